// Copyright 2020 by Michael Thies <mail@mhthies.de>
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Human readable reports of allocations and of the survey, to be printed to stdout.

use crate::alloc::{Allocation, CostModel};
use crate::{Cost, Rank, Student, Survey};
use std::fmt::Write;

/// One-line description of a student: padded name, major, first role, GPA and the short names of
/// the given peers
fn entry(student: &Student, peers: &[usize], survey: &Survey) -> String {
    let peers = peers
        .iter()
        .map(|p| survey.students[*p].short_name())
        .collect::<Vec<String>>()
        .join(", ");
    format!(
        "{:<23.23}  {:>8.8}  {}  {}  [{}]",
        student.name,
        student.major,
        student.roles.first().map(|r| r.as_str()).unwrap_or("-"),
        student.gpa,
        peers
    )
}

/// Names of the skills the student claims, separated by spaces
fn skill_string(student: &Student, survey: &Survey) -> String {
    survey
        .skills
        .iter()
        .zip(student.skills.iter())
        .filter(|(_, has)| **has)
        .map(|(name, _)| name.as_str())
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Members of a project's team, sorted by surname
fn sorted_team<'a>(survey: &'a Survey, alloc: &Allocation, project: usize) -> Vec<&'a Student> {
    let mut team: Vec<&Student> = alloc
        .team(project)
        .iter()
        .map(|s| &survey.students[*s])
        .collect();
    team.sort_by(|a, b| (&a.last, &a.first).cmp(&(&b.last, &b.first)));
    team
}

/// Format an allocation with all details. For each project, one line per member is printed with
/// the student's rank for the project, major, first role, GPA, the realized conflicts (as noted by
/// `Allocation::note_conflicts()`) and skills. The score breakdown follows at the end.
///
/// The output format will look like
/// ```text
///
/// Solar Car (2)
/// 5 Dora Diaz                     E:D  Design  inf  []
/// 4 Carla Chen                    E:C  Software  3.2  []  Programming
///
/// score = {5: 3, 4: 2, 3: 1, 2: 0, 1: 0} + 0 conflicts = 8
/// ```
pub fn format_allocation(model: CostModel, alloc: &Allocation) -> String {
    let survey = model.survey;
    let mut result = String::new();
    for project in survey.projects.iter() {
        write!(result, "\n{}\n", project).unwrap();
        for student in sorted_team(survey, alloc, project.index) {
            writeln!(
                result,
                "{} {}  {}",
                student.pref(project.index),
                entry(student, alloc.noted_conflicts(student.index), survey),
                skill_string(student, survey)
            )
            .unwrap();
        }
    }
    write!(result, "\nscore = {}\n", model.score(alloc)).unwrap();
    result
}

/// Format an allocation in its final form: only the names of the members of each project
pub fn format_final(survey: &Survey, alloc: &Allocation) -> String {
    let mut result = String::new();
    for project in survey.projects.iter() {
        write!(result, "\n{}\n", project).unwrap();
        for student in sorted_team(survey, alloc, project.index) {
            writeln!(result, "{}", student.name).unwrap();
        }
    }
    result
}

/// Format the suggestions for manual improvements: for each student all swaps and moves that
/// cost less than `cutoff`, cheapest first
pub fn format_swaps(model: CostModel, alloc: &Allocation, cutoff: Cost) -> String {
    let survey = model.survey;
    let mut result = String::new();
    for student in survey.students.iter() {
        writeln!(
            result,
            "{} {}",
            student,
            survey.projects[alloc.project_of(student.index)]
        )
        .unwrap();

        for (cost, other) in model.cheapest_swaps(alloc, student.index, cutoff) {
            let other = &survey.students[other];
            writeln!(
                result,
                "    {}\t{:>20.20} {:>8.8}  {} {:.30}",
                cost,
                other.name,
                other.major,
                other.gpa,
                survey.projects[alloc.project_of(other.index)].to_string()
            )
            .unwrap();
        }
        result.push('\n');

        for (cost, project) in model.cheapest_moves(alloc, student.index, cutoff) {
            writeln!(
                result,
                "    {}\t{:.30}",
                cost,
                survey.projects[project].to_string()
            )
            .unwrap();
        }
        result.push('\n');
    }
    result
}

/// Format a student's card: entry with avoided peers, skills, ranks for all projects, the locked
/// marker and the comment
fn format_student(result: &mut String, student: &Student, survey: &Survey) {
    writeln!(result, "{}", entry(student, &student.antagonists, survey)).unwrap();
    writeln!(result, "{:30} {}", "", skill_string(student, survey)).unwrap();
    let numbers = (1..=survey.projects.len())
        .map(|i| format!("{:>2}", i))
        .collect::<Vec<String>>()
        .join(" ");
    let ranks = student
        .prefs
        .iter()
        .map(|r| format!("{:>2}", r.get()))
        .collect::<Vec<String>>()
        .join(" ");
    writeln!(result, "\nProject\t{}", numbers).unwrap();
    writeln!(
        result,
        "       \t{}{}",
        ranks,
        if student.locked { "  locked" } else { "" }
    )
    .unwrap();
    write!(result, "\n{}\n\n", student.comment).unwrap();
}

/// Format a summary of the survey data:
/// * project and skill names
/// * students avoided by their peers, most avoided first
/// * the number of students signing up for each role (as first choice)
/// * students who are hard to place (second best rank below mediocre)
/// * a card for each student
/// * for each project, the students who ranked it 5, 4 or 3
pub fn format_summary(survey: &Survey) -> String {
    let mut result = String::new();

    for project in survey.projects.iter() {
        writeln!(result, "{}\t{}", project.index + 1, project.name).unwrap();
    }
    result.push('\n');
    for (i, skill) in survey.skills.iter().enumerate() {
        writeln!(result, "{}\t{}", i + 1, skill).unwrap();
    }
    result.push('\n');

    let mut avoided: Vec<&Student> = survey.students.iter().filter(|s| s.tally > 0).collect();
    avoided.sort_by(|a, b| b.tally.cmp(&a.tally).then_with(|| a.name.cmp(&b.name)));
    for student in avoided {
        writeln!(result, "{} {}", student.tally, student).unwrap();
    }
    result.push('\n');

    let mut roles = std::collections::BTreeMap::<&str, usize>::new();
    for student in survey.students.iter() {
        if let Some(role) = student.roles.first() {
            *roles.entry(role.as_str()).or_insert(0) += 1;
        }
    }
    let mut roles: Vec<(&str, usize)> = roles.into_iter().collect();
    roles.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (role, count) in roles {
        writeln!(result, "{} {}", role, count).unwrap();
    }
    result.push('\n');

    writeln!(result, "Hard to place:").unwrap();
    for student in survey.students.iter().filter(|s| is_hard_to_place(s)) {
        format_student(&mut result, student, survey);
    }
    result.push('\n');

    for student in survey.students.iter() {
        format_student(&mut result, student, survey);
    }

    for project in survey.projects.iter() {
        writeln!(result, "Project {}", project).unwrap();
        for rank in Rank::all().rev().take(3) {
            if let Some(students) = project.students_by_rank.get(&rank) {
                writeln!(result, "{}", rank).unwrap();
                for s in students {
                    let student = &survey.students[*s];
                    writeln!(result, "{}", entry(student, &student.antagonists, survey)).unwrap();
                }
            }
        }
        result.push('\n');
    }

    result
}

/// An unlocked student whose second best rank is below mediocre
fn is_hard_to_place(student: &Student) -> bool {
    if student.locked {
        return false;
    }
    let mut prefs = student.prefs.clone();
    prefs.sort_by(|a, b| b.cmp(a));
    prefs.get(1).map_or(false, |r| *r < Rank::MEDIOCRE)
}
