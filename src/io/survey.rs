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

//! IO functionality for the preference survey export and construction of the complete `Survey`
//! from survey responses, roster and configuration.
//!
//! The survey export is a CSV file with a header row. Columns are identified by their header:
//! * `project[<name>]`: the rank (1-5) for the named project
//! * `avoid…`: free-text name of a peer the student does not want to work with
//! * `role…`: a role the student would like to take
//! * `skills[<name>]`: `Y` if the student claims the named skill
//! * `major`, `major2`, `comment`, `email`, `student_id`
//!
//! All other columns are ignored.

use super::fuzzy::FuzzyDict;
use super::roster::Roster;
use crate::config::Config;
use crate::{Project, Rank, Student, Survey};
use log::{debug, info, warn};
use std::collections::HashMap;

/// A single survey response, before it is matched against the roster
#[derive(Clone, Debug)]
struct Response {
    student_id: String,
    email: String,
    /// Ranks of the configured (surveyed) projects, in the configured order
    prefs: Vec<Rank>,
    antinames: Vec<String>,
    roles: Vec<String>,
    skills: Vec<bool>,
    major: String,
    comment: String,
}

/// Column indexes of the survey export, derived from its header row
struct Columns {
    /// Column of each configured project, in the configured order
    projects: Vec<usize>,
    avoid: Vec<usize>,
    roles: Vec<usize>,
    skills: Vec<(String, usize)>,
    major: Option<usize>,
    major2: Option<usize>,
    comment: Option<usize>,
    email: usize,
    student_id: usize,
}

/// Extract `<name>` from a header of the form `<prefix>[<name>]`
fn bracketed<'a>(header: &'a str, prefix: &str) -> Option<&'a str> {
    header
        .strip_prefix(prefix)
        .and_then(|h| h.strip_prefix('['))
        .and_then(|h| h.strip_suffix(']'))
        .map(|h| h.trim())
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord, config: &Config) -> Result<Columns, String> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let mut project_columns = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            if let Some(name) = bracketed(header, "project") {
                if config.projects.iter().any(|p| p == name) {
                    project_columns.insert(name.to_owned(), i);
                } else {
                    warn!("Ignoring survey column for unknown project '{}'", name);
                }
            }
        }
        let projects = config
            .projects
            .iter()
            .map(|name| {
                project_columns
                    .get(name)
                    .copied()
                    .ok_or(format!("No survey column found for project '{}'", name))
            })
            .collect::<Result<Vec<usize>, String>>()?;

        let prefixed = |prefix: &str| {
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| h.starts_with(prefix) && !h.contains('['))
                .map(|(i, _)| i)
                .collect::<Vec<usize>>()
        };

        Ok(Columns {
            projects,
            avoid: prefixed("avoid"),
            roles: prefixed("role"),
            skills: headers
                .iter()
                .enumerate()
                .filter_map(|(i, h)| bracketed(h, "skills").map(|name| (name.to_owned(), i)))
                .collect(),
            major: find("major"),
            major2: find("major2"),
            comment: find("comment"),
            email: find("email").ok_or("No 'email' column found in survey")?,
            student_id: find("student_id").ok_or("No 'student_id' column found in survey")?,
        })
    }

    fn parse_row(&self, row: &csv::StringRecord, config: &Config) -> Result<Response, String> {
        let field = |i: usize| row.get(i).unwrap_or("").trim();
        let optional = |i: Option<usize>| i.map(field).unwrap_or("").to_owned();
        let email = field(self.email).to_owned();

        let prefs = self
            .projects
            .iter()
            .zip(config.projects.iter())
            .map(|(column, name)| {
                let value = field(*column);
                value.parse::<u8>().ok().and_then(Rank::new).ok_or(format!(
                    "Invalid preference '{}' for project '{}' in the response of {}",
                    value, name, email
                ))
            })
            .collect::<Result<Vec<Rank>, String>>()?;

        let major2 = optional(self.major2);
        let mut comment = optional(self.comment).replace('\\', "");
        if !major2.is_empty() {
            comment = format!("{}\n\n{}", major2, comment);
        }

        Ok(Response {
            student_id: field(self.student_id).to_owned(),
            prefs,
            antinames: self
                .avoid
                .iter()
                .map(|i| field(*i))
                .filter(|n| !n.is_empty())
                .map(|n| n.to_owned())
                .collect(),
            roles: self
                .roles
                .iter()
                .map(|i| field(*i))
                .filter(|r| !r.is_empty())
                .map(|r| r.to_owned())
                .collect(),
            skills: self
                .skills
                .iter()
                .map(|(_, i)| field(*i).eq_ignore_ascii_case("y"))
                .collect(),
            major: optional(self.major),
            comment,
            email,
        })
    }
}

/// Read the survey export and build the complete survey: responses are matched with the roster,
/// avoided peers are resolved and the configured restrictions, locks and bars are applied.
///
/// # Errors
/// Fails on malformed CSV data, a missing project column, an invalid preference rank, a student
/// id that is not in the roster, or an email address differing from the roster's.
///
/// Unresolvable names (avoided peers, locked or barred students) and unknown project names are
/// only reported as warnings; the affected relation or rule is skipped.
pub fn read<R: std::io::Read>(reader: R, roster: &Roster, config: &Config) -> Result<Survey, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers().map_err(|e| e.to_string())?.clone();
    let columns = Columns::from_headers(&headers, config)?;

    let mut responses: Vec<Response> = Vec::new();
    let mut by_id = HashMap::<String, (usize, usize)>::new();
    for (i, row) in csv_reader.records().enumerate() {
        let row = row.map_err(|e| format!("Invalid survey row {}: {}", i + 1, e))?;
        let response = columns.parse_row(&row, config)?;
        match by_id.get_mut(&response.student_id) {
            Some((previous_row, index)) => {
                warn!(
                    "Student id {} answered the survey twice. Using row {} instead of row {}.",
                    response.student_id,
                    i + 1,
                    *previous_row + 1
                );
                *previous_row = i;
                responses[*index] = response;
            }
            None => {
                by_id.insert(response.student_id.clone(), (i, responses.len()));
                responses.push(response);
            }
        }
    }
    info!("Read {} survey responses", responses.len());

    let mut students = responses
        .into_iter()
        .map(|r| match_roster(r, roster, config))
        .collect::<Result<Vec<Student>, String>>()?;
    students.sort_by(|a, b| (&a.last, &a.first).cmp(&(&b.last, &b.first)));
    for (i, student) in students.iter_mut().enumerate() {
        student.index = i;
        student.is_citizen = config.eligible_citizenships.contains(&student.citizenship)
            || config.eligible_visas.contains(&student.visa);
    }

    let mut names = FuzzyDict::new(config.fuzzy_cutoff);
    for student in students.iter() {
        if let Some(previous) = names.insert(&student.name, student.index) {
            warn!(
                "Students {} and {} share the name {}. Names resolve to the latter.",
                students[previous].id, student.id, student.name
            );
        }
    }
    resolve_antagonists(&mut students, &names, config);

    if config.promote_top_choice {
        promote_top_choice(&mut students);
    }

    let mut survey = Survey {
        students,
        projects: config
            .all_project_names()
            .enumerate()
            .map(|(i, name)| {
                let (min, max) = config.staffing(name);
                Project::new(i, name.clone(), min, max)
            })
            .collect(),
        skills: columns.skills.into_iter().map(|(name, _)| name).collect(),
    };

    apply_restrictions(&mut survey, config);
    apply_locks_and_bars(&mut survey, &names, config);
    survey.refresh_derived();
    crate::assert_data_consistency(&survey);

    Ok(survey)
}

/// Combine a survey response with the student's roster entry
fn match_roster(response: Response, roster: &Roster, config: &Config) -> Result<Student, String> {
    let entry = roster.lookup(&response.student_id).ok_or(format!(
        "Student id '{}' of {} not found in roster",
        response.student_id, response.email
    ))?;
    if !entry.email.eq_ignore_ascii_case(&response.email) {
        return Err(format!(
            "Email address of student id '{}' does not match: '{}' in survey, '{}' in roster",
            response.student_id, response.email, entry.email
        ));
    }

    let mut prefs = response.prefs;
    prefs.extend(config.unlisted_projects.iter().map(|_| Rank::MIN));

    Ok(Student {
        index: 0,
        id: entry.student_id.clone(),
        first: entry.first.clone(),
        last: entry.last.clone(),
        name: format!("{} {}", entry.first, entry.last),
        email: entry.email.clone(),
        max_pref: prefs.iter().copied().max().unwrap_or(Rank::MIN),
        prefs,
        gpa: entry.gpa,
        citizenship: entry.citizenship.clone(),
        visa: entry.visa.clone(),
        is_citizen: false,
        antinames: response.antinames,
        antagonists: Vec::new(),
        tally: 0,
        roles: response.roles,
        skills: response.skills,
        major: response.major,
        comment: response.comment,
        locked: false,
    })
}

/// Look up a student by (approximate) name, reporting approximate matches
fn find_student(names: &FuzzyDict<usize>, students: &[Student], name: &str) -> Option<usize> {
    let index = *names.get(name)?;
    if !students[index].name.eq_ignore_ascii_case(name.trim()) {
        info!("Fuzzy match: '{}' -> {}", name, students[index]);
    }
    Some(index)
}

/// Resolve the avoided-peer names of all students and count how often each student is named
fn resolve_antagonists(students: &mut [Student], names: &FuzzyDict<usize>, config: &Config) {
    let all: &[Student] = students;
    let resolved: Vec<Vec<usize>> = all
        .iter()
        .map(|student| {
            let mut antagonists = Vec::new();
            for name in student.antinames.iter() {
                let name = config.name_fixes.get(name).unwrap_or(name);
                match find_student(names, all, name) {
                    Some(other) if other == student.index => {
                        warn!("{} named themselves as a peer to avoid", student)
                    }
                    Some(other) if !antagonists.contains(&other) => antagonists.push(other),
                    Some(_) => {}
                    None => warn!(
                        "Could not resolve peer to avoid: {} -> '{}'",
                        student, name
                    ),
                }
            }
            antagonists
        })
        .collect();

    for (s, antagonists) in resolved.into_iter().enumerate() {
        for other in antagonists.iter() {
            students[*other].tally += 1;
        }
        students[s].antagonists = antagonists;
    }
}

/// Raise the best rank of every student to the maximum rank
fn promote_top_choice(students: &mut [Student]) {
    for student in students.iter_mut() {
        let best = student.prefs.iter().copied().max().unwrap_or(Rank::MAX);
        if best < Rank::MAX {
            info!("Promoting top choices of {} from {} to {}", student, best, Rank::MAX);
            for rank in student.prefs.iter_mut().filter(|r| **r == best) {
                *rank = Rank::MAX;
            }
            student.max_pref = Rank::MAX;
        }
    }
}

/// Mark the restricted projects and bar all ineligible students from them
fn apply_restrictions(survey: &mut Survey, config: &Config) {
    for name in config.restricted_projects.iter() {
        match survey.find_project(name) {
            Some(p) => {
                info!("Restricted: {}", survey.projects[p]);
                survey.projects[p].restricted = true;
            }
            None => warn!("Could not find restricted project '{}'", name),
        }
    }

    let Survey {
        students, projects, ..
    } = survey;
    for student in students.iter_mut().filter(|s| !s.is_citizen) {
        for project in projects.iter().filter(|p| p.restricted) {
            debug!(
                "{} ({}) barred from restricted {}",
                student,
                student.pref(project.index),
                project
            );
            student.bar_from(project.index);
        }
    }
}

/// Resolve a (student name, project name) pair of the configuration
fn resolve_pair(
    survey: &Survey,
    names: &FuzzyDict<usize>,
    student_name: &str,
    project_name: &str,
    rule: &str,
) -> Option<(usize, usize)> {
    let student = find_student(names, &survey.students, student_name);
    if student.is_none() {
        warn!("Could not find {} student '{}'", rule, student_name);
    }
    let project = survey.find_project(project_name);
    if project.is_none() {
        warn!("Could not find project '{}' of {} student '{}'", project_name, rule, student_name);
    }
    Some((student?, project?))
}

/// Apply the configured locks, then the configured bars
fn apply_locks_and_bars(survey: &mut Survey, names: &FuzzyDict<usize>, config: &Config) {
    for (student_name, project_name) in config.locked_students.iter() {
        if let Some((s, p)) = resolve_pair(survey, names, student_name, project_name, "locked") {
            info!("{} locked onto {}", survey.students[s], survey.projects[p]);
            survey.students[s].lock_onto(p);
        }
    }
    for (student_name, project_name) in config.barred_students.iter() {
        if let Some((s, p)) = resolve_pair(survey, names, student_name, project_name, "barred") {
            info!(
                "{} ({}) barred from {}",
                survey.students[s],
                survey.students[s].pref(p),
                survey.projects[p]
            );
            survey.students[s].bar_from(p);
        }
    }
}
