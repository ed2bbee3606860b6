//! The mutable assignment of students to project teams.
//!
//! An `Allocation` stores the team of every project and, inversely, the project of every student.
//! Both views are only changed through `add()` and `remove()` (and `move_to()`/`swap()` built on
//! them), which assert their preconditions, so the two views can never disagree.

pub mod cost;

#[cfg(test)]
mod tests;

pub use cost::{CostModel, ScoreBreakdown};

use super::Survey;
use std::collections::BTreeMap;

/// Assignment of students to projects, referencing both by index into the `Survey`.
#[derive(Clone, Debug)]
pub struct Allocation {
    /// Team members (student indexes) for each project
    teams: Vec<Vec<usize>>,
    /// Current project of each student
    ison: Vec<Option<usize>>,
    /// Snapshot of realized conflicts, see `note_conflicts()`
    conflicts: Option<BTreeMap<usize, Vec<usize>>>,
}

/// Two allocations are equal if every student is placed on the same project. The order of members
/// within a team and the conflict snapshot are not considered.
impl PartialEq for Allocation {
    fn eq(&self, other: &Self) -> bool {
        self.ison == other.ison
    }
}

impl Eq for Allocation {}

impl Allocation {
    /// Create an empty allocation (no student placed) for the survey's students and projects
    pub fn new(survey: &Survey) -> Self {
        Self::with_size(survey.students.len(), survey.projects.len())
    }

    pub fn with_size(num_students: usize, num_projects: usize) -> Self {
        Allocation {
            teams: vec![Vec::new(); num_projects],
            ison: vec![None; num_students],
            conflicts: None,
        }
    }

    /// Place an unplaced student on a project.
    ///
    /// # Panics
    /// If the student is already placed on any project.
    pub fn add(&mut self, student: usize, project: usize) {
        assert!(
            self.ison[student].is_none(),
            "Student {} is already on project {:?}",
            student,
            self.ison[student]
        );
        self.teams[project].push(student);
        self.ison[student] = Some(project);
    }

    /// Take a student off their project.
    ///
    /// # Panics
    /// If the student is not currently placed on `project`.
    pub fn remove(&mut self, student: usize, project: usize) {
        assert_eq!(
            self.ison[student],
            Some(project),
            "Student {} is not on project {}",
            student,
            project
        );
        let team = &mut self.teams[project];
        let pos = team
            .iter()
            .position(|s| *s == student)
            .expect("team membership and inverse lookup disagree");
        team.swap_remove(pos);
        self.ison[student] = None;
    }

    /// Move a placed student to another project
    pub fn move_to(&mut self, student: usize, project: usize) {
        let src = self.project_of(student);
        self.remove(student, src);
        self.add(student, project);
    }

    /// Exchange the projects of two placed students
    pub fn swap(&mut self, a: usize, b: usize) {
        let pa = self.project_of(a);
        let pb = self.project_of(b);
        self.remove(a, pa);
        self.remove(b, pb);
        self.add(a, pb);
        self.add(b, pa);
        debug_assert!(self.check_consistency().is_ok());
    }

    /// Current team size of the project
    pub fn num(&self, project: usize) -> usize {
        self.teams[project].len()
    }

    pub fn team(&self, project: usize) -> &[usize] {
        &self.teams[project]
    }

    pub fn teams(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.teams.iter().map(|t| t.as_slice()).enumerate()
    }

    /// Current project of the student, if placed
    pub fn ison(&self, student: usize) -> Option<usize> {
        self.ison[student]
    }

    /// Current project of a placed student.
    ///
    /// # Panics
    /// If the student is not placed.
    pub fn project_of(&self, student: usize) -> usize {
        self.ison[student].unwrap_or_else(|| panic!("Student {} is not placed", student))
    }

    pub fn num_students(&self) -> usize {
        self.ison.len()
    }

    pub fn num_projects(&self) -> usize {
        self.teams.len()
    }

    /// Whether every student is placed on a project
    pub fn is_complete(&self) -> bool {
        self.ison.iter().all(|p| p.is_some())
    }

    /// Assignment as a vector of project indexes per student (None for unplaced students)
    pub fn assignment(&self) -> Vec<Option<usize>> {
        self.ison.clone()
    }

    /// Check that team membership and the inverse lookup agree: each student is listed in the
    /// team of exactly the project the inverse lookup reports, and in no other team.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut seen = vec![None; self.ison.len()];
        for (p, team) in self.teams.iter().enumerate() {
            for s in team.iter() {
                if let Some(other) = seen[*s] {
                    return Err(format!(
                        "Student {} is member of projects {} and {}",
                        s, other, p
                    ));
                }
                seen[*s] = Some(p);
            }
        }
        for (s, p) in self.ison.iter().enumerate() {
            if *p != seen[s] {
                return Err(format!(
                    "Student {} is listed on {:?} but on the team of {:?}",
                    s, p, seen[s]
                ));
            }
        }
        Ok(())
    }

    /// Iterate all realized conflicts as directed (student, avoided teammate) pairs
    pub fn conflict_pairs<'a>(
        &'a self,
        survey: &'a Survey,
    ) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.teams.iter().flat_map(move |team| {
            team.iter().flat_map(move |s| {
                survey.students[*s]
                    .antagonists
                    .iter()
                    .filter(move |a| team.contains(a))
                    .map(move |a| (*s, *a))
            })
        })
    }

    /// Number of realized conflicts in the whole allocation. Each directed avoidance counts once,
    /// so a mutual avoidance between teammates counts twice.
    pub fn total_conflicts(&self, survey: &Survey) -> usize {
        self.conflict_pairs(survey).count()
    }

    /// Indexes of all students who avoid one of their teammates, each listed once
    pub fn conflicted_students(&self, survey: &Survey) -> Vec<usize> {
        let mut students: Vec<usize> = self.conflict_pairs(survey).map(|(s, _)| s).collect();
        students.dedup();
        students
    }

    /// Record the current realized conflicts, mapping each student to the avoided teammates
    pub fn note_conflicts(&mut self, survey: &Survey) {
        let mut conflicts = BTreeMap::<usize, Vec<usize>>::new();
        for (s, a) in self.conflict_pairs(survey) {
            conflicts.entry(s).or_insert_with(Vec::new).push(a);
        }
        self.conflicts = Some(conflicts);
    }

    /// Avoided teammates of a student as recorded by the last `note_conflicts()` call
    pub fn noted_conflicts(&self, student: usize) -> &[usize] {
        self.conflicts
            .as_ref()
            .and_then(|c| c.get(&student))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
