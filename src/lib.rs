//! Allocation of students to capacity-bounded project teams.
//!
//! The crate is split into the allocation state with its cost model (`alloc`), the heuristic
//! search working on it (`search`), the run configuration (`config`) and the IO collaborators for
//! rosters, surveys, reports and checkpoints (`io`).

pub mod alloc;
pub mod config;
pub mod io;
pub mod search;
mod util;


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of all penalty values and cost deltas. Negative deltas are improvements.
pub type Cost = i64;

/// A preference rank a student gave a project. Only values within `Rank::MIN..=Rank::MAX` can be
/// constructed, so every rank reaching the cost model has a penalty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rank(u8);

impl Rank {
    pub const MIN: Rank = Rank(1);
    pub const MAX: Rank = Rank(5);
    /// Students placed at or below this rank are candidates for desperate measures
    pub const MEDIOCRE: Rank = Rank(3);

    pub fn new(value: u8) -> Option<Rank> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Some(Rank(value))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterate all valid ranks in ascending order
    pub fn all() -> impl DoubleEndedIterator<Item = Rank> {
        (Self::MIN.0..=Self::MAX.0).map(Rank)
    }
}

impl std::convert::TryFrom<u8> for Rank {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rank::new(value).ok_or(format!(
            "Preference rank {} is not within [{},{}]",
            value,
            Rank::MIN.0,
            Rank::MAX.0
        ))
    }
}

impl From<Rank> for u8 {
    fn from(rank: Rank) -> u8 {
        rank.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Representation of a student's data, combined from the survey response and the roster
#[derive(Clone, Debug)]
pub struct Student {
    /// id/index of the Student in the list of students
    pub index: usize,
    /// Student id from the registrar's roster
    pub id: String,
    pub first: String,
    pub last: String,
    /// Full name ("first last"). Mainly used for info/debug output and name resolution
    pub name: String,
    pub email: String,
    /// Preference rank for each project, indexed by project index
    pub prefs: Vec<Rank>,
    /// Highest rank within `prefs`. Must be refreshed after preferences are overridden.
    pub max_pref: Rank,
    pub gpa: f32,
    pub citizenship: String,
    pub visa: String,
    /// Whether the student may be staffed on restricted projects
    pub is_citizen: bool,
    /// Free-text names of avoided peers, as given in the survey
    pub antinames: Vec<String>,
    /// Indexes of avoided peers
    pub antagonists: Vec<usize>,
    /// Number of peers who named this student as someone to avoid
    pub tally: usize,
    pub roles: Vec<String>,
    /// Self-rated skills, in the order of the survey's skill names
    pub skills: Vec<bool>,
    pub major: String,
    pub comment: String,
    /// Whether the preferences have been forced onto a single project
    pub locked: bool,
}

impl Student {
    /// Name in the form "F Last" for compact listings
    pub fn short_name(&self) -> String {
        match self.first.chars().next() {
            Some(initial) => format!("{} {}", initial, self.last),
            None => self.last.clone(),
        }
    }

    pub fn pref(&self, project: usize) -> Rank {
        self.prefs[project]
    }

    /// Recalculate `max_pref` from the current preferences
    pub fn update_max_pref(&mut self) {
        self.max_pref = self.prefs.iter().copied().max().unwrap_or(Rank::MIN);
    }

    /// Force the student onto a single project: maximum rank for it, minimum rank for all others
    pub fn lock_onto(&mut self, project: usize) {
        self.locked = true;
        for (p, rank) in self.prefs.iter_mut().enumerate() {
            *rank = if p == project { Rank::MAX } else { Rank::MIN };
        }
    }

    /// Bar the student from a project by forcing the minimum rank for it
    pub fn bar_from(&mut self, project: usize) {
        self.prefs[project] = Rank::MIN;
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Representation of a project's data
#[derive(Clone, Debug)]
pub struct Project {
    /// id/index of the Project in the list of projects
    pub index: usize,
    pub name: String,
    /// Minimum team size
    pub min_staff: usize,
    /// Maximum team size
    pub max_staff: usize,
    /// Whether the project requires citizens or permanent residents
    pub restricted: bool,
    /// Indexes of students grouped by the rank they gave this project
    pub students_by_rank: BTreeMap<Rank, Vec<usize>>,
}

impl Project {
    pub fn new(index: usize, name: String, min_staff: usize, max_staff: usize) -> Self {
        Project {
            index,
            name,
            min_staff,
            max_staff,
            restricted: false,
            students_by_rank: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.index + 1)
    }
}

/// The fully resolved problem: all students and projects, ready to be allocated
#[derive(Clone, Debug, Default)]
pub struct Survey {
    pub students: Vec<Student>,
    pub projects: Vec<Project>,
    /// Names of the skills students rated themselves on
    pub skills: Vec<String>,
}

impl Survey {
    pub fn find_project(&self, name: &str) -> Option<usize> {
        self.projects.iter().position(|p| p.name == name)
    }

    pub fn find_student_by_id(&self, id: &str) -> Option<usize> {
        self.students.iter().position(|s| s.id == id)
    }

    /// Rebuild the derived data (max rank per student, students by rank per project) after
    /// preferences have been changed.
    pub fn refresh_derived(&mut self) {
        for project in self.projects.iter_mut() {
            project.students_by_rank.clear();
        }
        for student in self.students.iter_mut() {
            student.update_max_pref();
            for (p, rank) in student.prefs.iter().enumerate() {
                self.projects[p]
                    .students_by_rank
                    .entry(*rank)
                    .or_insert_with(Vec::new)
                    .push(student.index);
            }
        }
    }

    /// Sum of all projects' minimum staffing
    pub fn total_min_staff(&self) -> usize {
        self.projects.iter().map(|p| p.min_staff).sum()
    }
}

/// Check consistency of a survey's students and projects (indexes, preference vector lengths,
/// antagonist references). Panics on the first violation.
pub fn assert_data_consistency(survey: &Survey) {
    for (i, p) in survey.projects.iter().enumerate() {
        assert_eq!(i, p.index, "Project {} has wrong index {}", i, p.index);
        assert!(
            p.min_staff <= p.max_staff,
            "Project {} has min_staff > max_staff",
            p.name
        );
    }
    for (i, s) in survey.students.iter().enumerate() {
        assert_eq!(i, s.index, "Student {} has wrong index {}", i, s.index);
        assert_eq!(
            s.prefs.len(),
            survey.projects.len(),
            "Student {} has {} preferences for {} projects",
            s.name,
            s.prefs.len(),
            survey.projects.len()
        );
        for a in s.antagonists.iter() {
            assert!(
                *a < survey.students.len(),
                "Antagonist {} of student {} does not exist",
                a,
                s.name
            );
        }
    }
}
