//! Cost model for allocations: marginal costs of single students and of moves and swaps, as well
//! as the global score of a complete allocation.
//!
//! The marginal costs only consider the placement penalty of the rank, conflicts and (for moves)
//! staffing boundaries. Low-GPA caps and restricted projects are only part of the global score.

use super::Allocation;
use crate::config::Penalties;
use crate::{Cost, Rank, Survey};
use std::fmt;

/// The survey together with the penalty weights. All cost calculations are done through this
/// object.
#[derive(Clone, Copy)]
pub struct CostModel<'a> {
    pub survey: &'a Survey,
    pub penalties: &'a Penalties,
}

impl<'a> CostModel<'a> {
    pub fn new(survey: &'a Survey, penalties: &'a Penalties) -> Self {
        CostModel { survey, penalties }
    }

    /// Cost of having `student` on `project`, given that `exclude` is *not* on the project.
    ///
    /// This is the placement penalty of the student's rank for the project plus the conflict
    /// penalty for every teammate the student avoids and every teammate avoiding the student.
    pub fn cost(
        &self,
        alloc: &Allocation,
        student: usize,
        project: usize,
        exclude: Option<usize>,
    ) -> Cost {
        let stu = &self.survey.students[student];
        let team = alloc.team(project);
        let counted = |other: usize| Some(other) != exclude && other != student;
        let avoided = stu
            .antagonists
            .iter()
            .filter(|a| counted(**a) && team.contains(*a))
            .count();
        let avoiding = team
            .iter()
            .filter(|t| counted(**t) && self.survey.students[**t].antagonists.contains(&student))
            .count();

        self.penalties.rank.penalty(stu.pref(project))
            + self.penalties.conflict * (avoided + avoiding) as Cost
    }

    /// Net change of the cost when moving `student` from their current project to `dest`,
    /// including the staffing penalties gained or lost at either end.
    pub fn cost_of_move(&self, alloc: &Allocation, student: usize, dest: usize) -> Cost {
        let src = alloc.project_of(student);
        let (src_project, dest_project) = (&self.survey.projects[src], &self.survey.projects[dest]);

        let mut before = self.cost(alloc, student, src, None);
        if alloc.num(src) == src_project.max_staff + 1 {
            before += self.penalties.over_staff;
        }
        if alloc.num(src) == src_project.min_staff {
            before -= self.penalties.under_staff;
        }

        let mut after = self.cost(alloc, student, dest, None);
        if alloc.num(dest) == dest_project.max_staff {
            after += self.penalties.over_staff;
        }
        if alloc.num(dest) + 1 == dest_project.min_staff {
            after -= self.penalties.under_staff;
        }

        after - before
    }

    /// Net change of the cost when exchanging the projects of students `a` and `b`
    pub fn cost_of_swap(&self, alloc: &Allocation, a: usize, b: usize) -> Cost {
        let (pa, pb) = (alloc.project_of(a), alloc.project_of(b));
        let before = self.cost(alloc, a, pa, None) + self.cost(alloc, b, pb, None);
        let after = self.cost(alloc, a, pb, Some(b)) + self.cost(alloc, b, pa, Some(a));
        after - before
    }

    /// All swaps of `student` with students on other projects that cost less than `cutoff`, as
    /// (cost, other student) pairs in increasing order of cost
    pub fn cheapest_swaps(
        &self,
        alloc: &Allocation,
        student: usize,
        cutoff: Cost,
    ) -> Vec<(Cost, usize)> {
        let src = alloc.project_of(student);
        let mut result: Vec<(Cost, usize)> = (0..alloc.num_students())
            .filter(|other| alloc.ison(*other).map_or(false, |p| p != src))
            .map(|other| (self.cost_of_swap(alloc, student, other), other))
            .filter(|(cost, _)| *cost < cutoff)
            .collect();
        result.sort();
        result
    }

    /// All moves of `student` to other projects that cost less than `cutoff`, as
    /// (cost, project) pairs in increasing order of cost
    pub fn cheapest_moves(
        &self,
        alloc: &Allocation,
        student: usize,
        cutoff: Cost,
    ) -> Vec<(Cost, usize)> {
        let src = alloc.project_of(student);
        let mut result: Vec<(Cost, usize)> = (0..alloc.num_projects())
            .filter(|p| *p != src)
            .map(|p| (self.cost_of_move(alloc, student, p), p))
            .filter(|(cost, _)| *cost < cutoff)
            .collect();
        result.sort();
        result
    }

    /// Calculate the global score of an allocation with all of its components
    pub fn score(&self, alloc: &Allocation) -> ScoreBreakdown {
        let penalties = self.penalties;
        let mut result = ScoreBreakdown::default();

        for (p, team) in alloc.teams() {
            let project = &self.survey.projects[p];
            if team.len() < project.min_staff {
                result.under_staff += penalties.under_staff;
            }
            if team.len() > project.max_staff {
                result.over_staff += penalties.over_staff;
            }

            if project.restricted {
                let non_citizens = team
                    .iter()
                    .filter(|s| !self.survey.students[**s].is_citizen)
                    .count();
                result.non_citizen += non_citizens as Cost * penalties.non_citizen;
            }

            let low_gpas = team
                .iter()
                .filter(|s| self.survey.students[**s].gpa < penalties.low_gpa_threshold)
                .count();
            if let Some(cap) = penalties.gpa_caps.cap(team.len()) {
                if low_gpas > cap {
                    result.low_gpa += penalties.low_gpa;
                }
            }

            for s in team.iter() {
                let rank = self.survey.students[*s].pref(p);
                result.rank_histogram[(rank.get() - Rank::MIN.get()) as usize] += 1;
                result.preference += penalties.rank.penalty(rank);
            }
        }

        result.conflicts = alloc.total_conflicts(self.survey);
        result.conflict = result.conflicts as Cost * penalties.conflict;
        result
    }
}

/// The global score of an allocation, split into its components
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub under_staff: Cost,
    pub over_staff: Cost,
    pub non_citizen: Cost,
    pub low_gpa: Cost,
    /// Sum of all students' placement penalties
    pub preference: Cost,
    /// Penalty for realized conflicts
    pub conflict: Cost,
    /// Number of directed realized conflicts
    pub conflicts: usize,
    /// Number of students placed at each rank (index 0 = minimum rank)
    pub rank_histogram: [usize; Rank::MAX.0 as usize],
}

impl ScoreBreakdown {
    pub fn total(&self) -> Cost {
        self.structural() + self.low_gpa + self.preference
    }

    /// Penalties of hard structural violations: staffing bounds, conflicts and ineligible
    /// members on restricted projects
    pub fn structural(&self) -> Cost {
        self.under_staff + self.over_staff + self.non_citizen + self.conflict
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let histogram = Rank::all()
            .rev()
            .map(|r| {
                format!(
                    "{}: {}",
                    r,
                    self.rank_histogram[(r.get() - Rank::MIN.get()) as usize]
                )
            })
            .collect::<Vec<String>>()
            .join(", ");
        write!(
            f,
            "{{{}}} + {} conflicts = {}",
            histogram,
            self.conflicts,
            self.total()
        )
    }
}
