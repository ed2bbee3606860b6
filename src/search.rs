//! Heuristic search for good allocations.
//!
//! The `LocalSearch` engine improves a single allocation in place by swapping and moving students,
//! repairing conflicts and understaffed projects. `construct` builds the initial allocations and
//! `driver` runs the endless restart loop around both of them.
//!
//! All operations only accept swaps and moves whose cost delta (see `alloc::CostModel`) is below
//! the engine's tolerance, with the exception of `LocalSearch::desperate()`, which deliberately
//! makes the allocation worse to escape local optima.

pub mod construct;
pub mod driver;

#[cfg(test)]
mod tests;

use crate::alloc::{Allocation, CostModel};
use crate::util::RandomTies;
use crate::{Cost, Rank};
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Reverse;

/// Maximum number of rounds of `LocalSearch::fix_and_swap()`
const MAX_FIX_ROUNDS: usize = 10;

/// Local search engine, operating on one allocation at a time
pub struct LocalSearch<'a, R: Rng> {
    model: CostModel<'a>,
    rng: R,
    /// Swaps and moves are applied if their cost delta is below this value
    tolerance: Cost,
}

impl<'a, R: Rng> LocalSearch<'a, R> {
    pub fn new(model: CostModel<'a>, rng: R) -> Self {
        LocalSearch {
            model,
            rng,
            tolerance: 0,
        }
    }

    /// Relax (positive values) or tighten (negative values) the acceptance threshold of swaps and
    /// moves
    pub fn with_tolerance(mut self, tolerance: Cost) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn model(&self) -> CostModel<'a> {
        self.model
    }

    pub fn rng(&mut self) -> &mut R {
        &mut self.rng
    }

    /// A locked student sitting on a project they rank highest is never moved away from it
    fn is_pinned(&self, alloc: &Allocation, student: usize) -> bool {
        let stu = &self.model.survey.students[student];
        stu.locked && stu.pref(alloc.project_of(student)) == Rank::MAX
    }

    /// Swap the two students if that improves the cost (by more than the tolerance). Returns
    /// whether the swap was made.
    pub fn try_swap(&self, alloc: &mut Allocation, a: usize, b: usize) -> bool {
        let cost = self.model.cost_of_swap(alloc, a, b);
        if cost < self.tolerance {
            alloc.swap(a, b);
            true
        } else {
            false
        }
    }

    /// Move the student to `dest` if that improves the cost (by more than the tolerance). Returns
    /// whether the move was made.
    pub fn try_move(&self, alloc: &mut Allocation, student: usize, dest: usize) -> bool {
        let cost = self.model.cost_of_move(alloc, student, dest);
        if cost < self.tolerance {
            alloc.move_to(student, dest);
            true
        } else {
            false
        }
    }

    /// Find and make the first acceptable swap for this student. Candidates are tried in
    /// decreasing order of the summed preference both students have for their new projects.
    ///
    /// Returns the number of swaps made (0 or 1).
    pub fn find_swap(&mut self, alloc: &mut Allocation, student: usize) -> usize {
        if self.is_pinned(alloc, student) {
            return 0;
        }
        let survey = self.model.survey;
        let students = &survey.students;
        let src = alloc.project_of(student);
        let mut candidates: Vec<(u8, usize)> = alloc
            .teams()
            .filter(|(p, _)| *p != src)
            .flat_map(move |(p, team)| {
                team.iter().map(move |other| {
                    (
                        students[*other].pref(src).get() + students[student].pref(p).get(),
                        *other,
                    )
                })
            })
            .filter(|(_, other)| !self.is_pinned(alloc, *other))
            .collect();
        candidates.sort_by_key_random_ties(&mut self.rng, |(total, _)| Reverse(*total));

        for (_, other) in candidates {
            if self.try_swap(alloc, student, other) {
                return 1;
            }
        }
        0
    }

    /// Find and make the first acceptable move for this student. Destinations are tried in
    /// decreasing order of the student's preference.
    ///
    /// Returns the number of moves made (0 or 1).
    pub fn find_move(&mut self, alloc: &mut Allocation, student: usize) -> usize {
        if self.is_pinned(alloc, student) {
            return 0;
        }
        let survey = self.model.survey;
        let stu = &survey.students[student];
        let src = alloc.project_of(student);
        let mut destinations: Vec<usize> = (0..alloc.num_projects()).filter(|p| *p != src).collect();
        destinations.sort_by_key_random_ties(&mut self.rng, |p| Reverse(stu.pref(*p)));

        for dest in destinations {
            if self.try_move(alloc, student, dest) {
                return 1;
            }
        }
        0
    }

    /// Try to resolve one realized conflict by swapping or moving one of the involved students.
    ///
    /// Returns the number of conflicts fixed (0 or 1); call repeatedly until it returns 0.
    pub fn fix_conflicts(&mut self, alloc: &mut Allocation) -> usize {
        let mut students = alloc.conflicted_students(self.model.survey);
        students.shuffle(&mut self.rng);

        for student in students {
            let count = match self.find_swap(alloc, student) {
                0 => self.find_move(alloc, student),
                n => n,
            };
            if count > 0 {
                return count;
            }
        }
        0
    }

    /// Move students into understaffed projects until no project is below its minimum.
    ///
    /// Returns the number of moves made. Fails if a project cannot be staffed, because no other
    /// project has students to spare, i.e. the number of students is smaller than the sum of all
    /// minimum staff numbers.
    pub fn fix_understaff(&mut self, alloc: &mut Allocation) -> Result<usize, String> {
        let survey = self.model.survey;
        let projects = &survey.projects;
        let mut moves = 0;
        loop {
            let mut understaffed: Vec<usize> = (0..projects.len())
                .filter(|p| alloc.num(*p) < projects[*p].min_staff)
                .collect();
            if understaffed.is_empty() {
                return Ok(moves);
            }
            understaffed.shuffle(&mut self.rng);

            for dest in understaffed {
                self.add_student(alloc, dest)?;
                moves += 1;
            }
        }
    }

    /// Move one student from a project that can spare someone to `dest`. The student with the
    /// highest preference for `dest` is chosen; locked students are only chosen if no one else is
    /// available.
    fn add_student(&mut self, alloc: &mut Allocation, dest: usize) -> Result<(), String> {
        let survey = self.model.survey;
        let candidates: Vec<usize> = alloc
            .teams()
            .filter(|(p, team)| *p != dest && team.len() > survey.projects[*p].min_staff)
            .flat_map(|(_, team)| team.iter().copied())
            .collect();
        let unlocked: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|s| !survey.students[*s].locked)
            .collect();
        let candidates = if unlocked.is_empty() {
            candidates
        } else {
            unlocked
        };

        let chosen = candidates
            .position_min_random_ties(&mut self.rng, |s| Reverse(survey.students[*s].pref(dest)))
            .ok_or(format!(
                "Cannot staff project '{}': no other project can spare a student. There are {} \
                 students for a total minimum staff of {}.",
                survey.projects[dest].name,
                survey.students.len(),
                survey.total_min_staff()
            ))?;
        alloc.move_to(candidates[chosen], dest);
        Ok(())
    }

    /// Try to make every student happier without hurting the score, starting with the students
    /// who are furthest below their best achievable rank.
    ///
    /// Returns the total number of swaps and moves made.
    pub fn find_swaps(&mut self, alloc: &mut Allocation) -> usize {
        let survey = self.model.survey;
        let students = &survey.students;
        let mut sad: Vec<usize> = (0..students.len()).collect();
        sad.sort_by_key_random_ties(&mut self.rng, |s| {
            students[*s].pref(alloc.project_of(*s)).get() as i16
                - students[*s].max_pref.get() as i16
        });

        let mut total = 0;
        for student in sad {
            total += match self.find_swap(alloc, student) {
                0 => self.find_move(alloc, student),
                n => n,
            };
        }
        total
    }

    /// Alternate conflict repair and global improvement passes, until a round makes no changes
    /// (at most `MAX_FIX_ROUNDS` rounds).
    ///
    /// Returns the total number of swaps and moves made.
    pub fn fix_and_swap(&mut self, alloc: &mut Allocation) -> usize {
        let mut total = 0;
        for round in 0..MAX_FIX_ROUNDS {
            debug!("Round {}: {}", round, self.model.score(alloc));
            let changes = self.fix_conflicts(alloc) + self.find_swaps(alloc);
            total += changes;
            if changes == 0 {
                break;
            }
        }
        total
    }

    /// Try all pairs of students and make every swap that improves the cost.
    ///
    /// Returns the number of swaps made.
    pub fn enumerate_swaps(&self, alloc: &mut Allocation) -> usize {
        let n = alloc.num_students();
        let mut total = 0;
        for a in 0..n {
            for b in 0..n {
                if alloc.project_of(a) != alloc.project_of(b)
                    && !self.is_pinned(alloc, a)
                    && !self.is_pinned(alloc, b)
                    && self.try_swap(alloc, a, b)
                {
                    total += 1;
                }
            }
        }
        total
    }

    /// Try all moves of all students and make every move that improves the cost.
    ///
    /// Returns the number of moves made.
    pub fn enumerate_moves(&self, alloc: &mut Allocation) -> usize {
        let mut total = 0;
        for student in 0..alloc.num_students() {
            for dest in 0..alloc.num_projects() {
                if dest != alloc.project_of(student)
                    && !self.is_pinned(alloc, student)
                    && self.try_move(alloc, student, dest)
                {
                    total += 1;
                }
            }
        }
        total
    }

    /// Desperate measures for an allocation that has no conflicts and no student below the
    /// mediocre rank: every student placed at a mediocre rank (and below their personal best) is
    /// moved or swapped onto a project they like better, even if that worsens the score.
    ///
    /// Does nothing if the allocation has realized conflicts or a student below the mediocre
    /// rank. Returns the number of swaps and moves made.
    pub fn desperate(&mut self, alloc: &mut Allocation) -> usize {
        let survey = self.model.survey;
        if alloc.total_conflicts(survey) > 0 {
            debug!("No desperate measures while there are conflicts.");
            return 0;
        }
        if survey
            .students
            .iter()
            .any(|s| s.pref(alloc.project_of(s.index)) < Rank::MEDIOCRE)
        {
            debug!("No desperate measures while students are below rank {}.", Rank::MEDIOCRE);
            return 0;
        }

        let mut sad: Vec<usize> = survey
            .students
            .iter()
            .filter(|s| {
                let pref = s.pref(alloc.project_of(s.index));
                pref <= Rank::MEDIOCRE && pref < s.max_pref && !s.locked
            })
            .map(|s| s.index)
            .collect();
        sad.shuffle(&mut self.rng);

        let mut total = 0;
        for student in sad {
            if self.make_happy(alloc, student) {
                total += 1;
            }
        }
        total
    }

    /// Move or swap the student onto a project they prefer over the current one, choosing the
    /// cheapest available operation regardless of its cost. Returns whether the student was
    /// relocated.
    fn make_happy(&mut self, alloc: &mut Allocation, student: usize) -> bool {
        let survey = self.model.survey;
        let stu = &survey.students[student];
        let pref = stu.pref(alloc.project_of(student));
        if pref > Rank::MEDIOCRE || pref >= stu.max_pref {
            return false;
        }

        let better: Vec<usize> = (0..alloc.num_projects())
            .filter(|p| stu.pref(*p) > pref)
            .collect();
        if better.is_empty() {
            return false;
        }

        let moves: Vec<(Cost, usize)> = better
            .iter()
            .map(|p| (self.model.cost_of_move(alloc, student, *p), *p))
            .collect();
        let swaps: Vec<(Cost, usize)> = better
            .iter()
            .flat_map(|p| alloc.team(*p).iter().copied())
            .filter(|other| !self.is_pinned(alloc, *other))
            .map(|other| (self.model.cost_of_swap(alloc, student, other), other))
            .collect();

        let best_move = moves.position_min_random_ties(&mut self.rng, |(cost, _)| *cost);
        let best_swap = swaps.position_min_random_ties(&mut self.rng, |(cost, _)| *cost);
        match (best_move, best_swap) {
            (Some(m), Some(s)) if moves[m].0 >= swaps[s].0 => {
                debug!(
                    "Desperately swapping {} and {} (cost {})",
                    stu, survey.students[swaps[s].1], swaps[s].0
                );
                alloc.swap(student, swaps[s].1);
            }
            (Some(m), _) => {
                debug!(
                    "Desperately moving {} to {} (cost {})",
                    stu, survey.projects[moves[m].1], moves[m].0
                );
                alloc.move_to(student, moves[m].1);
            }
            (None, _) => return false,
        }
        true
    }
}
