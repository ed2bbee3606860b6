//! Greedy construction of complete allocations.
//!
//! Both heuristics only respect the maximum staff numbers. The resulting allocations will often
//! have understaffed projects and should be passed to `LocalSearch::fix_understaff()`.

use crate::alloc::{Allocation, CostModel};
use crate::util::RandomTies;
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Reverse;

/// Build an allocation by visiting the students in random order and placing each of them on their
/// most preferred project that is not full yet.
///
/// Fails, if a student cannot be placed, because all projects are full.
pub fn greedy_by_student<R: Rng + ?Sized>(
    model: CostModel,
    rng: &mut R,
) -> Result<Allocation, String> {
    let survey = model.survey;
    let mut alloc = Allocation::new(survey);

    let mut students: Vec<usize> = (0..survey.students.len()).collect();
    students.shuffle(rng);

    for s in students {
        let student = &survey.students[s];
        let mut projects: Vec<usize> = (0..survey.projects.len()).collect();
        projects.sort_by_key_random_ties(rng, |p| Reverse(student.pref(*p)));

        let project = projects
            .into_iter()
            .find(|p| alloc.num(*p) < survey.projects[*p].max_staff)
            .ok_or(format!(
                "Could not place student {} on any project. The maximum staff numbers only allow \
                 for {} of {} students.",
                student,
                survey.projects.iter().map(|p| p.max_staff).sum::<usize>(),
                survey.students.len()
            ))?;
        alloc.add(s, project);
    }

    Ok(alloc)
}

/// Build an allocation by visiting the projects in random order and letting each of them choose the
/// cheapest of the remaining students, until all students are placed.
///
/// Fails, if students remain while all projects are full.
pub fn greedy_by_project<R: Rng + ?Sized>(
    model: CostModel,
    rng: &mut R,
) -> Result<Allocation, String> {
    let survey = model.survey;
    let mut alloc = Allocation::new(survey);
    let mut remaining: Vec<usize> = (0..survey.students.len()).collect();
    let mut projects: Vec<usize> = (0..survey.projects.len()).collect();

    while !remaining.is_empty() {
        projects.shuffle(rng);
        let mut progress = false;

        for p in projects.iter().copied() {
            if alloc.num(p) >= survey.projects[p].max_staff {
                continue;
            }
            let chosen = match remaining
                .position_min_random_ties(rng, |s| model.cost(&alloc, *s, p, None))
            {
                Some(i) => i,
                None => break,
            };
            alloc.add(remaining.swap_remove(chosen), p);
            progress = true;
        }

        if !progress {
            return Err(format!(
                "All projects are full, but {} students are left to place.",
                remaining.len()
            ));
        }
    }

    Ok(alloc)
}
