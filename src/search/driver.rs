//! The outer search loop: endless random restarts, each improved to a local optimum, with
//! checkpointing of every good allocation found on the way.

use super::construct::{greedy_by_project, greedy_by_student};
use super::LocalSearch;
use crate::alloc::{Allocation, CostModel};
use crate::config::{Config, Construction};
use crate::Cost;
use log::{debug, info};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};

/// Number of desperate measures allowed per restart between two improving rounds
const DESPERATION_ROUNDS: usize = 1;

/// Parameters of the search driver
#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Allocations scoring below this value are passed to the checkpoint callback
    pub save_threshold: Cost,
    /// The search refuses to run with fewer students
    pub min_students: usize,
    /// Number of constructions per restart; the cheapest one is improved
    pub seed_candidates: usize,
    pub construction: Construction,
    /// Stop after this many restarts. None: run until stopped.
    pub max_restarts: Option<usize>,
}

impl SearchOptions {
    pub fn from_config(config: &Config) -> Self {
        SearchOptions {
            save_threshold: config.save_threshold,
            min_students: config.min_students,
            seed_candidates: config.seed_candidates,
            construction: config.construction,
            max_restarts: None,
        }
    }
}

/// Main function of the module: search for good allocations until the `stop` flag is set (or
/// `max_restarts` is reached).
///
/// Each restart constructs a fresh allocation, repairs understaffing and improves it with
/// `LocalSearch::fix_and_swap()` as long as the score keeps improving. After a round without
/// improvement, desperate measures are taken once; if that does not lead to an improvement in the
/// following round, the next restart begins. Every allocation scoring below the save threshold is
/// passed to `checkpoint`.
///
/// Returns the best allocation found with its score, or None if the search was stopped before
/// the first allocation was completed.
///
/// # Errors
/// Fails if there are fewer students than `min_students`, if an allocation cannot be constructed
/// or staffed (see `construct` and `LocalSearch::fix_understaff()`) and if `checkpoint` fails.
pub fn optimize<R, F>(
    model: CostModel,
    options: &SearchOptions,
    rng: R,
    stop: &AtomicBool,
    mut checkpoint: F,
) -> Result<Option<(Allocation, Cost)>, String>
where
    R: Rng,
    F: FnMut(&Allocation, Cost) -> Result<(), String>,
{
    let num_students = model.survey.students.len();
    if num_students < options.min_students {
        return Err(format!(
            "Not enough students: {} found, at least {} required.",
            num_students, options.min_students
        ));
    }

    let mut search = LocalSearch::new(model, rng);
    let mut best: Option<(Allocation, Cost)> = None;
    let mut restart = 0;

    while !stop.load(Ordering::Relaxed) && options.max_restarts.map_or(true, |m| restart < m) {
        debug!("Generating new allocation (restart {})", restart);
        let (mut alloc, score) = generate_alloc(&mut search, options, restart)?;
        descend(&mut search, &mut alloc, score, stop, |step, alloc| {
            if let Step::Round(score) = step {
                if score < options.save_threshold {
                    checkpoint(alloc, score)?;
                }
                if best.as_ref().map_or(true, |(_, b)| score < *b) {
                    info!("Best so far is {}", score);
                    best = Some((alloc.clone(), score));
                }
            }
            Ok(())
        })?;
        restart += 1;
    }

    if stop.load(Ordering::Relaxed) {
        info!("Search stopped after {} restarts.", restart);
    }
    Ok(best)
}

/// A step of `descend()`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Step {
    /// A round of `LocalSearch::fix_and_swap()` ended with this score
    Round(Cost),
    /// Desperate measures were taken, with this number of swaps and moves
    Desperate(usize),
}

/// Improve the allocation of one restart, starting from score `initial`, until a round without
/// improvement follows the desperate measures taken after the previous round without improvement.
/// `observe` is called after each step with the current allocation; its errors abort the descent.
pub(super) fn descend<R, F>(
    search: &mut LocalSearch<'_, R>,
    alloc: &mut Allocation,
    initial: Cost,
    stop: &AtomicBool,
    mut observe: F,
) -> Result<(), String>
where
    R: Rng,
    F: FnMut(Step, &Allocation) -> Result<(), String>,
{
    let model = search.model();
    let mut prev = initial;
    let mut desperation_left = DESPERATION_ROUNDS;

    while !stop.load(Ordering::Relaxed) {
        search.fix_and_swap(alloc);
        let score = model.score(alloc);
        debug!("{}", score);
        let score = score.total();
        observe(Step::Round(score), alloc)?;

        if score < prev {
            prev = score;
            desperation_left = DESPERATION_ROUNDS;
            continue;
        }
        if desperation_left == 0 {
            break;
        }
        desperation_left -= 1;
        let changes = search.desperate(alloc);
        debug!("Took {} desperate measures", changes);
        observe(Step::Desperate(changes), alloc)?;
    }
    Ok(())
}

/// Construct `options.seed_candidates` allocations with staffing repaired and return the one with
/// the lowest score.
fn generate_alloc<R: Rng>(
    search: &mut LocalSearch<'_, R>,
    options: &SearchOptions,
    restart: usize,
) -> Result<(Allocation, Cost), String> {
    let mut best = construct_candidate(search, options.construction, restart)?;
    for _ in 1..options.seed_candidates {
        let candidate = construct_candidate(search, options.construction, restart)?;
        if candidate.1 < best.1 {
            best = candidate;
        }
    }
    Ok(best)
}

fn construct_candidate<R: Rng>(
    search: &mut LocalSearch<'_, R>,
    construction: Construction,
    restart: usize,
) -> Result<(Allocation, Cost), String> {
    let model = search.model();
    let by_project = match construction {
        Construction::StudentGreedy => false,
        Construction::ProjectGreedy => true,
        Construction::Alternate => restart % 2 == 1,
    };
    let mut alloc = if by_project {
        greedy_by_project(model, search.rng())?
    } else {
        greedy_by_student(model, search.rng())?
    };
    search.fix_understaff(&mut alloc)?;
    let score = model.score(&alloc).total();
    Ok((alloc, score))
}
