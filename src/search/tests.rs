use super::construct::{greedy_by_project, greedy_by_student};
use super::driver::{descend, optimize, SearchOptions, Step};
use super::LocalSearch;
use crate::alloc::{Allocation, CostModel};
use crate::config::{Construction, Penalties};
use crate::test::{create_survey, create_uniform_survey};
use crate::{Cost, Survey};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::AtomicBool;

fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

fn options(max_restarts: usize) -> SearchOptions {
    SearchOptions {
        save_threshold: 29,
        min_students: 10,
        seed_candidates: 1,
        construction: Construction::StudentGreedy,
        max_restarts: Some(max_restarts),
    }
}

/// Place the students on the projects in the given order: `teams[p]` lists the students of
/// project p.
fn create_alloc(survey: &Survey, teams: &[&[usize]]) -> Allocation {
    let mut alloc = Allocation::new(survey);
    for (p, team) in teams.iter().enumerate() {
        for s in team.iter() {
            alloc.add(*s, p);
        }
    }
    alloc
}

/// Twelve students, three projects with exactly four places each. Students 0-3 favour project 0,
/// students 4-7 project 1 and students 8-11 project 2.
fn create_perfect_survey() -> Survey {
    let prefs: Vec<[u8; 3]> = (0..12)
        .map(|s| {
            let mut p = [1; 3];
            p[s / 4] = 5;
            p
        })
        .collect();
    let prefs: Vec<&[u8]> = prefs.iter().map(|p| &p[..]).collect();
    create_survey(&prefs, &[(4, 4), (4, 4), (4, 4)])
}

#[test]
fn test_uniform_survey_is_staffed_without_violations() {
    let survey = create_uniform_survey(30, 5, 3, 5, 6);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut saved = Vec::<Cost>::new();

    let result = optimize(model, &options(3), rng(1), &AtomicBool::new(false), |_, score| {
        saved.push(score);
        Ok(())
    })
    .unwrap();

    let (alloc, score) = result.expect("no allocation found");
    assert!(alloc.is_complete());
    assert!(alloc.check_consistency().is_ok());
    for (_, team) in alloc.teams() {
        assert!(team.len() >= 5 && team.len() <= 6);
    }
    let breakdown = model.score(&alloc);
    assert_eq!(breakdown.structural(), 0);
    assert_eq!(breakdown.rank_histogram, [0, 0, 30, 0, 0]);
    assert_eq!(score, 30 * 5);
    // Nothing below the save threshold
    assert!(saved.is_empty());
}

#[test]
fn test_too_little_capacity_fails() {
    let survey = create_uniform_survey(30, 2, 3, 5, 6);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    let result = optimize(model, &options(1), rng(1), &AtomicBool::new(false), |_, _| Ok(()));
    assert!(result.is_err());
    assert!(greedy_by_student(model, &mut rng(2)).is_err());
    assert!(greedy_by_project(model, &mut rng(2)).is_err());
}

#[test]
fn test_too_few_students_fails() {
    let survey = create_uniform_survey(5, 2, 3, 1, 5);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    let result = optimize(model, &options(1), rng(1), &AtomicBool::new(false), |_, _| Ok(()));
    let err = result.unwrap_err();
    assert!(err.contains("Not enough students"), "unexpected error: {}", err);
}

#[test]
fn test_stopped_search_returns_nothing() {
    let survey = create_uniform_survey(12, 3, 3, 4, 4);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    let result = optimize(model, &options(100), rng(1), &AtomicBool::new(true), |_, _| {
        panic!("no checkpoint expected")
    });
    assert!(result.unwrap().is_none());
}

#[test]
fn test_good_allocations_are_checkpointed() {
    let survey = create_perfect_survey();
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut saved = Vec::<(Allocation, Cost)>::new();

    let mut opts = options(4);
    opts.construction = Construction::Alternate;
    opts.seed_candidates = 2;
    let (best, score) = optimize(model, &opts, rng(3), &AtomicBool::new(false), |alloc, score| {
        saved.push((alloc.clone(), score));
        Ok(())
    })
    .unwrap()
    .unwrap();

    assert_eq!(score, 0);
    for s in 0..12 {
        assert_eq!(best.project_of(s), s / 4);
    }
    assert!(!saved.is_empty());
    assert!(saved.iter().all(|(_, score)| *score < 29));
    assert!(saved.iter().any(|(alloc, _)| *alloc == best));
}

#[test]
fn test_checkpoint_errors_abort_search() {
    let survey = create_perfect_survey();
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    let result = optimize(model, &options(2), rng(1), &AtomicBool::new(false), |_, _| {
        Err(String::from("disk full"))
    });
    assert_eq!(result.unwrap_err(), "disk full");
}

#[test]
fn test_desperation_follows_first_round_without_improvement() {
    // Students 0-2 favour project 0, student 3 favours project 1; everybody ranks their other
    // project 3. At the optimum one of students 0-2 stays on project 1 at rank 3.
    let survey = create_survey(&[&[5, 3], &[5, 3], &[5, 3], &[3, 5]], &[(2, 2), (2, 2)]);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut alloc = create_alloc(&survey, &[&[2, 3], &[0, 1]]);
    let initial = model.score(&alloc).total();
    assert_eq!(initial, 15);

    let mut search = LocalSearch::new(model, rng(4));
    let mut steps = Vec::new();
    descend(&mut search, &mut alloc, initial, &AtomicBool::new(false), |step, _| {
        steps.push(step);
        Ok(())
    })
    .unwrap();

    // Improving round, no desperation; round without improvement, one desperate swap; second
    // round without improvement ends the restart
    assert_eq!(
        steps,
        vec![Step::Round(5), Step::Round(5), Step::Desperate(1), Step::Round(5)]
    );
    assert!(alloc.check_consistency().is_ok());
    assert_eq!(model.score(&alloc).total(), 5);
}

#[test]
fn test_descent_errors_and_stop() {
    let survey = create_survey(&[&[5, 3], &[5, 3], &[5, 3], &[3, 5]], &[(2, 2), (2, 2)]);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut alloc = create_alloc(&survey, &[&[2, 3], &[0, 1]]);
    let mut search = LocalSearch::new(model, rng(4));

    let mut calls = 0;
    let result = descend(&mut search, &mut alloc, 15, &AtomicBool::new(false), |_, _| {
        calls += 1;
        Err(String::from("disk full"))
    });
    assert_eq!(result.unwrap_err(), "disk full");
    assert_eq!(calls, 1);

    let result = descend(&mut search, &mut alloc, 15, &AtomicBool::new(true), |_, _| {
        panic!("no step expected")
    });
    assert!(result.is_ok());
}

#[test]
fn test_greedy_by_student_honors_preferences() {
    let survey = create_perfect_survey();
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    let alloc = greedy_by_student(model, &mut rng(5)).unwrap();
    assert!(alloc.is_complete());
    for s in 0..12 {
        assert_eq!(alloc.project_of(s), s / 4);
    }
}

#[test]
fn test_greedy_by_project() {
    let survey = create_uniform_survey(12, 3, 4, 4, 4);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    let alloc = greedy_by_project(model, &mut rng(7)).unwrap();
    assert!(alloc.is_complete());
    assert!(alloc.check_consistency().is_ok());
    for p in 0..3 {
        assert_eq!(alloc.num(p), 4);
    }

    let survey = create_uniform_survey(13, 3, 4, 4, 4);
    let model = CostModel::new(&survey, &penalties);
    assert!(greedy_by_project(model, &mut rng(7)).is_err());
}

#[test]
fn test_try_swap_and_move() {
    let survey = create_survey(&[&[5, 1], &[1, 5], &[1, 5]], &[(1, 2), (1, 2)]);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let search = LocalSearch::new(model, rng(1));

    // Everyone is happy: nothing is accepted and nothing changes
    let mut alloc = create_alloc(&survey, &[&[0], &[1, 2]]);
    let original = alloc.clone();
    assert!(!search.try_swap(&mut alloc, 0, 1));
    assert!(!search.try_move(&mut alloc, 0, 1));
    assert!(!search.try_move(&mut alloc, 2, 0));
    assert_eq!(alloc, original);
    assert_eq!(alloc.team(0), original.team(0));
    assert_eq!(alloc.team(1), original.team(1));

    // Everyone is unhappy
    let mut alloc = create_alloc(&survey, &[&[1], &[0, 2]]);
    assert!(search.try_swap(&mut alloc, 0, 1));
    assert_eq!(alloc.project_of(0), 0);
    assert_eq!(alloc.project_of(1), 1);

    // Moving student 2 would empty project 0 and overfill project 1
    let mut alloc = create_alloc(&survey, &[&[2], &[0, 1]]);
    assert!(!search.try_move(&mut alloc, 2, 1));
    assert!(search.try_swap(&mut alloc, 2, 0));
}

#[test]
fn test_tolerance() {
    let survey = create_uniform_survey(2, 2, 5, 1, 1);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut alloc = create_alloc(&survey, &[&[0], &[1]]);

    let strict = LocalSearch::new(model, rng(1));
    assert!(!strict.try_swap(&mut alloc, 0, 1));
    let relaxed = LocalSearch::new(model, rng(1)).with_tolerance(1);
    assert!(relaxed.try_swap(&mut alloc, 0, 1));
    assert_eq!(alloc.project_of(0), 1);
}

#[test]
fn test_fix_conflicts_reaches_local_optimum() {
    let prefs: Vec<[u8; 3]> = (0..12)
        .map(|s| match s % 3 {
            0 => [5, 4, 3],
            1 => [3, 5, 4],
            _ => [4, 3, 5],
        })
        .collect();
    let prefs: Vec<&[u8]> = prefs.iter().map(|p| &p[..]).collect();
    let mut survey = create_survey(&prefs, &[(4, 4), (4, 4), (4, 4)]);
    for (a, b) in [(0, 1), (2, 3), (4, 5), (6, 7)].iter() {
        survey.students[*a].antagonists.push(*b);
    }
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(11));
    let mut alloc = create_alloc(&survey, &[&[0, 1, 2, 3], &[4, 5, 6, 7], &[8, 9, 10, 11]]);
    assert_eq!(alloc.total_conflicts(&survey), 4);

    let mut fixed = 0;
    loop {
        let count = search.fix_conflicts(&mut alloc);
        if count == 0 {
            break;
        }
        fixed += count;
    }

    assert!(fixed > 0);
    assert!(alloc.check_consistency().is_ok());
    for s in alloc.conflicted_students(&survey) {
        assert!(model.cheapest_swaps(&alloc, s, 0).is_empty());
        assert!(model.cheapest_moves(&alloc, s, 0).is_empty());
    }
    // Students 8-11 avoid no one, so there is always a conflict-free swap partner
    assert_eq!(alloc.total_conflicts(&survey), 0);
}

#[test]
fn test_unresolvable_conflict() {
    let mut survey = create_uniform_survey(2, 1, 5, 1, 2);
    survey.students[0].antagonists.push(1);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(1));
    let mut alloc = create_alloc(&survey, &[&[0, 1]]);

    assert_eq!(search.fix_conflicts(&mut alloc), 0);
    assert_eq!(alloc.total_conflicts(&survey), 1);
}

#[test]
fn test_fix_understaff() {
    let survey = create_uniform_survey(10, 3, 3, 3, 5);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(1));
    let mut alloc = create_alloc(&survey, &[&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]]);

    assert_eq!(search.fix_understaff(&mut alloc), Ok(6));
    assert_eq!(alloc.num(0), 4);
    assert_eq!(alloc.num(1), 3);
    assert_eq!(alloc.num(2), 3);
    assert!(alloc.check_consistency().is_ok());
    assert_eq!(search.fix_understaff(&mut alloc), Ok(0));
}

#[test]
fn test_fix_understaff_fails_without_spare_students() {
    let survey = create_uniform_survey(5, 2, 3, 3, 5);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(1));
    let mut alloc = create_alloc(&survey, &[&[0, 1, 2, 3, 4]]);

    let err = search.fix_understaff(&mut alloc).unwrap_err();
    assert!(err.contains("Project 1"), "unexpected error: {}", err);
}

#[test]
fn test_fix_understaff_prefers_unlocked_students() {
    let mut survey = create_survey(&[&[1, 5], &[1, 5], &[5, 1]], &[(1, 6), (1, 6)]);
    survey.students[0].locked = true;
    survey.students[1].locked = true;
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(1));
    let mut alloc = create_alloc(&survey, &[&[0, 1, 2]]);

    assert_eq!(search.fix_understaff(&mut alloc), Ok(1));
    assert_eq!(alloc.project_of(2), 1);
}

/// Student 0 ranks both projects highest and sits on project 0. Swapping them with student 3 is
/// the only improving operation.
fn create_pinning_problem(locked: bool) -> (Survey, Allocation) {
    let mut survey = create_survey(
        &[&[5, 5], &[5, 1], &[5, 1], &[5, 1], &[1, 5], &[1, 5]],
        &[(3, 3), (3, 3)],
    );
    survey.students[0].locked = locked;
    let alloc = create_alloc(&survey, &[&[0, 1, 2], &[3, 4, 5]]);
    (survey, alloc)
}

#[test]
fn test_locked_student_is_not_moved() {
    let (survey, mut alloc) = create_pinning_problem(true);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(1));
    let original = alloc.clone();

    assert_eq!(search.fix_and_swap(&mut alloc), 0);
    assert_eq!(search.enumerate_swaps(&mut alloc), 0);
    assert_eq!(search.enumerate_moves(&mut alloc), 0);
    assert_eq!(search.desperate(&mut alloc), 0);
    assert_eq!(alloc, original);
}

#[test]
fn test_unlocked_student_is_moved() {
    let (survey, mut alloc) = create_pinning_problem(false);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(1));

    assert!(search.fix_and_swap(&mut alloc) > 0);
    assert_eq!(alloc.project_of(0), 1);
    assert_eq!(alloc.project_of(3), 0);
    assert_eq!(model.score(&alloc).total(), 0);
}

#[test]
fn test_find_swaps() {
    let survey = create_survey(&[&[1, 5], &[5, 1], &[5, 5], &[5, 5]], &[(2, 2), (2, 2)]);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(1));
    let mut alloc = create_alloc(&survey, &[&[0, 2], &[1, 3]]);

    assert!(search.find_swaps(&mut alloc) > 0);
    assert_eq!(alloc.project_of(0), 1);
    assert_eq!(alloc.project_of(1), 0);
    assert_eq!(model.score(&alloc).total(), 0);
    assert_eq!(search.find_swaps(&mut alloc), 0);
}

#[test]
fn test_enumerate_swaps() {
    let survey = create_survey(&[&[1, 5], &[5, 1], &[5, 5], &[5, 5]], &[(2, 2), (2, 2)]);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let search = LocalSearch::new(model, rng(1));
    let mut alloc = create_alloc(&survey, &[&[0, 2], &[1, 3]]);

    assert_eq!(search.enumerate_swaps(&mut alloc), 1);
    assert_eq!(model.score(&alloc).total(), 0);
}

/// Every student is placed at rank 3 or better. Students 0, 2 and 3 are placed below their
/// personal best.
fn create_desperate_problem() -> (Survey, Allocation) {
    let survey = create_survey(&[&[3, 5], &[5, 3], &[5, 3], &[5, 3]], &[(2, 2), (2, 2)]);
    let alloc = create_alloc(&survey, &[&[0, 1], &[2, 3]]);
    (survey, alloc)
}

#[test]
fn test_desperate() {
    let (survey, mut alloc) = create_desperate_problem();
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut search = LocalSearch::new(model, rng(4));

    assert!(search.desperate(&mut alloc) > 0);
    assert!(alloc.check_consistency().is_ok());
    assert_eq!(alloc.project_of(0), 1);
}

#[test]
fn test_desperate_keeps_pinned_students() {
    let (mut survey, mut alloc) = create_desperate_problem();
    survey.students[1].locked = true;
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    for seed in 0..10 {
        let mut search = LocalSearch::new(model, rng(seed));
        search.desperate(&mut alloc);
        assert_eq!(alloc.project_of(1), 0);
    }
}

#[test]
fn test_desperate_is_gated() {
    let penalties = Penalties::default();

    // Realized conflict
    let (mut survey, mut alloc) = create_desperate_problem();
    survey.students[2].antagonists.push(3);
    let model = CostModel::new(&survey, &penalties);
    let original = alloc.clone();
    assert_eq!(LocalSearch::new(model, rng(1)).desperate(&mut alloc), 0);
    assert_eq!(alloc, original);

    // Student below the mediocre rank
    let survey = create_survey(&[&[3, 5], &[5, 2], &[5, 3], &[5, 3]], &[(2, 2), (2, 2)]);
    let model = CostModel::new(&survey, &penalties);
    let mut alloc = create_alloc(&survey, &[&[0, 2], &[1, 3]]);
    let original = alloc.clone();
    assert_eq!(LocalSearch::new(model, rng(1)).desperate(&mut alloc), 0);
    assert_eq!(alloc, original);
}
