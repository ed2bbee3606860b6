use super::{Allocation, CostModel};
use crate::config::Penalties;
use crate::test::{create_survey, create_uniform_survey};
use crate::Survey;

/// Four students, two projects with staffing (1, 4). Student 0 avoids student 1. Students 0 and 1
/// are placed on project 0, students 2 and 3 on project 1.
fn create_conflict_problem() -> (Survey, Allocation) {
    let mut survey = create_survey(&[&[5, 3], &[5, 5], &[5, 5], &[5, 5]], &[(1, 4), (1, 4)]);
    survey.students[0].antagonists = vec![1];
    let mut alloc = Allocation::new(&survey);
    alloc.add(0, 0);
    alloc.add(1, 0);
    alloc.add(2, 1);
    alloc.add(3, 1);
    (survey, alloc)
}

#[test]
fn test_primitives_keep_consistency() {
    let survey = create_uniform_survey(6, 3, 3, 1, 3);
    let mut alloc = Allocation::new(&survey);
    assert!(!alloc.is_complete());
    for s in 0..6 {
        alloc.add(s, s % 3);
        assert!(alloc.check_consistency().is_ok());
    }
    assert!(alloc.is_complete());
    assert_eq!(alloc.num(0), 2);
    assert_eq!(alloc.ison(4), Some(1));

    alloc.move_to(4, 2);
    assert!(alloc.check_consistency().is_ok());
    assert_eq!(alloc.num(1), 1);
    assert_eq!(alloc.num(2), 3);
    assert_eq!(alloc.project_of(4), 2);
    assert!(alloc.team(2).contains(&4));
    assert!(!alloc.team(1).contains(&4));

    alloc.swap(0, 1);
    assert!(alloc.check_consistency().is_ok());
    assert_eq!(alloc.project_of(0), 1);
    assert_eq!(alloc.project_of(1), 0);
    assert_eq!(alloc.num(0), 2);
    assert_eq!(alloc.num(1), 1);

    alloc.remove(5, 2);
    assert!(alloc.check_consistency().is_ok());
    assert_eq!(alloc.ison(5), None);
    assert!(!alloc.is_complete());
}

#[test]
#[should_panic(expected = "already on project")]
fn test_add_twice_panics() {
    let survey = create_uniform_survey(2, 2, 3, 1, 3);
    let mut alloc = Allocation::new(&survey);
    alloc.add(0, 0);
    alloc.add(0, 1);
}

#[test]
#[should_panic(expected = "is not on project")]
fn test_remove_from_wrong_project_panics() {
    let survey = create_uniform_survey(2, 2, 3, 1, 3);
    let mut alloc = Allocation::new(&survey);
    alloc.add(0, 0);
    alloc.remove(0, 1);
}

#[test]
fn test_swap_twice_is_identity() {
    let survey = create_uniform_survey(9, 3, 3, 1, 5);
    let mut alloc = Allocation::new(&survey);
    for s in 0..9 {
        alloc.add(s, s % 3);
    }
    let original = alloc.clone();

    for (a, b) in [(0, 1), (3, 5), (2, 7), (4, 8)].iter() {
        alloc.swap(*a, *b);
        assert_ne!(alloc, original);
        alloc.swap(*a, *b);
        assert_eq!(alloc, original);
        assert!(alloc.check_consistency().is_ok());
        for p in 0..3 {
            let mut team = alloc.team(p).to_vec();
            let mut original_team = original.team(p).to_vec();
            team.sort();
            original_team.sort();
            assert_eq!(team, original_team);
        }
    }
}

#[test]
fn test_note_conflicts() {
    let (mut survey, mut alloc) = create_conflict_problem();

    alloc.note_conflicts(&survey);
    assert_eq!(alloc.noted_conflicts(0), &[1]);
    assert!(alloc.noted_conflicts(1).is_empty());
    assert_eq!(alloc.total_conflicts(&survey), 1);
    assert_eq!(alloc.conflicted_students(&survey), vec![0]);

    // Mutual avoidance: each directed relation counts on its own
    survey.students[1].antagonists = vec![0];
    alloc.note_conflicts(&survey);
    assert_eq!(alloc.noted_conflicts(1), &[0]);
    assert_eq!(alloc.total_conflicts(&survey), 2);

    // Separated students are no conflict
    alloc.swap(1, 2);
    alloc.note_conflicts(&survey);
    assert!(alloc.noted_conflicts(0).is_empty());
    assert_eq!(alloc.total_conflicts(&survey), 0);
}

#[test]
fn test_cost() {
    let (survey, alloc) = create_conflict_problem();
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);

    // rank 5 + conflict with student 1
    assert_eq!(model.cost(&alloc, 0, 0, None), 100);
    // student 1 is avoided by student 0
    assert_eq!(model.cost(&alloc, 1, 0, None), 100);
    assert_eq!(model.cost(&alloc, 0, 0, Some(1)), 0);
    assert_eq!(model.cost(&alloc, 0, 1, None), 5);
    assert_eq!(model.cost(&alloc, 2, 1, None), 0);
}

#[test]
fn test_cost_of_move() {
    let (mut survey, alloc) = create_conflict_problem();
    let penalties = Penalties::default();
    {
        let model = CostModel::new(&survey, &penalties);
        // from conflict at rank 5 (100) to rank 3 without conflict (5)
        assert_eq!(model.cost_of_move(&alloc, 0, 1), -95);
        assert_eq!(model.cheapest_moves(&alloc, 0, 100), vec![(-95, 1)]);
        assert!(model.cheapest_moves(&alloc, 0, -95).is_empty());
    }

    // Leaving project 0 would make it understaffed
    survey.projects[0].min_staff = 2;
    {
        let model = CostModel::new(&survey, &penalties);
        assert_eq!(model.cost_of_move(&alloc, 0, 1), 5 - (100 - 100000));
    }

    // Joining project 1 would make it overstaffed
    survey.projects[0].min_staff = 1;
    survey.projects[1].max_staff = 2;
    {
        let model = CostModel::new(&survey, &penalties);
        assert_eq!(model.cost_of_move(&alloc, 0, 1), 5 + 100000 - 100);
    }

    // Joining project 1 fixes its understaffing
    survey.projects[1].max_staff = 4;
    survey.projects[1].min_staff = 3;
    {
        let model = CostModel::new(&survey, &penalties);
        assert_eq!(model.cost_of_move(&alloc, 0, 1), 5 - 100000 - 100);
    }
}

#[test]
fn test_cost_of_swap() {
    let (mut survey, alloc) = create_conflict_problem();
    let penalties = Penalties::default();
    {
        let model = CostModel::new(&survey, &penalties);
        // Student 0: conflict at rank 5 (100) -> rank 3 (5); student 2: rank 5 -> rank 5
        assert_eq!(model.cost_of_swap(&alloc, 0, 2), -95);
        assert_eq!(model.cost_of_swap(&alloc, 2, 0), -95);
        assert_eq!(model.cheapest_swaps(&alloc, 0, 0), vec![(-95, 2), (-95, 3)]);
    }

    // Student 0 also avoids student 2. Swapping them keeps them apart, so the relation between
    // them must not count on either side.
    survey.students[0].antagonists = vec![1, 2];
    {
        let model = CostModel::new(&survey, &penalties);
        assert_eq!(model.cost_of_swap(&alloc, 0, 2), -95);
        // Swapping with student 3 moves student 0 next to student 2
        assert_eq!(model.cost_of_swap(&alloc, 0, 3), 5 + 100 - 100);
    }
}

#[test]
fn test_score_staffing() {
    let survey = create_uniform_survey(7, 2, 4, 2, 4);
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let mut alloc = Allocation::new(&survey);
    for s in 0..6 {
        alloc.add(s, 0);
    }
    alloc.add(6, 1);

    let score = model.score(&alloc);
    assert_eq!(score.over_staff, 100000);
    assert_eq!(score.under_staff, 100000);
    assert_eq!(score.preference, 7);
    assert_eq!(score.rank_histogram, [0, 0, 0, 7, 0]);
    assert_eq!(score.structural(), 200000);
    // 6 members, 0 low GPAs
    assert_eq!(score.low_gpa, 0);
    assert_eq!(score.total(), 200007);

    alloc.move_to(0, 1);
    alloc.move_to(1, 1);
    let score = model.score(&alloc);
    assert_eq!(score.structural(), 0);
    assert_eq!(score.total(), 7);
}

#[test]
fn test_score_restricted_project() {
    let mut survey = create_uniform_survey(6, 2, 5, 1, 6);
    survey.projects[0].restricted = true;
    survey.students[3].is_citizen = false;
    let penalties = Penalties::default();
    let mut alloc = Allocation::new(&survey);
    for s in 0..6 {
        alloc.add(s, s / 3);
    }

    let model = CostModel::new(&survey, &penalties);
    let before = model.score(&alloc);
    assert_eq!(before.non_citizen, 0);
    assert_eq!(before.total(), 0);

    alloc.move_to(3, 0);
    let after = model.score(&alloc);
    assert_eq!(after.non_citizen, penalties.non_citizen);
    assert_eq!(after.total() - before.total(), penalties.non_citizen);
}

#[test]
fn test_score_low_gpa_cap() {
    let mut survey = create_uniform_survey(8, 2, 5, 4, 4);
    let penalties = Penalties::default();
    let mut alloc = Allocation::new(&survey);
    for s in 0..8 {
        alloc.add(s, s / 4);
    }
    // Team size 4 allows for 2 low GPAs
    survey.students[0].gpa = 2.5;
    survey.students[1].gpa = 2.9;
    survey.students[4].gpa = 3.0;
    let model = CostModel::new(&survey, &penalties);
    assert_eq!(model.score(&alloc).low_gpa, 0);

    survey.students[2].gpa = 1.5;
    let model = CostModel::new(&survey, &penalties);
    let score = model.score(&alloc);
    assert_eq!(score.low_gpa, 100);
    assert_eq!(score.structural(), 0);
    assert_eq!(score.total(), 100);
}

#[test]
fn test_score_conflicts() {
    let (mut survey, alloc) = create_conflict_problem();
    survey.students[1].antagonists = vec![0];
    let penalties = Penalties::default();
    let model = CostModel::new(&survey, &penalties);
    let score = model.score(&alloc);
    assert_eq!(score.conflicts, 2);
    assert_eq!(score.conflict, 200);
    assert_eq!(score.total(), 200);
    assert_eq!(format!("{}", score), "{5: 4, 4: 0, 3: 0, 2: 0, 1: 0} + 2 conflicts = 200");
}
