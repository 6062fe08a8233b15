//! # Validation Tier Tests
//!
//! End-to-end scenarios over the built-in worker chain.
//!
//! ## Tiers
//! - T0: Model loading
//! - T1: One bidirectional group {A, B}
//! - T2: Essential relationship across groups {C} -> {D}
//! - T3: Threshold multi-match
//! - T4: Dependency-aware reclamation across groups

use agora_core::workers::{
    EXTERNAL_CANDIDATES, FREE_CANDIDATES, MATCH_GROUP, compute_group_priorities, score_entity,
};
use agora_core::{
    AgoraError, Board, FeatureRegistry, ModelSpec, Region, RunSummary, Scheduler,
    SchedulerConfig, StaticCandidates, Step, form_groups,
};
use std::rc::Rc;

fn load(text: &str) -> Board {
    let model: ModelSpec = toml::from_str(text).expect("parse model");
    model
        .build(&FeatureRegistry::with_builtins())
        .expect("build model")
}

fn scheduler(source: StaticCandidates) -> Scheduler {
    Scheduler::with_builtin_workers(
        SchedulerConfig::default(),
        Rc::new(FeatureRegistry::with_builtins()),
        Box::new(source),
    )
}

fn worker_order(board: &Board) -> Vec<&str> {
    board.history().iter().map(|r| r.worker()).collect()
}

// =============================================================================
// TIER T0: MODEL LOADING
// =============================================================================

mod t0_model_loading {
    use super::*;

    /// T0.1: Unknown relationship targets are rejected at load.
    #[test]
    fn unknown_target_rejected() {
        let model: ModelSpec = toml::from_str(
            r#"
            [[entity]]
            name = "A"

            [[entity.attribute]]
            name = "near"
            kind = "search_area"
            rule = { type = "near", distance = 4.0 }
            relations = ["ghost"]
            "#,
        )
        .expect("parse");
        assert!(matches!(
            model.build(&FeatureRegistry::with_builtins()),
            Err(AgoraError::MissingDependency { .. })
        ));
    }

    /// T0.2: An empty model runs to an immediate fixpoint.
    #[test]
    fn empty_model_is_a_fixpoint() {
        let mut board = load("");
        let report = scheduler(StaticCandidates::new())
            .run(&mut board)
            .expect("run");
        assert_eq!(report.activations, 0);
    }

    /// T0.3: An entity without candidates ends unmatched, not in error.
    #[test]
    fn no_candidates_is_not_an_error() {
        let mut board = load(
            r#"
            [[entity]]
            name = "lonely"
            "#,
        );
        scheduler(StaticCandidates::new())
            .run(&mut board)
            .expect("run");
        assert!(!board.entity(0).expect("entity").is_matched());
        assert!(board.group(0).expect("group").is_terminal());
    }
}

// =============================================================================
// TIER T1: ONE GROUP {A, B}
// =============================================================================

mod t1_single_group {
    use super::*;

    const MODEL: &str = r#"
        [[entity]]
        name = "A"

        [[entity.attribute]]
        name = "size"
        kind = "feature"
        feature = "area"
        membership = [2.0, 4.0, 10.0, 20.0]

        [[entity]]
        name = "B"

        [[entity.attribute]]
        name = "near_a"
        kind = "feature"
        feature = "centroid_distance"
        membership = [0.0, 0.0, 3.0, 6.0]
        relations = ["A"]
        bidirectional = true
        essential = true

        [[entity.attribute]]
        name = "seed"
        kind = "seg_param"
        param = { type = "region_growing_seed" }
        relations = ["A"]
    "#;

    fn source() -> StaticCandidates {
        StaticCandidates::new()
            .with("A", [Region::rect(0, 0, 2, 2), Region::rect(10, 10, 11, 11)])
            .with("B", [Region::rect(2, 0, 4, 2), Region::rect(20, 20, 22, 22)])
    }

    /// T1.1: The full chain runs in the expected order.
    #[test]
    fn activation_order() {
        let mut board = load(MODEL);
        let report = scheduler(source()).run(&mut board).expect("run");

        assert_eq!(
            worker_order(&board),
            vec![
                "form_groups",
                "next_group",
                "external_candidates",
                "entity_confidence",
                "next_entity",
                "external_candidates",
                "entity_confidence",
                "group_candidates",
                "group_confidence",
                "match_group",
                "free_candidates",
            ]
        );
        assert_eq!(report.activations, 11);
        assert_eq!(report.per_worker.get(EXTERNAL_CANDIDATES), Some(&2));
    }

    /// T1.2: One group with full priority; A is segmented before B.
    #[test]
    fn group_priority_and_member_order() {
        let mut board = load(MODEL);
        let mut scheduler = scheduler(source());

        scheduler.step(&mut board).expect("form_groups");
        assert_eq!(board.group_count(), 1);
        assert_eq!(board.group(0).expect("group").members(), &[0, 1]);

        scheduler.step(&mut board).expect("next_group");
        assert_eq!(board.group(0).expect("group").priority(), 1.0);
        assert_eq!(board.next_entity(), Some(0));

        scheduler.run(&mut board).expect("run");
        let a = board.entity_index("A").expect("A");
        let b = board.entity_index("B").expect("B");
        let segmented: Vec<_> = board
            .history()
            .iter()
            .filter(|r| r.worker() == EXTERNAL_CANDIDATES)
            .flat_map(|r| r.messages().iter().cloned())
            .collect();
        assert_eq!(segmented, vec![format!("entity:{a}"), format!("entity:{b}")]);
    }

    /// T1.3: The best pair is matched and A's candidates are kept until B is
    /// matched.
    #[test]
    fn matched_then_freed() {
        let mut board = load(MODEL);
        let mut scheduler = scheduler(source());

        loop {
            match scheduler.step(&mut board).expect("step") {
                Step::Fixpoint => break,
                Step::Activated { worker, .. } => {
                    let a = board.entity(0).expect("A");
                    let b = board.entity(1).expect("B");
                    if !b.is_matched() && a.is_matched() {
                        assert!(a.num_candidates() > 0, "A freed before B matched");
                    }
                    if worker == MATCH_GROUP {
                        assert_eq!(a.matched_indices(), &[0]);
                        assert_eq!(b.matched_indices(), &[0]);
                        assert_eq!(a.num_candidates(), 2);
                    }
                }
            }
        }

        let summary = RunSummary::from_board(&board);
        let a = summary.entity("A").expect("A");
        let b = summary.entity("B").expect("B");
        assert_eq!(a.matched_result, Some(Region::rect(0, 0, 2, 2)));
        assert_eq!(b.matched_result, Some(Region::rect(2, 0, 4, 2)));
        assert!(a.candidates.is_empty());
        assert!(b.candidates.is_empty());
        assert_eq!(summary.metrics.matched_count, 2);
    }
}

// =============================================================================
// TIER T2: ESSENTIAL RELATIONSHIP {C} -> {D}
// =============================================================================

mod t2_essential_dependency {
    use super::*;

    const MODEL: &str = r#"
        [[entity]]
        name = "C"

        [[entity.attribute]]
        name = "near_d"
        kind = "feature"
        feature = "centroid_distance"
        membership = [0.0, 0.0, 5.0, 10.0]
        relations = ["D"]
        essential = true

        [[entity]]
        name = "D"
    "#;

    fn source() -> StaticCandidates {
        StaticCandidates::new()
            .with("C", [Region::rect(1, 0, 3, 2)])
            .with("D", [Region::rect(0, 0, 2, 2)])
    }

    /// T2.1: C's confidences are forced to 0 while D is unmatched.
    #[test]
    fn confidences_forced_to_zero() {
        let mut board = load(MODEL);
        board
            .entity_mut(0)
            .expect("C")
            .add_candidate(Region::rect(1, 0, 3, 2));
        form_groups(&mut board).expect("form");

        score_entity(&mut board, &FeatureRegistry::with_builtins(), 0).expect("score");
        let candidate = &board.entity(0).expect("C").candidates()[0];
        assert_eq!(candidate.partial_confidence(), 0.0);
    }

    /// T2.2: C's group has priority 0 while D's group is open.
    #[test]
    fn blocked_group_priority() {
        let mut board = load(MODEL);
        form_groups(&mut board).expect("form");
        compute_group_priorities(&mut board).expect("priorities");

        let c_group = board.find_group_of(0).expect("C group");
        let d_group = board.find_group_of(1).expect("D group");
        assert_eq!(board.group(c_group).expect("C").priority(), 0.0);
        assert_eq!(board.group(d_group).expect("D").priority(), 1.0);
    }

    /// T2.3: D is resolved first, after which C matches normally.
    #[test]
    fn d_resolved_before_c() {
        let mut board = load(MODEL);
        scheduler(source()).run(&mut board).expect("run");

        let selections: Vec<String> = board
            .history()
            .iter()
            .filter(|r| r.worker() == "next_group")
            .flat_map(|r| r.messages().iter().cloned())
            .collect();
        assert_eq!(selections, vec!["group:1".to_string(), "group:0".to_string()]);

        let c = board.entity(0).expect("C");
        assert_eq!(c.matched_result(), Some(&Region::rect(1, 0, 3, 2)));
    }
}

// =============================================================================
// TIER T3: THRESHOLD MULTI-MATCH
// =============================================================================

mod t3_threshold {
    use super::*;

    /// T3.1: Threshold 0.5 over confidences [0.9, 0.6, 0.3] keeps two.
    #[test]
    fn two_of_three_matched() {
        let mut board = load(
            r#"
            [[entity]]
            name = "E"

            [[entity.attribute]]
            name = "size"
            kind = "feature"
            feature = "area"
            membership = [0.0, 10.0, 10.0, 20.0]

            [[entity.attribute]]
            name = "multi"
            kind = "seg_param"
            param = { type = "confidence_threshold", threshold = 0.5 }
            "#,
        );
        let source = StaticCandidates::new().with(
            "E",
            [
                Region::rect(0, 0, 9, 1),
                Region::rect(0, 2, 6, 3),
                Region::rect(0, 4, 3, 5),
            ],
        );
        let mut scheduler = scheduler(source);

        while let Step::Activated { worker, .. } = scheduler.step(&mut board).expect("step") {
            if worker == MATCH_GROUP {
                let e = board.entity(0).expect("E");
                let partials: Vec<f64> = e
                    .candidates()
                    .iter()
                    .map(|c| c.partial_confidence())
                    .collect();
                assert_eq!(partials, vec![0.9, 0.6, 0.3]);
            }
        }

        let e = board.entity(0).expect("E");
        assert_eq!(e.matched_result().map(Region::area), Some(15));
        assert_eq!(e.num_matched_candidates(), 2);
        assert_eq!(e.matched_indices(), &[0, 1]);
        let summary = RunSummary::from_board(&board);
        assert_eq!(summary.metrics.matched_count, 1);
    }
}

// =============================================================================
// TIER T4: RECLAMATION ACROSS GROUPS
// =============================================================================

mod t4_reclamation {
    use super::*;

    const MODEL: &str = r#"
        [[entity]]
        name = "A"

        [[entity]]
        name = "B"

        [[entity.attribute]]
        name = "seed"
        kind = "seg_param"
        param = { type = "region_growing_seed" }
        relations = ["A"]
    "#;

    /// T4.1: A's candidates survive its own reclamation pass while B is
    /// unmatched and go when B's pass cascades.
    #[test]
    fn cascade_after_dependent_matches() {
        let mut board = load(MODEL);
        let source = StaticCandidates::new()
            .with("A", [Region::rect(0, 0, 1, 1)])
            .with("B", [Region::rect(0, 0, 2, 2)]);
        let mut scheduler = scheduler(source);

        let mut passes = 0;
        while let Step::Activated { worker, .. } = scheduler.step(&mut board).expect("step") {
            if worker != FREE_CANDIDATES {
                continue;
            }
            passes += 1;
            let a = board.entity(0).expect("A");
            if passes == 1 {
                assert!(a.is_matched());
                assert!(!board.entity(1).expect("B").is_matched());
                assert_eq!(a.num_candidates(), 1);
                assert!(board.last_record().expect("record").messages().is_empty());
            } else {
                assert_eq!(a.num_candidates(), 0);
                assert!(board.last_record().expect("record").has_message("entity:0"));
            }
        }
        assert_eq!(passes, 2);
        assert!(board.entities().iter().all(|e| e.is_matched()));
    }
}
