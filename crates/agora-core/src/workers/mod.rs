//! # Built-in Workers
//!
//! The control chain that drives a board from raw entities to matched
//! results:
//!
//! | Worker                | Kind         | Fires when                                        |
//! |-----------------------|--------------|---------------------------------------------------|
//! | `form_groups`         | Grouping     | entities exist but no groups                      |
//! | `next_group`          | Scheduling   | grouping just ran, nothing selected, or done      |
//! | `next_entity`         | Scheduling   | current entity evaluated, another member is not   |
//! | `external_candidates` | Segmentation | current entity not yet segmented                  |
//! | `entity_confidence`   | Confidence   | a segmentation just ran for an unevaluated entity |
//! | `group_candidates`    | Confidence   | every member of the current group was evaluated   |
//! | `group_confidence`    | Confidence   | group candidates were just formed                 |
//! | `match_group`         | Matching     | group confidence ran for the current group        |
//! | `free_candidates`     | Memory       | a group was just matched                          |
//!
//! "Since selection" below always means "after the most recent `next_group`
//! record".

mod confidence;
mod external;
mod grouping;
mod matching;
mod memory;
mod priority;

pub use confidence::{
    EntityConfidenceWorker, GroupCandidatesWorker, GroupConfidenceWorker, ScoringTally,
    form_group_candidates, score_entity, score_group_candidates,
};
pub use external::{CandidateSource, ExternalCandidatesWorker, StaticCandidates};
pub use grouping::FormGroupsWorker;
pub use matching::{MatchGroupWorker, match_best_group};
pub use memory::{DependencyIndex, FreeCandidatesWorker, FreeOutcome, free_candidates};
pub use priority::{
    NextEntityWorker, NextGroupWorker, compute_group_priorities, select_next_group,
};

use crate::board::Board;
use crate::feature::FeatureRegistry;
use crate::group::Group;
use crate::worker::Worker;
use crate::WorkerKind;
use std::rc::Rc;

// =============================================================================
// WORKER NAMES
// =============================================================================

pub const FORM_GROUPS: &str = "form_groups";
pub const NEXT_GROUP: &str = "next_group";
pub const NEXT_ENTITY: &str = "next_entity";
pub const EXTERNAL_CANDIDATES: &str = "external_candidates";
pub const ENTITY_CONFIDENCE: &str = "entity_confidence";
pub const GROUP_CANDIDATES: &str = "group_candidates";
pub const GROUP_CONFIDENCE: &str = "group_confidence";
pub const MATCH_GROUP: &str = "match_group";
pub const FREE_CANDIDATES: &str = "free_candidates";

/// Every built-in worker, in registration order.
#[must_use]
pub fn builtin_workers(
    features: Rc<FeatureRegistry>,
    source: Box<dyn CandidateSource>,
) -> Vec<Box<dyn Worker>> {
    vec![
        Box::new(FormGroupsWorker),
        Box::new(EntityConfidenceWorker::new(Rc::clone(&features))),
        Box::new(GroupCandidatesWorker::new()),
        Box::new(GroupConfidenceWorker::new(features)),
        Box::new(MatchGroupWorker::new()),
        Box::new(FreeCandidatesWorker::new()),
        Box::new(NextGroupWorker),
        Box::new(ExternalCandidatesWorker::new(source)),
        Box::new(NextEntityWorker),
    ]
}

// =============================================================================
// RECORD MESSAGES
// =============================================================================

/// Message naming the entity an activation worked on.
#[must_use]
pub fn entity_message(entity: usize) -> String {
    format!("entity:{entity}")
}

/// Message naming the group an activation worked on.
#[must_use]
pub fn group_message(group: usize) -> String {
    format!("group:{group}")
}

// =============================================================================
// HISTORY QUERIES
// =============================================================================

/// Position of the most recent `next_group` record.
pub(crate) fn selection_start(board: &Board) -> Option<usize> {
    board.find_activation_record(NEXT_GROUP, WorkerKind::Scheduling, None)
}

/// Whether `worker` recorded an activation (carrying `message`, if given)
/// since the current group was selected.
pub(crate) fn recorded_since_selection(
    board: &Board,
    worker: &str,
    kind: WorkerKind,
    message: Option<&str>,
) -> bool {
    match board.find_activation_record(worker, kind, message) {
        None => false,
        Some(position) => selection_start(board).is_none_or(|start| position > start),
    }
}

/// Whether entity confidence ran for `entity` since selection.
pub(crate) fn is_entity_processed(board: &Board, entity: usize) -> bool {
    recorded_since_selection(
        board,
        ENTITY_CONFIDENCE,
        WorkerKind::Confidence,
        Some(&entity_message(entity)),
    )
}

/// A member needs no more per-entity work: it was evaluated since
/// selection, or it is already matched.
pub(crate) fn is_member_settled(board: &Board, entity: usize) -> bool {
    board.entity(entity).is_ok_and(|e| e.is_matched()) || is_entity_processed(board, entity)
}

/// Whether the last record was written by `worker` of `kind`.
pub(crate) fn last_record_is(board: &Board, worker: &str, kind: WorkerKind) -> bool {
    board.last_record().is_some_and(|r| r.is(worker, kind))
}

/// The selected group, if it is still open.
pub(crate) fn open_group(board: &Board) -> Option<(usize, &Group)> {
    let index = board.next_group()?;
    let group = board.group(index).ok()?;
    (!group.is_terminal()).then_some((index, group))
}

// =============================================================================
// TEST FIXTURES
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{ENTITY_CONFIDENCE, NEXT_GROUP, entity_message};
    use crate::attribute::{Attribute, AttributeKind};
    use crate::board::Board;
    use crate::feature::{FeatureSpec, Membership};
    use crate::WorkerKind;

    pub(crate) fn board_with(names: &[&str]) -> Board {
        let mut board = Board::new();
        for name in names {
            board.add_entity(name).expect("add entity");
        }
        board
    }

    /// A plateau `centroid_distance` feature from `from` to `to`.
    pub(crate) fn link(board: &mut Board, from: usize, to: usize, bidirectional: bool, essential: bool) {
        let target = board.entity(to).expect("target").name().to_string();
        let mut attribute = Attribute::new(
            format!("near_{target}"),
            AttributeKind::Feature(FeatureSpec::new("centroid_distance", Membership::plateau())),
        )
        .with_relation(target, to);
        if bidirectional {
            attribute = attribute.as_bidirectional();
        }
        if essential {
            attribute = attribute.as_essential();
        }
        board
            .entity_mut(from)
            .expect("source")
            .add_attribute(attribute)
            .expect("add attribute");
    }

    /// Pretend `next_group` just selected `group`.
    pub(crate) fn select(board: &mut Board, group: usize) {
        let first = board.group(group).expect("group").members()[0];
        board.set_next_group(Some(group)).expect("cursor");
        board.set_next_entity(Some(first)).expect("cursor");
        board.append_activation_record(NEXT_GROUP, WorkerKind::Scheduling);
    }

    /// Pretend entity confidence just ran for `entity`.
    pub(crate) fn mark_processed(board: &mut Board, entity: usize) {
        board.append_activation_record(ENTITY_CONFIDENCE, WorkerKind::Confidence);
        board
            .append_message_to_last(entity_message(entity))
            .expect("message");
    }
}
