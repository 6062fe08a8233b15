//! Dependency-aware memory reclamation.
//!
//! Once an entity is matched, its candidates are only needed by entities
//! that build their own candidates from them (`same_candidates_as`,
//! `region_growing_seed`, `additional_candidates`). Candidates are released
//! as soon as no unmatched dependent is left, and the release cascades to
//! the entity's own dependencies.

use crate::board::Board;
use crate::primitives::SCORE_URGENT;
use crate::worker::Worker;
use crate::workers::{FREE_CANDIDATES, MATCH_GROUP, entity_message, last_record_is};
use crate::{AgoraError, WorkerKind};
use std::collections::{BTreeMap, BTreeSet};

/// Result of a `free_candidates` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreeOutcome {
    /// Candidates were released for these entities (the requested one
    /// first), `candidates` in total.
    Freed { entities: Vec<usize>, candidates: usize },
    /// The entity has no matched result yet.
    NotMatched,
    /// The entity declares `retain`.
    Retained,
    /// An unmatched entity still builds on these candidates.
    InUse { dependent: usize },
}

/// Dependency edges of the three candidate-sharing kinds, both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyIndex {
    dependents: BTreeMap<usize, BTreeSet<usize>>,
    dependencies: BTreeMap<usize, BTreeSet<usize>>,
}

impl DependencyIndex {
    #[must_use]
    pub fn build(board: &Board) -> Self {
        let mut index = Self::default();
        for (entity, record) in board.entities().iter().enumerate() {
            for attribute in record.attributes() {
                if attribute.dependency_kind().is_none() {
                    continue;
                }
                for target in attribute.targets() {
                    index.dependents.entry(target).or_default().insert(entity);
                    index.dependencies.entry(entity).or_default().insert(target);
                }
            }
        }
        index
    }

    /// Entities whose candidates are built from `target`'s.
    pub fn dependents_of(&self, target: usize) -> impl Iterator<Item = usize> + '_ {
        self.dependents.get(&target).into_iter().flatten().copied()
    }

    /// Entities whose candidates `entity` builds on.
    pub fn dependencies_of(&self, entity: usize) -> impl Iterator<Item = usize> + '_ {
        self.dependencies.get(&entity).into_iter().flatten().copied()
    }

    fn refusal(&self, board: &Board, entity: usize) -> Result<Option<FreeOutcome>, AgoraError> {
        let record = board.entity(entity)?;
        if !record.is_matched() {
            return Ok(Some(FreeOutcome::NotMatched));
        }
        if record.retains_candidates() {
            return Ok(Some(FreeOutcome::Retained));
        }
        for dependent in self.dependents_of(entity) {
            if dependent != entity && !board.entity(dependent)?.is_matched() {
                return Ok(Some(FreeOutcome::InUse { dependent }));
            }
        }
        Ok(None)
    }

    /// Release `entity`'s candidates, then every dependency that became
    /// releasable.
    pub fn free_candidates(&self, board: &mut Board, entity: usize) -> Result<FreeOutcome, AgoraError> {
        if let Some(refusal) = self.refusal(board, entity)? {
            return Ok(refusal);
        }

        let mut freed = Vec::new();
        let mut released = 0usize;
        let mut visited = BTreeSet::new();
        let mut pending = vec![entity];

        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            if current != entity && self.refusal(board, current)?.is_some() {
                continue;
            }

            released += board.entity_mut(current)?.free_candidates();
            if let Some(group) = board.find_group_of(current) {
                board.group_mut(group)?.clear_candidates();
            }
            freed.push(current);
            pending.extend(self.dependencies_of(current));
        }

        tracing::debug!(entity, cascade = freed.len(), released, "candidates freed");
        Ok(FreeOutcome::Freed {
            entities: freed,
            candidates: released,
        })
    }
}

/// Release `entity`'s candidates if nothing needs them any more.
pub fn free_candidates(board: &mut Board, entity: usize) -> Result<FreeOutcome, AgoraError> {
    DependencyIndex::build(board).free_candidates(board, entity)
}

/// Frees the members of the group that was just matched.
#[derive(Debug, Default)]
pub struct FreeCandidatesWorker {
    freed: Vec<usize>,
}

impl FreeCandidatesWorker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The group named on the last match record.
    fn matched_group(board: &Board) -> Option<usize> {
        board
            .last_record()?
            .messages()
            .iter()
            .find_map(|m| m.strip_prefix("group:")?.parse().ok())
    }
}

impl Worker for FreeCandidatesWorker {
    fn name(&self) -> &str {
        FREE_CANDIDATES
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Memory
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        Ok(if last_record_is(board, MATCH_GROUP, WorkerKind::Matching) {
            SCORE_URGENT
        } else {
            0.0
        })
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        self.freed.clear();
        let Some(group) = Self::matched_group(board) else {
            return Ok(());
        };

        let index = DependencyIndex::build(board);
        let members = board.group(group)?.members().to_vec();
        for member in members {
            match index.free_candidates(board, member)? {
                FreeOutcome::Freed { entities, .. } => {
                    for entity in entities {
                        if !self.freed.contains(&entity) {
                            self.freed.push(entity);
                        }
                    }
                }
                outcome => {
                    tracing::debug!(entity = member, ?outcome, "candidates kept");
                }
            }
        }
        Ok(())
    }

    fn on_activation_recorded(&self, board: &mut Board) -> Result<(), AgoraError> {
        for &entity in &self.freed {
            board.append_message_to_last(entity_message(entity))?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeKind, MemParam, SegParam};
    use crate::candidate::GroupCandidate;
    use crate::grouping::form_groups;
    use crate::workers::fixtures::board_with;
    use crate::workers::group_message;
    use crate::Region;

    fn depend(board: &mut Board, from: usize, to: usize) {
        let target = board.entity(to).expect("target").name().to_string();
        board
            .entity_mut(from)
            .expect("source")
            .add_attribute(
                Attribute::new(
                    "seed",
                    AttributeKind::SegParam {
                        param: SegParam::RegionGrowingSeed,
                    },
                )
                .with_relation(target, to),
            )
            .expect("attr");
    }

    fn matched(board: &mut Board, entity: usize) {
        let record = board.entity_mut(entity).expect("entity");
        let index = record.add_candidate(Region::rect(0, 0, 1, 1));
        record.commit_matches(&[index]).expect("commit");
    }

    #[test]
    fn index_answers_both_directions() {
        let mut board = board_with(&["A", "B", "C"]);
        depend(&mut board, 1, 0);
        depend(&mut board, 2, 0);
        let index = DependencyIndex::build(&board);
        assert_eq!(index.dependents_of(0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(index.dependencies_of(2).collect::<Vec<_>>(), vec![0]);
        assert_eq!(index.dependents_of(2).count(), 0);
    }

    #[test]
    fn unmatched_dependent_blocks_release() {
        let mut board = board_with(&["A", "B"]);
        depend(&mut board, 1, 0);
        matched(&mut board, 0);
        board.entity_mut(1).expect("B").add_candidate(Region::new());

        assert_eq!(
            free_candidates(&mut board, 0).expect("free"),
            FreeOutcome::InUse { dependent: 1 }
        );
        assert_eq!(board.entity(0).expect("A").num_candidates(), 1);

        board.entity_mut(1).expect("B").commit_matches(&[0]).expect("commit");
        assert_eq!(
            free_candidates(&mut board, 0).expect("free"),
            FreeOutcome::Freed {
                entities: vec![0],
                candidates: 1
            }
        );
        assert!(board.entity(0).expect("A").is_matched());
    }

    #[test]
    fn release_cascades_to_dependencies() {
        let mut board = board_with(&["A", "B"]);
        depend(&mut board, 1, 0);
        matched(&mut board, 0);
        matched(&mut board, 1);

        let outcome = free_candidates(&mut board, 1).expect("free");
        assert_eq!(
            outcome,
            FreeOutcome::Freed {
                entities: vec![1, 0],
                candidates: 2
            }
        );
    }

    #[test]
    fn retain_and_unmatched_are_refused() {
        let mut board = board_with(&["A", "B"]);
        board
            .entity_mut(0)
            .expect("A")
            .add_attribute(Attribute::new(
                "keep",
                AttributeKind::MemParam {
                    param: MemParam::Retain,
                },
            ))
            .expect("attr");
        matched(&mut board, 0);

        assert_eq!(free_candidates(&mut board, 0).expect("free"), FreeOutcome::Retained);
        assert_eq!(free_candidates(&mut board, 1).expect("free"), FreeOutcome::NotMatched);
        assert!(free_candidates(&mut board, 7).is_err());
    }

    #[test]
    fn freeing_clears_group_candidates() {
        let mut board = board_with(&["A"]);
        matched(&mut board, 0);
        form_groups(&mut board).expect("form");
        board
            .group_mut(0)
            .expect("group")
            .set_candidates(vec![GroupCandidate::new(1)]);

        free_candidates(&mut board, 0).expect("free");
        assert!(board.group(0).expect("group").candidates().is_empty());
    }

    #[test]
    fn worker_frees_the_matched_group() {
        let mut board = board_with(&["A"]);
        matched(&mut board, 0);
        form_groups(&mut board).expect("form");

        let mut worker = FreeCandidatesWorker::new();
        assert_eq!(worker.score(&board).expect("score"), 0.0);
        board.append_activation_record(MATCH_GROUP, WorkerKind::Matching);
        board.append_message_to_last(group_message(0)).expect("message");
        assert_eq!(worker.score(&board).expect("score"), SCORE_URGENT);

        worker.activate(&mut board).expect("activate");
        board.append_activation_record(FREE_CANDIDATES, WorkerKind::Memory);
        worker.on_activation_recorded(&mut board).expect("record");
        assert_eq!(board.entity(0).expect("A").num_candidates(), 0);
        assert!(board.last_record().expect("record").has_message("entity:0"));
    }
}
