//! # Board
//!
//! The shared workspace every worker reads and writes.
//!
//! The board owns:
//! - the entities, addressable by index or by unique name
//! - the groups, which partition the entities once formed
//! - the append-only activation history
//! - the two scheduling cursors, `next_group` and `next_entity`
//! - the overall search area and the board-wide I/O paths
//!
//! All accessors taking an index return `IndexOutOfRange` for a bad one.
//! Nothing is clamped.

use crate::entity::Entity;
use crate::group::Group;
use crate::model::IoPaths;
use crate::types::IndexKind;
use crate::{AgoraError, Region, WorkerKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// ACTIVATION RECORD
// =============================================================================

/// One entry of the activation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    worker: String,
    kind: WorkerKind,
    messages: Vec<String>,
}

impl ActivationRecord {
    #[must_use]
    pub fn new(worker: impl Into<String>, kind: WorkerKind) -> Self {
        Self {
            worker: worker.into(),
            kind,
            messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn worker(&self) -> &str {
        &self.worker
    }

    #[must_use]
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    #[must_use]
    pub fn has_message(&self, message: &str) -> bool {
        self.messages.iter().any(|m| m == message)
    }

    /// Whether this record was written by `worker` of `kind`.
    #[must_use]
    pub fn is(&self, worker: &str, kind: WorkerKind) -> bool {
        self.kind == kind && self.worker == worker
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// The blackboard.
#[derive(Debug, Clone, Default)]
pub struct Board {
    entities: Vec<Entity>,
    name_index: BTreeMap<String, usize>,
    groups: Vec<Group>,
    history: Vec<ActivationRecord>,
    next_group: Option<usize>,
    next_entity: Option<usize>,
    overall_search_area: Option<Region>,
    paths: IoPaths,
}

impl Board {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    /// Add an entity and return its index.
    pub fn add_entity(&mut self, name: &str) -> Result<usize, AgoraError> {
        if self.name_index.contains_key(name) {
            return Err(AgoraError::DuplicateEntity(name.to_string()));
        }
        let index = self.entities.len();
        self.entities.push(Entity::new(name));
        self.name_index.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn entity(&self, index: usize) -> Result<&Entity, AgoraError> {
        self.entities.get(index).ok_or_else(|| {
            AgoraError::out_of_range(IndexKind::Entity, index, self.entities.len())
        })
    }

    pub fn entity_mut(&mut self, index: usize) -> Result<&mut Entity, AgoraError> {
        let len = self.entities.len();
        self.entities
            .get_mut(index)
            .ok_or_else(|| AgoraError::out_of_range(IndexKind::Entity, index, len))
    }

    pub fn entity_named(&self, name: &str) -> Result<&Entity, AgoraError> {
        let index = self
            .entity_index(name)
            .ok_or_else(|| AgoraError::EntityNotFound(name.to_string()))?;
        self.entity(index)
    }

    #[must_use]
    pub fn entity_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Every entity reachable from `entity` through relationship edges.
    ///
    /// The start entity is excluded, even when a cycle leads back to it.
    pub fn ancestors_of(&self, entity: usize) -> Result<BTreeSet<usize>, AgoraError> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![entity];
        self.entity(entity)?;

        while let Some(current) = stack.pop() {
            for attribute in self.entity(current)?.attributes() {
                for target in attribute.targets() {
                    if target != entity && seen.insert(target) {
                        stack.push(target);
                    }
                }
            }
        }
        Ok(seen)
    }

    // =========================================================================
    // GROUPS
    // =========================================================================

    pub fn group(&self, index: usize) -> Result<&Group, AgoraError> {
        self.groups
            .get(index)
            .ok_or_else(|| AgoraError::out_of_range(IndexKind::Group, index, self.groups.len()))
    }

    pub fn group_mut(&mut self, index: usize) -> Result<&mut Group, AgoraError> {
        let len = self.groups.len();
        self.groups
            .get_mut(index)
            .ok_or_else(|| AgoraError::out_of_range(IndexKind::Group, index, len))
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Index of the group holding `entity`.
    #[must_use]
    pub fn find_group_of(&self, entity: usize) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(entity))
    }

    /// Replace the group list. Only grouping may do this, since groups must
    /// partition the entities.
    pub(crate) fn set_groups(&mut self, groups: Vec<Group>) {
        self.groups = groups;
    }

    // =========================================================================
    // SCHEDULING CURSORS
    // =========================================================================

    #[must_use]
    pub fn next_group(&self) -> Option<usize> {
        self.next_group
    }

    #[must_use]
    pub fn next_entity(&self) -> Option<usize> {
        self.next_entity
    }

    pub fn set_next_group(&mut self, group: Option<usize>) -> Result<(), AgoraError> {
        if let Some(index) = group {
            self.group(index)?;
        }
        self.next_group = group;
        Ok(())
    }

    pub fn set_next_entity(&mut self, entity: Option<usize>) -> Result<(), AgoraError> {
        if let Some(index) = entity {
            self.entity(index)?;
        }
        self.next_entity = entity;
        Ok(())
    }

    // =========================================================================
    // ACTIVATION HISTORY
    // =========================================================================

    pub fn append_activation_record(&mut self, worker: &str, kind: WorkerKind) {
        self.history.push(ActivationRecord::new(worker, kind));
    }

    /// Append a message to the most recent record.
    pub fn append_message_to_last(&mut self, message: impl Into<String>) -> Result<(), AgoraError> {
        let last = self
            .history
            .last_mut()
            .ok_or(AgoraError::NoActivationHistory)?;
        last.messages.push(message.into());
        Ok(())
    }

    /// Position of the most recent record written by `worker` of `kind`,
    /// optionally also carrying `message`.
    #[must_use]
    pub fn find_activation_record(
        &self,
        worker: &str,
        kind: WorkerKind,
        message: Option<&str>,
    ) -> Option<usize> {
        self.history.iter().rposition(|record| {
            record.is(worker, kind) && message.is_none_or(|m| record.has_message(m))
        })
    }

    #[must_use]
    pub fn last_record(&self) -> Option<&ActivationRecord> {
        self.history.last()
    }

    #[must_use]
    pub fn history(&self) -> &[ActivationRecord] {
        &self.history
    }

    #[must_use]
    pub fn activation_count(&self) -> usize {
        self.history.len()
    }

    // =========================================================================
    // SEARCH AREA AND PATHS
    // =========================================================================

    #[must_use]
    pub fn overall_search_area(&self) -> Option<&Region> {
        self.overall_search_area.as_ref()
    }

    pub fn set_overall_search_area(&mut self, area: Option<Region>) {
        self.overall_search_area = area;
    }

    #[must_use]
    pub fn paths(&self) -> &IoPaths {
        &self.paths
    }

    pub fn set_paths(&mut self, paths: IoPaths) {
        self.paths = paths;
    }

    /// Board paths with the entity's overrides applied.
    pub fn paths_for(&self, entity: usize) -> Result<IoPaths, AgoraError> {
        Ok(self.paths.overlay(self.entity(entity)?.paths()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeKind, SegParam};

    fn seeded(name: &str, target: &str, index: usize) -> Attribute {
        Attribute::new(
            name,
            AttributeKind::SegParam {
                param: SegParam::RegionGrowingSeed,
            },
        )
        .with_relation(target, index)
    }

    #[test]
    fn entities_are_unique_by_name() {
        let mut board = Board::new();
        assert_eq!(board.add_entity("A").expect("add"), 0);
        assert!(matches!(
            board.add_entity("A"),
            Err(AgoraError::DuplicateEntity(_))
        ));
        assert_eq!(board.entity_index("A"), Some(0));
        assert_eq!(board.entity_index("B"), None);
        assert!(matches!(
            board.entity_named("B"),
            Err(AgoraError::EntityNotFound(_))
        ));
    }

    #[test]
    fn out_of_range_is_never_clamped() {
        let mut board = Board::new();
        board.add_entity("A").expect("add");
        assert!(matches!(
            board.entity(1),
            Err(AgoraError::IndexOutOfRange {
                kind: IndexKind::Entity,
                index: 1,
                len: 1
            })
        ));
        assert!(board.set_next_entity(Some(3)).is_err());
        assert!(board.set_next_group(Some(0)).is_err());
        assert!(board.group(0).is_err());
    }

    #[test]
    fn ancestors_follow_edges_transitively() {
        let mut board = Board::new();
        for name in ["A", "B", "C", "D"] {
            board.add_entity(name).expect("add");
        }
        board
            .entity_mut(0)
            .expect("A")
            .add_attribute(seeded("s", "B", 1))
            .expect("attr");
        board
            .entity_mut(1)
            .expect("B")
            .add_attribute(seeded("s", "C", 2))
            .expect("attr");
        board
            .entity_mut(2)
            .expect("C")
            .add_attribute(seeded("s", "A", 0))
            .expect("attr");

        let ancestors = board.ancestors_of(0).expect("ancestors");
        assert_eq!(ancestors.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(board.ancestors_of(3).expect("leaf").is_empty());
    }

    #[test]
    fn history_is_searched_most_recent_first() {
        let mut board = Board::new();
        assert!(matches!(
            board.append_message_to_last("x"),
            Err(AgoraError::NoActivationHistory)
        ));

        board.append_activation_record("segment", WorkerKind::Segmentation);
        board.append_message_to_last("entity:0").expect("append");
        board.append_activation_record("score", WorkerKind::Confidence);
        board.append_activation_record("segment", WorkerKind::Segmentation);
        board.append_message_to_last("entity:1").expect("append");

        assert_eq!(
            board.find_activation_record("segment", WorkerKind::Segmentation, None),
            Some(2)
        );
        assert_eq!(
            board.find_activation_record("segment", WorkerKind::Segmentation, Some("entity:0")),
            Some(0)
        );
        assert_eq!(
            board.find_activation_record("segment", WorkerKind::Confidence, None),
            None
        );
        assert_eq!(board.activation_count(), 3);
    }
}
