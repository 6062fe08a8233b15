//! # Groups
//!
//! A group is a cluster of entities that must be resolved together because
//! bidirectional relationships tie them. Groups partition the board's
//! entities; the scheduler works through them one at a time in priority
//! order.

use crate::candidate::GroupCandidate;
use crate::primitives::{MAX_PRIORITY, TERMINAL_PRIORITY};
use crate::types::IndexKind;
use crate::AgoraError;
use serde::{Deserialize, Serialize};

/// An order-preserving, duplicate-free set of entity indices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Group {
    members: Vec<usize>,
    priority: f64,
    candidates: Vec<GroupCandidate>,
}

impl Group {
    /// A group holding only `entity`.
    #[must_use]
    pub fn singleton(entity: usize) -> Self {
        Self {
            members: vec![entity],
            priority: 0.0,
            candidates: Vec::new(),
        }
    }

    /// Build a group from `members`, dropping repeats.
    #[must_use]
    pub fn from_members(members: impl IntoIterator<Item = usize>) -> Self {
        let mut group = Self::default();
        for member in members {
            group.push_member(member);
        }
        group
    }

    fn push_member(&mut self, entity: usize) {
        if !self.members.contains(&entity) {
            self.members.push(entity);
        }
    }

    #[must_use]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn contains(&self, entity: usize) -> bool {
        self.members.contains(&entity)
    }

    /// Position of `entity` inside this group.
    #[must_use]
    pub fn position_of(&self, entity: usize) -> Option<usize> {
        self.members.iter().position(|&m| m == entity)
    }

    pub fn member(&self, position: usize) -> Result<usize, AgoraError> {
        self.members.get(position).copied().ok_or_else(|| {
            AgoraError::out_of_range(IndexKind::Member, position, self.members.len())
        })
    }

    /// Move every member of `other` to the end of this group, keeping order.
    pub fn absorb(&mut self, other: Group) {
        for member in other.members {
            self.push_member(member);
        }
    }

    // =========================================================================
    // PRIORITY
    // =========================================================================

    #[must_use]
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Set the priority, clamped to `[TERMINAL_PRIORITY, MAX_PRIORITY]`.
    pub fn set_priority(&mut self, priority: f64) {
        self.priority = if priority.is_nan() {
            0.0
        } else {
            priority.clamp(TERMINAL_PRIORITY, MAX_PRIORITY)
        };
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.priority <= TERMINAL_PRIORITY
    }

    /// Mark the group as fully processed. Terminal groups are never selected
    /// again.
    pub fn mark_terminal(&mut self) {
        self.priority = TERMINAL_PRIORITY;
    }

    // =========================================================================
    // GROUP CANDIDATES
    // =========================================================================

    #[must_use]
    pub fn candidates(&self) -> &[GroupCandidate] {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut [GroupCandidate] {
        &mut self.candidates
    }

    pub fn candidate(&self, index: usize) -> Result<&GroupCandidate, AgoraError> {
        self.candidates.get(index).ok_or_else(|| {
            AgoraError::out_of_range(IndexKind::GroupCandidate, index, self.candidates.len())
        })
    }

    pub fn set_candidates(&mut self, candidates: Vec<GroupCandidate>) {
        self.candidates = candidates;
    }

    pub fn clear_candidates(&mut self) {
        self.candidates.clear();
    }

    /// Index of the group candidate with the highest positive confidence.
    /// The first one wins ties.
    #[must_use]
    pub fn best_candidate(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, candidate) in self.candidates.iter().enumerate() {
            let confidence = candidate.confidence();
            if confidence <= 0.0 {
                continue;
            }
            match best {
                Some((_, top)) if top >= confidence => {}
                _ => best = Some((index, confidence)),
            }
        }
        best.map(|(index, _)| index)
    }
}

// =============================================================================
// TESTS
// =============================================================================
