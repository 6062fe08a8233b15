//! Group priorities and the two scheduling cursors.
//!
//! A group's priority says how ready it is to be resolved: the share of its
//! external neighbour groups that are already terminal. An essential
//! relationship into a group that is still open pins the priority at 0.

use crate::board::Board;
use crate::primitives::{MAX_PRIORITY, SCORE_ADVANCE, SCORE_SELECT};
use crate::worker::Worker;
use crate::workers::{
    FORM_GROUPS, NEXT_ENTITY, NEXT_GROUP, entity_message, group_message, is_member_settled,
    last_record_is, open_group,
};
use crate::{AgoraError, WorkerKind};
use std::collections::BTreeSet;

/// Recompute the priority of every open group.
///
/// Terminal groups keep their terminal priority.
pub fn compute_group_priorities(board: &mut Board) -> Result<(), AgoraError> {
    let mut updates = Vec::new();

    for (index, group) in board.groups().iter().enumerate() {
        if group.is_terminal() {
            continue;
        }

        let mut neighbours = BTreeSet::new();
        let mut blocked = false;
        for &member in group.members() {
            for attribute in board.entity(member)?.attributes() {
                for target in attribute.targets() {
                    let other = board.find_group_of(target).ok_or_else(|| {
                        AgoraError::UnresolvableModel(format!(
                            "entity {target} belongs to no group"
                        ))
                    })?;
                    if other == index {
                        continue;
                    }
                    neighbours.insert(other);
                    if attribute.is_essential() && !board.group(other)?.is_terminal() {
                        blocked = true;
                    }
                }
            }
        }

        let priority = if blocked {
            0.0
        } else if neighbours.is_empty() {
            MAX_PRIORITY
        } else {
            let mut processed = 0usize;
            for &other in &neighbours {
                if board.group(other)?.is_terminal() {
                    processed += 1;
                }
            }
            processed as f64 / neighbours.len() as f64
        };
        updates.push((index, priority));
    }

    for (index, priority) in updates {
        board.group_mut(index)?.set_priority(priority);
    }
    Ok(())
}

/// Select the open group with the highest priority and point `next_entity`
/// at its first member. The first group seen wins ties.
///
/// Clears both cursors and returns `None` when every group is terminal.
pub fn select_next_group(board: &mut Board) -> Result<Option<usize>, AgoraError> {
    let mut best: Option<(usize, f64)> = None;
    for (index, group) in board.groups().iter().enumerate() {
        if group.is_terminal() {
            continue;
        }
        match best {
            Some((_, top)) if top >= group.priority() => {}
            _ => best = Some((index, group.priority())),
        }
    }

    let Some((index, priority)) = best else {
        board.set_next_group(None)?;
        board.set_next_entity(None)?;
        return Ok(None);
    };

    let first = board.group(index)?.member(0)?;
    board.set_next_group(Some(index))?;
    board.set_next_entity(Some(first))?;
    tracing::debug!(group = index, priority, entity = first, "group selected");
    Ok(Some(index))
}

// =============================================================================
// NEXT GROUP
// =============================================================================

/// Picks the next group to resolve.
#[derive(Debug, Default)]
pub struct NextGroupWorker;

impl Worker for NextGroupWorker {
    fn name(&self) -> &str {
        NEXT_GROUP
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Scheduling
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        if board.groups().iter().all(|g| g.is_terminal()) {
            return Ok(0.0);
        }
        let due = last_record_is(board, FORM_GROUPS, WorkerKind::Grouping)
            || board.next_group().is_none()
            || open_group(board).is_none();
        Ok(if due { SCORE_SELECT } else { 0.0 })
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        compute_group_priorities(board)?;
        select_next_group(board)?;
        Ok(())
    }

    fn on_activation_recorded(&self, board: &mut Board) -> Result<(), AgoraError> {
        match board.next_group() {
            Some(group) => board.append_message_to_last(group_message(group)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// NEXT ENTITY
// =============================================================================

/// Round-robins `next_entity` through the open group's members.
#[derive(Debug, Default)]
pub struct NextEntityWorker;

impl NextEntityWorker {
    /// The member after `current` (wrapping) that still needs work.
    fn following_unsettled(board: &Board, members: &[usize], current: usize) -> Option<usize> {
        let start = members
            .iter()
            .position(|&m| m == current)
            .map_or(0, |p| p + 1);
        (0..members.len())
            .filter_map(|offset| members.get((start + offset) % members.len()).copied())
            .find(|&m| !is_member_settled(board, m))
    }
}

impl Worker for NextEntityWorker {
    fn name(&self) -> &str {
        NEXT_ENTITY
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Scheduling
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        let (Some((_, group)), Some(current)) = (open_group(board), board.next_entity()) else {
            return Ok(0.0);
        };
        if !is_member_settled(board, current) {
            return Ok(0.0);
        }
        let pending = group.members().iter().any(|&m| !is_member_settled(board, m));
        Ok(if pending { SCORE_ADVANCE } else { 0.0 })
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        let (Some((_, group)), Some(current)) = (open_group(board), board.next_entity()) else {
            return Ok(());
        };
        let next = Self::following_unsettled(board, group.members(), current);
        if next.is_some() {
            board.set_next_entity(next)?;
        }
        Ok(())
    }

    fn on_activation_recorded(&self, board: &mut Board) -> Result<(), AgoraError> {
        match board.next_entity() {
            Some(entity) => board.append_message_to_last(entity_message(entity)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
