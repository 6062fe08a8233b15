//! # Grouping Engine
//!
//! Clusters entities into groups through bidirectional relationships.
//!
//! Every entity starts in its own group. The two endpoints of a
//! bidirectional relationship always end up together, so the result is the
//! set of connected components of the bidirectional graph. Groups keep the
//! order of their lowest member: when two groups meet, the one created first
//! absorbs the other and keeps its member order.

use crate::board::Board;
use crate::group::Group;
use crate::AgoraError;

/// Partition the board's entities into groups.
///
/// A no-op returning `Ok(false)` once groups exist.
///
/// # Errors
///
/// `UnresolvableModel` if any relationship points at a missing entity.
pub fn form_groups(board: &mut Board) -> Result<bool, AgoraError> {
    if board.group_count() > 0 {
        return Ok(false);
    }

    let edges = bidirectional_edges(board)?;
    let mut groups: Vec<Group> = (0..board.entity_count()).map(Group::singleton).collect();

    loop {
        let mut merged = false;
        for &(from, to) in &edges {
            let (Some(a), Some(b)) = (group_of(&groups, from), group_of(&groups, to)) else {
                continue;
            };
            if a == b {
                continue;
            }
            let (keep, gone) = if a < b { (a, b) } else { (b, a) };
            let absorbed = groups.remove(gone);
            if let Some(group) = groups.get_mut(keep) {
                group.absorb(absorbed);
            }
            merged = true;
        }
        if !merged {
            break;
        }
    }

    tracing::info!(
        entities = board.entity_count(),
        groups = groups.len(),
        "groups formed"
    );
    board.set_groups(groups);
    Ok(true)
}

fn group_of(groups: &[Group], entity: usize) -> Option<usize> {
    groups.iter().position(|g| g.contains(entity))
}

fn bidirectional_edges(board: &Board) -> Result<Vec<(usize, usize)>, AgoraError> {
    let count = board.entity_count();
    let mut edges = Vec::new();
    for (index, entity) in board.entities().iter().enumerate() {
        for attribute in entity.attributes() {
            for relation in attribute.relations() {
                if relation.index >= count {
                    return Err(AgoraError::UnresolvableModel(format!(
                        "'{}.{}' points at '{}' (index {}) but the board has {} entities",
                        entity.name(),
                        attribute.name(),
                        relation.name,
                        relation.index,
                        count
                    )));
                }
                if attribute.is_bidirectional() {
                    edges.push((index, relation.index));
                }
            }
        }
    }
    Ok(edges)
}

// =============================================================================
// TESTS
// =============================================================================
