//! Committing group candidates as matches.
//!
//! The group holding the best group candidate is matched. Each of its
//! unmatched members either takes its choice from that best candidate, or,
//! when it declares a confidence threshold, every distinct choice from group
//! candidates whose confidence is above the threshold. The group becomes
//! terminal whether or not anything was committed.

use crate::board::Board;
use crate::primitives::SCORE_URGENT;
use crate::worker::Worker;
use crate::workers::{GROUP_CONFIDENCE, MATCH_GROUP, group_message, open_group, recorded_since_selection};
use crate::{AgoraError, WorkerKind};

/// Match the open group holding the best positive group candidate, falling
/// back to the selected group when no candidate qualifies.
///
/// Returns the group that became terminal.
pub fn match_best_group(board: &mut Board) -> Result<Option<usize>, AgoraError> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (index, group) in board.groups().iter().enumerate() {
        if group.is_terminal() {
            continue;
        }
        let Some(choice) = group.best_candidate() else {
            continue;
        };
        let confidence = group.candidate(choice)?.confidence();
        match best {
            Some((_, _, top)) if top >= confidence => {}
            _ => best = Some((index, choice, confidence)),
        }
    }

    let target = match best {
        Some((index, _, _)) => Some(index),
        None => open_group(board).map(|(index, _)| index),
    };
    let Some(group) = target else {
        return Ok(None);
    };
    let chosen = best.map(|(_, choice, _)| choice);

    let members = board.group(group)?.members().to_vec();
    for (position, &member) in members.iter().enumerate() {
        if board.entity(member)?.is_matched() {
            continue;
        }

        let current = board.group(group)?;
        let mut picks: Vec<usize> = Vec::new();
        match board.entity(member)?.confidence_threshold() {
            Some(threshold) => {
                for candidate in current.candidates() {
                    if candidate.confidence() <= threshold {
                        continue;
                    }
                    if let Some(index) = candidate.choice(position)? {
                        if !picks.contains(&index) {
                            picks.push(index);
                        }
                    }
                }
            }
            None => {
                if let Some(choice) = chosen {
                    if let Some(index) = current.candidate(choice)?.choice(position)? {
                        picks.push(index);
                    }
                }
            }
        }

        let entity = board.entity_mut(member)?;
        entity.commit_matches(&picks)?;
        if entity.is_matched() {
            tracing::info!(
                entity = entity.name(),
                matched = entity.num_matched_candidates(),
                area = entity.matched_result().map_or(0, |r| r.area()),
                "entity matched"
            );
        } else {
            tracing::info!(entity = entity.name(), "no candidate to match");
        }
    }

    board.group_mut(group)?.mark_terminal();
    Ok(Some(group))
}

/// Commits the best group candidate once group confidence has run.
#[derive(Debug, Default)]
pub struct MatchGroupWorker {
    last_group: Option<usize>,
}

impl MatchGroupWorker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Worker for MatchGroupWorker {
    fn name(&self) -> &str {
        MATCH_GROUP
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Matching
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        let ready = open_group(board).is_some()
            && recorded_since_selection(board, GROUP_CONFIDENCE, WorkerKind::Confidence, None);
        Ok(if ready { SCORE_URGENT } else { 0.0 })
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        self.last_group = match_best_group(board)?;
        Ok(())
    }

    fn on_activation_recorded(&self, board: &mut Board) -> Result<(), AgoraError> {
        match self.last_group {
            Some(group) => board.append_message_to_last(group_message(group)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
