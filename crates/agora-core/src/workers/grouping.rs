//! Grouping as a worker: fires once, before anything else can run.

use crate::board::Board;
use crate::grouping::form_groups;
use crate::primitives::SCORE_URGENT;
use crate::worker::Worker;
use crate::workers::FORM_GROUPS;
use crate::{AgoraError, WorkerKind};

/// Partitions the board into groups once, before anything else happens.
#[derive(Debug, Default)]
pub struct FormGroupsWorker;

impl Worker for FormGroupsWorker {
    fn name(&self) -> &str {
        FORM_GROUPS
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Grouping
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        if board.group_count() == 0 && board.entity_count() > 0 {
            Ok(SCORE_URGENT)
        } else {
            Ok(0.0)
        }
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        form_groups(board)?;
        Ok(())
    }
}
