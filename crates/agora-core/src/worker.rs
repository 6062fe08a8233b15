//! # Worker Contract
//!
//! A worker (knowledge source) is a named unit that competes for control of
//! the board. On every cycle the scheduler asks each worker how eager it is;
//! the single most eager one is activated.
//!
//! Workers communicate only through the board. The activation history is
//! their shared memory of what already happened: a worker's precondition is
//! usually a question about the last record or about records written since
//! the current group was selected.

use crate::board::Board;
use crate::{AgoraError, WorkerKind};

/// A pluggable knowledge source.
pub trait Worker {
    /// Name written to the activation history.
    fn name(&self) -> &str;

    fn kind(&self) -> WorkerKind;

    /// Eagerness to run against the current board. Anything `<= 0` means
    /// "nothing to do".
    fn score(&self, board: &Board) -> Result<f64, AgoraError>;

    /// Do the work.
    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError>;

    /// Called right after the scheduler appended this activation's record,
    /// so the worker can attach messages to it.
    fn on_activation_recorded(&self, _board: &mut Board) -> Result<(), AgoraError> {
        Ok(())
    }
}
