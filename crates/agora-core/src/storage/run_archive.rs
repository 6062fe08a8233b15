//! # redb-backed Run Archive
//!
//! Keeps encoded run summaries on disk, keyed by run name.
//!
//! Values are exactly the bytes produced by `summary_to_bytes`, so an archived
//! run and a summary file written by the binary are interchangeable.

use crate::export::RunSummary;
use crate::formats::{summary_from_bytes, summary_to_bytes};
use crate::primitives::MAX_NAME_LENGTH;
use crate::AgoraError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table of runs: run name -> encoded summary.
const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");

fn io_error(e: impl std::fmt::Display) -> AgoraError {
    AgoraError::IoError(e.to_string())
}

/// A disk-backed store of run summaries.
pub struct RunArchive {
    db: Database,
}

impl std::fmt::Debug for RunArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunArchive").finish_non_exhaustive()
    }
}

impl RunArchive {
    /// Open or create an archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgoraError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        let write_txn = db.begin_write().map_err(io_error)?;
        {
            let _ = write_txn.open_table(RUNS).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        Ok(Self { db })
    }

    fn validate_name(name: &str) -> Result<(), AgoraError> {
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(AgoraError::InvalidModel(format!(
                "run name must be 1..={MAX_NAME_LENGTH} bytes"
            )));
        }
        Ok(())
    }

    /// Store `summary` under `name`, replacing any previous run of that name.
    pub fn store(&self, name: &str, summary: &RunSummary) -> Result<(), AgoraError> {
        Self::validate_name(name)?;
        let bytes = summary_to_bytes(summary)?;

        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(RUNS).map_err(io_error)?;
            table.insert(name, bytes.as_slice()).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        tracing::debug!(run = name, bytes = bytes.len(), "run archived");
        Ok(())
    }

    /// Load the run called `name`.
    pub fn load(&self, name: &str) -> Result<Option<RunSummary>, AgoraError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RUNS).map_err(io_error)?;
        match table.get(name).map_err(io_error)? {
            Some(value) => summary_from_bytes(value.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Every stored run name, sorted.
    pub fn list(&self) -> Result<Vec<String>, AgoraError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(RUNS).map_err(io_error)?;
        let mut names = Vec::new();
        for entry in table.iter().map_err(io_error)? {
            let (key, _) = entry.map_err(io_error)?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    /// Delete the run called `name`. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, AgoraError> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        let existed = {
            let mut table = write_txn.open_table(RUNS).map_err(io_error)?;
            table.remove(name).map_err(io_error)?.is_some()
        };
        write_txn.commit().map_err(io_error)?;
        Ok(existed)
    }
}

// =============================================================================
// TESTS
// =============================================================================
