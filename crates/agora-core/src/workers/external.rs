//! Candidate generation from an external source.
//!
//! Pixel-level segmentation lives outside the engine. This worker asks a
//! `CandidateSource` for the current entity's regions and wires in the
//! dependency parameters the engine understands:
//! - `same_candidates_as`: the targets' candidates replace the source output
//! - `additional_candidates`: the targets' candidates are appended
//!
//! When the board has an overall search area, regions outside it are dropped.

use crate::attribute::{Attribute, DependencyKind};
use crate::board::Board;
use crate::primitives::SCORE_SEGMENT;
use crate::worker::Worker;
use crate::workers::{EXTERNAL_CANDIDATES, entity_message, open_group, recorded_since_selection};
use crate::{AgoraError, Region, WorkerKind};
use std::collections::BTreeMap;

/// Produces candidate regions for an entity.
pub trait CandidateSource {
    fn candidates_for(&self, board: &Board, entity: usize) -> Result<Vec<Region>, AgoraError>;
}

/// A fixed map from entity name to regions.
#[derive(Debug, Clone, Default)]
pub struct StaticCandidates {
    regions: BTreeMap<String, Vec<Region>>,
}

impl StaticCandidates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert` for a whole list.
    #[must_use]
    pub fn with(mut self, entity: &str, regions: impl IntoIterator<Item = Region>) -> Self {
        self.regions
            .entry(entity.to_string())
            .or_default()
            .extend(regions);
        self
    }

    pub fn insert(&mut self, entity: &str, region: Region) {
        self.regions
            .entry(entity.to_string())
            .or_default()
            .push(region);
    }
}

impl CandidateSource for StaticCandidates {
    fn candidates_for(&self, board: &Board, entity: usize) -> Result<Vec<Region>, AgoraError> {
        let name = board.entity(entity)?.name();
        Ok(self.regions.get(name).cloned().unwrap_or_default())
    }
}

/// Segmentation worker backed by a `CandidateSource`.
pub struct ExternalCandidatesWorker {
    source: Box<dyn CandidateSource>,
}

impl std::fmt::Debug for ExternalCandidatesWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalCandidatesWorker").finish()
    }
}

impl ExternalCandidatesWorker {
    #[must_use]
    pub fn new(source: Box<dyn CandidateSource>) -> Self {
        Self { source }
    }

    fn targets_of(attributes: &[Attribute], kind: DependencyKind) -> Vec<usize> {
        attributes
            .iter()
            .filter(|a| a.dependency_kind() == Some(kind))
            .flat_map(Attribute::targets)
            .collect()
    }

    fn copy_candidates(board: &Board, targets: &[usize], into: &mut Vec<Region>) -> Result<(), AgoraError> {
        for &target in targets {
            into.extend(
                board
                    .entity(target)?
                    .candidates()
                    .iter()
                    .map(|c| c.region().clone()),
            );
        }
        Ok(())
    }
}

impl Worker for ExternalCandidatesWorker {
    fn name(&self) -> &str {
        EXTERNAL_CANDIDATES
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Segmentation
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        let (Some((_, group)), Some(entity)) = (open_group(board), board.next_entity()) else {
            return Ok(0.0);
        };
        if !group.contains(entity) || board.entity(entity)?.is_matched() {
            return Ok(0.0);
        }
        let segmented = recorded_since_selection(
            board,
            EXTERNAL_CANDIDATES,
            WorkerKind::Segmentation,
            Some(&entity_message(entity)),
        );
        Ok(if segmented { 0.0 } else { SCORE_SEGMENT })
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        let Some(entity) = board.next_entity() else {
            return Ok(());
        };

        let attributes = board.entity(entity)?.attributes();
        let same = Self::targets_of(attributes, DependencyKind::SameCandidatesAs);
        let additional = Self::targets_of(attributes, DependencyKind::AdditionalCandidates);

        let mut regions = Vec::new();
        if same.is_empty() {
            regions = self.source.candidates_for(board, entity)?;
        } else {
            Self::copy_candidates(board, &same, &mut regions)?;
        }
        Self::copy_candidates(board, &additional, &mut regions)?;

        let proposed = regions.len();
        if let Some(area) = board.overall_search_area() {
            regions.retain(|r| r.intersects(area));
        }

        let target = board.entity_mut(entity)?;
        let kept = regions.len();
        for region in regions {
            target.add_candidate(region);
        }
        tracing::debug!(
            entity = target.name(),
            proposed,
            kept,
            "external candidates added"
        );
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
