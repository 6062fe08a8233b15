//! # Entities
//!
//! A named target to be resolved ("solution element").
//!
//! Entities are created once, when the model is loaded. Their attributes are
//! fixed from then on. Candidates come and go many times during a run; the
//! matched indices and the combined matched result are written once by the
//! matching worker and outlive a later release of the candidates.

use crate::attribute::Attribute;
use crate::candidate::Candidate;
use crate::model::IoPaths;
use crate::types::IndexKind;
use crate::{AgoraError, Region};
use serde::{Deserialize, Serialize};

/// A target entity and its current hypotheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    name: String,
    attributes: Vec<Attribute>,
    candidates: Vec<Candidate>,
    matched: Vec<usize>,
    resolved: bool,
    matched_result: Option<Region>,
    paths: IoPaths,
}

impl Entity {
    /// Create an entity with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            candidates: Vec::new(),
            matched: Vec::new(),
            resolved: false,
            matched_result: None,
            paths: IoPaths::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // =========================================================================
    // ATTRIBUTES
    // =========================================================================

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, index: usize) -> Result<&Attribute, AgoraError> {
        self.attributes.get(index).ok_or_else(|| {
            AgoraError::out_of_range(IndexKind::Attribute, index, self.attributes.len())
        })
    }

    /// Append an attribute. Only valid before any candidate exists, since
    /// every candidate holds one score slot per attribute.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<usize, AgoraError> {
        if !self.candidates.is_empty() {
            return Err(AgoraError::InvalidModel(format!(
                "cannot add attribute '{}' to '{}' after candidates exist",
                attribute.name(),
                self.name
            )));
        }
        self.attributes.push(attribute);
        Ok(self.attributes.len() - 1)
    }

    /// Multi-match threshold declared by the first threshold attribute.
    #[must_use]
    pub fn confidence_threshold(&self) -> Option<f64> {
        self.attributes
            .iter()
            .find_map(Attribute::confidence_threshold)
    }

    /// Whether the model asks to keep this entity's candidates.
    #[must_use]
    pub fn retains_candidates(&self) -> bool {
        self.attributes.iter().any(Attribute::is_retain)
    }

    // =========================================================================
    // CANDIDATES
    // =========================================================================

    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut [Candidate] {
        &mut self.candidates
    }

    pub fn candidate(&self, index: usize) -> Result<&Candidate, AgoraError> {
        self.candidates.get(index).ok_or_else(|| {
            AgoraError::out_of_range(IndexKind::Candidate, index, self.candidates.len())
        })
    }

    pub fn candidate_mut(&mut self, index: usize) -> Result<&mut Candidate, AgoraError> {
        let len = self.candidates.len();
        self.candidates
            .get_mut(index)
            .ok_or_else(|| AgoraError::out_of_range(IndexKind::Candidate, index, len))
    }

    /// Append a candidate for `region` and return its index.
    pub fn add_candidate(&mut self, region: Region) -> usize {
        self.candidates
            .push(Candidate::new(region, self.attributes.len()));
        self.candidates.len() - 1
    }

    #[must_use]
    pub fn num_candidates(&self) -> usize {
        self.candidates.len()
    }

    // =========================================================================
    // MATCHING
    // =========================================================================

    /// Indices of the committed candidates.
    ///
    /// Kept after `free_candidates`, when they no longer index anything.
    #[must_use]
    pub fn matched_indices(&self) -> &[usize] {
        &self.matched
    }

    #[must_use]
    pub fn num_matched_candidates(&self) -> usize {
        self.matched.len()
    }

    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.resolved
    }

    /// Union of the committed candidates' regions.
    #[must_use]
    pub fn matched_result(&self) -> Option<&Region> {
        self.matched_result.as_ref()
    }

    /// Commit `indices` as this entity's matches and build the combined
    /// result. Duplicates are dropped, order is kept. An empty slice is a
    /// no-op.
    pub fn commit_matches(&mut self, indices: &[usize]) -> Result<(), AgoraError> {
        if indices.is_empty() {
            return Ok(());
        }

        let mut committed: Vec<usize> = Vec::with_capacity(indices.len());
        let mut combined = Region::new();
        for &index in indices {
            let candidate = self.candidate(index)?;
            if !committed.contains(&index) {
                combined.extend(candidate.region());
                committed.push(index);
            }
        }

        self.matched = committed;
        self.matched_result = Some(combined);
        self.resolved = true;
        Ok(())
    }

    /// Drop every candidate.
    ///
    /// The matched indices, the matched flag and the combined matched result
    /// survive; later groups still read the result through relationships.
    /// Returns the number of candidates released.
    pub fn free_candidates(&mut self) -> usize {
        let released = self.candidates.len();
        self.candidates.clear();
        released
    }

    // =========================================================================
    // PATHS
    // =========================================================================

    /// Per-entity path overrides from the model.
    #[must_use]
    pub fn paths(&self) -> &IoPaths {
        &self.paths
    }

    pub fn set_paths(&mut self, paths: IoPaths) {
        self.paths = paths;
    }
}

// =============================================================================
// TESTS
// =============================================================================
