//! # Candidates
//!
//! Proposed matches for entities and for whole groups.
//!
//! - A `Candidate` is one region proposed for one entity. It carries one score
//!   slot per attribute of its entity and a derived partial confidence.
//! - A `GroupCandidate` binds one candidate per group member and aggregates
//!   their confidence with `min`.
//!
//! Both confidences only ever go down: new evidence can veto a hypothesis
//! but never revive one.

use crate::primitives::FULL_CONFIDENCE;
use crate::types::IndexKind;
use crate::{AgoraError, Region};
use serde::{Deserialize, Serialize};

// =============================================================================
// SCORE
// =============================================================================

/// The outcome of evaluating one attribute on one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Feature value, `None` when it could not be computed or was forced.
    pub value: Option<f64>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Score {
    /// Create a score; the confidence is clamped to `[0, 1]`, NaN becomes 0.
    #[must_use]
    pub fn new(value: Option<f64>, confidence: f64) -> Self {
        Self {
            value,
            confidence: clamp_confidence(confidence),
        }
    }

    /// A forced zero, used when an essential relationship is unresolved.
    #[must_use]
    pub fn vetoed() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, FULL_CONFIDENCE)
    }
}

// =============================================================================
// CANDIDATE
// =============================================================================

/// One proposed match for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    region: Region,
    scores: Vec<Option<Score>>,
    partial_confidence: f64,
}

impl Candidate {
    /// Create a candidate with `attribute_count` unset score slots.
    #[must_use]
    pub fn new(region: Region, attribute_count: usize) -> Self {
        Self {
            region,
            scores: vec![None; attribute_count],
            partial_confidence: FULL_CONFIDENCE,
        }
    }

    #[must_use]
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// All score slots, one per attribute of the owning entity.
    #[must_use]
    pub fn scores(&self) -> &[Option<Score>] {
        &self.scores
    }

    pub fn score(&self, attribute: usize) -> Result<Option<Score>, AgoraError> {
        self.scores.get(attribute).copied().ok_or_else(|| {
            AgoraError::out_of_range(IndexKind::Attribute, attribute, self.scores.len())
        })
    }

    /// Record a score for `attribute`.
    ///
    /// Re-scoring a slot keeps the lower confidence, so the slot and the
    /// partial confidence can only decrease.
    pub fn set_score(&mut self, attribute: usize, score: Score) -> Result<(), AgoraError> {
        let len = self.scores.len();
        let slot = self
            .scores
            .get_mut(attribute)
            .ok_or_else(|| AgoraError::out_of_range(IndexKind::Attribute, attribute, len))?;

        let confidence = clamp_confidence(score.confidence);
        let stored = match slot {
            Some(previous) if previous.confidence <= confidence => *previous,
            _ => Score {
                value: score.value,
                confidence,
            },
        };
        *slot = Some(stored);
        self.partial_confidence = self.partial_confidence.min(stored.confidence);
        Ok(())
    }

    /// Minimum over every set confidence; 1.0 while nothing is set.
    #[must_use]
    pub fn partial_confidence(&self) -> f64 {
        self.partial_confidence
    }

    /// Number of score slots that hold a value.
    #[must_use]
    pub fn scored_count(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }
}

// =============================================================================
// GROUP CANDIDATE
// =============================================================================

/// One combination of per-member candidate choices across a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCandidate {
    choices: Vec<Option<usize>>,
    confidence: f64,
}

impl GroupCandidate {
    /// Create a group candidate with every member unbound.
    #[must_use]
    pub fn new(member_count: usize) -> Self {
        Self {
            choices: vec![None; member_count],
            confidence: FULL_CONFIDENCE,
        }
    }

    /// Per-member candidate indices, by member position.
    #[must_use]
    pub fn choices(&self) -> &[Option<usize>] {
        &self.choices
    }

    pub fn choice(&self, member: usize) -> Result<Option<usize>, AgoraError> {
        self.choices.get(member).copied().ok_or_else(|| {
            AgoraError::out_of_range(IndexKind::Member, member, self.choices.len())
        })
    }

    /// Bind member `member` to candidate `candidate`, folding
    /// `candidate_confidence` into the aggregate.
    pub fn bind(
        &mut self,
        member: usize,
        candidate: usize,
        candidate_confidence: f64,
    ) -> Result<(), AgoraError> {
        let len = self.choices.len();
        let slot = self
            .choices
            .get_mut(member)
            .ok_or_else(|| AgoraError::out_of_range(IndexKind::Member, member, len))?;
        *slot = Some(candidate);
        self.lower_confidence(candidate_confidence);
        Ok(())
    }

    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Fold another confidence in with `min`. Never raises the aggregate.
    pub fn lower_confidence(&mut self, confidence: f64) {
        self.confidence = self.confidence.min(clamp_confidence(confidence));
    }
}

// =============================================================================
// TESTS
// =============================================================================
