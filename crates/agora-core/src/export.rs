//! # Run Summary Export
//!
//! A self-contained, serializable snapshot of a board after a run.
//!
//! The summary carries, per entity, its attributes, its remaining candidates
//! (scores, partial confidence, matched flag) and its combined matched
//! result; plus the groups, the activation history and a few counters. It is
//! what the binary prints, writes to disk and archives.
//!
//! Everything in a summary is ordered by entity, group or history position,
//! so two runs over the same model and candidates produce identical bytes.

use crate::attribute::AttributeKind;
use crate::board::{ActivationRecord, Board};
use crate::candidate::Score;
use crate::Region;
use serde::{Deserialize, Serialize};

// =============================================================================
// SUMMARY TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSummary {
    pub name: String,
    /// `search_area`, `seg_param`, `mem_param` or `feature`.
    pub kind: String,
    /// Names of the related entities.
    pub relations: Vec<String>,
    pub essential: bool,
    pub bidirectional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub region: Region,
    pub scores: Vec<Option<Score>>,
    pub partial_confidence: f64,
    /// Whether this candidate is one of the entity's committed matches.
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub name: String,
    pub attributes: Vec<AttributeSummary>,
    pub candidates: Vec<CandidateSummary>,
    pub matched_indices: Vec<usize>,
    pub matched_result: Option<Region>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Member entity names, in group order.
    pub members: Vec<String>,
    pub priority: f64,
    pub terminal: bool,
    pub candidate_count: usize,
}

/// Counters describing a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub entity_count: usize,
    pub group_count: usize,
    pub matched_count: usize,
    /// Candidates still held in memory.
    pub candidate_count: usize,
    pub activation_count: usize,
}

impl RunMetrics {
    #[must_use]
    pub fn from_board(board: &Board) -> Self {
        Self {
            entity_count: board.entity_count(),
            group_count: board.group_count(),
            matched_count: board.entities().iter().filter(|e| e.is_matched()).count(),
            candidate_count: board.entities().iter().map(|e| e.num_candidates()).sum(),
            activation_count: board.activation_count(),
        }
    }
}

/// Snapshot of a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub entities: Vec<EntitySummary>,
    pub groups: Vec<GroupSummary>,
    pub history: Vec<ActivationRecord>,
    pub metrics: RunMetrics,
}

fn kind_label(kind: &AttributeKind) -> String {
    kind.label().to_string()
}

impl RunSummary {
    /// Take a snapshot of `board`.
    #[must_use]
    pub fn from_board(board: &Board) -> Self {
        let name_of = |index: usize| {
            board
                .entity(index)
                .map_or_else(|_| format!("#{index}"), |e| e.name().to_string())
        };

        let entities = board
            .entities()
            .iter()
            .map(|entity| EntitySummary {
                name: entity.name().to_string(),
                attributes: entity
                    .attributes()
                    .iter()
                    .map(|a| AttributeSummary {
                        name: a.name().to_string(),
                        kind: kind_label(a.kind()),
                        relations: a.relations().iter().map(|r| r.name.clone()).collect(),
                        essential: a.is_essential(),
                        bidirectional: a.is_bidirectional(),
                    })
                    .collect(),
                candidates: entity
                    .candidates()
                    .iter()
                    .enumerate()
                    .map(|(index, c)| CandidateSummary {
                        region: c.region().clone(),
                        scores: c.scores().to_vec(),
                        partial_confidence: c.partial_confidence(),
                        matched: entity.matched_indices().contains(&index),
                    })
                    .collect(),
                matched_indices: entity.matched_indices().to_vec(),
                matched_result: entity.matched_result().cloned(),
            })
            .collect();

        let groups = board
            .groups()
            .iter()
            .map(|g| GroupSummary {
                members: g.members().iter().map(|&m| name_of(m)).collect(),
                priority: g.priority(),
                terminal: g.is_terminal(),
                candidate_count: g.candidates().len(),
            })
            .collect();

        Self {
            entities,
            groups,
            history: board.history().to_vec(),
            metrics: RunMetrics::from_board(board),
        }
    }

    /// Summary of the entity called `name`.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntitySummary> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Deterministic checksum of the summary.
    ///
    /// XOR-rotate over names, matches, pixels and confidence bits. Detects
    /// accidental corruption only; it is not collision resistant.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        fn mix_str(hash: &mut u64, text: &str, rotation: u32) {
            for (i, byte) in text.bytes().enumerate() {
                *hash ^= u64::from(byte).rotate_left(rotation + (i as u32 % 32));
            }
        }
        fn mix_region(hash: &mut u64, region: &Region) {
            for p in region.pixels() {
                *hash ^= (p.x as u64).rotate_left(17) ^ (p.y as u64).rotate_left(11);
            }
        }

        let mut hash: u64 = 0;
        for (index, entity) in self.entities.iter().enumerate() {
            hash ^= (index as u64).rotate_left(3);
            mix_str(&mut hash, &entity.name, 7);
            for &matched in &entity.matched_indices {
                hash ^= (matched as u64).rotate_left(13);
            }
            if let Some(region) = &entity.matched_result {
                mix_region(&mut hash, region);
            }
            for candidate in &entity.candidates {
                hash ^= candidate.partial_confidence.to_bits().rotate_left(29);
                mix_region(&mut hash, &candidate.region);
            }
        }
        for group in &self.groups {
            hash ^= group.priority.to_bits().rotate_left(19);
        }
        for record in &self.history {
            mix_str(&mut hash, record.worker(), 23);
        }
        hash ^ (self.metrics.activation_count as u64).rotate_left(5)
    }
}

// =============================================================================
// CRYPTOGRAPHIC HASH
// =============================================================================

/// BLAKE3 hash of the encoded summary, as 64 hex characters.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
pub fn summary_crypto_hash(summary: &RunSummary) -> Result<String, crate::AgoraError> {
    let data = crate::formats::summary_to_bytes(summary)?;
    Ok(compute_blake3_hash(&data))
}

/// BLAKE3 hash of raw bytes, as 64 hex characters.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
