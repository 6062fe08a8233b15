//! # agora-core
//!
//! The opportunistic control engine for Agora - THE BOARD.
//!
//! A board holds named target entities described by a model. Workers
//! (knowledge sources) compete for control on every cycle; the scheduler
//! activates the most eager one, records the activation and repeats until no
//! worker has anything left to do.
//!
//! ## Layers
//!
//! - `types`, `attribute`, `feature`: leaf data and fuzzy scoring
//! - `candidate`, `entity`, `group`: hypotheses and their aggregation
//! - `board`, `model`, `grouping`: the shared workspace and how it is built
//! - `worker`, `scheduler`, `workers`: the control loop and built-in workers
//! - `export`, `formats`, `storage`: summaries, their encoding and archive
//!
//! ## Architectural Constraints
//!
//! - Single-threaded: the scheduler owns the board, one worker runs at a time
//! - Deterministic: `BTreeMap`/`BTreeSet` ordering, first-registered wins ties
//! - Pixel-level segmentation stays outside; regions arrive through
//!   `CandidateSource` and features through `FeatureEvaluator`
//! - No async, no network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod attribute;
pub mod board;
pub mod candidate;
pub mod entity;
pub mod export;
pub mod feature;
pub mod formats;
pub mod group;
pub mod grouping;
pub mod model;
pub mod primitives;
pub mod scheduler;
pub mod storage;
pub mod types;
pub mod worker;
pub mod workers;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{AgoraError, IndexKind, Point, Region, WorkerKind};

// =============================================================================
// RE-EXPORTS: Data Model
// =============================================================================

pub use attribute::{
    Attribute, AttributeKind, DependencyKind, MemParam, Relation, SearchAreaRule, SegParam,
};
pub use board::{ActivationRecord, Board};
pub use candidate::{Candidate, GroupCandidate, Score};
pub use entity::Entity;
pub use feature::{FeatureEvaluator, FeatureRegistry, FeatureSpec, Membership};
pub use group::Group;
pub use grouping::form_groups;
pub use model::{AttributeSpec, EntitySpec, IoPaths, ModelSpec};

// =============================================================================
// RE-EXPORTS: Control
// =============================================================================

pub use scheduler::{RunReport, Scheduler, SchedulerConfig, Step};
pub use worker::Worker;
pub use workers::{CandidateSource, DependencyIndex, FreeOutcome, StaticCandidates, free_candidates};

// =============================================================================
// RE-EXPORTS: Export & Storage
// =============================================================================

pub use export::{RunMetrics, RunSummary};
#[cfg(feature = "crypto-hash")]
pub use export::{compute_blake3_hash, summary_crypto_hash};
pub use formats::{summary_from_bytes, summary_to_bytes};
pub use storage::RunArchive;
