//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Agora engine.
//!
//! These are compiled into the binary and are immutable at runtime.
//!
//! ## Score Levels
//!
//! Built-in workers report one of a few fixed eagerness levels. The levels
//! only matter relative to each other: the control chain (grouping,
//! confidence, matching, reclamation) outranks group selection, which
//! outranks segmentation, which outranks the entity round-robin.

/// Score of a control worker whose precondition just became true.
pub const SCORE_URGENT: f64 = 1.0;

/// Score of the next-group worker.
pub const SCORE_SELECT: f64 = 0.9;

/// Score of a segmentation worker that has an entity to work on.
pub const SCORE_SEGMENT: f64 = 0.5;

/// Score of the next-entity round-robin.
pub const SCORE_ADVANCE: f64 = 0.2;

/// Priority of a fully processed group.
pub const TERMINAL_PRIORITY: f64 = -1.0;

/// Upper bound of a group priority.
pub const MAX_PRIORITY: f64 = 1.0;

/// Confidence of a candidate (or group candidate) before any score is set.
pub const FULL_CONFIDENCE: f64 = 1.0;

/// Default cap on scheduler activations.
///
/// The built-in workers reach a fixpoint long before this on any finite
/// model; the cap catches misbehaving plugin workers.
pub const DEFAULT_MAX_ACTIVATIONS: usize = 100_000;

/// Magic bytes for the binary run summary header.
///
/// - File Header = Magic Bytes ("AGRS") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"AGRS";

/// Current summary format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for entity and attribute names.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum number of entities in a model.
pub const MAX_ENTITIES: usize = 10_000;

/// Maximum number of group candidates a single group may enumerate.
///
/// The cross product grows multiplicatively with group size; past this the
/// formation worker refuses instead of exhausting memory.
pub const MAX_GROUP_CANDIDATES: usize = 1_000_000;

/// Maximum pixel count of a region built from untrusted bounds.
///
/// Regions are explicit pixel sets, so a rectangle costs memory in
/// proportion to its area. 4096 x 4096.
pub const MAX_REGION_AREA: usize = 16_777_216;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_levels_are_ordered() {
        assert!(SCORE_URGENT > SCORE_SELECT);
        assert!(SCORE_SELECT > SCORE_SEGMENT);
        assert!(SCORE_SEGMENT > SCORE_ADVANCE);
        assert!(SCORE_ADVANCE > 0.0);
    }

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"AGRS");
    }
}
