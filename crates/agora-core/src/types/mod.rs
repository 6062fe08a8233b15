//! # Core Type Definitions
//!
//! This module contains the leaf types shared by every layer of the engine:
//! - Pixel geometry (`Point`, `Region`), the opaque candidate payload
//! - Worker classification (`WorkerKind`)
//! - Error types (`AgoraError`, `IndexKind`)
//!
//! ## Determinism Guarantees
//!
//! - `Region` stores pixels in a `BTreeSet`, so iteration, serialization and
//!   unions are order-stable across runs
//! - Every type that crosses the persistence boundary implements serde

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

// =============================================================================
// GEOMETRY
// =============================================================================

/// A single pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A set of pixels.
///
/// Regions are the payload of every candidate and of every combined matched
/// result. The engine never looks inside them beyond the set operations
/// below; producing them is the job of segmentation workers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Region {
    pixels: BTreeSet<Point>,
}

impl Region {
    /// Create an empty region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a region from any collection of points. Duplicates collapse.
    #[must_use]
    pub fn from_pixels(pixels: impl IntoIterator<Item = Point>) -> Self {
        Self {
            pixels: pixels.into_iter().collect(),
        }
    }

    /// Axis-aligned rectangle covering `[x0, x1) x [y0, y1)`.
    ///
    /// An inverted or zero-sized rectangle yields an empty region.
    #[must_use]
    pub fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let mut pixels = BTreeSet::new();
        for y in y0..y1 {
            for x in x0..x1 {
                pixels.insert(Point::new(x, y));
            }
        }
        Self { pixels }
    }

    /// Like [`Region::rect`], but refuses rectangles whose area exceeds
    /// [`MAX_REGION_AREA`](crate::primitives::MAX_REGION_AREA).
    pub fn try_rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Result<Self, AgoraError> {
        let width = (i64::from(x1) - i64::from(x0)).max(0);
        let height = (i64::from(y1) - i64::from(y0)).max(0);
        let area = width.saturating_mul(height);
        if usize::try_from(area).map_or(true, |a| a > crate::primitives::MAX_REGION_AREA) {
            return Err(AgoraError::InvalidModel(format!(
                "rectangle {},{},{},{} covers {} pixels, limit is {}",
                x0,
                y0,
                x1,
                y1,
                area,
                crate::primitives::MAX_REGION_AREA
            )));
        }
        Ok(Self::rect(x0, y0, x1, y1))
    }

    /// Number of pixels.
    #[must_use]
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Iterate pixels in deterministic order (by `x`, then `y`).
    pub fn pixels(&self) -> impl Iterator<Item = &Point> {
        self.pixels.iter()
    }

    #[must_use]
    pub fn contains(&self, point: &Point) -> bool {
        self.pixels.contains(point)
    }

    /// Add every pixel of `other` to this region.
    pub fn extend(&mut self, other: &Region) {
        self.pixels.extend(other.pixels.iter().copied());
    }

    /// Union of two regions.
    #[must_use]
    pub fn union(&self, other: &Region) -> Region {
        let mut result = self.clone();
        result.extend(other);
        result
    }

    /// Number of pixels shared with `other`.
    #[must_use]
    pub fn intersection_area(&self, other: &Region) -> usize {
        let (small, large) = if self.area() <= other.area() {
            (self, other)
        } else {
            (other, self)
        };
        small.pixels.iter().filter(|p| large.contains(p)).count()
    }

    #[must_use]
    pub fn intersects(&self, other: &Region) -> bool {
        let (small, large) = if self.area() <= other.area() {
            (self, other)
        } else {
            (other, self)
        };
        small.pixels.iter().any(|p| large.contains(p))
    }

    /// Mean pixel position, or `None` for an empty region.
    #[must_use]
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.pixels.is_empty() {
            return None;
        }
        let (sx, sy) = self
            .pixels
            .iter()
            .fold((0.0_f64, 0.0_f64), |(sx, sy), p| {
                (sx + f64::from(p.x), sy + f64::from(p.y))
            });
        let n = self.pixels.len() as f64;
        Some((sx / n, sy / n))
    }
}

// =============================================================================
// WORKER KIND
// =============================================================================

/// Classification of a worker, recorded on every activation.
///
/// History queries match on kind as well as name, so a plugin may reuse a
/// built-in name under a different kind without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Forms groups from bidirectional relationships.
    Grouping,
    /// Moves the `next_group` / `next_entity` cursors.
    Scheduling,
    /// Produces candidates for an entity.
    Segmentation,
    /// Scores candidates and group candidates.
    Confidence,
    /// Commits group candidates as matches.
    Matching,
    /// Releases candidate memory.
    Memory,
}

impl WorkerKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Grouping => "grouping",
            WorkerKind::Scheduling => "scheduling",
            WorkerKind::Segmentation => "segmentation",
            WorkerKind::Confidence => "confidence",
            WorkerKind::Matching => "matching",
            WorkerKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// The collection an invalid index was used against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Entity,
    Group,
    Candidate,
    Attribute,
    GroupCandidate,
    Member,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexKind::Entity => "entity",
            IndexKind::Group => "group",
            IndexKind::Candidate => "candidate",
            IndexKind::Attribute => "attribute",
            IndexKind::GroupCandidate => "group candidate",
            IndexKind::Member => "group member",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the Agora engine.
///
/// - No silent failures, no clamping of bad indices
/// - Model and programmer errors surface immediately (fail fast)
/// - Empty scheduling states are not errors and never produce one
#[derive(Debug, Error)]
pub enum AgoraError {
    /// An entity, group, candidate, attribute or member index is invalid.
    #[error("{kind} index {index} out of range (len {len})")]
    IndexOutOfRange {
        kind: IndexKind,
        index: usize,
        len: usize,
    },

    /// A relationship names an entity the model does not define.
    #[error("Entity '{entity}' references unknown entity '{target}'")]
    MissingDependency { entity: String, target: String },

    /// A message was appended while the activation history is empty.
    #[error("No activation record to append to")]
    NoActivationHistory,

    /// Grouping found a relationship to a non-existent entity.
    #[error("Unresolvable model: {0}")]
    UnresolvableModel(String),

    /// No entity carries the requested name.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Entity names are unique keys.
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    /// A feature attribute names an evaluator nobody registered.
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// The model description is structurally invalid.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// The scheduler hit its configured activation cap.
    #[error("Activation limit of {0} reached before fixpoint")]
    ActivationLimit(usize),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl AgoraError {
    pub(crate) fn out_of_range(kind: IndexKind, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { kind, index, len }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_area_and_bounds() {
        let r = Region::rect(0, 0, 3, 2);
        assert_eq!(r.area(), 6);
        assert!(r.contains(&Point::new(2, 1)));
        assert!(!r.contains(&Point::new(3, 1)));
        assert!(Region::rect(2, 2, 1, 5).is_empty());
    }

    #[test]
    fn try_rect_refuses_oversized_area() {
        assert_eq!(Region::try_rect(0, 0, 3, 2).ok(), Some(Region::rect(0, 0, 3, 2)));
        assert!(Region::try_rect(5, 5, 0, 0).is_ok_and(|r| r.is_empty()));
        assert!(matches!(
            Region::try_rect(0, 0, 2_000_000, 2_000_000),
            Err(AgoraError::InvalidModel(_))
        ));
        assert!(matches!(
            Region::try_rect(i32::MIN, i32::MIN, i32::MAX, i32::MAX),
            Err(AgoraError::InvalidModel(_))
        ));
    }

    #[test]
    fn union_and_intersection() {
        let a = Region::rect(0, 0, 4, 4);
        let b = Region::rect(2, 2, 6, 6);
        assert_eq!(a.intersection_area(&b), 4);
        assert_eq!(a.union(&b).area(), 28);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&Region::rect(10, 10, 11, 11)));
    }

    #[test]
    fn centroid_of_rect() {
        let r = Region::rect(0, 0, 3, 3);
        assert_eq!(r.centroid(), Some((1.0, 1.0)));
        assert_eq!(Region::new().centroid(), None);
    }

    #[test]
    fn error_messages_name_the_collection() {
        let err = AgoraError::out_of_range(IndexKind::GroupCandidate, 7, 3);
        assert_eq!(err.to_string(), "group candidate index 7 out of range (len 3)");
    }
}
