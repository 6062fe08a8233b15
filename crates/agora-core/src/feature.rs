//! # Features
//!
//! Feature evaluation and fuzzy confidence for candidate scoring.
//!
//! A feature attribute names an evaluator and a trapezoidal membership
//! function. The evaluator turns a candidate region (plus the regions of the
//! attribute's related entities) into a number; the membership function turns
//! that number into a confidence in `[0, 1]`.
//!
//! Evaluators are plugins. `FeatureRegistry::with_builtins()` carries the
//! geometric ones the engine ships with.

use crate::candidate::Score;
use crate::{AgoraError, Region};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// FUZZY MEMBERSHIP
// =============================================================================

/// Trapezoidal membership function `[a, b, c, d]`.
///
/// ```text
/// 1 |      b______c
///   |     /        \
/// 0 |____a          d____
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Membership {
    points: [f64; 4],
}

impl Membership {
    /// Create a validated trapezoid.
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Result<Self, AgoraError> {
        let membership = Self {
            points: [a, b, c, d],
        };
        membership.validate()?;
        Ok(membership)
    }

    /// A membership that maps every finite value to full confidence.
    #[must_use]
    pub fn plateau() -> Self {
        Self {
            points: [f64::MIN, f64::MIN, f64::MAX, f64::MAX],
        }
    }

    #[must_use]
    pub fn points(&self) -> [f64; 4] {
        self.points
    }

    /// Points must be finite and non-decreasing.
    pub fn validate(&self) -> Result<(), AgoraError> {
        if self.points.iter().any(|p| !p.is_finite()) {
            return Err(AgoraError::InvalidModel(format!(
                "membership points must be finite: {:?}",
                self.points
            )));
        }
        if self.points.windows(2).any(|w| w[0] > w[1]) {
            return Err(AgoraError::InvalidModel(format!(
                "membership points must be non-decreasing: {:?}",
                self.points
            )));
        }
        Ok(())
    }

    /// Degree of membership of `value`. NaN maps to 0.
    #[must_use]
    pub fn confidence(&self, value: f64) -> f64 {
        let [a, b, c, d] = self.points;
        if value.is_nan() || value < a || value > d {
            return 0.0;
        }
        if value >= b && value <= c {
            return 1.0;
        }
        if value < b {
            (value - a) / (b - a)
        } else {
            (d - value) / (d - c)
        }
    }
}

/// The feature half of a feature attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Registered evaluator name.
    pub feature: String,
    pub membership: Membership,
}

impl FeatureSpec {
    #[must_use]
    pub fn new(feature: impl Into<String>, membership: Membership) -> Self {
        Self {
            feature: feature.into(),
            membership,
        }
    }
}

// =============================================================================
// EVALUATOR TRAIT
// =============================================================================

/// Computes a feature value for a candidate region.
///
/// `related` holds one region per relationship of the attribute, in
/// declaration order. Returning `None` means the value cannot be computed for
/// this input; the candidate then scores confidence 0.
pub trait FeatureEvaluator {
    fn name(&self) -> &str;

    fn evaluate(&self, subject: &Region, related: &[&Region]) -> Option<f64>;

    /// Minimum number of relationships an attribute using this feature needs.
    fn min_related(&self) -> usize {
        0
    }
}

fn union_of(related: &[&Region]) -> Region {
    let mut merged = Region::new();
    for region in related {
        merged.extend(region);
    }
    merged
}

/// Pixel count of the candidate.
pub struct AreaFeature;

impl FeatureEvaluator for AreaFeature {
    fn name(&self) -> &str {
        "area"
    }

    fn evaluate(&self, subject: &Region, _related: &[&Region]) -> Option<f64> {
        Some(subject.area() as f64)
    }
}

/// Euclidean distance between the candidate centroid and the centroid of the
/// related regions.
pub struct CentroidDistanceFeature;

impl FeatureEvaluator for CentroidDistanceFeature {
    fn name(&self) -> &str {
        "centroid_distance"
    }

    fn evaluate(&self, subject: &Region, related: &[&Region]) -> Option<f64> {
        let (sx, sy) = subject.centroid()?;
        let (rx, ry) = union_of(related).centroid()?;
        Some((sx - rx).hypot(sy - ry))
    }

    fn min_related(&self) -> usize {
        1
    }
}

/// Fraction of the candidate lying inside the related regions.
pub struct OverlapFeature;

impl FeatureEvaluator for OverlapFeature {
    fn name(&self) -> &str {
        "overlap"
    }

    fn evaluate(&self, subject: &Region, related: &[&Region]) -> Option<f64> {
        if subject.is_empty() {
            return None;
        }
        let shared = subject.intersection_area(&union_of(related));
        Some(shared as f64 / subject.area() as f64)
    }

    fn min_related(&self) -> usize {
        1
    }
}

/// Candidate area divided by the related regions' area.
pub struct RelativeAreaFeature;

impl FeatureEvaluator for RelativeAreaFeature {
    fn name(&self) -> &str {
        "relative_area"
    }

    fn evaluate(&self, subject: &Region, related: &[&Region]) -> Option<f64> {
        let reference = union_of(related).area();
        if reference == 0 {
            return None;
        }
        Some(subject.area() as f64 / reference as f64)
    }

    fn min_related(&self) -> usize {
        1
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Named feature evaluators available to the confidence workers.
#[derive(Default)]
pub struct FeatureRegistry {
    evaluators: BTreeMap<String, Box<dyn FeatureEvaluator>>,
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("evaluators", &self.evaluators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FeatureRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `area`, `centroid_distance`, `overlap` and
    /// `relative_area`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(AreaFeature));
        registry.register(Box::new(CentroidDistanceFeature));
        registry.register(Box::new(OverlapFeature));
        registry.register(Box::new(RelativeAreaFeature));
        registry
    }

    /// Register an evaluator, replacing any previous one with the same name.
    pub fn register(&mut self, evaluator: Box<dyn FeatureEvaluator>) {
        self.evaluators
            .insert(evaluator.name().to_string(), evaluator);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn FeatureEvaluator> {
        self.evaluators.get(name).map(|e| e.as_ref())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.evaluators.keys().map(String::as_str)
    }

    /// Evaluate `spec` on `subject` and map the value through its membership.
    pub fn score(
        &self,
        spec: &FeatureSpec,
        subject: &Region,
        related: &[&Region],
    ) -> Result<Score, AgoraError> {
        let evaluator = self
            .get(&spec.feature)
            .ok_or_else(|| AgoraError::UnknownFeature(spec.feature.clone()))?;
        let value = evaluator.evaluate(subject, related);
        let confidence = value.map_or(0.0, |v| spec.membership.confidence(v));
        Ok(Score::new(value, confidence))
    }
}

// =============================================================================
// TESTS
// =============================================================================
