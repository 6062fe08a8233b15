//! # Attributes
//!
//! Typed, model-declared capabilities attached to an entity.
//!
//! An attribute is owned by exactly one entity. It carries zero or more
//! relationships to other entities (by name and resolved index) and two
//! flags:
//! - `essential`: an unresolved target forces the worst outcome
//!   (confidence 0, priority 0) instead of being ignored
//! - `bidirectional`: the relationship clusters both endpoints into one group
//!
//! The engine interprets `Feature`, the three dependency `SegParam`s,
//! `ConfidenceThreshold` and `MemParam::Retain`. Everything else is passed
//! through untouched to segmentation workers.

use crate::feature::FeatureSpec;
use serde::{Deserialize, Serialize};

// =============================================================================
// RELATIONSHIPS
// =============================================================================

/// A reference from an attribute to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Name of the target entity as written in the model.
    pub name: String,
    /// Index of the target entity on the board.
    pub index: usize,
}

impl Relation {
    #[must_use]
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

/// Relationship kinds that make one entity's candidates an input to another.
///
/// While an unmatched entity depends on a target through one of these, the
/// target's candidates must stay in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    SameCandidatesAs,
    RegionGrowingSeed,
    AdditionalCandidates,
}

// =============================================================================
// ATTRIBUTE KINDS
// =============================================================================

/// Search-area rules, evaluated by segmentation workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchAreaRule {
    Whole,
    Inside,
    Outside,
    Near {
        distance: f64,
    },
    Custom {
        name: String,
        #[serde(default)]
        params: Vec<f64>,
    },
}

/// Segmentation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegParam {
    /// Use the target's candidates instead of generating new ones.
    SameCandidatesAs,
    /// Grow regions from the target's candidates.
    RegionGrowingSeed,
    /// Append the target's candidates to the generated ones.
    AdditionalCandidates,
    /// Intensity window for threshold-based segmenters.
    Threshold { lower: f64, upper: f64 },
    /// Commit every group candidate above `threshold` instead of only the best.
    ConfidenceThreshold { threshold: f64 },
    Custom {
        name: String,
        #[serde(default)]
        params: Vec<f64>,
    },
}

/// Memory-management hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemParam {
    /// Never free this entity's candidates.
    Retain,
}

/// The capability an attribute declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    SearchArea { rule: SearchAreaRule },
    SegParam { param: SegParam },
    MemParam { param: MemParam },
    Feature(FeatureSpec),
}

impl AttributeKind {
    /// Short lowercase label used in summaries and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            AttributeKind::SearchArea { .. } => "search_area",
            AttributeKind::SegParam { .. } => "seg_param",
            AttributeKind::MemParam { .. } => "mem_param",
            AttributeKind::Feature(_) => "feature",
        }
    }
}

// =============================================================================
// ATTRIBUTE
// =============================================================================

/// A typed capability of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
    relations: Vec<Relation>,
    essential: bool,
    bidirectional: bool,
}

impl Attribute {
    /// Create an attribute without relationships or flags.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            relations: Vec::new(),
            essential: false,
            bidirectional: false,
        }
    }

    /// Add a relationship to the entity at `index`.
    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>, index: usize) -> Self {
        self.relations.push(Relation::new(name, index));
        self
    }

    /// Mark the attribute's relationships as essential.
    #[must_use]
    pub fn as_essential(mut self) -> Self {
        self.essential = true;
        self
    }

    /// Mark the attribute's relationships as clustering edges.
    #[must_use]
    pub fn as_bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Indices of every related entity, in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = usize> + '_ {
        self.relations.iter().map(|r| r.index)
    }

    #[must_use]
    pub fn is_essential(&self) -> bool {
        self.essential
    }

    #[must_use]
    pub fn is_bidirectional(&self) -> bool {
        self.bidirectional
    }

    /// The feature this attribute scores, if it is a feature attribute.
    #[must_use]
    pub fn feature(&self) -> Option<&FeatureSpec> {
        match &self.kind {
            AttributeKind::Feature(spec) => Some(spec),
            _ => None,
        }
    }

    /// The candidate dependency this attribute declares, if any.
    #[must_use]
    pub fn dependency_kind(&self) -> Option<DependencyKind> {
        match &self.kind {
            AttributeKind::SegParam { param } => match param {
                SegParam::SameCandidatesAs => Some(DependencyKind::SameCandidatesAs),
                SegParam::RegionGrowingSeed => Some(DependencyKind::RegionGrowingSeed),
                SegParam::AdditionalCandidates => Some(DependencyKind::AdditionalCandidates),
                _ => None,
            },
            _ => None,
        }
    }

    /// The multi-match threshold, if this attribute declares one.
    #[must_use]
    pub fn confidence_threshold(&self) -> Option<f64> {
        match &self.kind {
            AttributeKind::SegParam {
                param: SegParam::ConfidenceThreshold { threshold },
            } => Some(*threshold),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_retain(&self) -> bool {
        matches!(
            self.kind,
            AttributeKind::MemParam {
                param: MemParam::Retain
            }
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Membership;

    #[test]
    fn builder_sets_flags_and_relations() {
        let attr = Attribute::new(
            "seed",
            AttributeKind::SegParam {
                param: SegParam::RegionGrowingSeed,
            },
        )
        .with_relation("A", 0)
        .as_essential();

        assert!(attr.is_essential());
        assert!(!attr.is_bidirectional());
        assert_eq!(attr.targets().collect::<Vec<_>>(), vec![0]);
        assert_eq!(
            attr.dependency_kind(),
            Some(DependencyKind::RegionGrowingSeed)
        );
    }

    #[test]
    fn policy_accessors() {
        let threshold = Attribute::new(
            "multi",
            AttributeKind::SegParam {
                param: SegParam::ConfidenceThreshold { threshold: 0.5 },
            },
        );
        assert_eq!(threshold.confidence_threshold(), Some(0.5));
        assert!(threshold.dependency_kind().is_none());

        let retain = Attribute::new(
            "keep",
            AttributeKind::MemParam {
                param: MemParam::Retain,
            },
        );
        assert!(retain.is_retain());

        let feature = Attribute::new(
            "size",
            AttributeKind::Feature(FeatureSpec::new("area", Membership::plateau())),
        );
        assert_eq!(feature.feature().map(|f| f.feature.as_str()), Some("area"));
        assert_eq!(feature.kind().label(), "feature");
    }
}
