//! # Model Description
//!
//! The structured description a board is loaded from.
//!
//! A model lists entities, their attributes and relationships (by entity
//! name), plus optional I/O path defaults and per-entity overrides. It is
//! plain serde data; the binary reads it from TOML:
//!
//! ```toml
//! [paths]
//! roi_dir = "rois"
//!
//! [[entity]]
//! name = "kidney"
//!
//! [[entity.attribute]]
//! name = "size"
//! kind = "feature"
//! feature = "area"
//! membership = [10.0, 50.0, 500.0, 900.0]
//! ```
//!
//! `ModelSpec::build` resolves every name into an index and validates the
//! whole description before a board exists. A model that builds never
//! produces an `UnresolvableModel` later.

use crate::attribute::{Attribute, AttributeKind, SegParam};
use crate::board::Board;
use crate::feature::FeatureRegistry;
use crate::primitives::{MAX_ENTITIES, MAX_NAME_LENGTH};
use crate::AgoraError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// I/O PATHS
// =============================================================================

/// Filesystem locations handed to segmentation workers.
///
/// The engine does not read any of these itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoPaths {
    pub input_image: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub roi_dir: Option<PathBuf>,
    pub edm_dir: Option<PathBuf>,
}

impl IoPaths {
    /// `self` with every path set in `overrides` replaced.
    #[must_use]
    pub fn overlay(&self, overrides: &IoPaths) -> IoPaths {
        IoPaths {
            input_image: overrides
                .input_image
                .clone()
                .or_else(|| self.input_image.clone()),
            work_dir: overrides.work_dir.clone().or_else(|| self.work_dir.clone()),
            roi_dir: overrides.roi_dir.clone().or_else(|| self.roi_dir.clone()),
            edm_dir: overrides.edm_dir.clone().or_else(|| self.edm_dir.clone()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_image.is_none()
            && self.work_dir.is_none()
            && self.roi_dir.is_none()
            && self.edm_dir.is_none()
    }
}

// =============================================================================
// MODEL SPEC
// =============================================================================

/// A whole model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Board-wide path defaults.
    #[serde(default)]
    pub paths: IoPaths,
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntitySpec>,
}

/// One entity of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeSpec>,
    /// Overrides for the board-wide paths.
    #[serde(default)]
    pub paths: IoPaths,
}

/// One attribute of a model entity. Relationships are entity names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: AttributeKind,
    #[serde(default)]
    pub relations: Vec<String>,
    #[serde(default)]
    pub essential: bool,
    #[serde(default)]
    pub bidirectional: bool,
}

impl ModelSpec {
    /// Validate the model and load it into a fresh board.
    ///
    /// # Errors
    ///
    /// - `InvalidModel` for bad names, limits, memberships or thresholds
    /// - `DuplicateEntity` when two entities share a name
    /// - `MissingDependency` when a relationship names an unknown entity
    /// - `UnknownFeature` when a feature is not in `features`
    pub fn build(&self, features: &FeatureRegistry) -> Result<Board, AgoraError> {
        if self.entities.len() > MAX_ENTITIES {
            return Err(AgoraError::InvalidModel(format!(
                "{} entities exceeds the limit of {}",
                self.entities.len(),
                MAX_ENTITIES
            )));
        }

        let mut board = Board::new();
        board.set_paths(self.paths.clone());

        // Names first, so relationships may point forward.
        for spec in &self.entities {
            validate_name("entity", &spec.name)?;
            let index = board.add_entity(&spec.name)?;
            board.entity_mut(index)?.set_paths(spec.paths.clone());
        }

        for (index, spec) in self.entities.iter().enumerate() {
            for attribute in &spec.attributes {
                let built = build_attribute(&board, &spec.name, attribute, features)?;
                board.entity_mut(index)?.add_attribute(built)?;
            }
        }

        tracing::debug!(
            entities = board.entity_count(),
            "model loaded into board"
        );
        Ok(board)
    }
}

fn validate_name(what: &str, name: &str) -> Result<(), AgoraError> {
    if name.trim().is_empty() {
        return Err(AgoraError::InvalidModel(format!("{what} name is empty")));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(AgoraError::InvalidModel(format!(
            "{what} name exceeds {MAX_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

fn build_attribute(
    board: &Board,
    owner: &str,
    spec: &AttributeSpec,
    features: &FeatureRegistry,
) -> Result<Attribute, AgoraError> {
    validate_name("attribute", &spec.name)?;

    let mut attribute = Attribute::new(&spec.name, spec.kind.clone());
    for target in &spec.relations {
        let index = board
            .entity_index(target)
            .ok_or_else(|| AgoraError::MissingDependency {
                entity: owner.to_string(),
                target: target.clone(),
            })?;
        attribute = attribute.with_relation(target, index);
    }
    if spec.essential {
        attribute = attribute.as_essential();
    }
    if spec.bidirectional {
        attribute = attribute.as_bidirectional();
    }

    match &spec.kind {
        AttributeKind::Feature(feature) => {
            let evaluator = features
                .get(&feature.feature)
                .ok_or_else(|| AgoraError::UnknownFeature(feature.feature.clone()))?;
            feature.membership.validate()?;
            if spec.relations.len() < evaluator.min_related() {
                return Err(AgoraError::InvalidModel(format!(
                    "{owner}.{}: feature '{}' needs at least {} relationship(s)",
                    spec.name,
                    feature.feature,
                    evaluator.min_related()
                )));
            }
        }
        AttributeKind::SegParam {
            param: SegParam::ConfidenceThreshold { threshold },
        } => {
            if !(0.0..=1.0).contains(threshold) {
                return Err(AgoraError::InvalidModel(format!(
                    "{owner}.{}: confidence threshold {threshold} outside [0, 1]",
                    spec.name
                )));
            }
        }
        AttributeKind::SegParam {
            param: SegParam::Threshold { lower, upper },
        } => {
            if lower > upper {
                return Err(AgoraError::InvalidModel(format!(
                    "{owner}.{}: threshold window [{lower}, {upper}] is inverted",
                    spec.name
                )));
            }
        }
        _ => {}
    }

    if attribute.dependency_kind().is_some() && spec.relations.is_empty() {
        return Err(AgoraError::InvalidModel(format!(
            "{owner}.{}: dependency attribute has no target",
            spec.name
        )));
    }

    Ok(attribute)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureSpec, Membership};

    fn feature(name: &str, relations: &[&str]) -> AttributeSpec {
        AttributeSpec {
            name: name.to_string(),
            kind: AttributeKind::Feature(FeatureSpec::new("centroid_distance", Membership::plateau())),
            relations: relations.iter().map(|r| (*r).to_string()).collect(),
            essential: false,
            bidirectional: true,
        }
    }

    fn entity(name: &str, attributes: Vec<AttributeSpec>) -> EntitySpec {
        EntitySpec {
            name: name.to_string(),
            attributes,
            paths: IoPaths::default(),
        }
    }

    #[test]
    fn overlay_prefers_overrides() {
        let defaults = IoPaths {
            roi_dir: Some("rois".into()),
            work_dir: Some("work".into()),
            ..IoPaths::default()
        };
        let overrides = IoPaths {
            roi_dir: Some("special".into()),
            ..IoPaths::default()
        };
        let merged = defaults.overlay(&overrides);
        assert_eq!(merged.roi_dir, Some("special".into()));
        assert_eq!(merged.work_dir, Some("work".into()));
        assert!(IoPaths::default().is_empty());
    }

    #[test]
    fn build_resolves_forward_references() {
        let model = ModelSpec {
            paths: IoPaths::default(),
            entities: vec![entity("A", vec![feature("near_b", &["B"])]), entity("B", vec![])],
        };
        let board = model.build(&FeatureRegistry::with_builtins()).expect("build");
        let attribute = board.entity(0).expect("A").attribute(0).expect("attr");
        assert_eq!(attribute.targets().collect::<Vec<_>>(), vec![1]);
        assert!(attribute.is_bidirectional());
    }

    #[test]
    fn build_rejects_unknown_target() {
        let model = ModelSpec {
            paths: IoPaths::default(),
            entities: vec![entity("A", vec![feature("near", &["ghost"])])],
        };
        assert!(matches!(
            model.build(&FeatureRegistry::with_builtins()),
            Err(AgoraError::MissingDependency { .. })
        ));
    }

    #[test]
    fn build_rejects_unknown_feature_and_missing_relations() {
        let registry = FeatureRegistry::with_builtins();

        let mut unknown = feature("f", &[]);
        unknown.kind = AttributeKind::Feature(FeatureSpec::new("texture", Membership::plateau()));
        let model = ModelSpec {
            paths: IoPaths::default(),
            entities: vec![entity("A", vec![unknown])],
        };
        assert!(matches!(model.build(&registry), Err(AgoraError::UnknownFeature(_))));

        let model = ModelSpec {
            paths: IoPaths::default(),
            entities: vec![entity("A", vec![feature("f", &[])])],
        };
        assert!(matches!(model.build(&registry), Err(AgoraError::InvalidModel(_))));
    }

    #[test]
    fn build_rejects_duplicates_and_bad_thresholds() {
        let registry = FeatureRegistry::with_builtins();
        let model = ModelSpec {
            paths: IoPaths::default(),
            entities: vec![entity("A", vec![]), entity("A", vec![])],
        };
        assert!(matches!(model.build(&registry), Err(AgoraError::DuplicateEntity(_))));

        let threshold = AttributeSpec {
            name: "multi".to_string(),
            kind: AttributeKind::SegParam {
                param: SegParam::ConfidenceThreshold { threshold: 1.5 },
            },
            relations: Vec::new(),
            essential: false,
            bidirectional: false,
        };
        let model = ModelSpec {
            paths: IoPaths::default(),
            entities: vec![entity("A", vec![threshold])],
        };
        assert!(matches!(model.build(&registry), Err(AgoraError::InvalidModel(_))));
    }

    #[test]
    fn dependency_needs_a_target() {
        let spec = AttributeSpec {
            name: "same".to_string(),
            kind: AttributeKind::SegParam {
                param: SegParam::SameCandidatesAs,
            },
            relations: Vec::new(),
            essential: false,
            bidirectional: false,
        };
        let model = ModelSpec {
            paths: IoPaths::default(),
            entities: vec![entity("A", vec![spec])],
        };
        assert!(model.build(&FeatureRegistry::with_builtins()).is_err());
    }

    #[test]
    fn toml_model_parses() {
        let text = r#"
            [paths]
            roi_dir = "rois"

            [[entity]]
            name = "A"

            [[entity.attribute]]
            name = "size"
            kind = "feature"
            feature = "area"
            membership = [1.0, 2.0, 10.0, 20.0]

            [[entity]]
            name = "B"
            paths = { roi_dir = "b_rois" }

            [[entity.attribute]]
            name = "near_a"
            kind = "feature"
            feature = "centroid_distance"
            membership = [0.0, 0.0, 5.0, 10.0]
            relations = ["A"]
            bidirectional = true

            [[entity.attribute]]
            name = "multi"
            kind = "seg_param"
            param = { type = "confidence_threshold", threshold = 0.5 }
        "#;
        let model: ModelSpec = toml::from_str(text).expect("parse");
        assert_eq!(model.entities.len(), 2);
        assert_eq!(model.entities[1].attributes.len(), 2);

        let board = model.build(&FeatureRegistry::with_builtins()).expect("build");
        assert_eq!(
            board.paths_for(1).expect("paths").roi_dir,
            Some("b_rois".into())
        );
        assert_eq!(board.entity(1).expect("B").confidence_threshold(), Some(0.5));
    }
}
