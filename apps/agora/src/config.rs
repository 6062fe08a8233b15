//! # Configuration
//!
//! `agora.toml`: scheduler limits and board-wide default paths.
//!
//! ```toml
//! [scheduler]
//! max_activations = 50000     # 0 runs until fixpoint
//! activation_deadline_ms = 250
//!
//! [paths]
//! roi_dir = "rois"
//! ```
//!
//! Every key is optional. Paths in a model file win over paths here.

use agora_core::primitives::DEFAULT_MAX_ACTIVATIONS;
use agora_core::{AgoraError, IoPaths, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "agora.toml";

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub max_activations: usize,
    pub activation_deadline_ms: Option<u64>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_activations: DEFAULT_MAX_ACTIVATIONS,
            activation_deadline_ms: None,
        }
    }
}

/// Contents of `agora.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgoraConfig {
    pub scheduler: SchedulerSection,
    pub paths: IoPaths,
}

impl AgoraConfig {
    /// Load config from file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgoraError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| {
            AgoraError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(AgoraError::IoError(format!(
                "Config '{}' exceeds {} bytes",
                path.display(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgoraError::IoError(format!("Read config: {}", e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, AgoraError> {
        toml::from_str(content)
            .map_err(|e| AgoraError::DeserializationError(format!("Config: {}", e)))
    }

    /// An explicit path must exist. Without one, `agora.toml` in the working
    /// directory is used when present, defaults otherwise.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, AgoraError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(fallback)
                } else {
                    tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_activations: (self.scheduler.max_activations > 0)
                .then_some(self.scheduler.max_activations),
            activation_deadline: self
                .scheduler
                .activation_deadline_ms
                .map(Duration::from_millis),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
