//! Tracker settings, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    core::goal::{DEFAULT_GOAL_GRAMS, Goal},
    entry::{EditTimestampPolicy, ImageLimits},
    error::ValidationError,
    persist::StorageKeys,
    runtime::handle::RuntimeConfig,
};

/// Why a config could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// `default_goal` is not a valid goal.
    #[error("invalid default goal: {0}")]
    Invalid(#[from] ValidationError),
}

/// Every field is optional in the file and falls back to its default.
///
/// ```toml
/// default_goal = 140
/// edit_timestamp = "follow_target_date"
///
/// [image]
/// max_dimension = 800
///
/// [runtime]
/// persist_queue_bound = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Goal used until the user sets one.
    pub default_goal: u32,
    /// Storage key of the meal collection.
    pub meals_key: String,
    /// Storage key of the goal.
    pub goal_key: String,
    /// How edits treat a changed target date.
    pub edit_timestamp: EditTimestampPolicy,
    /// Image preprocessing bounds.
    pub image: ImageLimits,
    /// Runtime channel sizes.
    pub runtime: RuntimeConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let keys = StorageKeys::default();
        Self {
            default_goal: DEFAULT_GOAL_GRAMS,
            meals_key: keys.meals,
            goal_key: keys.goal,
            edit_timestamp: EditTimestampPolicy::default(),
            image: ImageLimits::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        // Reject a zero goal at load time rather than at first use.
        config.default_goal()?;
        debug!(?config, "tracker config parsed");
        Ok(config)
    }

    /// `default_goal` as a validated [`Goal`].
    pub fn default_goal(&self) -> Result<Goal, ValidationError> {
        Goal::new(self.default_goal)
    }

    /// Keys under which state is persisted.
    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys {
            meals: self.meals_key.clone(),
            goal: self.goal_key.clone(),
        }
    }
}

/// Reads and parses a TOML config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrackerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    debug!(path = %path.as_ref().display(), "loading tracker config");
    TrackerConfig::from_toml_str(&contents)
}
