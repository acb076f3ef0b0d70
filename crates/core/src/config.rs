//! Runtime settings for a merge invocation.
//!
//! There is no configuration file. The binary assembles a [`MergeConfig`]
//! from its flags and calls [`MergeConfig::validate`] before opening the
//! repository. Embedders may also deserialize one with `serde`; omitted
//! fields take the defaults below.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;

/// Log levels accepted by [`MergeConfig::log_level`].
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Settings for one merge invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Options handed to the store's three-way merge.
    #[serde(default)]
    pub merge: MergeSettings,

    /// Minimum tracing level: trace, debug, info, warn, error, off.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            merge: MergeSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl MergeConfig {
    /// Reject values the store or the logger cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.merge.validate()?;
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log_level".into(),
                detail: format!(
                    "unknown level '{}', expected one of: {}",
                    self.log_level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        debug!(config = ?self, "configuration validated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Three-way merge options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Detect renamed files between the merge base and each side.
    #[serde(default = "default_find_renames")]
    pub find_renames: bool,

    /// Similarity percentage (0-100) above which a delete/add pair is a rename.
    #[serde(default = "default_rename_threshold")]
    pub rename_threshold: u32,
}

fn default_find_renames() -> bool {
    true
}
fn default_rename_threshold() -> u32 {
    50
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            find_renames: default_find_renames(),
            rename_threshold: default_rename_threshold(),
        }
    }
}

impl MergeSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rename_threshold > 100 {
            return Err(ConfigError::InvalidValue {
                field: "merge.rename_threshold".into(),
                detail: format!("{} is not between 0 and 100", self.rename_threshold),
            });
        }
        Ok(())
    }
}
