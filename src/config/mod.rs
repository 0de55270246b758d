//! Configuration for the deployment core
//!
//! Handles configuration loading and the runtime knobs that select the
//! startup-barrier mode and the redeployment conflict policy.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::deploy::traits::DeployError;

/// Environment override for [`DeployConfig::expected_unit_count`].
pub const EXPECTED_UNITS_ENV: &str = "BUNDLE_HOST_EXPECTED_UNITS";

/// Environment override for [`DeployConfig::ignore_redeploy_conflicts`].
pub const IGNORE_REDEPLOY_ENV: &str = "BUNDLE_HOST_IGNORE_REDEPLOY";

/// Deployment core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Number of units expected in the startup cohort.
    ///
    /// When unset, cohort completion is inferred by exhaustion of the
    /// pending set instead.
    #[serde(default)]
    pub expected_unit_count: Option<u64>,

    /// Tolerate duplicate descriptor registration during redeployment.
    ///
    /// When set, a duplicate registration is logged and ignored; the first
    /// registration stays installed either way.
    #[serde(default)]
    pub ignore_redeploy_conflicts: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            expected_unit_count: None,
            ignore_redeploy_conflicts: false,
        }
    }
}

impl DeployConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, DeployError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DeployError::InvalidConfig(format!("failed to read config file: {}", e)))?;
        toml::from_str(&contents)
            .map_err(|e| DeployError::InvalidConfig(format!("failed to parse config TOML: {}", e)))
    }

    /// Apply environment overrides for the runtime knobs.
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(
            std::env::var(EXPECTED_UNITS_ENV).ok().as_deref(),
            std::env::var(IGNORE_REDEPLOY_ENV).ok().as_deref(),
        )
    }

    fn apply_overrides(mut self, expected: Option<&str>, ignore: Option<&str>) -> Self {
        if let Some(value) = expected {
            match value.parse::<u64>() {
                Ok(count) => self.expected_unit_count = Some(count),
                Err(_) => warn!("ignoring invalid {}: {}", EXPECTED_UNITS_ENV, value),
            }
        }
        if let Some(value) = ignore {
            match value.parse::<bool>() {
                Ok(flag) => self.ignore_redeploy_conflicts = flag,
                Err(_) => warn!("ignoring invalid {}: {}", IGNORE_REDEPLOY_ENV, value),
            }
        }
        self
    }
}
