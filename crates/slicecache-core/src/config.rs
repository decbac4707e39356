//! Planner and dispatch tuning, loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid config.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

///
/// SliceCacheConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SliceCacheConfig {
    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl SliceCacheConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.max_concurrent_fetches",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dispatch.max_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.max_rounds",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

///
/// PlannerConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    /// Answer a sub-window from a coarser aggregate by linear pro-rata.
    #[serde(default = "default_true")]
    pub prorate_aggregates: bool,

    /// Plan fetches for missing closed-family values instead of disclosing a
    /// partial sum.
    #[serde(default = "default_true")]
    pub fetch_missing_values: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            prorate_aggregates: default_true(),
            fetch_missing_values: default_true(),
        }
    }
}

///
/// DispatchConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Adapter calls allowed per `execute`; the rest are reported over budget.
    #[serde(default = "default_request_budget")]
    pub request_budget: usize,

    /// Plan/fetch rounds a resolver runs before returning its last plan.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            request_budget: default_request_budget(),
            max_rounds: default_max_rounds(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_concurrent_fetches() -> usize {
    4
}

const fn default_request_budget() -> usize {
    64
}

const fn default_max_rounds() -> usize {
    3
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SliceCacheConfig::from_toml_str("").unwrap();

        assert_eq!(config, SliceCacheConfig::default());
        assert!(config.planner.prorate_aggregates);
        assert!(config.planner.fetch_missing_values);
        assert_eq!(config.dispatch.max_concurrent_fetches, 4);
        assert_eq!(config.dispatch.request_budget, 64);
        assert_eq!(config.dispatch.max_rounds, 3);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = SliceCacheConfig::from_toml_str(
            "[planner]\nfetch_missing_values = false\n\n[dispatch]\nrequest_budget = 8\n",
        )
        .unwrap();

        assert!(!config.planner.fetch_missing_values);
        assert!(config.planner.prorate_aggregates);
        assert_eq!(config.dispatch.request_budget, 8);
        assert_eq!(config.dispatch.max_concurrent_fetches, 4);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = SliceCacheConfig::from_toml_str("[dispatch]\nmax_concurrent_fetches = 0\n")
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "dispatch.max_concurrent_fetches",
                ..
            }
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SliceCacheConfig::from_toml_str("[planner]\nguess = true\n").unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SliceCacheConfig::load("/nonexistent/slicecache.toml").unwrap_err();

        assert!(err.to_string().contains("/nonexistent/slicecache.toml"));
    }
}
