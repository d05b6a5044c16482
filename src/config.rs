//! Configuration management for skinner
//!
//! Aggregations can be described in a TOML file, with environment variable
//! overrides and sensible defaults:
//!
//! ```toml
//! [aggregation]
//! decomps = ["host", "util"]
//! results_as_points = false
//! missing_fields = "group"
//!
//! [bucketizers.util]
//! kind = "linear"
//! width = 10
//!
//! [logging]
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::aggregation::bucketizer::{BucketizerMap, BucketizerSpec};
use crate::aggregation::engine::{EngineOptions, MissingFieldPolicy};
use crate::aggregation::pluck::validate_path;
use crate::aggregation::stream::AggregatorConfig;
use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SkinnerConfig {
    /// What to group by and how to emit results
    #[serde(default)]
    pub aggregation: AggregationSection,

    /// Bucketizers keyed by decomposition field name
    #[serde(default)]
    pub bucketizers: BTreeMap<String, BucketizerSpec>,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Aggregation settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregationSection {
    /// Ordered decomposition field paths
    #[serde(default)]
    pub decomps: Vec<String>,

    /// Emit datapoints instead of rows
    #[serde(default)]
    pub results_as_points: bool,

    /// Handling of unresolvable fields
    #[serde(default)]
    pub missing_fields: MissingFieldPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or an `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AggregationSection {
    fn default() -> Self {
        Self {
            decomps: Vec::new(),
            results_as_points: false,
            missing_fields: MissingFieldPolicy::default(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl SkinnerConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(decomps) = std::env::var("SKINNER_DECOMPS") {
            self.aggregation.decomps = decomps
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Ok(policy) = std::env::var("SKINNER_MISSING_FIELDS") {
            self.aggregation.missing_fields = policy.parse()?;
        }
        if let Ok(points) = std::env::var("SKINNER_RESULTS_AS_POINTS") {
            if let Ok(p) = points.parse() {
                self.aggregation.results_as_points = p;
            }
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.log_level = log_level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for path in &self.aggregation.decomps {
            validate_path(path).map_err(Error::Configuration)?;
        }

        for (field, spec) in &self.bucketizers {
            spec.build()?;
            if !self.aggregation.decomps.contains(field) {
                return Err(Error::Configuration(format!(
                    "bucketizer configured for '{}', which is not a decomposition field",
                    field
                )));
            }
        }

        if self.logging.log_level.trim().is_empty() {
            return Err(Error::Configuration("Log level cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build the bucketizer map
    pub fn build_bucketizers(&self) -> Result<BucketizerMap> {
        self.bucketizers
            .iter()
            .map(|(field, spec)| Ok((field.clone(), spec.build()?)))
            .collect()
    }

    /// Engine options for batch aggregation
    pub fn to_engine_options(&self) -> Result<EngineOptions> {
        Ok(EngineOptions::new(&self.aggregation.decomps)
            .with_bucketizers(self.build_bucketizers()?)
            .with_missing_fields(self.aggregation.missing_fields))
    }

    /// Streaming aggregator configuration
    pub fn to_aggregator_config(&self) -> Result<AggregatorConfig> {
        Ok(AggregatorConfig::new(&self.aggregation.decomps)
            .with_bucketizers(self.build_bucketizers()?)
            .results_as_points(self.aggregation.results_as_points)
            .with_missing_fields(self.aggregation.missing_fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[aggregation]
decomps = ["host", "util"]
missing_fields = "reject"

[bucketizers.util]
kind = "linear"
width = 10
"#;

    #[test]
    fn test_default_config() {
        let config = SkinnerConfig::default();
        assert!(config.aggregation.decomps.is_empty());
        assert!(!config.aggregation.results_as_points);
        assert_eq!(config.aggregation.missing_fields, MissingFieldPolicy::Group);
        assert_eq!(config.logging.log_level, "warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = SkinnerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.aggregation.decomps, vec!["host", "util"]);
        assert_eq!(config.aggregation.missing_fields, MissingFieldPolicy::Reject);
        assert_eq!(
            config.bucketizers["util"],
            BucketizerSpec::Linear { width: 10.0 }
        );
        assert!(config.validate().is_ok());

        let stream_config = config.to_aggregator_config().unwrap();
        assert_eq!(stream_config.bucketizers["util"].bounds_for(3), (30, 39));
        assert_eq!(stream_config.missing_fields, MissingFieldPolicy::Reject);
    }

    #[test]
    fn test_invalid_width() {
        let config = SkinnerConfig::from_toml_str(
            r#"
[aggregation]
decomps = ["util"]

[bucketizers.util]
kind = "linear"
width = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
        assert!(config.to_engine_options().is_err());
    }

    #[test]
    fn test_bucketizer_for_unknown_field() {
        let mut config = SkinnerConfig::from_toml_str(SAMPLE).unwrap();
        config.aggregation.decomps = vec!["host".to_string()];
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_path() {
        let mut config = SkinnerConfig::default();
        config.aggregation.decomps = vec!["data..state".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_policy() {
        let parsed = SkinnerConfig::from_toml_str("[aggregation]\nmissing_fields = \"drop\"\n");
        assert!(matches!(parsed, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("SKINNER_DECOMPS", "state, city");
        let config = SkinnerConfig::from_env().unwrap();
        assert_eq!(config.aggregation.decomps, vec!["state", "city"]);
        std::env::remove_var("SKINNER_DECOMPS");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skinner.toml");

        let config = SkinnerConfig::from_toml_str(SAMPLE).unwrap();
        config.save_to_file(&path).unwrap();

        let reloaded = SkinnerConfig::from_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_missing_file() {
        let result = SkinnerConfig::from_file("/nonexistent/skinner.toml");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
