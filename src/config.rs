//! Aggregated YAML configuration for the whole pipeline.
//!
//! A single file carries one section per stage, so deployments tune the
//! pipeline without touching code:
//!
//! ```yaml
//! version: "1.0"
//!
//! pass0:
//!   min_unit_chars: 30
//!   chunk_target_chars: 1200
//!
//! coref:
//!   confidence_threshold: 0.85
//!   named_jaro_reject: 0.55
//!
//! pass1:
//!   strict_promotion: true
//!   pointer_min_shared_tokens: 2
//!
//! promotion:
//!   discursive_min_confidence: 0.70
//!
//! navigation:
//!   max_mentions_per_concept: 100
//!
//! retrieve:
//!   top_k: 10
//!   score_floor: 0.5
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use coref::CorefConfig;
use extract::Pass1Config;
use graphnav::NavigationConfig;
use ingest::Pass0Config;
use promote::{PromotionThresholds, TierMatrix};
use retrieve::{ConfidenceConfig, RetrieveConfig};

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration, one section per stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StrataConfig {
    /// Configuration format version.
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub pass0: Pass0Config,
    #[serde(default)]
    pub coref: CorefConfig,
    #[serde(default)]
    pub pass1: Pass1Config,
    #[serde(default)]
    pub promotion: PromotionThresholds,
    #[serde(default)]
    pub tier_matrix: TierMatrix,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub retrieve: RetrieveConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            pass0: Pass0Config::default(),
            coref: CorefConfig::default(),
            pass1: Pass1Config::default(),
            promotion: PromotionThresholds::default(),
            tier_matrix: TierMatrix::default(),
            navigation: NavigationConfig::default(),
            retrieve: RetrieveConfig::default(),
            confidence: ConfidenceConfig::default(),
        }
    }
}

impl StrataConfig {
    /// Load a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse a YAML configuration string.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigLoadError> {
        let config: StrataConfig = serde_yaml::from_str(text)?;
        if !config.version.starts_with("1.") {
            return Err(ConfigLoadError::UnsupportedVersion(config.version));
        }
        Ok(config)
    }

    /// Serialize back to YAML (round-trips through [`Self::from_yaml`]).
    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_yaml() {
        let config = StrataConfig::default();
        let yaml = config.to_yaml().unwrap();
        let restored = StrataConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let yaml = "version: \"1.0\"\nretrieve:\n  collection: knowbase\n  top_k: 5\n  score_floor: 0.4\n";
        let config = StrataConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retrieve.top_k, 5);
        assert_eq!(config.pass0.min_unit_chars, 30);
        assert_eq!(config.coref.confidence_threshold, 0.85);
    }

    #[test]
    fn unsupported_versions_are_rejected() {
        let yaml = "version: \"9.0\"\n";
        assert!(matches!(
            StrataConfig::from_yaml(yaml),
            Err(ConfigLoadError::UnsupportedVersion(_))
        ));
    }
}
