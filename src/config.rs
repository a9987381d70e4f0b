use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunable decision policy.
///
/// The weights and thresholds are policy constants, not laws: operators tune
/// them per deployment. [`EngineConfig::validate`] rejects combinations that
/// could push a similarity score outside the 0-100 range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Combined similarity at or above this is genuine (inclusive bound).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Weight of the fingerprint score in the combined similarity.
    #[serde(default = "default_hash_weight")]
    pub hash_weight: f64,

    /// Weight of the byte-size score in the combined similarity.
    #[serde(default = "default_size_weight")]
    pub size_weight: f64,

    /// Raw fingerprint similarity below this refuses a genuine verdict even
    /// when a filename hint or the combined score would grant one.
    #[serde(default = "default_pixel_forgery_floor")]
    pub pixel_forgery_floor: f64,

    /// Substrings that mark a storage path as a known fraudulent-sample
    /// location. Matched case-insensitively.
    #[serde(default = "default_fraud_path_markers")]
    pub fraud_path_markers: BTreeSet<String>,
}

fn default_similarity_threshold() -> f64 {
    85.0
}

fn default_hash_weight() -> f64 {
    0.7
}

fn default_size_weight() -> f64 {
    0.3
}

fn default_pixel_forgery_floor() -> f64 {
    50.0
}

fn default_fraud_path_markers() -> BTreeSet<String> {
    [
        "copy_paste",
        "copy-paste",
        "copy_move",
        "copy-move",
        "imitation",
        "inpaint",
        "tampered",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            hash_weight: default_hash_weight(),
            size_weight: default_size_weight(),
            pixel_forgery_floor: default_pixel_forgery_floor(),
            fraud_path_markers: default_fraud_path_markers(),
        }
    }
}

impl EngineConfig {
    /// Check that thresholds lie in 0-100 and that the weights are
    /// non-negative and sum to 1. Non-finite weights are rejected outright.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.similarity_threshold));
        }
        if !(0.0..=100.0).contains(&self.pixel_forgery_floor) {
            return Err(ConfigError::FloorOutOfRange(self.pixel_forgery_floor));
        }
        // NaN compares false in every check below, so finiteness goes first.
        if !self.hash_weight.is_finite() || !self.size_weight.is_finite() {
            return Err(ConfigError::NonFiniteWeight {
                hash: self.hash_weight,
                size: self.size_weight,
            });
        }
        if self.hash_weight < 0.0 || self.size_weight < 0.0 {
            return Err(ConfigError::NegativeWeight {
                hash: self.hash_weight,
                size: self.size_weight,
            });
        }
        let sum = self.hash_weight + self.size_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightSum(sum));
        }
        Ok(())
    }

    /// Load and validate a JSON config file. Missing fields fall back to
    /// their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-user default config location, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("veridoc").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.similarity_threshold, 85.0);
        assert_eq!(config.hash_weight, 0.7);
        assert_eq!(config.size_weight, 0.3);
        assert!(config.fraud_path_markers.contains("copy_paste"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = EngineConfig {
            similarity_threshold: 150.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let config = EngineConfig {
            hash_weight: -0.2,
            size_weight: 1.2,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeWeight { .. })
        ));
    }

    #[test]
    fn test_nan_weight_rejected() {
        let config = EngineConfig {
            hash_weight: f64::NAN,
            size_weight: 0.3,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteWeight { .. })
        ));
    }

    #[test]
    fn test_infinite_weight_rejected() {
        let config = EngineConfig {
            hash_weight: 0.7,
            size_weight: f64::INFINITY,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteWeight { .. })
        ));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = EngineConfig {
            hash_weight: 0.5,
            size_weight: 0.6,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::WeightSum(_))));
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "similarity_threshold": 90.0 }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.similarity_threshold, 90.0);
        assert_eq!(config.hash_weight, 0.7);
        assert!(!config.fraud_path_markers.is_empty());
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "hash_weight": 0.9, "size_weight": 0.9 }"#).unwrap();

        assert!(matches!(
            EngineConfig::from_file(&path),
            Err(ConfigError::WeightSum(_))
        ));
    }

    #[test]
    fn test_from_file_missing_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nope.json");
        assert!(matches!(
            EngineConfig::from_file(&path),
            Err(ConfigError::Read(_))
        ));
    }
}
