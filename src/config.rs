//! Tunable thresholds and scheduler settings.
//!
//! Configuration is always passed explicitly; nothing here reads the
//! environment. The CLI loads a [`HeatmapConfig`] from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Degree-box thresholds for deciding two detections are the same place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProximityConfig {
    /// Maximum latitude difference (exclusive) in degrees.
    /// Default: 0.005 (~550 meters)
    pub lat_threshold: f64,

    /// Maximum longitude difference (exclusive) in degrees.
    /// Default: 0.005 (~500 meters at mid-latitudes)
    pub lon_threshold: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            lat_threshold: 0.005,
            lon_threshold: 0.005,
        }
    }
}

impl ProximityConfig {
    pub fn new(lat_threshold: f64, lon_threshold: f64) -> Self {
        Self {
            lat_threshold,
            lon_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("latThreshold", self.lat_threshold),
            ("lonThreshold", self.lon_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReconcileError::Config {
                    message: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        Ok(())
    }
}

/// Settings for the recurring cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupConfig {
    /// Time between scheduled runs in milliseconds.
    /// Default: 300000 (5 minutes)
    pub interval_ms: u64,

    /// Maximum deletes per store batch.
    /// Default: 500 (document store batch write limit)
    pub batch_size: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5 * 60 * 1000,
            batch_size: 500,
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(ReconcileError::Config {
                message: "intervalMs must be greater than zero".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ReconcileError::Config {
                message: "batchSize must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Complete configuration: matching thresholds plus scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeatmapConfig {
    pub proximity: ProximityConfig,
    pub cleanup: CleanupConfig,
}

impl HeatmapConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: HeatmapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ReconcileError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.proximity.validate()?;
        self.cleanup.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HeatmapConfig::default();
        assert_eq!(config.proximity.lat_threshold, 0.005);
        assert_eq!(config.proximity.lon_threshold, 0.005);
        assert_eq!(config.cleanup.interval(), Duration::from_secs(300));
        assert_eq!(config.cleanup.batch_size, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            HeatmapConfig::from_json_str(r#"{ "proximity": { "latThreshold": 0.01 } }"#).unwrap();
        assert_eq!(config.proximity.lat_threshold, 0.01);
        assert_eq!(config.proximity.lon_threshold, 0.005);
        assert_eq!(config.cleanup.batch_size, 500);
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let err = HeatmapConfig::from_json_str(r#"{ "proximity": { "lonThreshold": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Config { .. }));
        assert!(err.to_string().contains("lonThreshold"));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = CleanupConfig {
            batch_size: 0,
            ..CleanupConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            HeatmapConfig::from_json_str("{ not json"),
            Err(ReconcileError::Config { .. })
        ));
    }
}
