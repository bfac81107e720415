//! Tunable parameters of a calibration run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Aggregated capacities below this many vehicles per hour and lane are
/// not plausible and get ignored.
pub const DEFAULT_CAPACITY_THRESHOLD: f64 = 375.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive finite number, got {value}")]
    NotPositive { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Plausibility gate per lane, in vehicles per hour.
    pub capacity_threshold: f64,
    /// Multiplier applied to every lane capacity after calibration.
    pub capacity_factor: f64,
    /// Multiplier applied to the free flow speed of slow links.
    pub free_flow_factor: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            capacity_threshold: DEFAULT_CAPACITY_THRESHOLD,
            capacity_factor: 1.0,
            free_flow_factor: 1.0,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("capacity_threshold", self.capacity_threshold),
            ("capacity_factor", self.capacity_factor),
            ("free_flow_factor", self.free_flow_factor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CalibrationConfig::default();
        assert_eq!(config.capacity_threshold, 375.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_factor_rejected() {
        let config = CalibrationConfig {
            capacity_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive {
                name: "capacity_factor",
                value: 0.0
            })
        );
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let config = CalibrationConfig {
            capacity_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CalibrationConfig =
            serde_json::from_str(r#"{ "capacity_factor": 1.2 }"#).unwrap();
        assert_eq!(config.capacity_threshold, DEFAULT_CAPACITY_THRESHOLD);
        assert_eq!(config.capacity_factor, 1.2);
    }
}
