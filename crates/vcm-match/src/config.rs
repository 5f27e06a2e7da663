//! Matching thresholds, read from ParamSet content

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use vcm_paramset::ParamContent;

/// Raised when ParamSet content carries a malformed matching key
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The key exists but its value has the wrong type or range
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// The offending ParamSet key
        key: &'static str,
        /// The rejected value, rendered as JSON
        value: String,
    },
}

/// Thresholds driving registration and correspondence
///
/// Values come from the match task's ParamSet under the `match.*` keys;
/// absent keys fall back to the defaults below, so the thresholds are part
/// of the task's content-addressed identity whenever they are set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Centroid distance (voxels, reference frame) below which two masks
    /// become a candidate link
    pub distance_tolerance: f64,
    /// Minimum landmarks each member must contribute to registration
    pub min_landmarks: usize,
    /// Maximum RMS alignment residual (voxels) accepted by registration
    pub max_residual: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            distance_tolerance: 8.0,
            min_landmarks: 3,
            max_residual: 6.0,
        }
    }
}

impl MatchConfig {
    /// Read thresholds out of ParamSet content, defaulting absent keys
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] when a `match.*` key is present but
    /// not a positive number of the right type.
    pub fn from_content(content: &ParamContent) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = content.get("match.distance_tolerance") {
            config.distance_tolerance = positive_f64("match.distance_tolerance", value)?;
        }
        if let Some(value) = content.get("match.min_landmarks") {
            config.min_landmarks = positive_usize("match.min_landmarks", value)?;
        }
        if let Some(value) = content.get("match.max_residual") {
            config.max_residual = positive_f64("match.max_residual", value)?;
        }
        Ok(config)
    }
}

fn positive_f64(key: &'static str, value: &Value) -> Result<f64, ConfigError> {
    value
        .as_f64()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

fn positive_usize(key: &'static str, value: &Value) -> Result<usize, ConfigError> {
    value
        .as_u64()
        .filter(|v| *v > 0)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}
