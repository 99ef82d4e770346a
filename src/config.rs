//! Tuner configuration data.
//!
//! The JSON shape shared with the managed service: filter tuning parameters and the model's
//! initial state, bounds and expected observation levels. Loading the document is left to the
//! caller, [`ConfigData::from_json`] only parses it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Gamma factor in the observation noise variance.
pub const DEFAULT_GAMMA_FACTOR: f64 = 1.0;
/// Relative error level of observations.
pub const DEFAULT_ERROR_LEVEL: f64 = 0.05;
/// Value of the tail of the student distribution at the error level.
pub const DEFAULT_STUDENT_PERCENTILE: f64 = 1.96;
/// Predicted percent change in state values between cycles.
pub const DEFAULT_PERCENT_CHANGE: f64 = 5.0;
/// Relative finite difference step.
pub const DEFAULT_STEP_SIZE: f64 = 0.001;
/// Absolute floor of the finite difference step.
pub const DEFAULT_MIN_STEP_SIZE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    #[serde(default)]
    pub filter_data: FilterData,
    pub model_data: ModelData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterData {
    pub gamma_factor: f64,
    /// Error level percentile
    pub error_level: f64,
    /// Tail of student distribution
    pub student_percentile: f64,
    /// Percent change in state
    pub percent_change: f64,
    /// Relative step size
    pub step_size: f64,
    /// Smallest step, taken for state elements below min_step_size / step_size
    pub min_step_size: f64,
    /// Recompute process noise from the current state every cycle
    pub adaptive_noise: bool,
}

impl Default for FilterData {
    fn default() -> Self {
        FilterData {
            gamma_factor: DEFAULT_GAMMA_FACTOR,
            error_level: DEFAULT_ERROR_LEVEL,
            student_percentile: DEFAULT_STUDENT_PERCENTILE,
            percent_change: DEFAULT_PERCENT_CHANGE,
            step_size: DEFAULT_STEP_SIZE,
            min_step_size: DEFAULT_MIN_STEP_SIZE,
            adaptive_noise: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelData {
    /// Initial state of model parameters
    pub init_state: Vec<f64>,
    #[serde(default)]
    pub bounded_state: bool,
    #[serde(default)]
    pub min_state: Vec<f64>,
    #[serde(default)]
    pub max_state: Vec<f64>,
    /// Expected values of observations
    pub expected_observations: Vec<f64>,
}

impl ConfigData {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_configuration(format!("config data: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::invalid_configuration(format!("config data: {}", e)))
    }
}
