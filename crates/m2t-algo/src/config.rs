//! Run configuration for a pairing pass.
//!
//! Every field has a default, so a partial TOML document only needs to name what
//! it changes:
//!
//! ```toml
//! window_size = 96
//! not_member_threshold = 0.6
//! dist_threshold = 150.0
//! distance_metric = "haversine"
//!
//! [delta]
//! kind = "rolling_mean"
//! window = 4
//! ```

use std::path::Path;

use m2t_core::{M2tError, M2tResult, SolverKind, DEFAULT_SINGLE_CUST_MARKER};
use m2t_ts::{DeltaMethod, PerUnitReference};
use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationConfig;
use crate::flagging::{default_threshold_grid, threshold_index, validate_threshold_grid};
use crate::geo::DistanceMetricKind;
use crate::reassignment::ReassignmentConfig;
use crate::regression::RegressionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Samples per correlation window
    pub window_size: usize,

    /// Offset between correlation windows (defaults to `window_size`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_step: Option<usize>,

    /// Ascending correlation threshold grid for the sweep
    pub thresholds: Vec<f64>,

    /// Operating threshold; must be a member of `thresholds`
    pub not_member_threshold: f64,

    /// Margin added to the best pairwise fit to obtain the trust threshold
    pub additive_factor: f64,

    /// Apply `reactance_threshold` when reactive power is available
    pub use_reactance_threshold: bool,
    pub reactance_threshold: f64,

    /// Hard geographic gate; disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_threshold: Option<f64>,

    pub distance_metric: DistanceMetricKind,

    /// Label reserved for single-customer transformers
    pub single_cust_marker: i64,

    /// Minimum complete samples for a pairwise fit
    pub min_regression_samples: usize,

    /// Linear solver for the regression normal equations
    pub solver: SolverKind,

    /// Per-unit base for each customer
    pub per_unit: PerUnitReference,

    /// Fluctuation series derived from per-unit voltage
    pub delta: DeltaMethod,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            window_size: 384,
            window_step: None,
            thresholds: default_threshold_grid(),
            not_member_threshold: 0.5,
            additive_factor: 0.02,
            use_reactance_threshold: true,
            reactance_threshold: 0.046,
            dist_threshold: None,
            distance_metric: DistanceMetricKind::default(),
            single_cust_marker: DEFAULT_SINGLE_CUST_MARKER,
            min_regression_samples: 10,
            solver: SolverKind::default(),
            per_unit: PerUnitReference::default(),
            delta: DeltaMethod::default(),
        }
    }
}

impl PairingConfig {
    pub fn from_toml_str(contents: &str) -> M2tResult<Self> {
        toml::from_str(contents).map_err(|e| M2tError::Parse(e.to_string()))
    }

    /// Load and validate a TOML config file.
    pub fn load_from(path: &Path) -> M2tResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> M2tResult<String> {
        toml::to_string_pretty(self).map_err(|e| M2tError::Parse(e.to_string()))
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> M2tResult<()> {
        self.correlation_config().validate()?;
        validate_threshold_grid(&self.thresholds)?;
        threshold_index(&self.thresholds, self.not_member_threshold)?;

        if let DeltaMethod::RollingMean { window } = self.delta {
            if window < 2 {
                return Err(M2tError::Config(format!(
                    "rolling mean window must be at least 2 samples, got {window}"
                )));
            }
        }
        if !self.additive_factor.is_finite() || self.additive_factor < 0.0 {
            return Err(M2tError::Config(format!(
                "additive_factor must be finite and non-negative, got {}",
                self.additive_factor
            )));
        }
        if !self.reactance_threshold.is_finite() || self.reactance_threshold < 0.0 {
            return Err(M2tError::Config(format!(
                "reactance_threshold must be finite and non-negative, got {}",
                self.reactance_threshold
            )));
        }
        if let Some(d) = self.dist_threshold {
            if !d.is_finite() || d < 0.0 {
                return Err(M2tError::Config(format!(
                    "dist_threshold must be finite and non-negative, got {d}"
                )));
            }
        }
        if self.min_regression_samples == 0 {
            return Err(M2tError::Config(
                "min_regression_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn correlation_config(&self) -> CorrelationConfig {
        CorrelationConfig {
            window_size: self.window_size,
            window_step: self.window_step,
        }
    }

    pub fn regression_config(&self) -> RegressionConfig {
        RegressionConfig {
            min_samples: self.min_regression_samples,
        }
    }

    pub fn reassignment_config(&self) -> ReassignmentConfig {
        ReassignmentConfig {
            not_member_threshold: self.not_member_threshold,
            reactance_threshold: self
                .use_reactance_threshold
                .then_some(self.reactance_threshold),
            dist_threshold: self.dist_threshold,
            single_cust_marker: self.single_cust_marker,
        }
    }
}
