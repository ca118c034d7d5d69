//! # m2t-algo: Meter-to-Transformer Pairing Algorithms
//!
//! This crate finds customers whose recorded service transformer is wrong and
//! proposes corrected groupings, using only AMI voltage and power measurements
//! (plus optional coordinates).
//!
//! ## Pipeline
//!
//! | Stage | Entry point | Output |
//! |-------|-------------|--------|
//! | Correlation | [`windowed_median_correlation`] | robust customer x customer correlation, no-votes customers |
//! | Flagging | [`sweep_thresholds`] | flagged transformers per threshold, ranked by confidence |
//! | Regression | [`pairwise_regression`] | fit quality (MSE), R², resistance/reactance distances |
//! | Calibration | [`find_min_mse`], [`adjust_distance_from_threshold`] | trust threshold, sentinel-adjusted distances |
//! | Reassignment | [`reassign_flagged`] | [`Prediction`] with tagged per-customer [`Assignment`]s |
//! | Scoring | [`transformer_prediction_errors`] | [`AccuracyReport`] against ground truth |
//!
//! Preprocessing (per-unit conversion, delta voltage) lives in `m2t-ts`.
//!
//! ### Parallelism
//!
//! The two O(customers²) stages fan out over rows of the upper triangle with
//! rayon. Each pair is computed once and written to both halves of the output,
//! so result matrices are exactly symmetric.
//!
//! ## Example
//!
//! ```ignore
//! use m2t_algo::{MeterPairing, PairingConfig};
//!
//! let config = PairingConfig::from_toml_str(&std::fs::read_to_string("pairing.toml")?)?;
//! let report = MeterPairing::new(&dataset).with_config(config).run()?;
//!
//! for change in &report.prediction.changes {
//!     println!("{}: {} -> {}", change.customer_id, change.original, change.predicted);
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod correlation;
pub mod flagging;
pub mod geo;
pub mod reassignment;
pub mod regression;
pub mod test_utils;
pub mod validation;
pub mod workflows;

pub use calibration::{adjust_distance_from_threshold, find_min_mse, MseThreshold};
pub use config::PairingConfig;
pub use correlation::{windowed_median_correlation, CorrelationConfig, CorrelationResult};
pub use flagging::{
    default_threshold_grid, flag_transformers, group_min_correlation, sweep_thresholds,
    threshold_index, RankedFlag, ThresholdSweep,
};
pub use geo::{distance_matrix, DistanceMetric, DistanceMetricKind, Euclidean, Haversine};
pub use reassignment::{
    reassign_flagged, Assignment, CandidateScore, CustomerChange, Prediction, ProvisionalGroup,
    ReassignmentConfig, ReassignmentInputs, Rejection,
};
pub use regression::{pairwise_regression, PairwiseFit, Predictors, RegressionConfig};
pub use validation::{transformer_prediction_errors, AccuracyReport};
pub use workflows::{MeterPairing, PairingReport};
