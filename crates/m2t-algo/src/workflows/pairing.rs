//! Meter-to-transformer pairing facade
//!
//! Provides a builder-style API that runs the full pass over one dataset:
//! preprocess, correlate, sweep, regress, calibrate, reassign.

use std::sync::Arc;

use m2t_core::{
    AmiDataset, Category, CustomerId, Diagnostics, LinearSystemBackend, M2tError, M2tResult,
    PairMatrix, TransformerId, TransformerLabels,
};
use m2t_ts::{to_delta_voltage, to_per_unit};
use tracing::{info, warn};

use crate::calibration::{adjust_distance_from_threshold, find_min_mse, MseThreshold};
use crate::config::PairingConfig;
use crate::correlation::{windowed_median_correlation, CorrelationResult};
use crate::flagging::{sweep_thresholds, ThresholdSweep};
use crate::geo::distance_matrix;
use crate::reassignment::{reassign_flagged, Assignment, Prediction, ReassignmentInputs};
use crate::regression::{pairwise_regression, PairwiseFit};
use crate::validation::{transformer_prediction_errors, AccuracyReport};

/// Everything a pairing pass produced.
#[derive(Debug, Clone)]
pub struct PairingReport {
    pub customer_ids: Vec<CustomerId>,
    pub original_labels: TransformerLabels,
    pub correlation: CorrelationResult,
    pub sweep: ThresholdSweep,
    /// Flagged at the operating threshold
    pub flagged: Vec<TransformerId>,
    pub fit: PairwiseFit,
    /// `None` when no pair produced a finite fit; every pair is then untrusted
    pub calibration: Option<MseThreshold>,
    /// Electrical distance with untrusted pairs replaced
    pub adjusted_distance: PairMatrix,
    pub geo_distance: Option<PairMatrix>,
    pub prediction: Prediction,
    pub diagnostics: Diagnostics,
    pub single_cust_marker: i64,
}

impl PairingReport {
    pub fn predicted_labels(&self) -> TransformerLabels {
        self.prediction.label_vector()
    }

    /// Score the predicted labels against ground truth.
    pub fn accuracy_against(&self, truth: &TransformerLabels) -> M2tResult<AccuracyReport> {
        transformer_prediction_errors(
            &self.predicted_labels(),
            truth,
            &self.customer_ids,
            self.single_cust_marker,
        )
    }

    /// Score the input labels against ground truth.
    pub fn baseline_accuracy(&self, truth: &TransformerLabels) -> M2tResult<AccuracyReport> {
        transformer_prediction_errors(
            &self.original_labels,
            truth,
            &self.customer_ids,
            self.single_cust_marker,
        )
    }
}

/// Fluent builder for a pairing pass
pub struct MeterPairing<'a> {
    dataset: &'a AmiDataset,
    config: PairingConfig,
    backend: Option<Arc<dyn LinearSystemBackend>>,
}

impl<'a> MeterPairing<'a> {
    /// Create a pairing pass over a dataset with default configuration
    pub fn new(dataset: &'a AmiDataset) -> Self {
        Self {
            dataset,
            config: PairingConfig::default(),
            backend: None,
        }
    }

    pub fn with_config(mut self, config: PairingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the operating correlation threshold (must be on the sweep grid)
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.config.not_member_threshold = threshold;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.config.window_size = window_size;
        self
    }

    /// Enable the geographic gate
    pub fn with_dist_threshold(mut self, dist_threshold: f64) -> Self {
        self.config.dist_threshold = Some(dist_threshold);
        self
    }

    /// Override the solver selected by `config.solver`
    pub fn with_backend(mut self, backend: Arc<dyn LinearSystemBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Run the full pass.
    ///
    /// Configuration and shape problems fail before any computation starts.
    pub fn run(self) -> M2tResult<PairingReport> {
        let config = &self.config;
        let dataset = self.dataset;
        config.validate()?;
        dataset.validate()?;

        let marker = config.single_cust_marker;
        let mut diagnostics = Diagnostics::new();

        let v_pu = to_per_unit(&dataset.voltage, &config.per_unit, &mut diagnostics)?;
        let delta = to_delta_voltage(&v_pu, config.delta)?;
        let power = [
            ("real power", Some(&dataset.real_power)),
            ("reactive power", dataset.reactive_power.as_ref()),
        ];
        for (quantity, matrix) in power {
            let Some(matrix) = matrix else { continue };
            let empty = matrix
                .finite_counts()
                .into_iter()
                .enumerate()
                .filter(|&(_, count)| count == 0)
                .map(|(c, _)| dataset.customer_ids[c].clone());
            for id in empty {
                diagnostics.warn_for(
                    Category::Preprocess,
                    format!("no finite {quantity} samples"),
                    [id],
                );
            }
        }

        let correlation = windowed_median_correlation(
            &delta,
            &dataset.customer_ids,
            &config.correlation_config(),
        )?;
        for id in &correlation.no_votes_ids {
            diagnostics.warn_for(
                Category::NoVotes,
                "customer has no correlation estimate against any other customer",
                [id.clone()],
            );
        }

        let sweep = sweep_thresholds(
            &dataset.labels,
            &config.thresholds,
            &correlation.matrix,
            &correlation.no_votes,
            marker,
        )?;
        let flagged = sweep.flagged_at(config.not_member_threshold)?.to_vec();

        let backend = self
            .backend
            .clone()
            .unwrap_or_else(|| config.solver.build_solver());
        let fit = pairwise_regression(
            &dataset.voltage,
            &dataset.real_power,
            dataset.reactive_power.as_ref(),
            &config.regression_config(),
            backend.as_ref(),
        )?;
        for &(i, j) in &fit.failed_pairs {
            diagnostics.warn_for(
                Category::Regression,
                "too few complete samples or singular fit",
                [dataset.customer_ids[i].clone(), dataset.customer_ids[j].clone()],
            );
        }

        let calibration = match find_min_mse(&fit.mse, config.additive_factor) {
            Ok(calibration) => Some(calibration),
            Err(M2tError::InsufficientData(reason)) => {
                warn!(%reason, "fit trust threshold unavailable, treating every pair as untrusted");
                diagnostics.error(
                    Category::Calibration,
                    format!("{reason}; every pair is untrusted"),
                );
                None
            }
            Err(err) => return Err(err),
        };
        // No threshold admits a missing fit, so every pair takes the sentinel.
        let mse_threshold = calibration.map_or(f64::NEG_INFINITY, |c| c.threshold);
        let adjusted_distance = adjust_distance_from_threshold(
            &fit.mse,
            fit.electrical_distance(),
            mse_threshold,
            None,
        )?;
        let adjusted_reactance = fit
            .reactance
            .as_ref()
            .map(|x| adjust_distance_from_threshold(&fit.mse, x, mse_threshold, None))
            .transpose()?;

        let geo_distance = dataset.coordinates.as_ref().map(|points| {
            distance_matrix(points, config.distance_metric.metric().as_ref())
        });

        let inputs = ReassignmentInputs {
            customer_ids: &dataset.customer_ids,
            labels: &dataset.labels,
            flagged: &flagged,
            correlation: &correlation.matrix,
            excluded: &correlation.no_votes,
            fit: &fit.mse,
            mse_threshold,
            adjusted_distance: &adjusted_distance,
            adjusted_reactance: adjusted_reactance.as_ref(),
            geo_distance: geo_distance.as_ref(),
        };
        let prediction = reassign_flagged(&inputs, &config.reassignment_config())?;
        for group in &prediction.provisional_groups {
            diagnostics.warn_for(
                Category::Reassignment,
                format!(
                    "no existing transformer accepted the group, placed under provisional label {}",
                    group.label
                ),
                group.member_ids.iter().cloned(),
            );
        }
        let merged = prediction
            .assignments
            .iter()
            .filter(|a| matches!(a, Assignment::Merged { .. }))
            .count();

        info!(
            customers = dataset.n_customers(),
            flagged = flagged.len(),
            changed = prediction.changes.len(),
            merged,
            provisional_groups = prediction.provisional_groups.len(),
            warnings = diagnostics.warning_count(),
            "pairing pass complete"
        );

        Ok(PairingReport {
            customer_ids: dataset.customer_ids.clone(),
            original_labels: dataset.labels.clone(),
            correlation,
            sweep,
            flagged,
            fit,
            calibration,
            adjusted_distance,
            geo_distance,
            prediction,
            diagnostics,
            single_cust_marker: marker,
        })
    }
}
