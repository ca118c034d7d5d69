//! Voltage preprocessing for AMI measurement matrices.
//!
//! Two steps turn raw meter voltage into a series whose fluctuations reflect the
//! shared service transformer rather than absolute voltage level:
//!
//! 1. [`to_per_unit`] divides each customer's series by that customer's own
//!    reference. The reference is always per customer because nominal service
//!    voltage (120 V, 240 V, ...) varies between customers.
//! 2. [`to_delta_voltage`] removes slow trends with a first difference or a
//!    deviation from a trailing mean. A delta touching a missing sample is missing.

use m2t_core::{stats::nan_median, Category, Diagnostics, M2tError, M2tResult, MeasurementMatrix};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How each customer's per-unit base is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerUnitReference {
    /// The customer's own median voltage. Applying it twice is a no-op.
    #[default]
    Median,
    /// The candidate nominal voltage closest to the customer's median.
    ServiceNominal { candidates: Vec<f64> },
}

impl PerUnitReference {
    /// North American residential service nominals.
    pub fn residential() -> Self {
        PerUnitReference::ServiceNominal {
            candidates: vec![120.0, 240.0],
        }
    }

    fn validate(&self) -> M2tResult<()> {
        if let PerUnitReference::ServiceNominal { candidates } = self {
            if candidates.is_empty() {
                return Err(M2tError::Config(
                    "service nominal reference needs at least one candidate voltage".into(),
                ));
            }
            if candidates.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                return Err(M2tError::Config(
                    "service nominal candidates must be positive and finite".into(),
                ));
            }
        }
        Ok(())
    }

    fn base_for(&self, median: f64) -> f64 {
        match self {
            PerUnitReference::Median => median,
            PerUnitReference::ServiceNominal { candidates } => candidates
                .iter()
                .copied()
                .min_by(|a, b| (a - median).abs().total_cmp(&(b - median).abs()))
                .unwrap_or(median),
        }
    }
}

/// How the delta (fluctuation) series is derived from per-unit voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaMethod {
    /// `v[t+1] - v[t]`; the output has one sample fewer than the input.
    #[default]
    FirstDifference,
    /// `v[t] - mean(v[t-window+1..=t])`; the first `window - 1` samples are missing.
    RollingMean { window: usize },
}

/// Convert raw voltage to per-unit, one reference per customer.
///
/// Customers without a single finite positive sample get an all-missing column and a
/// `preprocess` warning; they surface later as no-votes customers.
pub fn to_per_unit(
    voltage: &MeasurementMatrix,
    reference: &PerUnitReference,
    diag: &mut Diagnostics,
) -> M2tResult<MeasurementMatrix> {
    reference.validate()?;

    let mut unusable = Vec::new();
    let mut customer = 0usize;
    let out = voltage.map_columns(voltage.n_samples(), |input, output| {
        let base = nan_median(input)
            .filter(|m| *m > 0.0)
            .map(|m| reference.base_for(m));
        match base {
            Some(base) => {
                for (dst, &v) in output.iter_mut().zip(input.iter()) {
                    *dst = if v.is_finite() { v / base } else { f64::NAN };
                }
            }
            None => unusable.push(customer),
        }
        customer += 1;
    });

    for idx in &unusable {
        warn!(customer = idx, "no usable voltage samples for per-unit conversion");
        diag.warn(
            Category::Preprocess,
            format!("customer index {idx} has no finite positive voltage samples"),
        );
    }
    debug!(
        customers = voltage.n_customers(),
        unusable = unusable.len(),
        "converted voltage to per-unit"
    );
    Ok(out)
}

/// Derive the delta-voltage series from per-unit voltage.
pub fn to_delta_voltage(v_pu: &MeasurementMatrix, method: DeltaMethod) -> M2tResult<MeasurementMatrix> {
    match method {
        DeltaMethod::FirstDifference => {
            let out_samples = v_pu.n_samples().saturating_sub(1);
            Ok(v_pu.map_columns(out_samples, |input, output| {
                for (dst, pair) in output.iter_mut().zip(input.windows(2)) {
                    // NaN in either sample propagates through the subtraction
                    *dst = pair[1] - pair[0];
                }
            }))
        }
        DeltaMethod::RollingMean { window } => {
            if window < 2 {
                return Err(M2tError::Config(format!(
                    "rolling mean window must be at least 2 samples, got {window}"
                )));
            }
            Ok(v_pu.map_columns(v_pu.n_samples(), |input, output| {
                rolling_deviation(input, window, output);
            }))
        }
    }
}

fn rolling_deviation(input: &[f64], window: usize, output: &mut [f64]) {
    let mut sum = 0.0;
    let mut missing = 0usize;
    for t in 0..input.len() {
        let entering = input[t];
        if entering.is_finite() {
            sum += entering;
        } else {
            missing += 1;
        }
        if t >= window {
            let leaving = input[t - window];
            if leaving.is_finite() {
                sum -= leaving;
            } else {
                missing -= 1;
            }
        }
        output[t] = if t + 1 >= window && missing == 0 {
            entering - sum / window as f64
        } else {
            f64::NAN
        };
    }
}
