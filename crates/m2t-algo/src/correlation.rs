//! Windowed, missing-data tolerant correlation between customers' delta voltage.
//!
//! AMI data routinely has communication gaps. Rather than dropping a customer with
//! any gap, the time axis is cut into windows; inside each window only columns
//! without missing samples take part, and the final score for a pair is the
//! median of all per-window estimates that pair received.
//!
//! **Algorithm**:
//! 1. For every window, centre each usable column and scale it to unit norm
//!    (one pass per column, done for all windows in parallel).
//! 2. The window's Pearson correlation for a pair is then a dot product.
//! 3. The pair's score is the median over windows where both columns were usable.
//!
//! A customer with no estimate against any other customer is a "no-votes"
//! customer: it is reported and excluded from flagging instead of being scored.

use m2t_core::{
    stats::median_in_place, CustomerId, M2tError, M2tResult, MeasurementMatrix, PairMatrix,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Window layout for [`windowed_median_correlation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Samples per window
    pub window_size: usize,
    /// Offset between window starts; `None` means non-overlapping windows
    pub window_step: Option<usize>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window_size: 384,
            window_step: None,
        }
    }
}

impl CorrelationConfig {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            window_step: None,
        }
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.window_step = Some(step);
        self
    }

    pub fn step(&self) -> usize {
        self.window_step.unwrap_or(self.window_size)
    }

    pub fn validate(&self) -> M2tResult<()> {
        if self.window_size < 2 {
            return Err(M2tError::Config(format!(
                "correlation window must hold at least 2 samples, got {}",
                self.window_size
            )));
        }
        if self.step() == 0 {
            return Err(M2tError::Config("correlation window step must be positive".into()));
        }
        Ok(())
    }

    /// Start offsets of every full window; trailing partial windows are dropped.
    pub fn window_starts(&self, samples: usize) -> Vec<usize> {
        (0..)
            .step_by(self.step())
            .take_while(|start| start + self.window_size <= samples)
            .collect()
    }
}

/// Output of the windowed correlation engine.
#[derive(Debug, Clone)]
pub struct CorrelationResult {
    /// Median-of-windows correlation; unit diagonal, NaN where a pair never voted
    pub matrix: PairMatrix,
    /// Number of windows that produced an estimate for each pair
    pub votes: PairMatrix,
    /// Customers without a single usable estimate against any peer
    pub no_votes: Vec<usize>,
    pub no_votes_ids: Vec<CustomerId>,
    /// Full windows evaluated
    pub windows: usize,
}

impl CorrelationResult {
    pub fn is_no_votes(&self, customer: usize) -> bool {
        self.no_votes.binary_search(&customer).is_ok()
    }
}

/// Centre a window and scale it to unit norm, or `None` when it cannot take part.
fn standardize(window: &[f64]) -> Option<Vec<f64>> {
    if window.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let len = window.len() as f64;
    let mean = window.iter().sum::<f64>() / len;
    let centered: Vec<f64> = window.iter().map(|v| v - mean).collect();
    let norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();

    // A flat window has no fluctuation to correlate; rounding leaves a tiny norm.
    let scale = window.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !norm.is_finite() || norm <= 1e-12 * scale * len.sqrt() || norm == 0.0 {
        return None;
    }
    Some(centered.into_iter().map(|v| v / norm).collect())
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Robust customer x customer correlation of delta-voltage series.
pub fn windowed_median_correlation(
    delta: &MeasurementMatrix,
    customer_ids: &[CustomerId],
    config: &CorrelationConfig,
) -> M2tResult<CorrelationResult> {
    config.validate()?;
    let n = delta.n_customers();
    if customer_ids.len() != n {
        return Err(M2tError::shape("correlation customer ids", n, customer_ids.len()));
    }

    let width = config.window_size;
    let starts = config.window_starts(delta.n_samples());
    let windows: Vec<Vec<Option<Vec<f64>>>> = starts
        .par_iter()
        .map(|&start| {
            (0..n)
                .map(|c| standardize(&delta.column(c)[start..start + width]))
                .collect()
        })
        .collect();
    debug!(windows = windows.len(), customers = n, "standardized correlation windows");

    // Each task owns one row of the upper triangle.
    let rows: Vec<(Vec<f64>, Vec<f64>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut medians = Vec::with_capacity(n - i - 1);
            let mut counts = Vec::with_capacity(n - i - 1);
            let mut estimates = Vec::with_capacity(windows.len());
            for j in i + 1..n {
                estimates.clear();
                for window in &windows {
                    if let (Some(a), Some(b)) = (&window[i], &window[j]) {
                        estimates.push(dot(a, b).clamp(-1.0, 1.0));
                    }
                }
                counts.push(estimates.len() as f64);
                medians.push(median_in_place(&mut estimates).unwrap_or(f64::NAN));
            }
            (medians, counts)
        })
        .collect();

    let mut matrix = PairMatrix::with_diagonal(n, 1.0);
    let mut votes = PairMatrix::filled(n, 0.0);
    for (i, (medians, counts)) in rows.into_iter().enumerate() {
        for (offset, (median, count)) in medians.into_iter().zip(counts).enumerate() {
            let j = i + 1 + offset;
            matrix.set_symmetric(i, j, median);
            votes.set_symmetric(i, j, count);
        }
    }
    for i in 0..n {
        votes.set(i, i, f64::NAN);
    }

    let no_votes: Vec<usize> = (0..n)
        .filter(|&i| (0..n).all(|j| j == i || matrix.get(i, j).is_nan()))
        .collect();
    let no_votes_ids = no_votes.iter().map(|&i| customer_ids[i].clone()).collect();

    info!(
        customers = n,
        windows = windows.len(),
        no_votes = no_votes.len(),
        "computed windowed median correlation"
    );

    Ok(CorrelationResult {
        matrix,
        votes,
        no_votes,
        no_votes_ids,
        windows: windows.len(),
    })
}
