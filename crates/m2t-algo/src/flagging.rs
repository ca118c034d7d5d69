//! Correlation-based error flagging with a threshold sweep.
//!
//! A transformer is *flagged* at threshold `t` when the weakest correlation
//! between any two of its (voting) members is below `t`. Instead of committing to
//! one `t`, the whole grid is swept: the threshold at which a transformer first
//! gets flagged ranks it, since a group that fails even a lenient (low) threshold
//! is the strongest evidence of a mislabeled customer.
//!
//! Flagged sets are nested by construction: `flagged(t1) ⊆ flagged(t2)` for
//! `t1 < t2`.

use m2t_core::{
    stats::nan_min, M2tError, M2tResult, PairMatrix, TransformerId, TransformerLabels,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

const THRESHOLD_TOLERANCE: f64 = 1e-9;

/// Candidate correlation thresholds used by the reference study.
pub fn default_threshold_grid() -> Vec<f64> {
    let mut grid: Vec<f64> = (25..=76).map(|v| v as f64 / 100.0).collect();
    grid.extend([0.78, 0.79, 0.80, 0.81, 0.82, 0.83, 0.84, 0.85, 0.86, 0.87, 0.88, 0.90, 0.91]);
    grid
}

/// Reject empty, non-finite or non-ascending grids.
pub fn validate_threshold_grid(thresholds: &[f64]) -> M2tResult<()> {
    if thresholds.is_empty() {
        return Err(M2tError::Config("threshold grid is empty".into()));
    }
    if let Some(bad) = thresholds.iter().find(|t| !t.is_finite()) {
        return Err(M2tError::Config(format!("threshold {bad} is not finite")));
    }
    if let Some(pair) = thresholds.windows(2).find(|pair| pair[1] <= pair[0]) {
        return Err(M2tError::Config(format!(
            "threshold grid must be strictly ascending ({} then {})",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Index of `threshold` in `grid`, or [`M2tError::ThresholdNotFound`].
pub fn threshold_index(grid: &[f64], threshold: f64) -> M2tResult<usize> {
    grid.iter()
        .position(|t| (t - threshold).abs() <= THRESHOLD_TOLERANCE)
        .ok_or(M2tError::ThresholdNotFound(threshold))
}

/// Weakest member-pair correlation of every transformer group.
///
/// Customers listed in `excluded` (no-votes) do not count as members. Groups with
/// fewer than two remaining members, or no finite member-pair correlation, map to
/// `None` and can never be flagged.
pub fn group_min_correlation(
    labels: &TransformerLabels,
    correlation: &PairMatrix,
    excluded: &[usize],
    single_cust_marker: i64,
) -> M2tResult<BTreeMap<TransformerId, Option<f64>>> {
    correlation.expect_dim("correlation matrix", labels.len())?;
    let groups = labels.groups(single_cust_marker);
    let mut out = BTreeMap::new();
    for (transformer, members) in groups {
        let voting: Vec<usize> = members
            .into_iter()
            .filter(|m| !excluded.contains(m))
            .collect();
        let weakest = if voting.len() < 2 {
            None
        } else {
            nan_min(voting.iter().enumerate().flat_map(|(pos, &a)| {
                voting[pos + 1..].iter().map(move |&b| correlation.get(a, b))
            }))
        };
        out.insert(transformer, weakest);
    }
    Ok(out)
}

/// Transformers flagged at a single threshold, in ascending label order.
pub fn flag_transformers(
    labels: &TransformerLabels,
    correlation: &PairMatrix,
    threshold: f64,
    excluded: &[usize],
    single_cust_marker: i64,
) -> M2tResult<Vec<TransformerId>> {
    let minima = group_min_correlation(labels, correlation, excluded, single_cust_marker)?;
    Ok(flagged_from_minima(&minima, threshold))
}

fn flagged_from_minima(minima: &BTreeMap<TransformerId, Option<f64>>, threshold: f64) -> Vec<TransformerId> {
    minima
        .iter()
        .filter(|(_, min)| matches!(min, Some(m) if *m < threshold))
        .map(|(t, _)| *t)
        .collect()
}

/// A flagged transformer with the evidence that ranked it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFlag {
    pub transformer: TransformerId,
    /// Lowest grid threshold at which the transformer is flagged
    pub first_flagged_at: f64,
    /// Weakest member-pair correlation
    pub min_correlation: f64,
}

/// Result of sweeping the whole threshold grid.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdSweep {
    pub thresholds: Vec<f64>,
    /// Flagged transformers per threshold, aligned with `thresholds`
    pub flagged: Vec<Vec<TransformerId>>,
    /// Number of flagged transformers per threshold (for diagnostic plots)
    pub counts: Vec<usize>,
    /// All ever-flagged transformers, most confident first
    pub ranked: Vec<RankedFlag>,
}

impl ThresholdSweep {
    /// Flagged transformers at a grid threshold.
    pub fn flagged_at(&self, threshold: f64) -> M2tResult<&[TransformerId]> {
        let idx = threshold_index(&self.thresholds, threshold)?;
        Ok(&self.flagged[idx])
    }

    pub fn count_at(&self, threshold: f64) -> M2tResult<usize> {
        let idx = threshold_index(&self.thresholds, threshold)?;
        Ok(self.counts[idx])
    }

    /// Ranked flags restricted to those flagged at or below `threshold`.
    pub fn ranked_at(&self, threshold: f64) -> M2tResult<Vec<&RankedFlag>> {
        threshold_index(&self.thresholds, threshold)?;
        Ok(self
            .ranked
            .iter()
            .filter(|flag| flag.first_flagged_at <= threshold + THRESHOLD_TOLERANCE)
            .collect())
    }
}

/// Flag transformers at every grid threshold and rank them.
///
/// Ties (first flagged at the same threshold) keep ascending label order.
pub fn sweep_thresholds(
    labels: &TransformerLabels,
    thresholds: &[f64],
    correlation: &PairMatrix,
    excluded: &[usize],
    single_cust_marker: i64,
) -> M2tResult<ThresholdSweep> {
    validate_threshold_grid(thresholds)?;
    let minima = group_min_correlation(labels, correlation, excluded, single_cust_marker)?;

    let mut flagged = Vec::with_capacity(thresholds.len());
    let mut counts = Vec::with_capacity(thresholds.len());
    let mut ranked: Vec<RankedFlag> = Vec::new();

    for &threshold in thresholds {
        let current = flagged_from_minima(&minima, threshold);
        for transformer in &current {
            if ranked.iter().all(|r| r.transformer != *transformer) {
                ranked.push(RankedFlag {
                    transformer: *transformer,
                    first_flagged_at: threshold,
                    min_correlation: minima[transformer].unwrap_or(f64::NAN),
                });
            }
        }
        debug!(threshold, flagged = current.len(), "swept correlation threshold");
        counts.push(current.len());
        flagged.push(current);
    }

    info!(
        thresholds = thresholds.len(),
        ever_flagged = ranked.len(),
        "completed threshold sweep"
    );

    Ok(ThresholdSweep {
        thresholds: thresholds.to_vec(),
        flagged,
        counts,
        ranked,
    })
}
