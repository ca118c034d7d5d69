//! Data-driven trust threshold for pairwise fits.
//!
//! Absolute fit quality depends on each customer's load profile, so no universal
//! MSE cutoff exists. The best-fitting pair of the dataset defines a noise floor;
//! pairs whose fit is worse than floor + margin are not trusted, and their
//! electrical distance is pushed to a sentinel so they never look "closest".

use m2t_core::{M2tError, M2tResult, PairMatrix};
use serde::Serialize;
use tracing::{debug, info};

/// Calibrated noise floor and trust threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MseThreshold {
    /// Smallest finite off-diagonal fit score
    pub min_mse: f64,
    pub additive_factor: f64,
    /// `min_mse + additive_factor`
    pub threshold: f64,
}

impl MseThreshold {
    /// Whether a pair's fit score is trustworthy.
    #[inline]
    pub fn trusts(&self, fit: f64) -> bool {
        fit.is_finite() && fit <= self.threshold
    }
}

/// Threshold = minimum off-diagonal fit + `additive_factor`.
///
/// Fails with [`M2tError::InsufficientData`] when no pair produced a finite fit.
pub fn find_min_mse(fit: &PairMatrix, additive_factor: f64) -> M2tResult<MseThreshold> {
    if !additive_factor.is_finite() || additive_factor < 0.0 {
        return Err(M2tError::Config(format!(
            "additive factor must be finite and non-negative, got {additive_factor}"
        )));
    }
    let min_mse = fit.min_off_diagonal().ok_or_else(|| {
        M2tError::InsufficientData("no customer pair produced a finite fit score".into())
    })?;
    let threshold = min_mse + additive_factor;
    info!(min_mse, threshold, "calibrated fit trust threshold");
    Ok(MseThreshold {
        min_mse,
        additive_factor,
        threshold,
    })
}

/// Copy of `distance` where every untrusted pair holds `replacement`.
///
/// A pair is untrusted when its fit exceeds `threshold` or is missing. `None` uses
/// the largest finite value of `distance`. The diagonal is left alone.
pub fn adjust_distance_from_threshold(
    fit: &PairMatrix,
    distance: &PairMatrix,
    threshold: f64,
    replacement: Option<f64>,
) -> M2tResult<PairMatrix> {
    let n = fit.dim();
    distance.expect_dim("distance matrix", n)?;
    let replacement = match replacement {
        Some(value) => value,
        None => distance.max_finite().unwrap_or(f64::NAN),
    };

    let mut adjusted = distance.clone();
    let mut replaced = 0usize;
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let f = fit.get(i, j);
            if f.is_nan() || f > threshold {
                adjusted.set(i, j, replacement);
                replaced += 1;
            }
        }
    }
    debug!(replaced, replacement, "adjusted untrusted pair distances");
    Ok(adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit_matrix() -> PairMatrix {
        PairMatrix::from_rows(&[
            vec![f64::NAN, 0.10, 0.50, 0.115],
            vec![0.10, f64::NAN, 0.13, f64::NAN],
            vec![0.50, 0.13, f64::NAN, 0.30],
            vec![0.115, f64::NAN, 0.30, f64::NAN],
        ])
        .unwrap()
    }

    fn distance_matrix() -> PairMatrix {
        PairMatrix::from_rows(&[
            vec![0.0, 0.2, 0.4, 0.3],
            vec![0.2, 0.0, 0.1, 0.6],
            vec![0.4, 0.1, 0.0, 0.9],
            vec![0.3, 0.6, 0.9, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn threshold_is_floor_plus_margin() {
        let calibrated = find_min_mse(&fit_matrix(), 0.02).unwrap();
        assert_eq!(calibrated.min_mse, 0.10);
        assert!((calibrated.threshold - 0.12).abs() < 1e-12);
        assert!(calibrated.trusts(0.115));
        assert!(!calibrated.trusts(0.13));
        assert!(!calibrated.trusts(f64::NAN));
    }

    #[test]
    fn untrusted_pairs_take_the_maximum() {
        let fit = fit_matrix();
        let calibrated = find_min_mse(&fit, 0.02).unwrap();
        let adjusted =
            adjust_distance_from_threshold(&fit, &distance_matrix(), calibrated.threshold, None)
                .unwrap();
        assert_eq!(adjusted.get(0, 1), 0.2);
        assert_eq!(adjusted.get(0, 3), 0.3);
        assert_eq!(adjusted.get(1, 2), 0.9);
        assert_eq!(adjusted.get(0, 2), 0.9);
        // Missing fit counts as untrusted
        assert_eq!(adjusted.get(1, 3), 0.9);
        assert_eq!(adjusted.get(2, 2), 0.0);
        assert!(adjusted.is_symmetric(0.0));
    }

    #[test]
    fn explicit_replacement_value() {
        let adjusted =
            adjust_distance_from_threshold(&fit_matrix(), &distance_matrix(), 0.12, Some(99.0))
                .unwrap();
        assert_eq!(adjusted.get(2, 3), 99.0);
        assert_eq!(adjusted.get(1, 0), 0.2);
    }

    #[test]
    fn all_missing_fit_is_insufficient_data() {
        let fit = PairMatrix::filled(3, f64::NAN);
        assert!(matches!(
            find_min_mse(&fit, 0.02),
            Err(M2tError::InsufficientData(_))
        ));
    }

    #[test]
    fn negative_margin_is_rejected() {
        assert!(matches!(
            find_min_mse(&fit_matrix(), -0.1),
            Err(M2tError::Config(_))
        ));
    }

    #[test]
    fn dimension_mismatch() {
        let err = adjust_distance_from_threshold(
            &fit_matrix(),
            &PairMatrix::filled(2, 0.0),
            0.1,
            None,
        );
        assert!(matches!(err, Err(M2tError::ShapeMismatch { .. })));
    }
}
