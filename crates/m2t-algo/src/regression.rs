//! Pairwise linear regression between customers' voltage and power.
//!
//! Two customers fed by the same service transformer see the same transformer
//! voltage, minus the drop along their own service drop:
//!
//! ```text
//! V_i ≈ V_tx - r_i·P_i - x_i·Q_i
//! V_j ≈ V_tx - r_j·P_j - x_j·Q_j
//! ```
//!
//! Subtracting eliminates `V_tx`, so for every pair the engine fits
//!
//! ```text
//! V_i - V_j = c + r_i·(-P_i) + r_j·(P_j) [+ x_i·(-Q_i) + x_j·(Q_j)]
//! ```
//!
//! by ordinary least squares over the samples where every involved series is
//! present. A pair on the same transformer fits almost perfectly (low MSE); a pair
//! on different transformers leaves the difference of two transformer voltages in
//! the residual. `|r_i| + |r_j|` and `|x_i| + |x_j|` serve as resistance-like and
//! reactance-like distances.
//!
//! Each unordered pair is fitted exactly once, so the output matrices are
//! symmetric bit for bit.

use m2t_core::{LinearSystemBackend, M2tError, M2tResult, MeasurementMatrix, PairMatrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which power measurements take part in the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predictors {
    RealPower,
    RealAndReactive,
}

impl Predictors {
    /// Number of coefficients including the intercept.
    pub fn coefficient_count(self) -> usize {
        match self {
            Predictors::RealPower => 3,
            Predictors::RealAndReactive => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Minimum complete samples for a pair fit to be attempted
    pub min_samples: usize,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self { min_samples: 10 }
    }
}

/// Pairwise fit matrices. Diagonals are NaN.
#[derive(Debug, Clone)]
pub struct PairwiseFit {
    pub predictors: Predictors,
    /// Mean squared residual; lower is a better fit
    pub mse: PairMatrix,
    /// Coefficient of determination
    pub r_squared: PairMatrix,
    /// `|r_i| + |r_j|`
    pub resistance: PairMatrix,
    /// `[i][j]` holds customer i's resistance coefficient from the (i, j) fit
    pub resistance_individual: PairMatrix,
    /// `|x_i| + |x_j|`, only with reactive power
    pub reactance: Option<PairMatrix>,
    pub reactance_individual: Option<PairMatrix>,
    /// Pairs with too few complete samples or a singular system
    pub failed_pairs: Vec<(usize, usize)>,
}

impl PairwiseFit {
    /// Reactance distance when available, otherwise resistance distance.
    pub fn electrical_distance(&self) -> &PairMatrix {
        self.reactance.as_ref().unwrap_or(&self.resistance)
    }
}

#[derive(Debug, Clone, Copy)]
struct PairEstimate {
    mse: f64,
    r_squared: f64,
    r: (f64, f64),
    x: Option<(f64, f64)>,
}

struct PairInputs<'a> {
    voltage: &'a MeasurementMatrix,
    real: &'a MeasurementMatrix,
    reactive: Option<&'a MeasurementMatrix>,
}

impl PairInputs<'_> {
    /// Predictor row `[1, -P_i, P_j, (-Q_i, Q_j)]` and response `V_i - V_j` at sample `t`.
    fn row(&self, i: usize, j: usize, t: usize, out: &mut Vec<f64>) -> Option<f64> {
        out.clear();
        let y = self.voltage.get(t, i) - self.voltage.get(t, j);
        out.extend([1.0, -self.real.get(t, i), self.real.get(t, j)]);
        if let Some(q) = self.reactive {
            out.extend([-q.get(t, i), q.get(t, j)]);
        }
        (y.is_finite() && out.iter().all(|v| v.is_finite())).then_some(y)
    }

    fn fit(
        &self,
        i: usize,
        j: usize,
        min_samples: usize,
        backend: &dyn LinearSystemBackend,
    ) -> Option<PairEstimate> {
        let k = if self.reactive.is_some() { 5 } else { 3 };
        let mut xtx = vec![vec![0.0; k]; k];
        let mut xty = vec![0.0; k];
        let mut row = Vec::with_capacity(k);
        let mut samples = Vec::new();

        for t in 0..self.voltage.n_samples() {
            if let Some(y) = self.row(i, j, t, &mut row) {
                for a in 0..k {
                    xty[a] += row[a] * y;
                    for b in 0..k {
                        xtx[a][b] += row[a] * row[b];
                    }
                }
                samples.push(t);
            }
        }
        if samples.len() < min_samples.max(k + 1) {
            return None;
        }

        let beta = backend.solve(&xtx, &xty).ok()?;

        let count = samples.len() as f64;
        let mut ys = Vec::with_capacity(samples.len());
        let mut ss_res = 0.0;
        for &t in &samples {
            let y = self.row(i, j, t, &mut row)?;
            let predicted: f64 = row.iter().zip(beta.iter()).map(|(x, b)| x * b).sum();
            ss_res += (y - predicted).powi(2);
            ys.push(y);
        }
        let mean_y = ys.iter().sum::<f64>() / count;
        let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            f64::NAN
        };

        Some(PairEstimate {
            mse: ss_res / count,
            r_squared,
            r: (beta[1], beta[2]),
            x: (k == 5).then(|| (beta[3], beta[4])),
        })
    }
}

/// Fit every customer pair and collect the fit matrices.
///
/// `voltage` is raw voltage; power units carry straight into the coefficient units.
pub fn pairwise_regression(
    voltage: &MeasurementMatrix,
    real_power: &MeasurementMatrix,
    reactive_power: Option<&MeasurementMatrix>,
    config: &RegressionConfig,
    backend: &dyn LinearSystemBackend,
) -> M2tResult<PairwiseFit> {
    let n = voltage.n_customers();
    let mut others = vec![("real power", real_power)];
    if let Some(q) = reactive_power {
        others.push(("reactive power", q));
    }
    for (name, matrix) in others {
        if matrix.n_customers() != n {
            return Err(M2tError::shape(format!("{name} columns"), n, matrix.n_customers()));
        }
        if matrix.n_samples() != voltage.n_samples() {
            return Err(M2tError::shape(
                format!("{name} samples"),
                voltage.n_samples(),
                matrix.n_samples(),
            ));
        }
    }

    let inputs = PairInputs {
        voltage,
        real: real_power,
        reactive: reactive_power,
    };
    let predictors = if reactive_power.is_some() {
        Predictors::RealAndReactive
    } else {
        Predictors::RealPower
    };

    // One task per row of the upper triangle; each pair is fitted once.
    let rows: Vec<Vec<Option<PairEstimate>>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (i + 1..n)
                .map(|j| inputs.fit(i, j, config.min_samples, backend))
                .collect()
        })
        .collect();

    let mut mse = PairMatrix::filled(n, f64::NAN);
    let mut r_squared = PairMatrix::filled(n, f64::NAN);
    let mut resistance = PairMatrix::filled(n, f64::NAN);
    let mut resistance_individual = PairMatrix::filled(n, f64::NAN);
    let mut reactance = reactive_power.map(|_| PairMatrix::filled(n, f64::NAN));
    let mut reactance_individual = reactive_power.map(|_| PairMatrix::filled(n, f64::NAN));
    let mut failed_pairs = Vec::new();

    for (i, row) in rows.into_iter().enumerate() {
        for (offset, estimate) in row.into_iter().enumerate() {
            let j = i + 1 + offset;
            let Some(est) = estimate else {
                failed_pairs.push((i, j));
                continue;
            };
            mse.set_symmetric(i, j, est.mse);
            r_squared.set_symmetric(i, j, est.r_squared);
            resistance.set_symmetric(i, j, est.r.0.abs() + est.r.1.abs());
            resistance_individual.set(i, j, est.r.0);
            resistance_individual.set(j, i, est.r.1);
            if let (Some(x), Some(dist), Some(indiv)) =
                (est.x, reactance.as_mut(), reactance_individual.as_mut())
            {
                dist.set_symmetric(i, j, x.0.abs() + x.1.abs());
                indiv.set(i, j, x.0);
                indiv.set(j, i, x.1);
            }
        }
    }

    if !failed_pairs.is_empty() {
        warn!(
            failed = failed_pairs.len(),
            "pairwise regression could not fit some customer pairs"
        );
    }
    info!(customers = n, ?predictors, "computed pairwise regression");

    Ok(PairwiseFit {
        predictors,
        mse,
        r_squared,
        resistance,
        resistance_individual,
        reactance,
        reactance_individual,
        failed_pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use m2t_core::{FaerSolver, GaussSolver};

    const SAMPLES: usize = 200;

    fn load(c: usize, t: usize) -> f64 {
        let t = t as f64;
        2.0 + (0.37 * (c as f64 + 1.0) * t).sin() + 0.5 * (1.3 * t + c as f64).cos()
    }

    fn vars(c: usize, t: usize) -> f64 {
        0.8 + 0.4 * (0.21 * (c as f64 + 2.0) * t as f64 + 0.5).sin()
    }

    fn tx_voltage(tx: usize, t: usize) -> f64 {
        240.0 + 1.5 * (0.05 * t as f64 + tx as f64 * 2.1).sin() + 0.7 * (0.9 * t as f64 * (tx as f64 + 1.0)).cos()
    }

    /// Customers 0-1 share transformer 0, customer 2 sits on transformer 1.
    fn feeder() -> (MeasurementMatrix, MeasurementMatrix, MeasurementMatrix) {
        let r = [0.30, 0.45, 0.25];
        let x = [0.10, 0.05, 0.20];
        let tx = [0, 0, 1];
        let mut v = Vec::new();
        let mut p = Vec::new();
        let mut q = Vec::new();
        for c in 0..3 {
            p.push((0..SAMPLES).map(|t| load(c, t)).collect::<Vec<_>>());
            q.push((0..SAMPLES).map(|t| vars(c, t)).collect::<Vec<_>>());
            v.push(
                (0..SAMPLES)
                    .map(|t| tx_voltage(tx[c], t) - r[c] * load(c, t) - x[c] * vars(c, t))
                    .collect::<Vec<_>>(),
            );
        }
        (
            MeasurementMatrix::from_columns(v).unwrap(),
            MeasurementMatrix::from_columns(p).unwrap(),
            MeasurementMatrix::from_columns(q).unwrap(),
        )
    }

    #[test]
    fn recovers_impedances_for_shared_transformer() {
        let (v, p, q) = feeder();
        let fit =
            pairwise_regression(&v, &p, Some(&q), &RegressionConfig::default(), &FaerSolver)
                .unwrap();
        assert_eq!(fit.predictors, Predictors::RealAndReactive);
        assert!(fit.failed_pairs.is_empty());
        assert!(fit.mse.get(0, 1) < 1e-12);
        assert!((fit.r_squared.get(0, 1) - 1.0).abs() < 1e-9);
        assert!((fit.resistance_individual.get(0, 1) - 0.30).abs() < 1e-6);
        assert!((fit.resistance_individual.get(1, 0) - 0.45).abs() < 1e-6);
        assert!((fit.resistance.get(0, 1) - 0.75).abs() < 1e-6);
        let reactance = fit.reactance.as_ref().unwrap();
        assert!((reactance.get(1, 0) - 0.15).abs() < 1e-6);
        assert!(fit.mse.get(0, 2) > 1e-3);
        assert!(fit.mse.get(0, 2) > 1e6 * fit.mse.get(0, 1).max(1e-18));
    }

    #[test]
    fn outputs_are_symmetric() {
        let (v, p, q) = feeder();
        let fit =
            pairwise_regression(&v, &p, Some(&q), &RegressionConfig::default(), &FaerSolver)
                .unwrap();
        assert!(fit.mse.is_symmetric(0.0));
        assert!(fit.r_squared.is_symmetric(0.0));
        assert!(fit.resistance.is_symmetric(0.0));
        assert!(fit.reactance.unwrap().is_symmetric(0.0));
        assert!(fit.mse.get(1, 1).is_nan());
    }

    #[test]
    fn real_power_only_variant() {
        let (v, p, _) = feeder();
        let fit = pairwise_regression(&v, &p, None, &RegressionConfig::default(), &GaussSolver)
            .unwrap();
        assert_eq!(fit.predictors, Predictors::RealPower);
        assert!(fit.reactance.is_none());
        assert!(std::ptr::eq(fit.electrical_distance(), &fit.resistance));
        assert!(fit.mse.get(0, 1).is_finite());
    }

    #[test]
    fn missing_rows_are_skipped_and_short_pairs_fail() {
        let (v, p, q) = feeder();
        let mut columns: Vec<Vec<f64>> = v.columns().map(|c| c.to_vec()).collect();
        for value in columns[0].iter_mut().step_by(3) {
            *value = f64::NAN;
        }
        columns[2] = vec![f64::NAN; SAMPLES];
        columns[2][0] = 240.0;
        let v = MeasurementMatrix::from_columns(columns).unwrap();
        let fit =
            pairwise_regression(&v, &p, Some(&q), &RegressionConfig::default(), &FaerSolver)
                .unwrap();
        assert!(fit.mse.get(0, 1) < 1e-12);
        assert_eq!(fit.failed_pairs, vec![(0, 2), (1, 2)]);
        assert!(fit.resistance.get(2, 0).is_nan());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let (v, p, _) = feeder();
        let short = MeasurementMatrix::from_columns(vec![vec![1.0; 5]; 3]).unwrap();
        assert!(matches!(
            pairwise_regression(&v, &p, Some(&short), &RegressionConfig::default(), &FaerSolver),
            Err(M2tError::ShapeMismatch { .. })
        ));
    }
}
