//! Small hand-built scenarios exercising the stages through the public API.

use m2t_algo::{
    adjust_distance_from_threshold, find_min_mse, reassign_flagged, sweep_thresholds,
    transformer_prediction_errors, windowed_median_correlation, Assignment, CorrelationConfig,
    ReassignmentConfig, ReassignmentInputs,
};
use m2t_core::{CustomerId, MeasurementMatrix, PairMatrix, TransformerId, TransformerLabels};

fn ids(n: usize) -> Vec<CustomerId> {
    (0..n).map(|i| CustomerId::new(format!("cust-{i}"))).collect()
}

fn uniform_pairs(n: usize, diagonal: f64, value: f64) -> PairMatrix {
    let mut m = PairMatrix::with_diagonal(n, diagonal);
    for i in 0..n {
        for j in i + 1..n {
            m.set_symmetric(i, j, value);
        }
    }
    m
}

#[test]
fn uncorrelated_customer_leaves_group_and_pair_stays() {
    // Period-2 and period-4 square waves are orthogonal over every 8-sample window.
    let alternating: Vec<f64> = (0..64).map(|t| if t % 2 == 0 { 1.0 } else { -1.0 }).collect();
    let paired: Vec<f64> = (0..64).map(|t| if t % 4 < 2 { 1.0 } else { -1.0 }).collect();
    let delta =
        MeasurementMatrix::from_columns(vec![alternating, paired.clone(), paired]).unwrap();
    let customer_ids = ids(3);
    let labels = TransformerLabels::from_raw(&[11, 11, 11]);

    let corr = windowed_median_correlation(&delta, &customer_ids, &CorrelationConfig::new(8))
        .unwrap();
    assert!(corr.matrix.get(0, 1).abs() < 1e-12);
    assert!((corr.matrix.get(1, 2) - 1.0).abs() < 1e-12);

    let grid = [0.25, 0.5, 0.75, 0.9];
    let sweep = sweep_thresholds(&labels, &grid, &corr.matrix, &corr.no_votes, -999).unwrap();
    assert_eq!(sweep.flagged_at(0.5).unwrap(), &[TransformerId::new(11)]);
    assert_eq!(sweep.ranked[0].first_flagged_at, 0.25);

    let fit = uniform_pairs(3, f64::NAN, 0.1);
    let calibrated = find_min_mse(&fit, 0.02).unwrap();
    let distance = uniform_pairs(3, 0.0, 0.3);
    let adjusted =
        adjust_distance_from_threshold(&fit, &distance, calibrated.threshold, None).unwrap();

    let flagged = sweep.flagged_at(0.5).unwrap().to_vec();
    let inputs = ReassignmentInputs {
        customer_ids: &customer_ids,
        labels: &labels,
        flagged: &flagged,
        correlation: &corr.matrix,
        excluded: &corr.no_votes,
        fit: &fit,
        mse_threshold: calibrated.threshold,
        adjusted_distance: &adjusted,
        adjusted_reactance: None,
        geo_distance: None,
    };
    let prediction = reassign_flagged(&inputs, &ReassignmentConfig::default()).unwrap();

    assert!(matches!(prediction.assignments[0], Assignment::Provisional { .. }));
    let predicted = prediction.label_vector();
    assert_eq!(predicted.get(1), TransformerId::new(11));
    assert_eq!(predicted.get(2), TransformerId::new(11));
    assert_ne!(predicted.get(0), TransformerId::new(11));
}

#[test]
fn calibration_threshold_and_replacement() {
    let fit = PairMatrix::from_rows(&[
        vec![f64::NAN, 0.10, 0.20],
        vec![0.10, f64::NAN, 0.11],
        vec![0.20, 0.11, f64::NAN],
    ])
    .unwrap();
    let distance = PairMatrix::from_rows(&[
        vec![0.0, 0.5, 0.1],
        vec![0.5, 0.0, 0.7],
        vec![0.1, 0.7, 0.0],
    ])
    .unwrap();

    let calibrated = find_min_mse(&fit, 0.02).unwrap();
    assert!((calibrated.threshold - 0.12).abs() < 1e-12);

    let adjusted =
        adjust_distance_from_threshold(&fit, &distance, calibrated.threshold, None).unwrap();
    // (0, 2) fits at 0.20 > 0.12 and takes the matrix maximum
    assert_eq!(adjusted.get(0, 2), 0.7);
    assert_eq!(adjusted.get(2, 0), 0.7);
    assert_eq!(adjusted.get(0, 1), 0.5);
    assert_eq!(adjusted.get(1, 2), 0.7);
}

#[test]
fn faithful_prediction_has_no_incorrect_transformers() {
    // A = customers 1..=3, B = customers 4..=5 (zero-based 0..=2 and 3..=4)
    let truth = TransformerLabels::from_raw(&[100, 100, 100, 200, 200]);
    let predicted = TransformerLabels::from_raw(&[100, 100, 100, 200, 200]);
    let report = transformer_prediction_errors(&predicted, &truth, &ids(5), -999).unwrap();
    assert_eq!(report.incorrect_count(), 0);
    assert_eq!(report.transformer_accuracy, 1.0);
}
