//! Accuracy metrics for comparing predicted labels against ground truth.

use m2t_core::{CustomerId, M2tError, M2tResult, TransformerId, TransformerLabels};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Result of scoring a predicted labeling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    /// Ground-truth transformers whose predicted membership differs from the truth.
    /// Single-customer transformers carrying the marker label appear under the marker.
    pub incorrect_transformers: Vec<TransformerId>,
    /// Customers belonging to an incorrect transformer
    pub incorrect_customers: Vec<usize>,
    pub incorrect_customer_ids: Vec<CustomerId>,
    pub total_transformers: usize,
    pub total_customers: usize,
    /// Correct transformers / total transformers
    pub transformer_accuracy: f64,
    /// Customers in correct transformers / total customers
    pub customer_pairing_accuracy: f64,
}

impl AccuracyReport {
    pub fn incorrect_count(&self) -> usize {
        self.incorrect_transformers.len()
    }

    pub fn is_perfect(&self) -> bool {
        self.incorrect_transformers.is_empty()
    }

    /// Transformers fixed relative to `baseline` (negative when worse).
    pub fn improvement_over(&self, baseline: &AccuracyReport) -> i64 {
        baseline.incorrect_count() as i64 - self.incorrect_count() as i64
    }
}

/// Group of every customer; marker customers form their own singleton group.
fn membership(labels: &TransformerLabels, marker: i64) -> Vec<BTreeSet<usize>> {
    let mut groups: BTreeMap<TransformerId, BTreeSet<usize>> = BTreeMap::new();
    for (c, label) in labels.as_slice().iter().enumerate() {
        if label.value() != marker {
            groups.entry(*label).or_default().insert(c);
        }
    }
    labels
        .as_slice()
        .iter()
        .enumerate()
        .map(|(c, label)| {
            if label.value() == marker {
                BTreeSet::from([c])
            } else {
                groups.get(label).cloned().unwrap_or_default()
            }
        })
        .collect()
}

/// Score `predicted` against `truth`.
///
/// A ground-truth transformer is correct when every one of its customers ends up in
/// a predicted group with exactly the same membership, no additions and no
/// omissions. Label values themselves do not have to match, so provisional negative
/// labels count as correct when they reproduce a real transformer.
pub fn transformer_prediction_errors(
    predicted: &TransformerLabels,
    truth: &TransformerLabels,
    customer_ids: &[CustomerId],
    single_cust_marker: i64,
) -> M2tResult<AccuracyReport> {
    let n = truth.len();
    if predicted.len() != n {
        return Err(M2tError::shape("predicted labels", n, predicted.len()));
    }
    if customer_ids.len() != n {
        return Err(M2tError::shape("customer ids", n, customer_ids.len()));
    }
    if n == 0 {
        return Err(M2tError::Validation("no customers to score".into()));
    }

    let predicted_groups = membership(predicted, single_cust_marker);
    let mut truth_groups: Vec<(TransformerId, BTreeSet<usize>)> = truth
        .groups(single_cust_marker)
        .into_iter()
        .map(|(t, members)| (t, members.into_iter().collect()))
        .collect();
    truth_groups.extend(
        truth
            .as_slice()
            .iter()
            .enumerate()
            .filter(|(_, l)| l.value() == single_cust_marker)
            .map(|(c, l)| (*l, BTreeSet::from([c]))),
    );

    let mut incorrect_transformers = Vec::new();
    let mut incorrect_customers = Vec::new();
    for (transformer, members) in &truth_groups {
        let correct = members.iter().all(|&c| predicted_groups[c] == *members);
        if !correct {
            incorrect_transformers.push(*transformer);
            incorrect_customers.extend(members.iter().copied());
        }
    }
    incorrect_customers.sort_unstable();

    let total_transformers = truth_groups.len();
    let correct_transformers = total_transformers - incorrect_transformers.len();
    Ok(AccuracyReport {
        incorrect_customer_ids: incorrect_customers
            .iter()
            .map(|&c| customer_ids[c].clone())
            .collect(),
        transformer_accuracy: correct_transformers as f64 / total_transformers as f64,
        customer_pairing_accuracy: (n - incorrect_customers.len()) as f64 / n as f64,
        incorrect_transformers,
        incorrect_customers,
        total_transformers,
        total_customers: n,
    })
}
