//! Reassignment of customers out of flagged transformer groups.
//!
//! Per flagged group the engine walks these states:
//!
//! 1. **Unresolved**: the group failed the correlation floor.
//! 2. **Split**: voting members are pruned greedily until the remaining core is
//!    mutually above the floor. Pruned members become suspects. A core smaller than
//!    two dissolves the group and every voting member becomes a suspect.
//! 3. **Evaluated**: every suspect is scored against every *other* group, using the
//!    original (pre-pass) group composition.
//! 4. **Resolved**: the suspect merges into the eligible candidate with the smallest
//!    mean adjusted electrical distance, or ends up in a provisional group pending
//!    external mapping.
//!
//! All decisions are taken against the original labels and applied at the end of
//! the pass, so the result does not depend on the order suspects are visited.

use m2t_core::{
    stats::{nan_mean, nan_min},
    CustomerId, M2tError, M2tResult, PairMatrix, TransformerId, TransformerLabels,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReassignmentConfig {
    /// Correlation floor for group membership (the operating sweep threshold)
    pub not_member_threshold: f64,
    /// Upper bound on the closest adjusted reactance to a candidate group
    pub reactance_threshold: Option<f64>,
    /// Upper bound on the closest geographic distance to a candidate group
    pub dist_threshold: Option<f64>,
    pub single_cust_marker: i64,
}

impl Default for ReassignmentConfig {
    fn default() -> Self {
        Self {
            not_member_threshold: 0.5,
            reactance_threshold: Some(0.046),
            dist_threshold: None,
            single_cust_marker: m2t_core::DEFAULT_SINGLE_CUST_MARKER,
        }
    }
}

/// Everything the reassignment pass reads. All matrices are customer x customer.
#[derive(Debug, Clone, Copy)]
pub struct ReassignmentInputs<'a> {
    pub customer_ids: &'a [CustomerId],
    pub labels: &'a TransformerLabels,
    /// Flagged transformers at the operating threshold
    pub flagged: &'a [TransformerId],
    pub correlation: &'a PairMatrix,
    /// No-votes customers; never suspects and never counted as voting members
    pub excluded: &'a [usize],
    /// Pairwise goodness of fit (MSE)
    pub fit: &'a PairMatrix,
    /// Calibrated trust threshold on `fit`
    pub mse_threshold: f64,
    /// Electrical distance after calibration
    pub adjusted_distance: &'a PairMatrix,
    pub adjusted_reactance: Option<&'a PairMatrix>,
    pub geo_distance: Option<&'a PairMatrix>,
}

/// Why a candidate group was not eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    LowCorrelation,
    NoTrustedFit,
    NoDistance,
    ReactanceAboveThreshold,
    OutsideDistanceThreshold,
}

/// Audit record of one suspect scored against one candidate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub customer: usize,
    pub transformer: TransformerId,
    pub mean_correlation: Option<f64>,
    pub min_correlation: Option<f64>,
    pub mean_distance: Option<f64>,
    pub min_reactance: Option<f64>,
    /// Members whose fit with the customer is within the trust threshold
    pub trusted_pairs: usize,
    pub min_geo_distance: Option<f64>,
    pub rejection: Option<Rejection>,
}

impl CandidateScore {
    pub fn is_eligible(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Final placement of a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assignment {
    /// Kept its original transformer
    Original { transformer: TransformerId },
    /// Moved to an existing transformer group
    Merged {
        from: TransformerId,
        into: TransformerId,
    },
    /// Member of a newly discovered group awaiting a real transformer id
    Provisional { from: TransformerId, group: usize },
}

/// Newly discovered grouping of customers that matched no existing transformer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionalGroup {
    pub id: usize,
    /// Negative placeholder label used by [`Prediction::label_vector`]
    pub label: TransformerId,
    pub members: Vec<usize>,
    pub member_ids: Vec<CustomerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerChange {
    pub index: usize,
    pub customer_id: CustomerId,
    pub original: TransformerId,
    pub predicted: TransformerId,
}

/// Outcome of a reassignment pass.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub assignments: Vec<Assignment>,
    pub provisional_groups: Vec<ProvisionalGroup>,
    pub changes: Vec<CustomerChange>,
    /// Customers pulled out of flagged groups, in evaluation order
    pub suspects: Vec<usize>,
    pub candidate_scores: Vec<CandidateScore>,
}

impl Prediction {
    /// Label of one customer after the pass.
    pub fn predicted_label(&self, customer: usize) -> TransformerId {
        match self.assignments[customer] {
            Assignment::Original { transformer } => transformer,
            Assignment::Merged { into, .. } => into,
            Assignment::Provisional { group, .. } => self.provisional_groups[group].label,
        }
    }

    /// Legacy label vector: provisional groups carry their negative placeholder.
    pub fn label_vector(&self) -> TransformerLabels {
        TransformerLabels::new(
            (0..self.assignments.len())
                .map(|c| self.predicted_label(c))
                .collect(),
        )
    }

    pub fn scores_for(&self, customer: usize) -> impl Iterator<Item = &CandidateScore> {
        self.candidate_scores
            .iter()
            .filter(move |s| s.customer == customer)
    }
}

impl ReassignmentInputs<'_> {
    fn validate(&self, config: &ReassignmentConfig) -> M2tResult<()> {
        let n = self.labels.len();
        if self.customer_ids.len() != n {
            return Err(M2tError::shape("customer ids", n, self.customer_ids.len()));
        }
        self.correlation.expect_dim("correlation matrix", n)?;
        self.fit.expect_dim("fit matrix", n)?;
        self.adjusted_distance.expect_dim("adjusted distance matrix", n)?;
        if let Some(x) = self.adjusted_reactance {
            x.expect_dim("adjusted reactance matrix", n)?;
        }
        if let Some(g) = self.geo_distance {
            g.expect_dim("geographic distance matrix", n)?;
        }
        if let Some(&bad) = self.excluded.iter().find(|&&c| c >= n) {
            return Err(M2tError::Validation(format!(
                "excluded customer index {bad} out of range for {n} customers"
            )));
        }
        if !config.not_member_threshold.is_finite() {
            return Err(M2tError::Config("not-member threshold must be finite".into()));
        }
        for (name, value) in [
            ("reactance threshold", config.reactance_threshold),
            ("distance threshold", config.dist_threshold),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(M2tError::Config(format!(
                        "{name} must be finite and non-negative, got {v}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn is_excluded(&self, customer: usize) -> bool {
        self.excluded.contains(&customer)
    }

    fn trusted(&self, a: usize, b: usize) -> bool {
        let fit = self.fit.get(a, b);
        fit.is_finite() && fit <= self.mse_threshold
    }

    fn within_geo_gate(&self, a: usize, b: usize, config: &ReassignmentConfig) -> bool {
        match (config.dist_threshold, self.geo_distance) {
            (Some(limit), Some(geo)) => geo.get(a, b) <= limit,
            _ => true,
        }
    }

    /// Two unmatched suspects may share a provisional group.
    fn compatible(&self, a: usize, b: usize, config: &ReassignmentConfig) -> bool {
        self.correlation.get(a, b) >= config.not_member_threshold
            && self.trusted(a, b)
            && self.within_geo_gate(a, b, config)
    }
}

/// Members of `core` that should leave it, and what remains.
///
/// Repeatedly removes the member with the most sub-threshold partners (ties: lowest
/// mean correlation to the core, then highest index) until no pair is below the
/// floor.
fn extract_core(core: &mut Vec<usize>, correlation: &PairMatrix, threshold: f64) -> Vec<usize> {
    let mut pruned = Vec::new();
    loop {
        let worst = core
            .iter()
            .enumerate()
            .map(|(pos, &c)| {
                let others = core.iter().filter(|&&o| o != c);
                let violations = others
                    .clone()
                    .filter(|&&o| correlation.get(c, o) < threshold)
                    .count();
                let mean = nan_mean(others.map(|&o| correlation.get(c, o)))
                    .unwrap_or(f64::NEG_INFINITY);
                (pos, c, violations, mean)
            })
            .filter(|(_, _, violations, _)| *violations > 0)
            .max_by(|a, b| {
                a.2.cmp(&b.2)
                    .then_with(|| b.3.total_cmp(&a.3))
                    .then_with(|| a.1.cmp(&b.1))
            });
        match worst {
            Some((pos, customer, _, _)) => {
                core.remove(pos);
                pruned.push(customer);
            }
            None => break,
        }
    }
    pruned.sort_unstable();
    pruned
}

fn score_candidate(
    customer: usize,
    transformer: TransformerId,
    members: &[usize],
    inputs: &ReassignmentInputs<'_>,
    config: &ReassignmentConfig,
) -> CandidateScore {
    let voting = members.iter().filter(|&&m| !inputs.is_excluded(m));
    let mean_correlation = nan_mean(voting.clone().map(|&m| inputs.correlation.get(customer, m)));
    let min_correlation = nan_min(voting.map(|&m| inputs.correlation.get(customer, m)));
    let mean_distance = nan_mean(
        members
            .iter()
            .map(|&m| inputs.adjusted_distance.get(customer, m)),
    );
    let min_reactance = inputs
        .adjusted_reactance
        .and_then(|x| nan_min(members.iter().map(|&m| x.get(customer, m))));
    let trusted_pairs = members
        .iter()
        .filter(|&&m| inputs.trusted(customer, m))
        .count();
    let min_geo_distance = inputs
        .geo_distance
        .and_then(|g| nan_min(members.iter().map(|&m| g.get(customer, m))));

    let rejection = if !mean_correlation.is_some_and(|c| c >= config.not_member_threshold) {
        Some(Rejection::LowCorrelation)
    } else if trusted_pairs == 0 {
        Some(Rejection::NoTrustedFit)
    } else if mean_distance.is_none() {
        Some(Rejection::NoDistance)
    } else if config.reactance_threshold.is_some_and(|limit| {
        inputs.adjusted_reactance.is_some() && !min_reactance.is_some_and(|x| x <= limit)
    }) {
        Some(Rejection::ReactanceAboveThreshold)
    } else if config.dist_threshold.is_some_and(|limit| {
        inputs.geo_distance.is_some() && !min_geo_distance.is_some_and(|d| d <= limit)
    }) {
        Some(Rejection::OutsideDistanceThreshold)
    } else {
        None
    };

    CandidateScore {
        customer,
        transformer,
        mean_correlation,
        min_correlation,
        mean_distance,
        min_reactance,
        trusted_pairs,
        min_geo_distance,
        rejection,
    }
}

/// Smallest mean distance wins; equal distances keep the lowest transformer id.
fn select_candidate(scores: &[CandidateScore]) -> Option<&CandidateScore> {
    scores
        .iter()
        .filter(|s| s.is_eligible())
        .fold(None, |best: Option<&CandidateScore>, s| match best {
            Some(b) if b.mean_distance <= s.mean_distance => Some(b),
            _ => Some(s),
        })
}

/// Placeholder labels -1, -2, ... that collide with neither the marker nor a real label.
fn provisional_labels(labels: &TransformerLabels, marker: i64) -> impl Iterator<Item = TransformerId> {
    let used: BTreeSet<i64> = labels.as_slice().iter().map(|l| l.value()).collect();
    (1..)
        .map(|k: i64| -k)
        .filter(move |l| *l != marker && !used.contains(l))
        .map(TransformerId::new)
}

/// Suspect with the group it was pulled from.
struct Suspect {
    customer: usize,
    origin: TransformerId,
    dissolved: bool,
}

/// Resolve every flagged transformer group.
pub fn reassign_flagged(
    inputs: &ReassignmentInputs<'_>,
    config: &ReassignmentConfig,
) -> M2tResult<Prediction> {
    inputs.validate(config)?;
    let marker = config.single_cust_marker;
    let groups = inputs.labels.groups(marker);

    let mut suspects = Vec::new();
    for transformer in inputs.flagged {
        let Some(members) = groups.get(transformer) else {
            warn!(%transformer, "flagged transformer has no members; skipping");
            continue;
        };
        let mut core: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&m| !inputs.is_excluded(m))
            .collect();
        let voting = core.clone();
        let pruned = extract_core(&mut core, inputs.correlation, config.not_member_threshold);
        let (pulled, dissolved) = if core.len() < 2 {
            (voting, true)
        } else {
            (pruned, false)
        };
        debug!(
            %transformer,
            suspects = pulled.len(),
            dissolved,
            "split flagged transformer group"
        );
        suspects.extend(pulled.into_iter().map(|customer| Suspect {
            customer,
            origin: *transformer,
            dissolved,
        }));
    }

    let mut assignments: Vec<Assignment> = inputs
        .labels
        .as_slice()
        .iter()
        .map(|&transformer| Assignment::Original { transformer })
        .collect();
    let mut candidate_scores = Vec::new();
    let mut unmatched = Vec::new();

    for suspect in &suspects {
        let scores: Vec<CandidateScore> = groups
            .iter()
            .filter(|(t, _)| **t != suspect.origin)
            .map(|(t, members)| score_candidate(suspect.customer, *t, members, inputs, config))
            .collect();
        match select_candidate(&scores) {
            Some(best) => {
                debug!(
                    customer = suspect.customer,
                    from = %suspect.origin,
                    into = %best.transformer,
                    distance = ?best.mean_distance,
                    "merged suspect into existing transformer"
                );
                assignments[suspect.customer] = Assignment::Merged {
                    from: suspect.origin,
                    into: best.transformer,
                };
            }
            None => {
                debug!(customer = suspect.customer, from = %suspect.origin, "no eligible candidate");
                unmatched.push(suspect);
            }
        }
        candidate_scores.extend(scores);
    }

    // A dissolved group keeps its label on its first unmatched member.
    let mut kept = BTreeSet::new();
    unmatched.retain(|s| !(s.dissolved && kept.insert(s.origin)));

    let mut clusters: Vec<Vec<&Suspect>> = Vec::new();
    for suspect in unmatched {
        let home = clusters.iter().position(|cluster| {
            cluster
                .iter()
                .all(|other| inputs.compatible(suspect.customer, other.customer, config))
        });
        match home {
            Some(idx) => clusters[idx].push(suspect),
            None => clusters.push(vec![suspect]),
        }
    }

    let mut labels = provisional_labels(inputs.labels, marker);
    let mut provisional_groups = Vec::with_capacity(clusters.len());
    for (id, cluster) in clusters.into_iter().enumerate() {
        let label = labels
            .next()
            .ok_or_else(|| M2tError::Other("ran out of provisional labels".into()))?;
        for s in &cluster {
            assignments[s.customer] = Assignment::Provisional {
                from: s.origin,
                group: id,
            };
        }
        let members: Vec<usize> = cluster.iter().map(|s| s.customer).collect();
        provisional_groups.push(ProvisionalGroup {
            id,
            label,
            member_ids: members
                .iter()
                .map(|&c| inputs.customer_ids[c].clone())
                .collect(),
            members,
        });
    }

    let mut prediction = Prediction {
        assignments,
        provisional_groups,
        changes: Vec::new(),
        suspects: suspects.iter().map(|s| s.customer).collect(),
        candidate_scores,
    };
    let predicted = prediction.label_vector();
    prediction.changes = predicted
        .changed_from(inputs.labels)?
        .into_iter()
        .map(|c| CustomerChange {
            index: c,
            customer_id: inputs.customer_ids[c].clone(),
            original: inputs.labels.get(c),
            predicted: predicted.get(c),
        })
        .collect();

    info!(
        flagged = inputs.flagged.len(),
        suspects = prediction.suspects.len(),
        changed = prediction.changes.len(),
        provisional_groups = prediction.provisional_groups.len(),
        "reassignment pass complete"
    );
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<CustomerId> {
        (0..n).map(|i| CustomerId::new(format!("c{i}"))).collect()
    }

    /// Symmetric matrix from an upper-triangle closure.
    fn pair_matrix(n: usize, diagonal: f64, f: impl Fn(usize, usize) -> f64) -> PairMatrix {
        let mut m = PairMatrix::with_diagonal(n, diagonal);
        for i in 0..n {
            for j in i + 1..n {
                m.set_symmetric(i, j, f(i, j));
            }
        }
        m
    }

    fn config() -> ReassignmentConfig {
        ReassignmentConfig {
            reactance_threshold: None,
            ..ReassignmentConfig::default()
        }
    }

    struct Fixture {
        ids: Vec<CustomerId>,
        labels: TransformerLabels,
        corr: PairMatrix,
        fit: PairMatrix,
        dist: PairMatrix,
    }

    impl Fixture {
        fn inputs<'a>(&'a self, flagged: &'a [TransformerId]) -> ReassignmentInputs<'a> {
            ReassignmentInputs {
                customer_ids: &self.ids,
                labels: &self.labels,
                flagged,
                correlation: &self.corr,
                excluded: &[],
                fit: &self.fit,
                mse_threshold: 0.12,
                adjusted_distance: &self.dist,
                adjusted_reactance: None,
                geo_distance: None,
            }
        }
    }

    /// Customer 0 is labelled A(1) but electrically belongs to B(2) = {3, 4}.
    fn mislabeled_feeder() -> Fixture {
        let truth = [2, 1, 1, 2, 2];
        let same = |i: usize, j: usize| truth[i] == truth[j];
        Fixture {
            ids: ids(5),
            labels: TransformerLabels::from_raw(&[1, 1, 1, 2, 2]),
            corr: pair_matrix(5, 1.0, |i, j| if same(i, j) { 0.9 } else { 0.1 }),
            fit: pair_matrix(5, f64::NAN, |i, j| if same(i, j) { 0.1 } else { 0.5 }),
            dist: pair_matrix(5, 0.0, |i, j| if same(i, j) { 0.2 } else { 1.0 }),
        }
    }

    #[test]
    fn round_trip_moves_the_uncorrelated_customer() {
        let fixture = Fixture {
            ids: ids(3),
            labels: TransformerLabels::from_raw(&[7, 7, 7]),
            corr: pair_matrix(3, 1.0, |i, j| if (i, j) == (1, 2) { 1.0 } else { 0.0 }),
            fit: pair_matrix(3, f64::NAN, |_, _| 0.1),
            dist: pair_matrix(3, 0.0, |_, _| 0.2),
        };
        let flagged = [TransformerId::new(7)];
        let prediction = reassign_flagged(&fixture.inputs(&flagged), &config()).unwrap();
        assert_eq!(prediction.suspects, vec![0]);
        assert_eq!(
            prediction.assignments[0],
            Assignment::Provisional {
                from: TransformerId::new(7),
                group: 0
            }
        );
        assert_eq!(prediction.provisional_groups[0].members, vec![0]);
        assert_eq!(prediction.label_vector().raw(), vec![-1, 7, 7]);
        assert_eq!(prediction.changes.len(), 1);
        assert_eq!(prediction.changes[0].predicted, TransformerId::new(-1));
    }

    #[test]
    fn mislabeled_customer_merges_into_best_group() {
        let fixture = mislabeled_feeder();
        let flagged = [TransformerId::new(1)];
        let prediction = reassign_flagged(&fixture.inputs(&flagged), &config()).unwrap();
        assert_eq!(
            prediction.assignments[0],
            Assignment::Merged {
                from: TransformerId::new(1),
                into: TransformerId::new(2)
            }
        );
        assert_eq!(prediction.label_vector().raw(), vec![2, 1, 1, 2, 2]);
        let scores: Vec<_> = prediction.scores_for(0).collect();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].trusted_pairs, 2);
        assert!(prediction.provisional_groups.is_empty());
    }

    #[test]
    fn geographic_gate_blocks_distant_group() {
        let fixture = mislabeled_feeder();
        let geo = pair_matrix(5, 0.0, |i, j| if i == 0 && j >= 3 { 900.0 } else { 50.0 });
        let flagged = [TransformerId::new(1)];
        let inputs = ReassignmentInputs {
            geo_distance: Some(&geo),
            ..fixture.inputs(&flagged)
        };
        let cfg = ReassignmentConfig {
            dist_threshold: Some(200.0),
            ..config()
        };
        let prediction = reassign_flagged(&inputs, &cfg).unwrap();
        assert!(matches!(
            prediction.assignments[0],
            Assignment::Provisional { group: 0, .. }
        ));
        assert_eq!(prediction.provisional_groups[0].member_ids, vec![CustomerId::new("c0")]);
        let score = prediction.scores_for(0).next().unwrap();
        assert_eq!(score.rejection, Some(Rejection::OutsideDistanceThreshold));
    }

    #[test]
    fn reactance_gate_applies_only_with_reactance() {
        let fixture = mislabeled_feeder();
        let reactance = pair_matrix(5, 0.0, |_, _| 0.5);
        let flagged = [TransformerId::new(1)];
        let inputs = ReassignmentInputs {
            adjusted_reactance: Some(&reactance),
            ..fixture.inputs(&flagged)
        };
        let prediction = reassign_flagged(&inputs, &ReassignmentConfig::default()).unwrap();
        let score = prediction.scores_for(0).next().unwrap();
        assert_eq!(score.rejection, Some(Rejection::ReactanceAboveThreshold));

        let prediction =
            reassign_flagged(&fixture.inputs(&flagged), &ReassignmentConfig::default()).unwrap();
        assert!(matches!(prediction.assignments[0], Assignment::Merged { .. }));
    }

    #[test]
    fn equal_distances_pick_lowest_transformer_id() {
        // Customer 0 (label 9) fits groups 3 and 5 equally well.
        let labels = TransformerLabels::from_raw(&[9, 9, 9, 5, 5, 3, 3]);
        let fixture = Fixture {
            ids: ids(7),
            labels,
            corr: pair_matrix(7, 1.0, |i, j| match (i, j) {
                (1, 2) => 0.95,
                (0, _) if j >= 3 => 0.9,
                (3, 4) | (5, 6) => 0.9,
                _ => 0.0,
            }),
            fit: pair_matrix(7, f64::NAN, |_, _| 0.1),
            dist: pair_matrix(7, 0.0, |_, _| 0.3),
        };
        let flagged = [TransformerId::new(9)];
        let prediction = reassign_flagged(&fixture.inputs(&flagged), &config()).unwrap();
        assert_eq!(prediction.predicted_label(0), TransformerId::new(3));
    }

    #[test]
    fn dissolved_group_keeps_label_on_first_unmatched_member() {
        let fixture = Fixture {
            ids: ids(4),
            labels: TransformerLabels::from_raw(&[1, 1, 2, 2]),
            corr: pair_matrix(4, 1.0, |i, j| if (i, j) == (2, 3) { 0.9 } else { 0.0 }),
            fit: pair_matrix(4, f64::NAN, |_, _| 0.1),
            dist: pair_matrix(4, 0.0, |_, _| 0.3),
        };
        let flagged = [TransformerId::new(1)];
        let prediction = reassign_flagged(&fixture.inputs(&flagged), &config()).unwrap();
        assert_eq!(prediction.suspects, vec![0, 1]);
        assert_eq!(prediction.predicted_label(0), TransformerId::new(1));
        assert_eq!(prediction.predicted_label(1), TransformerId::new(-1));
        assert_eq!(prediction.changes.len(), 1);
    }

    #[test]
    fn compatible_suspects_share_a_provisional_group() {
        // Group 1 = {0, 1, 2, 3} holds two unrelated pairs; pruning keeps {0, 1}.
        let fixture = Fixture {
            ids: ids(6),
            labels: TransformerLabels::from_raw(&[1, 1, 1, 1, 4, 4]),
            corr: pair_matrix(6, 1.0, |i, j| match (i, j) {
                (0, 1) | (2, 3) | (4, 5) => 0.9,
                _ => 0.0,
            }),
            fit: pair_matrix(6, f64::NAN, |_, _| 0.1),
            dist: pair_matrix(6, 0.0, |_, _| 0.3),
        };
        let flagged = [TransformerId::new(1)];
        let prediction = reassign_flagged(&fixture.inputs(&flagged), &config()).unwrap();
        assert_eq!(prediction.provisional_groups.len(), 1);
        assert_eq!(prediction.suspects, vec![2, 3]);
        assert_eq!(prediction.provisional_groups[0].members, vec![2, 3]);
        assert_eq!(prediction.label_vector().raw(), vec![1, 1, -1, -1, 4, 4]);
    }

    #[test]
    fn provisional_labels_skip_marker_and_existing_labels() {
        let labels = TransformerLabels::from_raw(&[-1, 3]);
        let generated: Vec<i64> = provisional_labels(&labels, -2)
            .take(3)
            .map(|l| l.value())
            .collect();
        assert_eq!(generated, vec![-3, -4, -5]);
    }

    #[test]
    fn excluded_customers_are_not_suspects() {
        let fixture = mislabeled_feeder();
        let flagged = [TransformerId::new(1)];
        let excluded = [0];
        let inputs = ReassignmentInputs {
            excluded: &excluded,
            ..fixture.inputs(&flagged)
        };
        let prediction = reassign_flagged(&inputs, &config()).unwrap();
        assert!(prediction.suspects.is_empty());
        assert!(prediction.changes.is_empty());
    }

    #[test]
    fn excluded_candidate_member_does_not_vote() {
        // B(2) = {3, 4, 5}; customer 5 has no votes and a stale -1.0 against customer 0
        let truth = [2, 1, 1, 2, 2, 2];
        let same = |i: usize, j: usize| truth[i] == truth[j];
        let fixture = Fixture {
            ids: ids(6),
            labels: TransformerLabels::from_raw(&[1, 1, 1, 2, 2, 2]),
            corr: pair_matrix(6, 1.0, |i, j| match (i, j) {
                (0, 5) => -1.0,
                _ if same(i, j) => 0.9,
                _ => 0.1,
            }),
            fit: pair_matrix(6, f64::NAN, |i, j| if same(i, j) { 0.1 } else { 0.5 }),
            dist: pair_matrix(6, 0.0, |i, j| if same(i, j) { 0.2 } else { 1.0 }),
        };
        let flagged = [TransformerId::new(1)];
        let excluded = [5];
        let inputs = ReassignmentInputs {
            excluded: &excluded,
            ..fixture.inputs(&flagged)
        };
        let prediction = reassign_flagged(&inputs, &config()).unwrap();

        assert_eq!(
            prediction.assignments[0],
            Assignment::Merged {
                from: TransformerId::new(1),
                into: TransformerId::new(2)
            }
        );
        let score = prediction
            .scores_for(0)
            .find(|s| s.transformer == TransformerId::new(2))
            .unwrap();
        assert_eq!(score.mean_correlation, Some(0.9));
        assert_eq!(score.min_correlation, Some(0.9));
        assert!(score.rejection.is_none());
    }

    #[test]
    fn assignment_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Assignment::Merged {
            from: TransformerId::new(3),
            into: TransformerId::new(2),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"merged","from":3,"into":2}"#);
    }

    #[test]
    fn mismatched_matrix_is_rejected() {
        let mut fixture = mislabeled_feeder();
        fixture.fit = PairMatrix::filled(3, 0.1);
        let flagged = [TransformerId::new(1)];
        assert!(matches!(
            reassign_flagged(&fixture.inputs(&flagged), &config()),
            Err(M2tError::ShapeMismatch { .. })
        ));
    }
}
