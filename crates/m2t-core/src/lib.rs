//! # m2t-core: Meter-to-Transformer Pairing Core
//!
//! Provides the data model shared by the preprocessing and analysis crates.
//!
//! ## Design Philosophy
//!
//! A pairing run operates on immutable, pre-collected AMI batches:
//! - **Measurement matrices**: time samples x customers, `NaN` for missing samples
//! - **Transformer labels**: one (possibly wrong) label per customer
//! - **Pair matrices**: customer x customer scores derived from the measurements
//!
//! Customer index `i` refers to the same customer in every array. [`AmiDataset`]
//! bundles the arrays and checks that invariant up front, so shape problems fail
//! fast before any O(customers²) work starts.
//!
//! ## Quick Start
//!
//! ```rust
//! use m2t_core::*;
//!
//! let voltage = MeasurementMatrix::from_rows(&[
//!     vec![240.1, 239.8],
//!     vec![240.4, 240.0],
//!     vec![f64::NAN, 239.5],
//! ]).unwrap();
//! let power = MeasurementMatrix::from_rows(&[
//!     vec![1.2, 0.8],
//!     vec![1.1, 0.9],
//!     vec![1.4, 1.0],
//! ]).unwrap();
//!
//! let dataset = AmiDataset::new(
//!     vec![CustomerId::new("meter_a"), CustomerId::new("meter_b")],
//!     voltage,
//!     power,
//!     TransformerLabels::from_raw(&[7, 7]),
//! );
//! dataset.validate().unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`diagnostics`] - Structured exclusions (no-votes customers, failed fits)
//! - [`error`] - [`M2tError`] taxonomy
//! - [`matrix`] - [`MeasurementMatrix`] and [`PairMatrix`]
//! - [`solver`] - Dense linear solves for the regression engine
//! - [`stats`] - NaN-aware median, mean and minimum

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod diagnostics;
pub mod error;
pub mod matrix;
pub mod solver;
pub mod stats;

pub use diagnostics::{Category, DiagnosticIssue, Diagnostics, Severity};
pub use error::{M2tError, M2tResult};
pub use matrix::{MeasurementMatrix, PairMatrix};
pub use solver::*;

/// Label reserved for customers that belong to no multi-customer group.
pub const DEFAULT_SINGLE_CUST_MARKER: i64 = -999;

/// Opaque customer (meter) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(value: impl Into<String>) -> Self {
        CustomerId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transformer group label. Values are arbitrary and need not be contiguous.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransformerId(i64);

impl TransformerId {
    #[inline]
    pub fn new(value: i64) -> Self {
        TransformerId(value)
    }
    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TransformerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// One transformer label per customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformerLabels {
    labels: Vec<TransformerId>,
}

impl TransformerLabels {
    pub fn new(labels: Vec<TransformerId>) -> Self {
        Self { labels }
    }

    pub fn from_raw(labels: &[i64]) -> Self {
        Self {
            labels: labels.iter().copied().map(TransformerId::new).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn get(&self, customer: usize) -> TransformerId {
        self.labels[customer]
    }

    pub fn as_slice(&self) -> &[TransformerId] {
        &self.labels
    }

    pub fn raw(&self) -> Vec<i64> {
        self.labels.iter().map(|l| l.value()).collect()
    }

    /// Members of every group in ascending label order.
    ///
    /// Customers carrying `single_cust_marker` are singletons and never form a group.
    pub fn groups(&self, single_cust_marker: i64) -> BTreeMap<TransformerId, Vec<usize>> {
        let mut groups: BTreeMap<TransformerId, Vec<usize>> = BTreeMap::new();
        for (idx, label) in self.labels.iter().enumerate() {
            if label.value() == single_cust_marker {
                continue;
            }
            groups.entry(*label).or_default().push(idx);
        }
        groups
    }

    /// Indices whose label differs from `other`.
    pub fn changed_from(&self, other: &TransformerLabels) -> M2tResult<Vec<usize>> {
        if self.len() != other.len() {
            return Err(M2tError::shape("label vectors", other.len(), self.len()));
        }
        Ok(self
            .labels
            .iter()
            .zip(other.labels.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(idx, _)| idx)
            .collect())
    }
}

/// Customer coordinate, either latitude/longitude in degrees or planar x/y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// All per-customer inputs of one pairing run, index-aligned.
#[derive(Debug, Clone)]
pub struct AmiDataset {
    pub customer_ids: Vec<CustomerId>,
    /// Raw voltage in volts
    pub voltage: MeasurementMatrix,
    pub real_power: MeasurementMatrix,
    pub reactive_power: Option<MeasurementMatrix>,
    /// Current, possibly erroneous, transformer labels
    pub labels: TransformerLabels,
    pub coordinates: Option<Vec<GeoPoint>>,
}

impl AmiDataset {
    pub fn new(
        customer_ids: Vec<CustomerId>,
        voltage: MeasurementMatrix,
        real_power: MeasurementMatrix,
        labels: TransformerLabels,
    ) -> Self {
        Self {
            customer_ids,
            voltage,
            real_power,
            reactive_power: None,
            labels,
            coordinates: None,
        }
    }

    pub fn with_reactive_power(mut self, reactive_power: MeasurementMatrix) -> Self {
        self.reactive_power = Some(reactive_power);
        self
    }

    pub fn with_coordinates(mut self, coordinates: Vec<GeoPoint>) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    #[inline]
    pub fn n_customers(&self) -> usize {
        self.customer_ids.len()
    }

    /// Check that every array agrees on customer count and sample count.
    pub fn validate(&self) -> M2tResult<()> {
        let n = self.customer_ids.len();
        if n == 0 {
            return Err(M2tError::Validation("dataset has no customers".into()));
        }

        let mut matrices = vec![("voltage", &self.voltage), ("real power", &self.real_power)];
        if let Some(q) = &self.reactive_power {
            matrices.push(("reactive power", q));
        }
        for (name, matrix) in &matrices {
            if matrix.n_customers() != n {
                return Err(M2tError::shape(
                    format!("{name} columns"),
                    n,
                    matrix.n_customers(),
                ));
            }
            if matrix.n_samples() != self.voltage.n_samples() {
                return Err(M2tError::shape(
                    format!("{name} samples"),
                    self.voltage.n_samples(),
                    matrix.n_samples(),
                ));
            }
        }

        if self.labels.len() != n {
            return Err(M2tError::shape("transformer labels", n, self.labels.len()));
        }
        if let Some(coords) = &self.coordinates {
            if coords.len() != n {
                return Err(M2tError::shape("customer coordinates", n, coords.len()));
            }
        }
        Ok(())
    }
}
