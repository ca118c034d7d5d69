//! Customer-to-customer geographic distance.

use m2t_core::{GeoPoint, PairMatrix};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64;
}

/// Planar distance treating `lat`/`lon` as projected x/y.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        (a.lat - b.lat).hypot(a.lon - b.lon)
    }
}

/// Great-circle distance in metres for coordinates in degrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct Haversine;

impl DistanceMetric for Haversine {
    fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        let dlat = (b.lat - a.lat).to_radians();
        let dlon = (b.lon - a.lon).to_radians();
        let h = (dlat / 2.0).sin().powi(2)
            + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
    }
}

/// Metric selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetricKind {
    #[default]
    Euclidean,
    Haversine,
}

impl DistanceMetricKind {
    pub fn metric(self) -> Box<dyn DistanceMetric> {
        match self {
            DistanceMetricKind::Euclidean => Box::new(Euclidean),
            DistanceMetricKind::Haversine => Box::new(Haversine),
        }
    }
}

/// Symmetric distance matrix with zero diagonal.
pub fn distance_matrix(points: &[GeoPoint], metric: &dyn DistanceMetric) -> PairMatrix {
    let n = points.len();
    let mut out = PairMatrix::filled(n, 0.0);
    for i in 0..n {
        for j in i + 1..n {
            out.set_symmetric(i, j, metric.distance(&points[i], &points[j]));
        }
    }
    out
}
