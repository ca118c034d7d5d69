//! Deterministic synthetic feeders for tests and benchmarks.
//!
//! Every transformer has its own voltage, which is the shared feeder level plus
//! transformer-local noise. Each customer sees that voltage minus the drop across
//! its own service impedance, plus meter noise:
//!
//! ```text
//! V_c(t) = V_tx(t) - r_c·P_c(t) - x_c·Q_c(t) + e_c(t)
//! ```

use m2t_core::{AmiDataset, CustomerId, GeoPoint, MeasurementMatrix, TransformerLabels};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct FeederSpec {
    pub transformers: usize,
    pub customers_per_transformer: usize,
    pub samples: usize,
    pub seed: u64,
    pub with_reactive_power: bool,
    /// Standard deviation of meter noise in volts
    pub meter_noise: f64,
    /// Distance between neighbouring transformers (planar units)
    pub transformer_spacing: f64,
}

impl Default for FeederSpec {
    fn default() -> Self {
        Self {
            transformers: 6,
            customers_per_transformer: 4,
            samples: 2000,
            seed: 42,
            with_reactive_power: true,
            meter_noise: 0.05,
            transformer_spacing: 100.0,
        }
    }
}

/// Generated dataset plus the labels it was generated from.
#[derive(Debug, Clone)]
pub struct SyntheticFeeder {
    /// Labels start out equal to `truth`
    pub dataset: AmiDataset,
    pub truth: TransformerLabels,
}

impl SyntheticFeeder {
    /// Transformer `k` carries label `k + 1`; customers are numbered transformer by transformer.
    ///
    /// # Panics
    ///
    /// If `meter_noise` is negative or not finite.
    pub fn generate(spec: &FeederSpec) -> Self {
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let t_len = spec.samples;
        let feeder_swing = Normal::new(0.0, 0.5).expect("valid feeder deviation");
        let transformer_swing = Normal::new(0.0, 1.0).expect("valid transformer deviation");
        let meter_noise = Normal::new(0.0, spec.meter_noise).expect("valid meter noise deviation");

        let feeder: Vec<f64> = (0..t_len).map(|_| feeder_swing.sample(&mut rng)).collect();

        let mut voltage = Vec::new();
        let mut real = Vec::new();
        let mut reactive = Vec::new();
        let mut labels = Vec::new();
        let mut ids = Vec::new();
        let mut coordinates = Vec::new();

        for k in 0..spec.transformers {
            let tx: Vec<f64> = feeder
                .iter()
                .map(|f| 240.0 + f + transformer_swing.sample(&mut rng))
                .collect();
            let centre = k as f64 * spec.transformer_spacing;

            for m in 0..spec.customers_per_transformer {
                let r = rng.gen_range(0.2..0.4);
                let x = rng.gen_range(0.1..0.3);
                let p: Vec<f64> = (0..t_len).map(|_| rng.gen_range(1.0..5.0)).collect();
                let q: Vec<f64> = (0..t_len).map(|_| rng.gen_range(0.0..2.0)).collect();
                let reactive_drop = if spec.with_reactive_power { x } else { 0.0 };
                let v: Vec<f64> = (0..t_len)
                    .map(|t| {
                        tx[t] - r * p[t] - reactive_drop * q[t]
                            + meter_noise.sample(&mut rng)
                    })
                    .collect();

                voltage.push(v);
                real.push(p);
                reactive.push(q);
                labels.push(k as i64 + 1);
                ids.push(CustomerId::new(format!("meter-{k}-{m}")));
                coordinates.push(GeoPoint::new(
                    centre + rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                ));
            }
        }

        let truth = TransformerLabels::from_raw(&labels);
        let matrix = |columns: Vec<Vec<f64>>| {
            MeasurementMatrix::from_columns(columns).expect("rectangular columns")
        };
        let mut dataset = AmiDataset::new(ids, matrix(voltage), matrix(real), truth.clone())
            .with_coordinates(coordinates);
        if spec.with_reactive_power {
            dataset = dataset.with_reactive_power(matrix(reactive));
        }
        Self { dataset, truth }
    }

    /// Give `customer` a wrong label.
    pub fn with_mislabel(mut self, customer: usize, label: i64) -> Self {
        let mut raw = self.dataset.labels.raw();
        raw[customer] = label;
        self.dataset.labels = TransformerLabels::from_raw(&raw);
        self
    }

    /// Knock out a block of voltage samples for one customer.
    pub fn with_missing_voltage(mut self, customer: usize, samples: Range<usize>) -> Self {
        for value in &mut self.dataset.voltage.column_mut(customer)[samples] {
            *value = f64::NAN;
        }
        self
    }

    /// Move a customer's coordinate.
    pub fn with_location(mut self, customer: usize, point: GeoPoint) -> Self {
        if let Some(coords) = self.dataset.coordinates.as_mut() {
            coords[customer] = point;
        }
        self
    }
}
