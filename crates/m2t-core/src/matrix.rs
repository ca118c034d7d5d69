//! Dense matrices used throughout the pairing pipeline.
//!
//! - [`MeasurementMatrix`]: time samples x customers, stored column-major so a
//!   customer's series is one contiguous slice. `NaN` marks a missing sample.
//! - [`PairMatrix`]: square customer x customer matrix (correlation, fit quality,
//!   distances). Stored row-major.

use crate::{M2tError, M2tResult};

/// Time x customer measurements (voltage, real power, reactive power).
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementMatrix {
    samples: usize,
    customers: usize,
    /// Column-major: `data[customer * samples + t]`
    data: Vec<f64>,
}

impl MeasurementMatrix {
    /// Build from column-major storage.
    pub fn new(samples: usize, customers: usize, data: Vec<f64>) -> M2tResult<Self> {
        if data.len() != samples * customers {
            return Err(M2tError::shape(
                "measurement matrix storage",
                samples * customers,
                data.len(),
            ));
        }
        Ok(Self {
            samples,
            customers,
            data,
        })
    }

    /// Build from one series per customer.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> M2tResult<Self> {
        let customers = columns.len();
        let samples = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(samples * customers);
        for (idx, column) in columns.into_iter().enumerate() {
            if column.len() != samples {
                return Err(M2tError::shape(
                    format!("measurement column {idx}"),
                    samples,
                    column.len(),
                ));
            }
            data.extend(column);
        }
        Ok(Self {
            samples,
            customers,
            data,
        })
    }

    /// Build from time-ordered rows, each holding one value per customer.
    pub fn from_rows(rows: &[Vec<f64>]) -> M2tResult<Self> {
        let samples = rows.len();
        let customers = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = vec![f64::NAN; samples * customers];
        for (t, row) in rows.iter().enumerate() {
            if row.len() != customers {
                return Err(M2tError::shape(
                    format!("measurement row {t}"),
                    customers,
                    row.len(),
                ));
            }
            for (c, &value) in row.iter().enumerate() {
                data[c * samples + t] = value;
            }
        }
        Ok(Self {
            samples,
            customers,
            data,
        })
    }

    /// Matrix of the given shape filled with missing values.
    pub fn missing(samples: usize, customers: usize) -> Self {
        Self {
            samples,
            customers,
            data: vec![f64::NAN; samples * customers],
        }
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.samples
    }

    #[inline]
    pub fn n_customers(&self) -> usize {
        self.customers
    }

    #[inline]
    pub fn column(&self, customer: usize) -> &[f64] {
        let start = customer * self.samples;
        &self.data[start..start + self.samples]
    }

    #[inline]
    pub fn column_mut(&mut self, customer: usize) -> &mut [f64] {
        let start = customer * self.samples;
        &mut self.data[start..start + self.samples]
    }

    #[inline]
    pub fn get(&self, sample: usize, customer: usize) -> f64 {
        self.data[customer * self.samples + sample]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.customers).map(move |c| self.column(c))
    }

    /// Apply `f` to every column, producing a matrix with `out_samples` rows.
    pub fn map_columns<F>(&self, out_samples: usize, mut f: F) -> Self
    where
        F: FnMut(&[f64], &mut [f64]),
    {
        let mut out = Self::missing(out_samples, self.customers);
        for c in 0..self.customers {
            let start = c * out_samples;
            f(
                self.column(c),
                &mut out.data[start..start + out_samples],
            );
        }
        out
    }

    /// Count of finite samples per customer.
    pub fn finite_counts(&self) -> Vec<usize> {
        self.columns()
            .map(|col| col.iter().filter(|v| v.is_finite()).count())
            .collect()
    }
}

/// Square customer x customer matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct PairMatrix {
    n: usize,
    data: Vec<f64>,
}

impl PairMatrix {
    pub fn filled(n: usize, value: f64) -> Self {
        Self {
            n,
            data: vec![value; n * n],
        }
    }

    /// NaN everywhere except `diagonal` on the diagonal.
    pub fn with_diagonal(n: usize, diagonal: f64) -> Self {
        let mut m = Self::filled(n, f64::NAN);
        for i in 0..n {
            m.set(i, i, diagonal);
        }
        m
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> M2tResult<Self> {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(M2tError::shape(format!("pair matrix row {i}"), n, row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { n, data })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] = value;
    }

    /// Write `value` to both `(i, j)` and `(j, i)`.
    #[inline]
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.set(i, j, value);
        self.set(j, i, value);
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// Symmetry check treating two NaNs as equal.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        for i in 0..self.n {
            for j in i + 1..self.n {
                let (a, b) = (self.get(i, j), self.get(j, i));
                if a.is_nan() && b.is_nan() {
                    continue;
                }
                if a.is_nan() != b.is_nan() || (a - b).abs() > tol {
                    return false;
                }
            }
        }
        true
    }

    /// Smallest finite value off the diagonal.
    pub fn min_off_diagonal(&self) -> Option<f64> {
        self.off_diagonal()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    /// Largest finite value anywhere in the matrix.
    pub fn max_finite(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }

    pub fn off_diagonal(&self) -> impl Iterator<Item = f64> + '_ {
        let n = self.n;
        self.data
            .iter()
            .enumerate()
            .filter(move |(idx, _)| idx / n != idx % n)
            .map(|(_, v)| *v)
    }

    /// Ensure this matrix matches `n` customers.
    pub fn expect_dim(&self, context: &str, n: usize) -> M2tResult<()> {
        if self.n != n {
            return Err(M2tError::shape(context, n, self.n));
        }
        Ok(())
    }
}
