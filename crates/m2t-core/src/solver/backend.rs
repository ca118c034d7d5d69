use crate::{M2tError, M2tResult};
use faer::{prelude::*, solvers::PartialPivLu, Mat};

/// Trait for solving dense linear systems (Ax = b).
///
/// The pairwise regression engine solves one small normal-equation system per
/// customer pair, from many worker threads at once.
pub trait LinearSystemBackend: Send + Sync {
    /// Solve the linear system Ax = b
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> M2tResult<Vec<f64>>;
}

fn check_square(matrix: &[Vec<f64>], rhs: &[f64]) -> M2tResult<usize> {
    let n = matrix.len();
    if rhs.len() != n {
        return Err(M2tError::shape("linear system rhs", n, rhs.len()));
    }
    if let Some(row) = matrix.iter().find(|row| row.len() != n) {
        return Err(M2tError::shape("linear system row", n, row.len()));
    }
    Ok(n)
}

#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl LinearSystemBackend for GaussSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> M2tResult<Vec<f64>> {
        let n = check_square(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut a = matrix.to_vec();
        let mut b = rhs.to_vec();

        for i in 0..n {
            let mut pivot = i;
            for row in i + 1..n {
                if a[row][i].abs() > a[pivot][i].abs() {
                    pivot = row;
                }
            }
            if pivot != i {
                a.swap(i, pivot);
                b.swap(i, pivot);
            }

            let diag = a[i][i];
            if diag.abs() < 1e-12 {
                return Err(M2tError::Solver("singular matrix".into()));
            }

            for value in a[i][i..].iter_mut() {
                *value /= diag;
            }
            b[i] /= diag;

            let pivot_segment = a[i][i..].to_vec();
            for row in 0..n {
                if row == i {
                    continue;
                }
                let factor = a[row][i];
                for (target, &pivot) in a[row][i..].iter_mut().zip(pivot_segment.iter()) {
                    *target -= factor * pivot;
                }
                b[row] -= factor * b[i];
            }
        }

        Ok(b)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl LinearSystemBackend for FaerSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> M2tResult<Vec<f64>> {
        let n = check_square(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mat = Mat::from_fn(n, n, |i, j| matrix[i][j]);
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        let solution: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();

        // LU does not report singularity; it shows up as inf/NaN.
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(M2tError::Solver("singular matrix (faer solver)".into()));
        }
        Ok(solution)
    }
}
