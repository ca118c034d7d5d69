use super::backend::{FaerSolver, GaussSolver, LinearSystemBackend};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Selectable linear-system backends for the regression normal equations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    Gauss,
    #[default]
    Faer,
}

impl SolverKind {
    pub fn build_solver(self) -> Arc<dyn LinearSystemBackend> {
        match self {
            SolverKind::Gauss => Arc::new(GaussSolver),
            SolverKind::Faer => Arc::new(FaerSolver),
        }
    }
}
