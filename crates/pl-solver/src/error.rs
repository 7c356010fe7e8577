//! Error types for solver operations.

use pl_net::NetError;
use thiserror::Error;

/// Errors that can occur during a solve.
///
/// Non-convergence (`ConvergenceFailed`, `Numeric`) is kept apart from
/// input validation (`InvalidInput`) so callers can decide whether a step may
/// be skipped or the run must stop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Invalid solver input: {what}")]
    InvalidInput { what: String },

    #[error("Convergence failed: {what}")]
    ConvergenceFailed { what: String },

    #[error("Numeric error: {what}")]
    Numeric { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    /// True for failures of the iteration itself, false for bad inputs.
    pub fn is_non_convergence(&self) -> bool {
        matches!(
            self,
            SolverError::ConvergenceFailed { .. } | SolverError::Numeric { .. }
        )
    }
}

impl From<NetError> for SolverError {
    fn from(e: NetError) -> Self {
        SolverError::InvalidInput {
            what: e.to_string(),
        }
    }
}
