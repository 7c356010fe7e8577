//! Error types for control operations.

use pl_core::ControllerId;
use pl_data::DataError;
use pl_net::{CellRef, NetError};
use pl_solver::SolverError;
use thiserror::Error;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while registering or running controllers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a controller constructor.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Controller cannot answer a query in its current state.
    #[error("Controller state error: {what}")]
    StateError { what: String },

    /// Two controllers at the same level and order write the same cell.
    #[error("Write conflict on {cell}: '{incoming}' collides with '{existing}'")]
    WriteConflict {
        cell: CellRef,
        existing: String,
        incoming: String,
    },

    /// Lookup of a controller id that was never registered.
    #[error("Unknown controller id {id}")]
    UnknownController { id: ControllerId },

    /// A level exceeded its iteration cap.
    #[error(
        "Level {level} did not converge after {iterations} iterations (unconverged: {})",
        controllers.join(", ")
    )]
    DidNotConverge {
        level: i32,
        iterations: usize,
        controllers: Vec<String>,
    },

    /// Error raised by a specific controller.
    #[error("Controller '{controller}': {source}")]
    InController {
        controller: String,
        #[source]
        source: Box<ControlError>,
    },

    #[error("Network model error: {0}")]
    Network(#[from] NetError),

    #[error("Profile lookup error: {0}")]
    Data(#[from] DataError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}

impl ControlError {
    /// Attach the name of the controller that raised this error.
    pub fn in_controller(self, controller: impl Into<String>) -> Self {
        ControlError::InController {
            controller: controller.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, with controller attribution stripped.
    pub fn root(&self) -> &ControlError {
        match self {
            ControlError::InController { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the controller that raised the error, if attributed.
    pub fn controller(&self) -> Option<&str> {
        match self {
            ControlError::InController { controller, .. } => Some(controller),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_round_trip() {
        let err = ControlError::from(DataError::UnknownTimeStep { time: 7 }).in_controller("pv");
        assert_eq!(err.controller(), Some("pv"));
        assert!(matches!(err.root(), ControlError::Data(_)));
        assert!(err.to_string().contains("Controller 'pv'"));
    }

    #[test]
    fn did_not_converge_lists_controllers() {
        let err = ControlError::DidNotConverge {
            level: 1,
            iterations: 30,
            controllers: vec!["tap 0".to_string(), "tap 1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Level 1 did not converge after 30 iterations (unconverged: tap 0, tap 1)"
        );
    }
}
