//! Error types for the pl-app service layer.

use std::path::PathBuf;

/// Application error shared by every frontend.
///
/// Backend errors are flattened to their messages so callers only ever
/// match on this one type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("Failed to read scenario file: {path}")]
    ScenarioFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write scenario file: {path}")]
    ScenarioFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Scenario validation failed: {0}")]
    Validation(String),

    #[error("Profile data error: {0}")]
    Profiles(String),

    #[error("Scenario compilation failed: {0}")]
    Compile(String),

    #[error("Controller error: {0}")]
    Control(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pl-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<pl_project::ProjectError> for AppError {
    fn from(err: pl_project::ProjectError) -> Self {
        match err {
            pl_project::ProjectError::Validation(v) => AppError::Validation(v.to_string()),
            other => AppError::Scenario(other.to_string()),
        }
    }
}

impl From<pl_project::ValidationError> for AppError {
    fn from(err: pl_project::ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<pl_data::DataError> for AppError {
    fn from(err: pl_data::DataError) -> Self {
        AppError::Profiles(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Profiles(err.to_string())
    }
}

impl From<pl_net::NetError> for AppError {
    fn from(err: pl_net::NetError) -> Self {
        AppError::Compile(err.to_string())
    }
}

impl From<pl_control::ControlError> for AppError {
    fn from(err: pl_control::ControlError) -> Self {
        AppError::Control(err.to_string())
    }
}

impl From<pl_timeseries::SimError> for AppError {
    fn from(err: pl_timeseries::SimError) -> Self {
        AppError::Simulation(err.to_string())
    }
}

impl From<pl_results::ResultsError> for AppError {
    fn from(err: pl_results::ResultsError) -> Self {
        match err {
            pl_results::ResultsError::RunNotFound { run_id } => AppError::RunNotFound(run_id),
            other => AppError::Results(other.to_string()),
        }
    }
}
