//! Error types for profile lookups.

use pl_core::TimeStep;
use thiserror::Error;

/// Result type for data source operations.
pub type DataResult<T> = Result<T, DataError>;

/// Errors that can occur when building or querying a data source.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    /// Requested time step is not in the index.
    #[error("Time step {time} not present in data source")]
    UnknownTimeStep { time: TimeStep },

    /// Requested profile is not a column of the data source.
    #[error("Profile '{profile}' not present in data source")]
    UnknownProfile { profile: String },

    /// Column length does not match the time index.
    #[error("Profile '{profile}' has {len} values, index has {expected}")]
    ShapeMismatch {
        profile: String,
        len: usize,
        expected: usize,
    },

    /// A time step appears twice in the index.
    #[error("Duplicate time step {time} in index")]
    DuplicateTimeStep { time: TimeStep },

    /// Profile values must be finite.
    #[error("Non-finite value in profile '{profile}' at time step {time}")]
    NonFinite { profile: String, time: TimeStep },
}
