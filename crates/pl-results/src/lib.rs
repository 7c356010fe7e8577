//! pl-results: run cache and output persistence.

pub mod hash;
pub mod sinks;
pub mod store;
pub mod types;

pub use hash::compute_run_id;
pub use sinks::{CsvSink, JsonSink, write_table_csv};
pub use store::{RunSink, RunStore};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },
}

impl From<ResultsError> for pl_timeseries::SinkError {
    fn from(e: ResultsError) -> Self {
        match e {
            ResultsError::Io(io) => pl_timeseries::SinkError::Io(io),
            other => pl_timeseries::SinkError::Backend {
                message: other.to_string(),
            },
        }
    }
}
