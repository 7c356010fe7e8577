//! Error types for time-series runs.

use std::fmt;

use pl_control::ControlError;
use pl_core::TimeStep;
use pl_net::NetError;
use thiserror::Error;

use crate::sink::SinkError;

/// Phase of a time step in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStage {
    TimeStep,
    ControlLoop,
    Finalize,
}

impl fmt::Display for StepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStage::TimeStep => "time_step",
            StepStage::ControlLoop => "control loop",
            StepStage::Finalize => "finalize_step",
        };
        f.write_str(label)
    }
}

/// Errors encountered while driving a time series.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Invalid time steps: {what}")]
    InvalidTimeSteps { what: String },

    /// A step failed and the failure policy does not allow skipping it.
    #[error("Time step {time} failed during {stage}: {source}")]
    StepFailed {
        time: TimeStep,
        stage: StepStage,
        #[source]
        source: ControlError,
    },

    /// Logged variable cannot be recorded.
    #[error("Output error: {what}")]
    Output { what: String },

    #[error("Controller setup failed: {0}")]
    Control(#[from] ControlError),

    #[error("Network model error: {0}")]
    Network(#[from] NetError),

    #[error("Result sink error: {0}")]
    Sink(#[from] SinkError),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Time step of a step failure.
    pub fn time(&self) -> Option<TimeStep> {
        match self {
            SimError::StepFailed { time, .. } => Some(*time),
            _ => None,
        }
    }
}
