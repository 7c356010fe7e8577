//! Time-series driver for controlled network simulations.
//!
//! For every time step the driver advances controllers, runs the control
//! loop to a fixed point, and appends the logged variables to an
//! [`OutputWriter`]. Buffered output is handed to a [`ResultSink`] for
//! persistence.

pub mod driver;
pub mod error;
pub mod output;
pub mod sink;

pub use driver::{
    CancelToken, RunOptions, RunSummary, StepFailurePolicy, StepProgress, TimeSeries, TimeSteps,
    run_timeseries,
};
pub use error::{SimError, SimResult, StepStage};
pub use output::{Aggregate, LogSpec, OutputTable, OutputTables, OutputWriter};
pub use sink::{MemorySink, ResultSink, SinkError};
