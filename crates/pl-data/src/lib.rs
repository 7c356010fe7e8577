//! Profile data sources for time-series runs.
//!
//! A data source is a read-only table indexed by time step and profile name.
//! Lookups are deterministic and never fall back to a default: asking for a
//! time step or profile that is not present is an error.

pub mod error;
pub mod frame;
pub mod source;

pub use error::{DataError, DataResult};
pub use frame::FrameData;
pub use source::DataSource;
