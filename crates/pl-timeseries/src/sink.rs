//! Persistence boundary for buffered output.

use thiserror::Error;

use crate::output::OutputTables;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {message}")]
    Backend { message: String },
}

/// Receives the cumulative output buffer.
///
/// A sink may be written several times during a run (incremental flushes);
/// each write carries every row recorded so far and supersedes the previous
/// one.
pub trait ResultSink {
    fn write(&mut self, tables: &OutputTables) -> Result<(), SinkError>;
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn write(&mut self, tables: &OutputTables) -> Result<(), SinkError> {
        (**self).write(tables)
    }
}

/// Keeps the latest flushed snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub latest: Option<OutputTables>,
    pub writes: usize,
}

impl ResultSink for MemorySink {
    fn write(&mut self, tables: &OutputTables) -> Result<(), SinkError> {
        self.latest = Some(tables.clone());
        self.writes += 1;
        Ok(())
    }
}
