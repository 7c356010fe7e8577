//! Network model error types.

use thiserror::Error;

/// Errors raised by point reads and writes on the network model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    #[error("Unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("Unknown element {table}[{index}]")]
    UnknownElement { table: String, index: usize },

    #[error("Unknown attribute {table}[{index}].{column}")]
    UnknownAttribute {
        table: String,
        index: usize,
        column: String,
    },

    #[error("Duplicate element {table}[{index}]")]
    DuplicateElement { table: String, index: usize },

    #[error("Non-finite value {value} for {table}[{index}].{column}")]
    NonFinite {
        table: String,
        index: usize,
        column: String,
        value: f64,
    },
}

pub type NetResult<T> = Result<T, NetError>;

