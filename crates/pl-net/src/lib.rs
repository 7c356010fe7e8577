//! pl-net: the shared network model.
//!
//! Provides:
//! - `NetworkModel`, a table/element/attribute store with point reads and writes
//! - `CellRef`, the address of a single attribute of a single element
//! - conventional table and column names used by the built-in controllers
//!
//! # Example
//!
//! ```
//! use pl_net::{NetworkModel, Row};
//!
//! let mut net = NetworkModel::new();
//! net.insert_row("load", 0, Row::new().with("p_mw", 1.5)).unwrap();
//! net.set("load", 0, "p_mw", 2.0).unwrap();
//!
//! assert_eq!(net.get("load", 0, "p_mw").unwrap(), 2.0);
//! ```

pub mod cell;
pub mod error;
pub mod model;
pub mod names;

pub use cell::CellRef;
pub use error::{NetError, NetResult};
pub use model::{NetworkModel, Row, Table};
