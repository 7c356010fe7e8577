//! The solve boundary of the control layer.
//!
//! The control loop treats the numeric solver as an opaque `solve` operation
//! over the network model. This crate defines that boundary (the [`Solver`]
//! trait and its error contract) and ships a small reference implementation,
//! [`RadialFeederSolver`], built on a damped Newton kernel.

pub mod error;
pub mod newton;
pub mod radial;
pub mod solver;

pub use error::{SolverError, SolverResult};
pub use newton::{NewtonConfig, NewtonResult, NewtonSystem};
pub use radial::RadialFeederSolver;
pub use solver::{SolveReport, Solver};
