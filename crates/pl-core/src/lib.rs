//! pl-core: shared vocabulary for powerloop.
//!
//! - units (uom SI time/energy/power types + constructors)
//! - ids (compact controller ids, time-step labels)

pub mod ids;
pub mod units;

pub use ids::*;
pub use units::*;

/// Floating point type used for every model and profile value.
pub type Real = f64;
