//! The data source trait.

use pl_core::{Real, TimeStep};

use crate::error::DataResult;

/// Read-only provider of profile values.
///
/// Implementations must be deterministic and side-effect free: the same
/// `(time, profile)` pair always yields the same value or the same error.
pub trait DataSource: Send + Sync {
    /// Scalar lookup for one profile at one time step.
    fn value(&self, time: TimeStep, profile: &str) -> DataResult<Real>;

    /// Scalar lookup multiplied by `scale_factor`.
    fn scaled_value(&self, time: TimeStep, profile: &str, scale_factor: Real) -> DataResult<Real> {
        Ok(self.value(time, profile)? * scale_factor)
    }

    /// Vector lookup, one value per requested profile, in request order.
    fn values(&self, time: TimeStep, profiles: &[&str]) -> DataResult<Vec<Real>> {
        profiles.iter().map(|p| self.value(time, p)).collect()
    }

    /// Number of time steps available.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Profile names, in a stable order.
    fn profiles(&self) -> Vec<&str>;
}
