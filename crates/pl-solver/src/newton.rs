//! Damped Newton kernel for per-unit voltage systems.

use crate::error::{SolverError, SolverResult};
use nalgebra::{DMatrix, DVector};

/// A square nonlinear system `f(x) = 0` in per-unit voltages.
pub trait NewtonSystem {
    /// Mismatch vector at `x`.
    fn mismatch(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of [`NewtonSystem::mismatch`] at `x`.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;
}

#[derive(Debug, Clone)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    /// Largest admissible per-unit mismatch (infinity norm).
    pub abs_tol: f64,
    /// Iterates below this voltage are rejected by the step damping.
    pub min_voltage: f64,
    /// Factor applied to the step on each rejected trial.
    pub damping: f64,
    pub max_damping_steps: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            abs_tol: 1e-10,
            min_voltage: 1e-3,
            damping: 0.5,
            max_damping_steps: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewtonResult {
    pub x: DVector<f64>,
    /// Infinity norm of the final mismatch.
    pub residual_norm: f64,
    pub iterations: usize,
    /// Total number of damped (shortened) steps taken.
    pub damped_steps: usize,
}

/// Solve `system` from `x0`.
///
/// A full Newton step is shortened until every voltage stays above
/// `min_voltage` and the mismatch shrinks. When no shortened step qualifies
/// the iteration stops with [`SolverError::ConvergenceFailed`]; a singular
/// Jacobian yields [`SolverError::Numeric`].
pub fn newton_solve<S: NewtonSystem + ?Sized>(
    system: &S,
    x0: DVector<f64>,
    config: &NewtonConfig,
) -> SolverResult<NewtonResult> {
    let mut x = x0;
    let mut mismatch = system.mismatch(&x);
    let mut damped_steps = 0;

    for iteration in 0..=config.max_iterations {
        let norm = mismatch.amax();
        if !norm.is_finite() {
            return Err(SolverError::Numeric {
                what: format!("non-finite mismatch at iteration {iteration}"),
            });
        }
        if norm <= config.abs_tol {
            return Ok(NewtonResult {
                x,
                residual_norm: norm,
                iterations: iteration,
                damped_steps,
            });
        }
        if iteration == config.max_iterations {
            break;
        }

        let step = system
            .jacobian(&x)
            .lu()
            .solve(&(-&mismatch))
            .ok_or_else(|| SolverError::Numeric {
                what: format!("singular Jacobian at iteration {iteration}"),
            })?;

        let (next, next_mismatch, cuts) = damped_step(system, &x, &step, norm, config)
            .ok_or_else(|| SolverError::ConvergenceFailed {
                what: format!("no admissible Newton step at iteration {iteration}, mismatch {norm:e}"),
            })?;
        damped_steps += cuts;
        x = next;
        mismatch = next_mismatch;
    }

    Err(SolverError::ConvergenceFailed {
        what: format!(
            "no convergence within {} iterations, mismatch {:e}",
            config.max_iterations,
            mismatch.amax()
        ),
    })
}

fn damped_step<S: NewtonSystem + ?Sized>(
    system: &S,
    x: &DVector<f64>,
    step: &DVector<f64>,
    norm: f64,
    config: &NewtonConfig,
) -> Option<(DVector<f64>, DVector<f64>, usize)> {
    let mut scale = 1.0;
    for cuts in 0..=config.max_damping_steps {
        let trial = x + step * scale;
        if trial.iter().all(|v| *v >= config.min_voltage) {
            let trial_mismatch = system.mismatch(&trial);
            if trial_mismatch.amax() < norm {
                return Some((trial, trial_mismatch, cuts));
            }
        }
        scale *= config.damping;
    }
    None
}
