//! Solver trait.

use pl_net::NetworkModel;

use crate::error::SolverResult;

/// Summary of one successful solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    /// Newton iterations used
    pub iterations: usize,
    /// Final residual norm
    pub residual_norm: f64,
}

/// A numeric solver over the network model.
///
/// `solve` reads input cells, computes a consistent operating point and
/// writes result cells back into the model. It must report non-convergence
/// and invalid inputs as distinct errors (see [`crate::SolverError`]).
pub trait Solver {
    fn solve(&mut self, net: &mut NetworkModel) -> SolverResult<SolveReport>;
}

impl<S: Solver + ?Sized> Solver for &mut S {
    fn solve(&mut self, net: &mut NetworkModel) -> SolverResult<SolveReport> {
        (**self).solve(net)
    }
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn solve(&mut self, net: &mut NetworkModel) -> SolverResult<SolveReport> {
        (**self).solve(net)
    }
}
