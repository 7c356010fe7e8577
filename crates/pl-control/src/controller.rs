//! The controller capability set.

use pl_core::{Real, Time, TimeStep};
use pl_net::{CellRef, NetResult, NetworkModel};

use crate::control_loop::Visibility;
use crate::error::ControlResult;

/// Per-step information handed to [`Controller::time_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    /// Time index of the step being entered.
    pub time: TimeStep,
    /// 0-based position of this step in the run's sequence.
    pub position: usize,
    /// Duration since the previous processed step.
    pub elapsed: Time,
    /// Duration since the first step of the run. Stays monotonic across
    /// skipped steps, so controllers that missed a step can catch up.
    pub clock: Time,
}

impl StepContext {
    /// A context whose clock equals `elapsed`; use [`StepContext::at`] to
    /// place it later in a run.
    pub fn new(time: TimeStep, position: usize, elapsed: Time) -> Self {
        Self {
            time,
            position,
            elapsed,
            clock: elapsed,
        }
    }

    pub fn at(mut self, clock: Time) -> Self {
        self.clock = clock;
        self
    }
}

/// Model access lent to a controller for one `control_step` call.
///
/// - `read_solved` returns the model as it was right after the latest solve
/// - `read` follows the loop's [`Visibility`]: the solved snapshot under
///   `PriorIteration`, the live model under `SameIteration`
/// - `write` always targets the live model
pub struct ModelAccess<'a> {
    live: &'a mut NetworkModel,
    solved: &'a NetworkModel,
    visibility: Visibility,
    changed: bool,
}

impl<'a> ModelAccess<'a> {
    pub fn new(live: &'a mut NetworkModel, solved: &'a NetworkModel, visibility: Visibility) -> Self {
        Self {
            live,
            solved,
            visibility,
            changed: false,
        }
    }

    pub fn read(&self, table: &str, index: usize, column: &str) -> NetResult<Real> {
        match self.visibility {
            Visibility::PriorIteration => self.solved.get(table, index, column),
            Visibility::SameIteration => self.live.get(table, index, column),
        }
    }

    pub fn read_solved(&self, table: &str, index: usize, column: &str) -> NetResult<Real> {
        self.solved.get(table, index, column)
    }

    /// The model as it was right after the latest solve.
    pub fn solved(&self) -> &NetworkModel {
        self.solved
    }

    pub fn write(&mut self, table: &str, index: usize, column: &str, value: Real) -> NetResult<()> {
        let previous = self.live.get(table, index, column).ok();
        self.live.set(table, index, column, value)?;
        if previous != Some(value) {
            self.changed = true;
        }
        Ok(())
    }

    pub fn write_cell(&mut self, cell: &CellRef, value: Real) -> NetResult<()> {
        self.write(&cell.table, cell.index, &cell.column, value)
    }

    /// Whether any write changed a cell value.
    pub fn changed(&self) -> bool {
        self.changed
    }
}

/// An independent rule that reads solver results and writes model inputs.
///
/// The control loop calls these methods in a fixed protocol:
///
/// 1. `initialize_run` once before the first time step
/// 2. per time step: `time_step`, then alternating solve / `is_converged` /
///    `control_step` rounds, then `finalize_step`
///
/// `control_step` must be idempotent for unchanged solver output: two calls
/// without an intervening solve leave the model in the same state.
pub trait Controller: Send {
    /// Human readable label for diagnostics and errors.
    fn name(&self) -> &str;

    /// Cells this controller writes. Used for the registration-time
    /// conflict check.
    fn writes(&self) -> Vec<CellRef>;

    /// Validate element references before the run.
    fn initialize_run(&mut self, _net: &NetworkModel) -> ControlResult<()> {
        Ok(())
    }

    /// Advance history-dependent state to a new time step.
    fn time_step(&mut self, ctx: &StepContext) -> ControlResult<()>;

    /// Whether the model already reflects this controller's target, given
    /// the latest solve. Errors when that cannot be decided.
    fn is_converged(&self, net: &NetworkModel) -> ControlResult<bool>;

    /// Apply one correction to the model.
    fn control_step(&mut self, access: &mut ModelAccess<'_>) -> ControlResult<()>;

    /// Hook after the step's control loop reached a terminal state.
    fn finalize_step(&mut self, _net: &NetworkModel, _ctx: &StepContext) -> ControlResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_net::Row;

    fn nets() -> (NetworkModel, NetworkModel) {
        let mut live = NetworkModel::new();
        live.insert_row("load", 0, Row::new().with("p_mw", 1.0))
            .unwrap();
        let solved = live.clone();
        (live, solved)
    }

    #[test]
    fn prior_iteration_reads_ignore_fresh_writes() {
        let (mut live, solved) = nets();
        let mut access = ModelAccess::new(&mut live, &solved, Visibility::PriorIteration);
        access.write("load", 0, "p_mw", 2.0).unwrap();
        assert_eq!(access.read("load", 0, "p_mw").unwrap(), 1.0);
        assert!(access.changed());
    }

    #[test]
    fn same_iteration_reads_see_fresh_writes() {
        let (mut live, solved) = nets();
        let mut access = ModelAccess::new(&mut live, &solved, Visibility::SameIteration);
        access.write("load", 0, "p_mw", 2.0).unwrap();
        assert_eq!(access.read("load", 0, "p_mw").unwrap(), 2.0);
        assert_eq!(access.read_solved("load", 0, "p_mw").unwrap(), 1.0);
    }

    #[test]
    fn rewriting_same_value_is_not_a_change() {
        let (mut live, solved) = nets();
        let mut access = ModelAccess::new(&mut live, &solved, Visibility::PriorIteration);
        access.write("load", 0, "p_mw", 1.0).unwrap();
        assert!(!access.changed());
    }
}
