//! Control convergence loop.
//!
//! Levels are processed in ascending order. Inside a level the loop
//! alternates solver calls and corrections by the controllers that are not
//! yet converged, until every controller of the level reports convergence
//! or the iteration cap fires.

use pl_net::NetworkModel;
use pl_solver::Solver;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::controller::{ModelAccess, StepContext};
use crate::error::{ControlError, ControlResult};
use crate::registry::ControllerRegistry;

/// What a controller's `read` observes during `control_step`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Reads return the model as solved at the start of the round.
    #[default]
    PriorIteration,
    /// Reads see writes made earlier in the same round.
    SameIteration,
}

/// Behavior when a level hits the iteration cap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Fail with [`ControlError::DidNotConverge`].
    #[default]
    Abort,
    /// Log a warning, keep the last written state and move to the next level.
    BestEffort,
}

/// Options for the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopOptions {
    /// Maximum correction rounds per level.
    pub max_iter: usize,
    pub on_divergence: DivergencePolicy,
    pub visibility: Visibility,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_iter: 30,
            on_divergence: DivergencePolicy::default(),
            visibility: Visibility::default(),
        }
    }
}

/// Outcome of one level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelReport {
    pub level: i32,
    /// Correction rounds performed.
    pub iterations: usize,
    pub converged: bool,
    /// Controllers still unconverged when the level ended.
    pub unconverged: Vec<String>,
}

/// Outcome of one loop invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    /// True when every level converged.
    pub converged: bool,
    /// Number of solver calls.
    pub solves: usize,
    pub levels: Vec<LevelReport>,
}

/// Orchestrates solver calls and controller corrections.
#[derive(Clone, Debug, Default)]
pub struct ControlLoop {
    options: LoopOptions,
}

impl ControlLoop {
    pub fn new(options: LoopOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    /// Drive every level of `registry` to convergence against `net`.
    ///
    /// The model always ends in a solved state: when controllers wrote after
    /// the latest solve, one more solve runs. A registry without in-service
    /// controllers still triggers exactly one solve.
    pub fn run<S: Solver + ?Sized>(
        &self,
        registry: &mut ControllerRegistry,
        net: &mut NetworkModel,
        solver: &mut S,
    ) -> ControlResult<LoopReport> {
        if self.options.max_iter == 0 {
            return Err(ControlError::InvalidArg {
                what: "max_iter must be positive",
            });
        }

        let mut report = LoopReport {
            converged: true,
            ..LoopReport::default()
        };
        // Inputs may have changed since the caller's last solve.
        let mut dirty = true;

        for level in registry.levels() {
            let level_report = self.run_level(level, registry, net, solver, &mut dirty, &mut report)?;
            report.converged &= level_report.converged;
            report.levels.push(level_report);
        }

        if dirty {
            trace!("final solve");
            solver.solve(net)?;
            report.solves += 1;
        }

        Ok(report)
    }

    fn run_level<S: Solver + ?Sized>(
        &self,
        level: i32,
        registry: &mut ControllerRegistry,
        net: &mut NetworkModel,
        solver: &mut S,
        dirty: &mut bool,
        report: &mut LoopReport,
    ) -> ControlResult<LevelReport> {
        let members = registry.level_members(level);
        let mut iterations = 0;

        loop {
            if *dirty {
                solver.solve(net)?;
                report.solves += 1;
                *dirty = false;
            }

            let mut pending = Vec::new();
            for &pos in &members {
                let controller = registry.entry(pos).controller.as_ref();
                let converged = controller
                    .is_converged(net)
                    .map_err(|e| e.in_controller(controller.name()))?;
                if !converged {
                    pending.push(pos);
                }
            }

            if pending.is_empty() {
                debug!(level, iterations, "level converged");
                return Ok(LevelReport {
                    level,
                    iterations,
                    converged: true,
                    unconverged: Vec::new(),
                });
            }

            if iterations >= self.options.max_iter {
                let controllers: Vec<String> = pending
                    .iter()
                    .map(|&pos| registry.entry(pos).controller.name().to_string())
                    .collect();
                match self.options.on_divergence {
                    DivergencePolicy::Abort => {
                        return Err(ControlError::DidNotConverge {
                            level,
                            iterations,
                            controllers,
                        });
                    }
                    DivergencePolicy::BestEffort => {
                        warn!(
                            level,
                            iterations,
                            unconverged = %controllers.join(", "),
                            "level did not converge, continuing with best-effort state"
                        );
                        return Ok(LevelReport {
                            level,
                            iterations,
                            converged: false,
                            unconverged: controllers,
                        });
                    }
                }
            }

            trace!(level, iteration = iterations, pending = pending.len(), "control round");
            let solved = net.clone();
            for pos in pending {
                let controller = registry.entry_mut(pos).controller.as_mut();
                let mut access = ModelAccess::new(net, &solved, self.options.visibility);
                controller
                    .control_step(&mut access)
                    .map_err(|e| e.in_controller(controller.name()))?;
                *dirty |= access.changed();
            }
            iterations += 1;
        }
    }
}

/// One-shot control run outside a time series.
///
/// Calls `initialize_run` on every in-service controller, then drives the
/// loop once.
pub fn run_control<S: Solver + ?Sized>(
    registry: &mut ControllerRegistry,
    net: &mut NetworkModel,
    solver: &mut S,
    options: &LoopOptions,
) -> ControlResult<LoopReport> {
    initialize_controllers(registry, net)?;
    ControlLoop::new(*options).run(registry, net, solver)
}

/// Run `initialize_run` on every in-service controller in execution order.
pub fn initialize_controllers(
    registry: &mut ControllerRegistry,
    net: &NetworkModel,
) -> ControlResult<()> {
    for pos in registry.ordered_positions() {
        let controller = registry.entry_mut(pos).controller.as_mut();
        controller
            .initialize_run(net)
            .map_err(|e| e.in_controller(controller.name()))?;
    }
    Ok(())
}

/// Run `time_step` on every in-service controller in execution order.
pub fn time_step_controllers(
    registry: &mut ControllerRegistry,
    ctx: &StepContext,
) -> ControlResult<()> {
    for pos in registry.ordered_positions() {
        let controller = registry.entry_mut(pos).controller.as_mut();
        controller
            .time_step(ctx)
            .map_err(|e| e.in_controller(controller.name()))?;
    }
    Ok(())
}

/// Run `finalize_step` on every in-service controller in execution order.
pub fn finalize_controllers(
    registry: &mut ControllerRegistry,
    net: &NetworkModel,
    ctx: &StepContext,
) -> ControlResult<()> {
    for pos in registry.ordered_positions() {
        let controller = registry.entry_mut(pos).controller.as_mut();
        controller
            .finalize_step(net, ctx)
            .map_err(|e| e.in_controller(controller.name()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use pl_net::{CellRef, Row};
    use pl_solver::{SolveReport, SolverError, SolverResult};

    /// Copies `load[i].p_mw` into `res_load[i].p_mw`.
    #[derive(Default)]
    struct EchoSolver {
        calls: usize,
        fail: Option<SolverError>,
    }

    impl Solver for EchoSolver {
        fn solve(&mut self, net: &mut NetworkModel) -> SolverResult<SolveReport> {
            self.calls += 1;
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            for (index, p) in net.column("load", "p_mw")? {
                net.set_result("res_load", index, "p_mw", p)?;
            }
            Ok(SolveReport::default())
        }
    }

    /// Moves `load[index].p_mw` one unit per round towards `target`.
    struct Stepper {
        name: String,
        index: usize,
        target: f64,
    }

    impl Controller for Stepper {
        fn name(&self) -> &str {
            &self.name
        }
        fn writes(&self) -> Vec<CellRef> {
            vec![CellRef::new("load", self.index, "p_mw")]
        }
        fn time_step(&mut self, _ctx: &StepContext) -> ControlResult<()> {
            Ok(())
        }
        fn is_converged(&self, net: &NetworkModel) -> ControlResult<bool> {
            Ok(net.get("res_load", self.index, "p_mw")? == self.target)
        }
        fn control_step(&mut self, access: &mut ModelAccess<'_>) -> ControlResult<()> {
            let current = access.read_solved("res_load", self.index, "p_mw")?;
            let next = current + (self.target - current).signum();
            access.write("load", self.index, "p_mw", next)?;
            Ok(())
        }
    }

    fn net() -> NetworkModel {
        let mut net = NetworkModel::new();
        net.insert_row("load", 0, Row::new().with("p_mw", 0.0)).unwrap();
        net.insert_row("load", 1, Row::new().with("p_mw", 0.0)).unwrap();
        net
    }

    fn stepper(name: &str, index: usize, target: f64) -> Stepper {
        Stepper {
            name: name.to_string(),
            index,
            target,
        }
    }

    #[test]
    fn empty_registry_still_solves_once() {
        let mut registry = ControllerRegistry::new();
        let mut net = net();
        let mut solver = EchoSolver::default();
        let report = ControlLoop::default()
            .run(&mut registry, &mut net, &mut solver)
            .unwrap();
        assert!(report.converged);
        assert_eq!(report.solves, 1);
        assert_eq!(net.get("res_load", 0, "p_mw").unwrap(), 0.0);
    }

    #[test]
    fn converges_and_ends_on_a_solve() {
        let mut registry = ControllerRegistry::new();
        registry.add(stepper("s", 0, 3.0), 0, 0).unwrap();
        let mut net = net();
        let mut solver = EchoSolver::default();
        let report = ControlLoop::default()
            .run(&mut registry, &mut net, &mut solver)
            .unwrap();

        assert!(report.converged);
        assert_eq!(report.levels[0].iterations, 3);
        assert_eq!(report.solves, 4);
        assert_eq!(solver.calls, 4);
        assert_eq!(net.get("res_load", 0, "p_mw").unwrap(), 3.0);
    }

    #[test]
    fn cap_aborts_with_level_and_names() {
        let mut registry = ControllerRegistry::new();
        registry.add(stepper("slow", 0, 10.0), 2, 0).unwrap();
        let mut net = net();
        let options = LoopOptions {
            max_iter: 4,
            ..LoopOptions::default()
        };
        let err = ControlLoop::new(options)
            .run(&mut registry, &mut net, &mut EchoSolver::default())
            .unwrap_err();
        assert_eq!(
            err,
            ControlError::DidNotConverge {
                level: 2,
                iterations: 4,
                controllers: vec!["slow".to_string()],
            }
        );
        // Last written state is kept.
        assert_eq!(net.get("load", 0, "p_mw").unwrap(), 4.0);
    }

    #[test]
    fn best_effort_moves_on_to_next_level() {
        let mut registry = ControllerRegistry::new();
        registry.add(stepper("slow", 0, 10.0), 0, 0).unwrap();
        registry.add(stepper("quick", 1, 1.0), 1, 0).unwrap();
        let mut net = net();
        let options = LoopOptions {
            max_iter: 2,
            on_divergence: DivergencePolicy::BestEffort,
            ..LoopOptions::default()
        };
        let report = ControlLoop::new(options)
            .run(&mut registry, &mut net, &mut EchoSolver::default())
            .unwrap();

        assert!(!report.converged);
        assert!(!report.levels[0].converged);
        assert_eq!(report.levels[0].unconverged, vec!["slow".to_string()]);
        assert!(report.levels[1].converged);
        assert_eq!(net.get("res_load", 1, "p_mw").unwrap(), 1.0);
    }

    #[test]
    fn solver_errors_propagate() {
        let mut registry = ControllerRegistry::new();
        let mut net = net();
        let mut solver = EchoSolver {
            fail: Some(SolverError::ConvergenceFailed {
                what: "no root".to_string(),
            }),
            ..EchoSolver::default()
        };
        let err = ControlLoop::default()
            .run(&mut registry, &mut net, &mut solver)
            .unwrap_err();
        assert!(matches!(err, ControlError::Solver(e) if e.is_non_convergence()));
    }

    #[test]
    fn zero_cap_is_rejected() {
        let options = LoopOptions {
            max_iter: 0,
            ..LoopOptions::default()
        };
        let err = ControlLoop::new(options)
            .run(&mut ControllerRegistry::new(), &mut net(), &mut EchoSolver::default())
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidArg { .. }));
    }
}
