//! Time-series driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pl_control::{
    ControlError, ControlLoop, ControllerRegistry, LoopOptions, LoopReport, StepContext,
    finalize_controllers, initialize_controllers, time_step_controllers,
};
use pl_core::{Time, TimeStep, minutes, s};
use pl_net::NetworkModel;
use pl_solver::Solver;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};
use uom::si::time::second;

use crate::error::{SimError, SimResult, StepStage};
use crate::output::OutputWriter;
use crate::sink::ResultSink;

/// Time indices to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSteps {
    /// `start..end`, end exclusive.
    Range { start: TimeStep, end: TimeStep },
    /// Strictly increasing list.
    Explicit(Vec<TimeStep>),
}

impl TimeSteps {
    /// Materialize and validate the sequence.
    pub fn resolve(&self) -> SimResult<Vec<TimeStep>> {
        match self {
            TimeSteps::Range { start, end } => {
                if start > end {
                    return Err(SimError::InvalidTimeSteps {
                        what: format!("range start {start} is after end {end}"),
                    });
                }
                Ok((*start..*end).collect())
            }
            TimeSteps::Explicit(steps) => {
                if let Some(pair) = steps.windows(2).find(|w| w[0] >= w[1]) {
                    return Err(SimError::InvalidTimeSteps {
                        what: format!("time steps must be strictly increasing ({} then {})", pair[0], pair[1]),
                    });
                }
                Ok(steps.clone())
            }
        }
    }
}

/// Behavior when a step fails with a recoverable error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFailurePolicy {
    /// Stop the run with [`SimError::StepFailed`].
    #[default]
    Abort,
    /// Log a warning, record a gap row and continue with the next step.
    SkipStep,
}

/// Options for a time-series run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub time_steps: TimeSteps,
    /// Duration between consecutive time indices.
    pub step_duration: Time,
    pub loop_options: LoopOptions,
    pub on_step_failure: StepFailurePolicy,
    /// Flush the cumulative buffer every N processed steps.
    pub flush_every: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            time_steps: TimeSteps::Range { start: 0, end: 1 },
            step_duration: minutes(15.0),
            loop_options: LoopOptions::default(),
            on_step_failure: StepFailurePolicy::default(),
            flush_every: None,
        }
    }
}

/// Progress snapshot emitted after every processed step.
#[derive(Debug, Clone)]
pub struct StepProgress {
    /// 0-based position of the step.
    pub position: usize,
    pub total: usize,
    pub time: TimeStep,
    pub fraction_complete: f64,
    /// `None` when the step was skipped.
    pub loop_report: Option<LoopReport>,
}

/// Outcome of a time-series run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Processed steps, skipped ones included.
    pub steps: usize,
    pub failed_steps: Vec<TimeStep>,
    /// Steps completed with a best-effort (unconverged) control state.
    pub unconverged_steps: Vec<TimeStep>,
    pub solves: usize,
    pub cancelled: bool,
}

/// Cooperative cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Time-series runner with optional progress, cancellation and sink hooks.
pub struct TimeSeries<'a> {
    options: RunOptions,
    progress: Option<Box<dyn FnMut(&StepProgress) + 'a>>,
    cancel: Option<CancelToken>,
    sink: Option<&'a mut dyn ResultSink>,
}

impl<'a> TimeSeries<'a> {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            progress: None,
            cancel: None,
            sink: None,
        }
    }

    pub fn with_progress(mut self, progress: impl FnMut(&StepProgress) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_sink(mut self, sink: &'a mut dyn ResultSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Process every time step in order.
    ///
    /// Step `t+1` starts only after step `t` reached a terminal state
    /// (recorded, skipped, or failed). On cancellation the steps processed
    /// so far are kept and flushed.
    pub fn run<S: Solver + ?Sized>(
        &mut self,
        net: &mut NetworkModel,
        registry: &mut ControllerRegistry,
        solver: &mut S,
        output: &mut OutputWriter,
    ) -> SimResult<RunSummary> {
        let steps = self.options.time_steps.resolve()?;
        let step_seconds = self.options.step_duration.get::<second>();
        if !(step_seconds.is_finite() && step_seconds > 0.0) {
            return Err(SimError::InvalidArg {
                what: "step_duration must be positive",
            });
        }
        if self.options.flush_every == Some(0) {
            return Err(SimError::InvalidArg {
                what: "flush_every must be positive",
            });
        }

        info!(steps = steps.len(), controllers = registry.len(), "time series started");
        initialize_controllers(registry, net)?;
        output.start(net)?;

        let control = ControlLoop::new(self.options.loop_options);
        let total = steps.len();
        let mut summary = RunSummary::default();
        let mut previous: Option<TimeStep> = None;
        let first = steps.first().copied().unwrap_or_default();

        for (position, &time) in steps.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                info!(time, "time series cancelled");
                summary.cancelled = true;
                break;
            }

            let span = info_span!("timestep", t = time);
            let _guard = span.enter();

            let elapsed = match previous {
                Some(prev) => s(step_seconds * (time - prev) as f64),
                None => s(0.0),
            };
            let clock = s(step_seconds * (time - first) as f64);
            let ctx = StepContext::new(time, position, elapsed).at(clock);
            previous = Some(time);

            let loop_report = match run_step(&control, &ctx, net, registry, solver) {
                Ok(report) => {
                    summary.solves += report.solves;
                    if !report.converged {
                        summary.unconverged_steps.push(time);
                    }
                    output.record(time, net)?;
                    debug!(solves = report.solves, converged = report.converged, "step done");
                    Some(report)
                }
                Err((stage, err)) => {
                    if self.options.on_step_failure == StepFailurePolicy::SkipStep
                        && is_skippable(&err)
                    {
                        warn!(%stage, error = %err, "skipping time step");
                        summary.failed_steps.push(time);
                        output.record_gap(time)?;
                        None
                    } else {
                        return Err(SimError::StepFailed {
                            time,
                            stage,
                            source: err,
                        });
                    }
                }
            };
            summary.steps += 1;

            if let Some(progress) = self.progress.as_mut() {
                progress(&StepProgress {
                    position,
                    total,
                    time,
                    fraction_complete: (position + 1) as f64 / total as f64,
                    loop_report,
                });
            }

            if let (Some(every), Some(sink)) = (self.options.flush_every, self.sink.as_mut()) {
                if summary.steps % every == 0 {
                    output.flush(&mut **sink)?;
                }
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            output.flush(&mut **sink)?;
        }

        info!(
            steps = summary.steps,
            failed = summary.failed_steps.len(),
            unconverged = summary.unconverged_steps.len(),
            solves = summary.solves,
            "time series finished"
        );
        Ok(summary)
    }
}

fn run_step<S: Solver + ?Sized>(
    control: &ControlLoop,
    ctx: &StepContext,
    net: &mut NetworkModel,
    registry: &mut ControllerRegistry,
    solver: &mut S,
) -> Result<LoopReport, (StepStage, ControlError)> {
    time_step_controllers(registry, ctx).map_err(|e| (StepStage::TimeStep, e))?;
    let report = control
        .run(registry, net, solver)
        .map_err(|e| (StepStage::ControlLoop, e))?;
    finalize_controllers(registry, net, ctx).map_err(|e| (StepStage::Finalize, e))?;
    Ok(report)
}

/// Failures a skip-step policy may absorb: missing profile data, solver
/// non-convergence and control-loop divergence. Invalid solver input and
/// model errors always abort.
fn is_skippable(err: &ControlError) -> bool {
    match err.root() {
        ControlError::Data(_) | ControlError::DidNotConverge { .. } => true,
        ControlError::Solver(e) => e.is_non_convergence(),
        _ => false,
    }
}

/// Run a time series without hooks.
pub fn run_timeseries<S: Solver + ?Sized>(
    net: &mut NetworkModel,
    registry: &mut ControllerRegistry,
    solver: &mut S,
    output: &mut OutputWriter,
    options: &RunOptions,
) -> SimResult<RunSummary> {
    TimeSeries::new(options.clone()).run(net, registry, solver, output)
}
