//! Scenario compilation: schema definitions to runtime objects.

use std::path::Path;
use std::sync::Arc;

use pl_control::{
    ConstControl, ContinuousTapControl, Controller, ControllerRegistry, DiscreteTapControl,
    DivergencePolicy, LoopOptions, Registration, StorageControl, TapSide, Visibility,
};
use pl_core::{minutes, mwh};
use pl_data::{DataSource, FrameData};
use pl_net::{NetworkModel, Row};
use pl_project::{
    AggregateDef, ControllerDef, ControllerKindDef, DivergenceDef, OutputDef, RunDef, Scenario,
    SolverDef, StepFailureDef, TapSideDef, TimeStepsDef, VisibilityDef,
};
use pl_solver::{NewtonConfig, RadialFeederSolver};
use pl_timeseries::{Aggregate, LogSpec, OutputWriter, RunOptions, StepFailurePolicy, TimeSteps};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::profiles::load_profiles;

/// Everything a time-series run needs, built from one scenario.
pub struct CompiledScenario {
    pub network: NetworkModel,
    pub profiles: Option<Arc<FrameData>>,
    pub registry: ControllerRegistry,
    pub output: OutputWriter,
    pub options: RunOptions,
    pub solver: RadialFeederSolver,
}

/// Compile a validated scenario. `base_dir` resolves relative profile paths.
pub fn compile_scenario(scenario: &Scenario, base_dir: &Path) -> AppResult<CompiledScenario> {
    let network = build_network(scenario)?;
    let profiles = match &scenario.profiles {
        Some(def) => Some(Arc::new(load_profiles(def, base_dir)?)),
        None => None,
    };
    let registry = build_controllers(&scenario.controllers, profiles.as_ref())?;
    let output = build_output(&scenario.output)?;
    let options = build_run_options(&scenario.run, &scenario.output, profiles.as_deref());
    let solver = build_solver(&scenario.solver);

    info!(
        scenario = %scenario.name,
        tables = scenario.network.len(),
        controllers = registry.len(),
        "scenario compiled"
    );

    Ok(CompiledScenario {
        network,
        profiles,
        registry,
        output,
        options,
        solver,
    })
}

pub fn build_network(scenario: &Scenario) -> AppResult<NetworkModel> {
    let mut net = NetworkModel::new();
    for (table, elements) in &scenario.network {
        net.add_table(table.as_str());
        for element in elements {
            let row: Row = element
                .values
                .iter()
                .map(|(column, value)| (column.as_str(), *value))
                .collect();
            net.insert_row(table, element.index, row)?;
        }
    }
    Ok(net)
}

/// Instantiate every controller and register it with its level and order.
pub fn build_controllers(
    defs: &[ControllerDef],
    profiles: Option<&Arc<FrameData>>,
) -> AppResult<ControllerRegistry> {
    let mut registry = ControllerRegistry::new();
    for def in defs {
        let controller = build_controller(def, profiles)?;
        let registration = Registration {
            level: def.level,
            order: def.order,
            in_service: def.in_service,
        };
        registry
            .add_boxed(controller, registration)
            .map_err(|e| e.in_controller(def.id.as_str()))?;
        debug!(controller = %def.id, level = def.level, order = def.order, "controller registered");
    }
    Ok(registry)
}

fn build_controller(
    def: &ControllerDef,
    profiles: Option<&Arc<FrameData>>,
) -> AppResult<Box<dyn Controller>> {
    let source = || -> AppResult<Arc<dyn DataSource>> {
        match profiles {
            Some(frame) => Ok(Arc::clone(frame) as Arc<dyn DataSource>),
            None => Err(AppError::Compile(format!(
                "controller '{}' reads profiles but the scenario declares none",
                def.id
            ))),
        }
    };
    let named = |e: pl_control::ControlError| AppError::from(e.in_controller(def.id.as_str()));

    let controller: Box<dyn Controller> = match &def.kind {
        ControllerKindDef::Const {
            table,
            column,
            indices,
            profiles: names,
            scale_factor,
        } => Box::new(
            ConstControl::new(
                table.as_str(),
                column.as_str(),
                indices.clone(),
                source()?,
                names.clone(),
            )
            .and_then(|c| c.with_name(def.id.as_str()).with_scale_factor(*scale_factor))
            .map_err(named)?,
        ),
        ControllerKindDef::DiscreteTap {
            trafo,
            vm_lower_pu,
            vm_upper_pu,
            side,
        } => Box::new(
            DiscreteTapControl::new(*trafo, *vm_lower_pu, *vm_upper_pu)
                .map_err(named)?
                .with_name(def.id.as_str())
                .with_side(tap_side(*side)),
        ),
        ControllerKindDef::ContinuousTap {
            trafo,
            vm_set_pu,
            tol,
            side,
        } => Box::new(
            ContinuousTapControl::new(*trafo, *vm_set_pu, *tol)
                .map_err(named)?
                .with_name(def.id.as_str())
                .with_side(tap_side(*side)),
        ),
        ControllerKindDef::Storage {
            storage,
            max_e_mwh,
            soc_percent,
            profile,
            scale_factor,
            min_soc,
            max_soc,
        } => {
            let mut control = StorageControl::new(*storage, mwh(*max_e_mwh), *soc_percent)
                .map_err(named)?
                .with_name(def.id.as_str());
            if let Some(profile) = profile {
                control = control.with_profile(source()?, profile.as_str(), *scale_factor);
            }
            if min_soc.is_some() || max_soc.is_some() {
                control = control
                    .with_soc_bounds(min_soc.unwrap_or(0.0), max_soc.unwrap_or(100.0))
                    .map_err(named)?;
            }
            Box::new(control)
        }
    };
    Ok(controller)
}

fn tap_side(side: TapSideDef) -> TapSide {
    match side {
        TapSideDef::Hv => TapSide::Hv,
        TapSideDef::Lv => TapSide::Lv,
    }
}

pub fn build_output(def: &OutputDef) -> AppResult<OutputWriter> {
    let mut output = OutputWriter::new();
    for variable in &def.variables {
        let spec = LogSpec {
            indices: variable.indices.clone(),
            aggregate: variable.aggregate.map(aggregate),
        };
        output.log_with(variable.table.as_str(), variable.column.as_str(), spec)?;
    }
    Ok(output)
}

fn aggregate(def: AggregateDef) -> Aggregate {
    match def {
        AggregateDef::Max => Aggregate::Max,
        AggregateDef::Min => Aggregate::Min,
        AggregateDef::Sum => Aggregate::Sum,
        AggregateDef::Mean => Aggregate::Mean,
    }
}

/// Driver options. Without explicit time steps every profile row is run, in
/// ascending order; a scenario without profiles runs the single step 0.
pub fn build_run_options(run: &RunDef, output: &OutputDef, profiles: Option<&FrameData>) -> RunOptions {
    let time_steps = match (&run.time_steps, profiles) {
        (Some(TimeStepsDef::List(steps)), _) => TimeSteps::Explicit(steps.clone()),
        (Some(TimeStepsDef::Range { start, end }), _) => TimeSteps::Range {
            start: *start,
            end: *end,
        },
        (None, Some(frame)) => {
            let mut steps = frame.index().to_vec();
            steps.sort_unstable();
            TimeSteps::Explicit(steps)
        }
        (None, None) => TimeSteps::Range { start: 0, end: 1 },
    };

    RunOptions {
        time_steps,
        step_duration: minutes(run.step_minutes),
        loop_options: LoopOptions {
            max_iter: run.max_iter,
            on_divergence: match run.on_divergence {
                DivergenceDef::Abort => DivergencePolicy::Abort,
                DivergenceDef::BestEffort => DivergencePolicy::BestEffort,
            },
            visibility: match run.visibility {
                VisibilityDef::PriorIteration => Visibility::PriorIteration,
                VisibilityDef::SameIteration => Visibility::SameIteration,
            },
        },
        on_step_failure: match run.on_step_failure {
            StepFailureDef::Abort => StepFailurePolicy::Abort,
            StepFailureDef::SkipStep => StepFailurePolicy::SkipStep,
        },
        flush_every: output.flush_every,
    }
}

pub fn build_solver(def: &SolverDef) -> RadialFeederSolver {
    RadialFeederSolver {
        base_mva: def.base_mva,
        newton: NewtonConfig {
            max_iterations: def.max_iterations,
            abs_tol: def.abs_tol,
            ..NewtonConfig::default()
        },
    }
}
