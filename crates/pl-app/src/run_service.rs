//! Run execution and caching.

use std::path::{Path, PathBuf};
use std::time::Instant;

use pl_control::ControllerSummary;
use pl_project::{OutputFormatDef, ProfilesDef, Scenario};
use pl_results::{CsvSink, JsonSink, OutputFormat, RunId, RunManifest, RunStore, compute_run_id};
use pl_timeseries::{CancelToken, OutputTables, ResultSink, TimeSeries};
use serde::Serialize;
use tracing::{info, warn};

use crate::build::{CompiledScenario, compile_scenario};
use crate::error::{AppError, AppResult};
use crate::progress::{RunProgressEvent, RunStage, TimeSeriesProgress};
use crate::scenario_service::load_scenario;

/// Options for run execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Reuse a stored run with the same id instead of re-running.
    pub use_cache: bool,
    pub solver_version: String,
    /// Copy the tables out of the store after the run.
    pub export: Option<ExportRequest>,
    pub cancel: Option<CancelToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            solver_version: env!("CARGO_PKG_VERSION").to_string(),
            export: None,
            cancel: None,
        }
    }
}

/// Where and how to export tables; the scenario's format when `format` is `None`.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub dir: PathBuf,
    pub format: Option<OutputFormat>,
}

/// Request to execute a run.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub scenario_path: &'a Path,
    pub options: RunOptions,
}

/// Wall-clock split of a run.
#[derive(Debug, Clone, Default)]
pub struct RunTimingSummary {
    pub compile_time_s: f64,
    pub run_time_s: f64,
    pub save_time_s: f64,
    pub load_cache_time_s: f64,
    pub total_time_s: f64,
}

/// Response from a run operation.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub run_id: RunId,
    pub manifest: RunManifest,
    pub tables: OutputTables,
    pub loaded_from_cache: bool,
    /// Files written by the export step.
    pub exported: Vec<PathBuf>,
    pub timing: RunTimingSummary,
}

/// Inputs hashed next to the scenario so that edited profile files
/// invalidate cached runs.
#[derive(Serialize)]
struct RunKey<'a> {
    profile_csv: Option<&'a str>,
}

fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    stage: RunStage,
    started: Instant,
    message: Option<String>,
    timeseries: Option<TimeSeriesProgress>,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(RunProgressEvent {
            stage,
            elapsed_wall_s: started.elapsed().as_secs_f64(),
            message,
            timeseries,
        });
    }
}

/// Execute or load a run.
pub fn ensure_run(request: &RunRequest) -> AppResult<RunResponse> {
    run_scenario(request, None)
}

/// Execute or load a run and stream progress events.
pub fn run_scenario(
    request: &RunRequest,
    mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
) -> AppResult<RunResponse> {
    let started = Instant::now();
    let mut timing = RunTimingSummary::default();

    emit_progress(
        &mut progress_cb,
        RunStage::LoadingScenario,
        started,
        Some(format!("Loading {}", request.scenario_path.display())),
        None,
    );
    let scenario = load_scenario(request.scenario_path)?;
    let base_dir = scenario_dir(request.scenario_path);

    let profile_csv = match &scenario.profiles {
        Some(ProfilesDef::Csv { path, .. }) => {
            let csv_path = base_dir.join(path);
            Some(std::fs::read_to_string(&csv_path).map_err(|e| {
                AppError::Profiles(format!("cannot read {}: {e}", csv_path.display()))
            })?)
        }
        _ => None,
    };
    let run_id = compute_run_id(
        &scenario,
        &RunKey {
            profile_csv: profile_csv.as_deref(),
        },
        &request.options.solver_version,
    );
    let store = RunStore::for_scenario(request.scenario_path)?;

    emit_progress(
        &mut progress_cb,
        RunStage::CheckingCache,
        started,
        Some("Checking cache".to_string()),
        None,
    );

    if request.options.use_cache && store.has_run(&run_id) {
        emit_progress(
            &mut progress_cb,
            RunStage::LoadingCachedResult,
            started,
            Some("Loading cached run".to_string()),
            None,
        );
        let load_started = Instant::now();
        let manifest = store.load_manifest(&run_id)?;
        let tables = store.load_tables(&run_id)?;
        timing.load_cache_time_s = load_started.elapsed().as_secs_f64();
        info!(run_id = %run_id, "run loaded from cache");

        let exported = export_tables(&request.options, &scenario, &tables, &mut progress_cb, started)?;
        timing.total_time_s = started.elapsed().as_secs_f64();
        emit_progress(
            &mut progress_cb,
            RunStage::Completed,
            started,
            Some("Loaded cached run".to_string()),
            None,
        );
        return Ok(RunResponse {
            run_id,
            manifest,
            tables,
            loaded_from_cache: true,
            exported,
            timing,
        });
    }

    emit_progress(
        &mut progress_cb,
        RunStage::Compiling,
        started,
        Some("Compiling scenario".to_string()),
        None,
    );
    let compile_started = Instant::now();
    let CompiledScenario {
        mut network,
        mut registry,
        mut output,
        options,
        mut solver,
        ..
    } = compile_scenario(&scenario, base_dir)?;
    timing.compile_time_s = compile_started.elapsed().as_secs_f64();

    emit_progress(
        &mut progress_cb,
        RunStage::RunningTimeSeries,
        started,
        Some("Running time series".to_string()),
        None,
    );
    let run_started = Instant::now();
    let steps = options.time_steps.resolve()?;
    let mut sink = store.sink(run_id.as_str());
    let summary = {
        let mut runner = TimeSeries::new(options).with_sink(&mut sink).with_progress(|p| {
            emit_progress(
                &mut progress_cb,
                RunStage::RunningTimeSeries,
                started,
                None,
                Some(TimeSeriesProgress::from(p)),
            );
        });
        if let Some(token) = &request.options.cancel {
            runner = runner.with_cancel(token.clone());
        }
        runner.run(&mut network, &mut registry, &mut solver, &mut output)?
    };
    timing.run_time_s = run_started.elapsed().as_secs_f64();

    if !summary.failed_steps.is_empty() {
        warn!(run_id = %run_id, failed = ?summary.failed_steps, "run finished with skipped steps");
    }

    emit_progress(
        &mut progress_cb,
        RunStage::SavingResults,
        started,
        Some("Saving results".to_string()),
        None,
    );
    let save_started = Instant::now();
    let processed = &steps[..summary.steps.min(steps.len())];
    let manifest = RunManifest::new(
        run_id.as_str(),
        scenario.name.as_str(),
        request.options.solver_version.as_str(),
        processed,
        summary,
    );
    let tables = output.tables().clone();
    // A cancelled run keeps its flushed tables but never becomes a cache hit.
    if !manifest.summary.cancelled {
        store.save_manifest(&manifest)?;
    }
    timing.save_time_s = save_started.elapsed().as_secs_f64();

    let exported = export_tables(&request.options, &scenario, &tables, &mut progress_cb, started)?;
    timing.total_time_s = started.elapsed().as_secs_f64();

    emit_progress(
        &mut progress_cb,
        RunStage::Completed,
        started,
        Some("Run completed".to_string()),
        None,
    );
    info!(
        run_id = %run_id,
        steps = manifest.summary.steps,
        total_s = timing.total_time_s,
        "run completed"
    );

    Ok(RunResponse {
        run_id,
        manifest,
        tables,
        loaded_from_cache: false,
        exported,
        timing,
    })
}

fn scenario_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn export_tables(
    options: &RunOptions,
    scenario: &Scenario,
    tables: &OutputTables,
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    started: Instant,
) -> AppResult<Vec<PathBuf>> {
    let Some(export) = &options.export else {
        return Ok(Vec::new());
    };
    let format = export.format.unwrap_or(match scenario.output.format {
        OutputFormatDef::Json => OutputFormat::Json,
        OutputFormatDef::Csv => OutputFormat::Csv,
    });
    emit_progress(
        progress_cb,
        RunStage::Exporting,
        started,
        Some(format!("Exporting to {}", export.dir.display())),
        None,
    );

    let written = match format {
        OutputFormat::Json => {
            let mut sink = JsonSink::new(export.dir.join("tables.json"));
            sink.write(tables).map_err(|e| AppError::Results(e.to_string()))?;
            vec![sink.path().to_path_buf()]
        }
        OutputFormat::Csv => {
            let mut sink = CsvSink::new(&export.dir);
            sink.write(tables).map_err(|e| AppError::Results(e.to_string()))?;
            tables
                .tables
                .keys()
                .map(|key| sink.dir().join(format!("{key}.csv")))
                .collect()
        }
    };
    Ok(written)
}

/// Stored runs of a scenario, most recent first.
pub fn list_runs(scenario_path: &Path) -> AppResult<Vec<RunManifest>> {
    let scenario = load_scenario(scenario_path)?;
    let store = RunStore::for_scenario(scenario_path)?;

    let mut runs = store.list_runs(&scenario.name)?;
    runs.reverse();
    Ok(runs)
}

/// Load a specific stored run.
pub fn load_run(scenario_path: &Path, run_id: &str) -> AppResult<(RunManifest, OutputTables)> {
    let store = RunStore::for_scenario(scenario_path)?;

    let manifest = store.load_manifest(run_id)?;
    let tables = store.load_tables(run_id)?;

    Ok((manifest, tables))
}

/// Controllers of a scenario in execution order, out-of-service ones last.
pub fn control_diagnostic(scenario_path: &Path) -> AppResult<Vec<ControllerSummary>> {
    let scenario = load_scenario(scenario_path)?;
    let compiled = compile_scenario(&scenario, scenario_dir(scenario_path))?;
    Ok(compiled.registry.diagnostic())
}
