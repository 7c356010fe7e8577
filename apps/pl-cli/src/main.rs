use clap::{Parser, Subcommand, ValueEnum};
use pl_app::{
    AppResult, ExportRequest, RunOptions, RunProgressEvent, RunRequest, RunStage, RunTimingSummary,
    query, run_service, scenario_service,
};
use pl_results::OutputFormat;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

#[derive(Parser)]
#[command(name = "pl-cli")]
#[command(about = "PowerLoop CLI - controlled time-series power flow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate scenario file syntax and references
    Validate {
        /// Path to the scenario file (YAML or JSON)
        scenario_path: PathBuf,
    },
    /// Run the time series of a scenario
    Run {
        /// Path to the scenario file (YAML or JSON)
        scenario_path: PathBuf,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
        /// Export format (defaults to the scenario's output format)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Export directory for the output tables
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List cached runs for a scenario
    Runs {
        /// Path to the scenario file
        scenario_path: PathBuf,
    },
    /// Show details of a cached run
    ShowRun {
        /// Path to the scenario file
        scenario_path: PathBuf,
        /// Run ID to display
        run_id: String,
        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print controllers in execution order
    Diagnostic {
        /// Path to the scenario file
        scenario_path: PathBuf,
    },
    /// Export one series of a run as CSV
    ExportSeries {
        /// Path to the scenario file
        scenario_path: PathBuf,
        /// Run ID
        run_id: String,
        /// Logged table (e.g. res_bus)
        table: String,
        /// Logged column (e.g. vm_pu)
        column: String,
        /// Element index or aggregate name
        label: String,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Run {
            scenario_path,
            no_cache,
            format,
            out,
        } => cmd_run(&scenario_path, !no_cache, format, out),
        Commands::Runs { scenario_path } => cmd_runs(&scenario_path),
        Commands::ShowRun {
            scenario_path,
            run_id,
            json,
        } => cmd_show_run(&scenario_path, &run_id, json),
        Commands::Diagnostic { scenario_path } => cmd_diagnostic(&scenario_path),
        Commands::ExportSeries {
            scenario_path,
            run_id,
            table,
            column,
            label,
            output,
        } => cmd_export_series(
            &scenario_path,
            &run_id,
            &table,
            &column,
            &label,
            output.as_deref(),
        ),
    }
}

fn cmd_validate(scenario_path: &Path) -> AppResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario = scenario_service::load_scenario(scenario_path)?;
    scenario_service::validate_scenario(&scenario)?;
    let summary = scenario_service::summarize_scenario(&scenario);

    println!("✓ Scenario '{}' is valid", summary.name);
    for (table, rows) in &summary.tables {
        println!("  {table}: {rows} elements");
    }
    println!("  Controllers: {}", summary.controller_count);
    println!("  Logged variables: {}", summary.logged_variables);
    if let Some(source) = &summary.profile_source {
        println!("  Profiles: {source}");
    }
    Ok(())
}

fn cmd_run(
    scenario_path: &Path,
    use_cache: bool,
    format: Option<FormatArg>,
    out: Option<PathBuf>,
) -> AppResult<()> {
    println!("Running scenario: {}", scenario_path.display());

    // A format alone exports next to the scenario.
    let export_dir = out.or_else(|| {
        format.map(|_| {
            scenario_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("output")
        })
    });
    let request = RunRequest {
        scenario_path,
        options: RunOptions {
            use_cache,
            export: export_dir.map(|dir| ExportRequest {
                dir,
                format: format.map(OutputFormat::from),
            }),
            ..RunOptions::default()
        },
    };

    let mut last_emit = Instant::now();
    let mut last_stage: Option<RunStage> = None;
    let response = run_service::run_scenario(
        &request,
        Some(&mut |event| {
            let emit_now = last_stage != Some(event.stage) || last_emit.elapsed().as_millis() >= 100;
            if emit_now {
                show_progress(|out| render_cli_progress(out, &event));
                last_stage = Some(event.stage);
                last_emit = Instant::now();
            }
        }),
    )?;
    show_progress(clear_progress_line);

    if response.loaded_from_cache {
        println!("✓ Loaded from cache: {}", response.run_id);
    } else {
        println!("✓ Time series completed: {}", response.run_id);
    }

    print_timing_summary(&response.timing);

    let run = &response.manifest.summary;
    println!("  Steps: {}", run.steps);
    println!("  Solves: {}", run.solves);
    if !run.failed_steps.is_empty() {
        println!("  Skipped steps: {:?}", run.failed_steps);
    }
    if !run.unconverged_steps.is_empty() {
        println!("  Unconverged steps: {:?}", run.unconverged_steps);
    }
    if run.cancelled {
        println!("  Run was cancelled");
    }
    for path in &response.exported {
        println!("  Wrote {}", path.display());
    }

    Ok(())
}

/// Draw on stdout. A broken terminal must not abort the run, so failures are
/// only logged.
fn show_progress(draw: impl FnOnce(&mut io::StdoutLock<'static>) -> io::Result<()>) {
    if let Err(err) = draw(&mut io::stdout().lock()) {
        warn!(error = %err, "progress output failed");
    }
}

fn clear_progress_line(out: &mut impl Write) -> io::Result<()> {
    write!(out, "\r{}\r", " ".repeat(120))?;
    out.flush()
}

fn render_cli_progress(out: &mut impl Write, event: &RunProgressEvent) -> io::Result<()> {
    match (&event.stage, &event.timeseries) {
        (RunStage::RunningTimeSeries, Some(t)) => {
            let width = 28usize;
            let filled = ((t.fraction_complete * width as f64).round() as usize).min(width);
            let bar = format!(
                "{}{}",
                "#".repeat(filled),
                "-".repeat(width.saturating_sub(filled))
            );
            write!(
                out,
                "\r[{}] {:>6.2}%  t={}  step={}/{}  solves={}{}  elapsed={:.1}s",
                bar,
                t.fraction_complete * 100.0,
                t.time,
                t.step,
                t.total,
                t.solves,
                if t.skipped { "  skipped" } else { "" },
                event.elapsed_wall_s
            )?;
        }
        _ => {
            let spinner = ['|', '/', '-', '\\'];
            let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
            let mut line = format!(
                "\r{} {}  elapsed={:.2}s",
                spinner[spin_idx],
                event.stage.label(),
                event.elapsed_wall_s
            );
            if let Some(msg) = &event.message {
                line.push_str(&format!("  {}", msg));
            }
            write!(out, "{}", line)?;
        }
    }
    out.flush()
}

fn print_timing_summary(timing: &RunTimingSummary) {
    let total = timing.total_time_s.max(1.0e-12);
    let compile_pct = 100.0 * timing.compile_time_s / total;
    let run_pct = 100.0 * timing.run_time_s / total;
    let save_pct = 100.0 * timing.save_time_s / total;

    println!("\nTiming summary:");
    println!("  Compile: {:.3}s ({:.1}%)", timing.compile_time_s, compile_pct);
    println!("  Run:     {:.3}s ({:.1}%)", timing.run_time_s, run_pct);
    println!("  Save:    {:.3}s ({:.1}%)", timing.save_time_s, save_pct);
    if timing.load_cache_time_s > 0.0 {
        println!("  Cache load: {:.3}s", timing.load_cache_time_s);
    }
    println!("  Total:   {:.3}s", timing.total_time_s);
}

fn cmd_runs(scenario_path: &Path) -> AppResult<()> {
    let runs = run_service::list_runs(scenario_path)?;

    if runs.is_empty() {
        println!("No cached runs found for {}", scenario_path.display());
    } else {
        println!("Cached runs for '{}':", runs[0].scenario_name);
        for manifest in runs {
            println!(
                "  {} ({}, {} steps)",
                manifest.run_id, manifest.timestamp, manifest.summary.steps
            );
        }
    }
    Ok(())
}

fn cmd_show_run(scenario_path: &Path, run_id: &str, json: bool) -> AppResult<()> {
    let (manifest, tables) = run_service::load_run(scenario_path, run_id)?;

    if json {
        let text = serde_json::to_string_pretty(&manifest)
            .map_err(|e| pl_app::AppError::Results(e.to_string()))?;
        println!("{text}");
        return Ok(());
    }

    let summary = query::summarize_tables(&tables);
    println!("Run {}", manifest.run_id);
    println!("  Scenario: {}", manifest.scenario_name);
    println!("  Created: {}", manifest.timestamp);
    println!("  Solver version: {}", manifest.solver_version);
    println!("  Rows: {} ({} skipped)", summary.row_count, summary.gap_rows);
    if let (Some(first), Some(last)) = (summary.first_step, summary.last_step) {
        println!("  Time steps: {first} - {last}");
    }
    println!("  Solves: {}", manifest.summary.solves);

    println!("\nVariables:");
    for key in summary.variables {
        println!("  {key}");
    }
    Ok(())
}

fn cmd_diagnostic(scenario_path: &Path) -> AppResult<()> {
    let rows = run_service::control_diagnostic(scenario_path)?;
    if rows.is_empty() {
        println!("No controllers in scenario");
        return Ok(());
    }

    println!("{:<4} {:<24} {:>5} {:>5} {:<10} writes", "id", "name", "level", "order", "service");
    for row in rows {
        println!(
            "{:<4} {:<24} {:>5} {:>5} {:<10} {}",
            row.id,
            row.name,
            row.level,
            row.order,
            if row.in_service { "in" } else { "out" },
            row.writes.join(", ")
        );
    }
    Ok(())
}

fn cmd_export_series(
    scenario_path: &Path,
    run_id: &str,
    table: &str,
    column: &str,
    label: &str,
    output: Option<&Path>,
) -> AppResult<()> {
    let (_manifest, tables) = run_service::load_run(scenario_path, run_id)?;
    let series = query::extract_series(&tables, table, column, label)?;

    let mut csv = String::from("time,value\n");
    for (t, val) in &series {
        csv.push_str(&format!("{},{}\n", t, val));
    }

    if let Some(path) = output {
        std::fs::write(path, csv)?;
        println!("✓ Exported {} data points to {}", series.len(), path.display());
    } else {
        print!("{}", csv);
    }

    Ok(())
}
