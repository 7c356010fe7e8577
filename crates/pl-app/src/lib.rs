//! Shared application service layer for powerloop.
//!
//! Frontends go through this crate to load scenarios, compile them into
//! runtime objects, execute or reuse cached time-series runs, and query
//! stored results.

pub mod build;
pub mod error;
pub mod profiles;
pub mod progress;
pub mod query;
pub mod run_service;
pub mod scenario_service;

pub use build::{
    CompiledScenario, build_controllers, build_network, build_output, build_run_options,
    build_solver, compile_scenario,
};
pub use error::{AppError, AppResult};
pub use profiles::{load_profiles, read_profiles_csv};
pub use progress::{RunProgressEvent, RunStage, TimeSeriesProgress};
pub use query::{TablesSummary, extract_series, list_variables, summarize_tables};
pub use run_service::{
    ExportRequest, RunOptions, RunRequest, RunResponse, RunTimingSummary, control_diagnostic,
    ensure_run, list_runs, load_run, run_scenario,
};
pub use scenario_service::{
    ScenarioSummary, load_scenario, save_scenario, summarize_scenario, validate_scenario,
};
