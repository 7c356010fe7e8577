//! Result data types.

use pl_timeseries::RunSummary;
use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub scenario_name: String,
    pub timestamp: String,
    pub solver_version: String,
    /// Time index of the first and last processed step.
    pub first_step: Option<usize>,
    pub last_step: Option<usize>,
    pub summary: RunSummary,
}

impl RunManifest {
    /// Manifest stamped with the current UTC time.
    pub fn new(
        run_id: impl Into<RunId>,
        scenario_name: impl Into<String>,
        solver_version: impl Into<String>,
        time_steps: &[usize],
        summary: RunSummary,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            scenario_name: scenario_name.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            solver_version: solver_version.into(),
            first_step: time_steps.first().copied(),
            last_step: time_steps.last().copied(),
            summary,
        }
    }
}
