//! Scenario loading, saving, validation, and introspection.

use std::path::Path;

use pl_project::{ProfilesDef, ProjectError, Scenario};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Summary of a scenario for listing.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub version: u32,
    /// Element count per network table.
    pub tables: Vec<(String, usize)>,
    pub controller_count: usize,
    pub logged_variables: usize,
    pub profile_source: Option<String>,
}

/// Load and validate a scenario (`.yaml`, `.yml` or `.json`).
pub fn load_scenario(path: &Path) -> AppResult<Scenario> {
    pl_project::load(path).map_err(|e| match e {
        ProjectError::Io(source) => AppError::ScenarioFileRead {
            path: path.to_path_buf(),
            source,
        },
        other => other.into(),
    })
}

/// Validate and write a scenario, choosing the format by extension.
pub fn save_scenario(path: &Path, scenario: &Scenario) -> AppResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let result = match extension.as_str() {
        "json" => pl_project::save_json(path, scenario),
        _ => pl_project::save_yaml(path, scenario),
    };
    result.map_err(|e| match e {
        ProjectError::Io(source) => AppError::ScenarioFileWrite {
            path: path.to_path_buf(),
            source,
        },
        other => other.into(),
    })
}

pub fn validate_scenario(scenario: &Scenario) -> AppResult<()> {
    pl_project::validate_scenario(scenario)?;
    Ok(())
}

pub fn summarize_scenario(scenario: &Scenario) -> ScenarioSummary {
    ScenarioSummary {
        name: scenario.name.clone(),
        version: scenario.version,
        tables: scenario
            .network
            .iter()
            .map(|(table, rows)| (table.clone(), rows.len()))
            .collect(),
        controller_count: scenario.controllers.len(),
        logged_variables: scenario.output.variables.len(),
        profile_source: scenario.profiles.as_ref().map(|p| match p {
            ProfilesDef::Inline { columns, .. } => format!("inline ({} columns)", columns.len()),
            ProfilesDef::Csv { path, .. } => format!("csv ({path})"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_names_the_path() {
        let path = Path::new("/nonexistent/powerloop/scenario.yaml");
        match load_scenario(path) {
            Err(AppError::ScenarioFileRead { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unknown_extension_is_a_scenario_error() {
        let err = load_scenario(Path::new("scenario.toml")).unwrap_err();
        assert!(matches!(err, AppError::Scenario(_)));
    }
}
