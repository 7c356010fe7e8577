//! Run storage API.

use std::fs;
use std::path::{Path, PathBuf};

use pl_timeseries::{OutputTables, ResultSink, SinkError};
use tracing::debug;

use crate::types::RunManifest;
use crate::{ResultsError, ResultsResult};

const MANIFEST: &str = "manifest.json";
const TABLES: &str = "tables.json";

/// Directory of cached runs, one sub-directory per run id.
///
/// A run counts as stored once its manifest exists; tables may be written
/// earlier by incremental flushes.
#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Store next to a scenario file, under `.powerloop/runs`.
    pub fn for_scenario(scenario_path: &Path) -> ResultsResult<Self> {
        let scenario_dir = scenario_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "scenario path has no parent directory".to_string(),
            })?;
        Self::new(scenario_dir.join(".powerloop").join("runs"))
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join(MANIFEST).exists()
    }

    pub fn save_tables(&self, run_id: &str, tables: &OutputTables) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        fs::create_dir_all(&run_dir)?;
        fs::write(run_dir.join(TABLES), serde_json::to_string(tables)?)?;
        debug!(run_id, rows = tables.len(), "tables saved");
        Ok(())
    }

    pub fn save_manifest(&self, manifest: &RunManifest) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;
        fs::write(run_dir.join(MANIFEST), serde_json::to_string_pretty(manifest)?)?;
        Ok(())
    }

    pub fn save_run(&self, manifest: &RunManifest, tables: &OutputTables) -> ResultsResult<()> {
        self.save_tables(&manifest.run_id, tables)?;
        self.save_manifest(manifest)
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id).join(MANIFEST);

        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(manifest_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_tables(&self, run_id: &str) -> ResultsResult<OutputTables> {
        let tables_path = self.run_dir(run_id).join(TABLES);

        if !tables_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(tables_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Manifests of every stored run of one scenario, oldest first.
    pub fn list_runs(&self, scenario_name: &str) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();

        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                let run_id = entry.file_name().to_string_lossy().to_string();
                match self.load_manifest(&run_id) {
                    Ok(manifest) if manifest.scenario_name == scenario_name => runs.push(manifest),
                    _ => {}
                }
            }
        }

        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }

    /// Sink that flushes a run's tables into this store.
    pub fn sink(&self, run_id: impl Into<String>) -> RunSink {
        RunSink {
            store: self.clone(),
            run_id: run_id.into(),
        }
    }
}

/// [`ResultSink`] writing into one run directory of a [`RunStore`].
#[derive(Debug, Clone)]
pub struct RunSink {
    store: RunStore,
    run_id: String,
}

impl ResultSink for RunSink {
    fn write(&mut self, tables: &OutputTables) -> Result<(), SinkError> {
        Ok(self.store.save_tables(&self.run_id, tables)?)
    }
}
