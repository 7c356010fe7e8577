use std::fs;
use std::path::{Path, PathBuf};

use pl_app::{
    AppError, ExportRequest, RunOptions, RunRequest, RunStage, control_diagnostic, ensure_run,
    extract_series, list_runs, load_run, run_scenario,
};
use pl_results::OutputFormat;
use pl_timeseries::CancelToken;

/// Copy the demo feeder into a fresh directory so each test owns its run store.
fn demo_workspace(name: &str) -> PathBuf {
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
    let dir = std::env::temp_dir().join(format!("pl_app_{name}"));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    for file in ["feeder.yaml", "feeder_profiles.csv"] {
        fs::copy(demos.join(file), dir.join(file)).unwrap();
    }
    dir.join("feeder.yaml")
}

fn request(path: &Path) -> RunRequest<'_> {
    RunRequest {
        scenario_path: path,
        options: RunOptions::default(),
    }
}

#[test]
fn demo_feeder_runs_then_hits_cache() {
    let path = demo_workspace("cache");

    let first = ensure_run(&request(&path)).unwrap();
    assert!(!first.loaded_from_cache);
    assert_eq!(first.tables.len(), 8);
    assert_eq!(first.manifest.summary.steps, 8);
    assert!(first.manifest.summary.failed_steps.is_empty());
    assert_eq!(first.manifest.first_step, Some(0));
    assert_eq!(first.manifest.last_step, Some(7));

    let taps: Vec<f64> = extract_series(&first.tables, "trafo", "tap_pos", "0")
        .unwrap()
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(taps, vec![0.0, 0.0, 0.0, 0.0, 0.0, -1.0, -1.0, -1.0]);

    let soc: Vec<f64> = extract_series(&first.tables, "storage", "soc_percent", "0")
        .unwrap()
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    let expected = [50.0, 50.0, 65.0, 90.0, 100.0, 100.0, 80.0, 50.0];
    for (got, want) in soc.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "soc {got} != {want}");
    }

    let load_sum = first.tables.get("load", "p_mw").unwrap();
    assert_eq!(load_sum.labels.len(), 1);
    assert!((load_sum.rows[0][0] - 1.2).abs() < 1e-12);

    for (_, vm) in extract_series(&first.tables, "res_bus", "vm_pu", "1").unwrap() {
        assert!((0.98..=1.02).contains(&vm), "bus 1 voltage {vm} outside band");
    }

    let second = ensure_run(&request(&path)).unwrap();
    assert!(second.loaded_from_cache);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.tables, first.tables);

    let runs = list_runs(&path).unwrap();
    assert_eq!(runs.len(), 1);
    let (manifest, tables) = load_run(&path, &first.run_id).unwrap();
    assert_eq!(manifest.summary, first.manifest.summary);
    assert_eq!(tables, first.tables);
}

#[test]
fn no_cache_reruns_with_same_id() {
    let path = demo_workspace("no_cache");
    let first = ensure_run(&request(&path)).unwrap();

    let mut req = request(&path);
    req.options.use_cache = false;
    let second = ensure_run(&req).unwrap();

    assert!(!second.loaded_from_cache);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.tables, first.tables);
}

#[test]
fn editing_profiles_changes_run_id() {
    let path = demo_workspace("profile_edit");
    let first = ensure_run(&request(&path)).unwrap();

    let csv_path = path.with_file_name("feeder_profiles.csv");
    let csv = fs::read_to_string(&csv_path).unwrap().replace("0,0.8,0.4", "0,0.7,0.4");
    fs::write(&csv_path, csv).unwrap();

    let second = ensure_run(&request(&path)).unwrap();
    assert!(!second.loaded_from_cache);
    assert_ne!(second.run_id, first.run_id);
}

#[test]
fn export_writes_csv_per_variable() {
    let path = demo_workspace("export");
    let out = path.with_file_name("out");

    let mut req = request(&path);
    req.options.export = Some(ExportRequest {
        dir: out.clone(),
        format: None,
    });
    let response = ensure_run(&req).unwrap();

    assert_eq!(response.exported.len(), 5);
    let vm = fs::read_to_string(out.join("res_bus.vm_pu.csv")).unwrap();
    assert!(vm.starts_with("time,1,2"));
    assert_eq!(vm.lines().count(), 9);

    req.options.export = Some(ExportRequest {
        dir: out.clone(),
        format: Some(OutputFormat::Json),
    });
    let cached = ensure_run(&req).unwrap();
    assert!(cached.loaded_from_cache);
    assert_eq!(cached.exported, vec![out.join("tables.json")]);
}

#[test]
fn progress_covers_every_stage_and_step() {
    let path = demo_workspace("progress");
    let mut events = Vec::new();
    let mut record = |e: pl_app::RunProgressEvent| events.push(e);

    run_scenario(&request(&path), Some(&mut record)).unwrap();

    assert_eq!(events.first().map(|e| e.stage), Some(RunStage::LoadingScenario));
    assert_eq!(events.last().map(|e| e.stage), Some(RunStage::Completed));
    let steps: Vec<usize> = events
        .iter()
        .filter_map(|e| e.timeseries.as_ref().map(|p| p.step))
        .collect();
    assert_eq!(steps, (1..=8).collect::<Vec<_>>());
    assert!(events.windows(2).all(|w| w[0].elapsed_wall_s <= w[1].elapsed_wall_s));
}

#[test]
fn cancelled_run_is_not_cached() {
    let path = demo_workspace("cancel");
    let token = CancelToken::new();
    token.cancel();

    let mut req = request(&path);
    req.options.cancel = Some(token);
    let response = ensure_run(&req).unwrap();
    assert!(response.manifest.summary.cancelled);
    assert_eq!(response.manifest.summary.steps, 0);
    assert!(list_runs(&path).unwrap().is_empty());

    let rerun = ensure_run(&request(&path)).unwrap();
    assert!(!rerun.loaded_from_cache);
    assert_eq!(rerun.manifest.summary.steps, 8);
}

#[test]
fn diagnostic_lists_controllers_in_execution_order() {
    let path = demo_workspace("diagnostic");
    let rows = control_diagnostic(&path).unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["loads", "pv", "battery", "tap changer"]);
    assert_eq!(rows[3].level, 1);
    assert!(rows[0].writes.iter().any(|w| w == "load[0].p_mw"));
}

#[test]
fn unknown_run_is_reported() {
    let path = demo_workspace("unknown_run");
    assert!(matches!(
        load_run(&path, "deadbeef"),
        Err(AppError::RunNotFound(id)) if id == "deadbeef"
    ));
}
