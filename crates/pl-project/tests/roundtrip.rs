use std::collections::BTreeMap;
use std::path::Path;

use pl_project::schema::*;
use pl_project::{load, load_json, load_yaml, save_json, save_yaml, validate_scenario};

fn scenario() -> Scenario {
    let mut network = BTreeMap::new();
    network.insert(
        "ext_grid".to_string(),
        vec![ElementDef {
            index: 0,
            values: [("vm_pu".to_string(), 1.0)].into(),
        }],
    );
    network.insert(
        "bus".to_string(),
        vec![ElementDef {
            index: 0,
            values: [("r_pu".to_string(), 0.01)].into(),
        }],
    );
    Scenario {
        version: 1,
        name: "Roundtrip".to_string(),
        network,
        profiles: Some(ProfilesDef::Inline {
            index: Some(vec![0, 5]),
            columns: [("p".to_string(), vec![1.0, 2.0])].into(),
        }),
        controllers: vec![],
        output: OutputDef {
            format: OutputFormatDef::Csv,
            variables: vec![LogDef {
                table: "res_bus".to_string(),
                column: "vm_pu".to_string(),
                indices: None,
                aggregate: Some(AggregateDef::Min),
            }],
            flush_every: Some(2),
        },
        run: RunDef {
            time_steps: Some(TimeStepsDef::Range { start: 0, end: 6 }),
            ..RunDef::default()
        },
        solver: SolverDef::default(),
    }
}

#[test]
fn roundtrip_yaml() {
    let scenario = scenario();
    validate_scenario(&scenario).unwrap();

    let path = std::env::temp_dir().join("pl_project_roundtrip.yaml");
    save_yaml(&path, &scenario).unwrap();
    let loaded = load_yaml(&path).unwrap();

    assert_eq!(scenario, loaded);
}

#[test]
fn roundtrip_json() {
    let scenario = scenario();
    let path = std::env::temp_dir().join("pl_project_roundtrip.json");
    save_json(&path, &scenario).unwrap();
    assert_eq!(load_json(&path).unwrap(), scenario);
    assert_eq!(load(&path).unwrap(), scenario);
}

#[test]
fn unknown_extension_is_rejected() {
    assert!(load(Path::new("scenario.toml")).is_err());
}

#[test]
fn controller_tags_parse_from_yaml() {
    let yaml = r#"
version: 1
name: tags
network:
  trafo:
    - { index: 0, lv_bus: 1 }
  storage:
    - { index: 3, bus: 1, p_mw: 0 }
controllers:
  - id: tap
    type: continuous_tap
    level: 2
    trafo: 0
    vm_set_pu: 1.0
    tol: 0.001
  - id: battery
    type: storage
    in_service: false
    storage: 3
    max_e_mwh: 4
    soc_percent: 20
run:
  time_steps: [0, 2, 4]
"#;
    let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
    validate_scenario(&scenario).unwrap();

    assert_eq!(scenario.controllers[0].level, 2);
    assert!(matches!(
        scenario.controllers[0].kind,
        ControllerKindDef::ContinuousTap { trafo: 0, side: TapSideDef::Hv, .. }
    ));
    assert!(!scenario.controllers[1].in_service);
    assert_eq!(scenario.run.time_steps, Some(TimeStepsDef::List(vec![0, 2, 4])));
    assert_eq!(scenario.run.max_iter, 30);
}
