use std::path::Path;

#[test]
fn demos_load_and_validate() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
    for name in ["feeder.yaml"] {
        let path = root.join(name);
        let scenario = pl_project::load_yaml(&path)
            .unwrap_or_else(|e| panic!("Failed to load {}: {}", name, e));
        pl_project::validate_scenario(&scenario)
            .unwrap_or_else(|e| panic!("Failed to validate {}: {}", name, e));
        assert!(!scenario.controllers.is_empty());
    }
}
