//! Scenario validation logic.

use std::collections::{BTreeMap, HashSet};

use crate::LATEST_VERSION;
use crate::schema::{
    ControllerDef, ControllerKindDef, ElementDef, LogDef, ProfilesDef, RunDef, Scenario,
    TimeStepsDef,
};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

type Tables = BTreeMap<String, HashSet<usize>>;

pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    if scenario.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: scenario.version,
        });
    }

    let mut tables: Tables = BTreeMap::new();
    for (table, elements) in &scenario.network {
        tables.insert(table.clone(), validate_table(table, elements)?);
    }

    let profiles = match &scenario.profiles {
        Some(def) => validate_profiles(def)?,
        None => Some(HashSet::new()),
    };

    let mut controller_ids = HashSet::new();
    for controller in &scenario.controllers {
        if !controller_ids.insert(&controller.id) {
            return Err(ValidationError::DuplicateId {
                id: controller.id.clone(),
                context: "controllers".to_string(),
            });
        }
        validate_controller(controller, &tables, profiles.as_ref())?;
    }

    for variable in &scenario.output.variables {
        validate_log(variable, &tables)?;
    }
    if scenario.output.flush_every == Some(0) {
        return Err(invalid("output.flush_every", 0, "must be positive"));
    }

    validate_run(&scenario.run)?;

    let base = scenario.solver.base_mva;
    if !(base.is_finite() && base > 0.0) {
        return Err(invalid("solver.base_mva", base, "must be positive"));
    }
    if scenario.solver.max_iterations == 0 {
        return Err(invalid("solver.max_iterations", 0, "must be positive"));
    }

    Ok(())
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn missing(id: impl ToString, context: impl Into<String>) -> ValidationError {
    ValidationError::MissingReference {
        id: id.to_string(),
        context: context.into(),
    }
}

fn validate_table(table: &str, elements: &[ElementDef]) -> Result<HashSet<usize>, ValidationError> {
    if table.is_empty() {
        return Err(invalid("network", "\"\"", "table names must not be empty"));
    }
    let mut indices = HashSet::new();
    for element in elements {
        if !indices.insert(element.index) {
            return Err(ValidationError::DuplicateId {
                id: element.index.to_string(),
                context: format!("network table '{table}'"),
            });
        }
        for (column, value) in &element.values {
            if !value.is_finite() {
                return Err(invalid(
                    format!("{table}[{}].{column}", element.index),
                    value,
                    "must be finite",
                ));
            }
        }
    }
    Ok(indices)
}

/// Profile names, or `None` when they are only known after loading a file.
fn validate_profiles(def: &ProfilesDef) -> Result<Option<HashSet<String>>, ValidationError> {
    match def {
        ProfilesDef::Inline { index, columns } => {
            let expected = match index {
                Some(index) => {
                    let mut seen = HashSet::new();
                    if let Some(dup) = index.iter().find(|t| !seen.insert(**t)) {
                        return Err(ValidationError::DuplicateId {
                            id: dup.to_string(),
                            context: "profiles.index".to_string(),
                        });
                    }
                    Some(index.len())
                }
                None => None,
            };
            let expected = expected.or_else(|| columns.values().next().map(Vec::len));
            for (name, values) in columns {
                if Some(values.len()) != expected {
                    return Err(invalid(
                        format!("profiles.columns.{name}"),
                        values.len(),
                        "column length differs from the time index",
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(invalid(format!("profiles.columns.{name}"), "NaN", "must be finite"));
                }
            }
            Ok(Some(columns.keys().cloned().collect()))
        }
        ProfilesDef::Csv { path, .. } => {
            if path.trim().is_empty() {
                return Err(invalid("profiles.path", "\"\"", "must not be empty"));
            }
            Ok(None)
        }
    }
}

fn require_element(tables: &Tables, table: &str, index: usize, context: &str) -> Result<(), ValidationError> {
    match tables.get(table) {
        Some(indices) if indices.contains(&index) => Ok(()),
        _ => Err(missing(format!("{table}[{index}]"), context)),
    }
}

fn require_profile(
    profiles: Option<&HashSet<String>>,
    profile: &str,
    context: &str,
) -> Result<(), ValidationError> {
    match profiles {
        Some(known) if !known.contains(profile) => Err(missing(profile, context)),
        _ => Ok(()),
    }
}

fn validate_controller(
    controller: &ControllerDef,
    tables: &Tables,
    profiles: Option<&HashSet<String>>,
) -> Result<(), ValidationError> {
    let context = format!("controller '{}'", controller.id);
    match &controller.kind {
        ControllerKindDef::Const {
            table,
            column: _,
            indices,
            profiles: names,
            scale_factor,
        } => {
            if indices.is_empty() {
                return Err(invalid(format!("{context}.indices"), "[]", "must not be empty"));
            }
            if names.len() != 1 && names.len() != indices.len() {
                return Err(invalid(
                    format!("{context}.profiles"),
                    names.len(),
                    "one profile per index or a single shared profile",
                ));
            }
            for &index in indices {
                require_element(tables, table, index, &context)?;
            }
            for name in names {
                require_profile(profiles, name, &context)?;
            }
            if !scale_factor.is_finite() {
                return Err(invalid(format!("{context}.scale_factor"), scale_factor, "must be finite"));
            }
        }
        ControllerKindDef::DiscreteTap {
            trafo,
            vm_lower_pu,
            vm_upper_pu,
            ..
        } => {
            require_element(tables, "trafo", *trafo, &context)?;
            if !(vm_lower_pu < vm_upper_pu) {
                return Err(invalid(
                    format!("{context}.vm_lower_pu"),
                    vm_lower_pu,
                    "must be below vm_upper_pu",
                ));
            }
        }
        ControllerKindDef::ContinuousTap {
            trafo, vm_set_pu, tol, ..
        } => {
            require_element(tables, "trafo", *trafo, &context)?;
            if !(*vm_set_pu > 0.0) {
                return Err(invalid(format!("{context}.vm_set_pu"), vm_set_pu, "must be positive"));
            }
            if !(*tol > 0.0) {
                return Err(invalid(format!("{context}.tol"), tol, "must be positive"));
            }
        }
        ControllerKindDef::Storage {
            storage,
            max_e_mwh,
            soc_percent,
            profile,
            min_soc,
            max_soc,
            ..
        } => {
            require_element(tables, "storage", *storage, &context)?;
            if !(*max_e_mwh > 0.0) {
                return Err(invalid(format!("{context}.max_e_mwh"), max_e_mwh, "must be positive"));
            }
            if !(0.0..=100.0).contains(soc_percent) {
                return Err(invalid(format!("{context}.soc_percent"), soc_percent, "must lie in 0..=100"));
            }
            let (lo, hi) = (min_soc.unwrap_or(0.0), max_soc.unwrap_or(100.0));
            if !(0.0 <= lo && lo < hi && hi <= 100.0) {
                return Err(invalid(
                    format!("{context}.min_soc"),
                    lo,
                    "soc bounds must satisfy 0 <= min < max <= 100",
                ));
            }
            if let Some(name) = profile {
                require_profile(profiles, name, &context)?;
            }
        }
    }
    Ok(())
}

fn validate_log(variable: &LogDef, tables: &Tables) -> Result<(), ValidationError> {
    let context = format!("output {}.{}", variable.table, variable.column);
    let source = if tables.contains_key(&variable.table) {
        variable.table.as_str()
    } else {
        variable
            .table
            .strip_prefix("res_")
            .filter(|t| tables.contains_key(*t))
            .ok_or_else(|| missing(&variable.table, &context))?
    };
    if let Some(indices) = &variable.indices {
        for &index in indices {
            require_element(tables, source, index, &context)?;
        }
    }
    Ok(())
}

fn validate_run(run: &RunDef) -> Result<(), ValidationError> {
    if !(run.step_minutes.is_finite() && run.step_minutes > 0.0) {
        return Err(invalid("run.step_minutes", run.step_minutes, "must be positive"));
    }
    if run.max_iter == 0 {
        return Err(invalid("run.max_iter", 0, "must be positive"));
    }
    match &run.time_steps {
        Some(TimeStepsDef::Range { start, end }) if start > end => Err(invalid(
            "run.time_steps",
            format!("{start}..{end}"),
            "start must not exceed end",
        )),
        Some(TimeStepsDef::List(steps)) if steps.windows(2).any(|w| w[0] >= w[1]) => Err(invalid(
            "run.time_steps",
            format!("{steps:?}"),
            "must be strictly increasing",
        )),
        _ => Ok(()),
    }
}
