//! Scenario schema definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub version: u32,
    pub name: String,
    /// Element tables keyed by table name (`bus`, `load`, `trafo`, ...).
    #[serde(default)]
    pub network: BTreeMap<String, Vec<ElementDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<ProfilesDef>,
    #[serde(default)]
    pub controllers: Vec<ControllerDef>,
    #[serde(default)]
    pub output: OutputDef,
    #[serde(default)]
    pub run: RunDef,
    #[serde(default)]
    pub solver: SolverDef,
}

/// One element row: its index plus named numeric attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementDef {
    pub index: usize,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ProfilesDef {
    /// Columns written in the scenario itself.
    Inline {
        /// Time index labels; `0..n` when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<Vec<usize>>,
        columns: BTreeMap<String, Vec<f64>>,
    },
    /// CSV file, relative to the scenario file.
    Csv {
        path: String,
        /// Column holding time index labels; row numbers when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_column: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerDef {
    pub id: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub in_service: bool,
    #[serde(flatten)]
    pub kind: ControllerKindDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerKindDef {
    Const {
        table: String,
        column: String,
        indices: Vec<usize>,
        profiles: Vec<String>,
        #[serde(default = "default_scale")]
        scale_factor: f64,
    },
    DiscreteTap {
        trafo: usize,
        vm_lower_pu: f64,
        vm_upper_pu: f64,
        #[serde(default)]
        side: TapSideDef,
    },
    ContinuousTap {
        trafo: usize,
        vm_set_pu: f64,
        tol: f64,
        #[serde(default)]
        side: TapSideDef,
    },
    Storage {
        storage: usize,
        max_e_mwh: f64,
        soc_percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<String>,
        #[serde(default = "default_scale")]
        scale_factor: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_soc: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_soc: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TapSideDef {
    #[default]
    Hv,
    Lv,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputDef {
    #[serde(default)]
    pub format: OutputFormatDef,
    #[serde(default)]
    pub variables: Vec<LogDef>,
    /// Flush to the run store every N steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_every: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormatDef {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogDef {
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateDef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregateDef {
    Max,
    Min,
    Sum,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunDef {
    /// Every profile time step when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_steps: Option<TimeStepsDef>,
    #[serde(default = "default_step_minutes")]
    pub step_minutes: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default)]
    pub on_divergence: DivergenceDef,
    #[serde(default)]
    pub visibility: VisibilityDef,
    #[serde(default)]
    pub on_step_failure: StepFailureDef,
}

impl Default for RunDef {
    fn default() -> Self {
        Self {
            time_steps: None,
            step_minutes: default_step_minutes(),
            max_iter: default_max_iter(),
            on_divergence: DivergenceDef::default(),
            visibility: VisibilityDef::default(),
            on_step_failure: StepFailureDef::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TimeStepsDef {
    // Listed first so a two-element list is not read as a range.
    List(Vec<usize>),
    Range { start: usize, end: usize },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceDef {
    #[default]
    Abort,
    BestEffort,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityDef {
    #[default]
    PriorIteration,
    SameIteration,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepFailureDef {
    #[default]
    Abort,
    SkipStep,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverDef {
    #[serde(default = "default_base_mva")]
    pub base_mva: f64,
    #[serde(default = "default_newton_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,
}

impl Default for SolverDef {
    fn default() -> Self {
        Self {
            base_mva: default_base_mva(),
            max_iterations: default_newton_iterations(),
            abs_tol: default_abs_tol(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f64 {
    1.0
}

fn default_step_minutes() -> f64 {
    15.0
}

fn default_max_iter() -> usize {
    30
}

fn default_base_mva() -> f64 {
    1.0
}

fn default_newton_iterations() -> usize {
    50
}

fn default_abs_tol() -> f64 {
    1e-10
}
