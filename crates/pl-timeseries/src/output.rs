//! In-memory output buffer.
//!
//! Variables are registered as `(table, column)` pairs before the run. Each
//! processed step appends exactly one row to every logged variable, either
//! the recorded values or a row of NaN gap markers for a skipped step.

use std::collections::BTreeMap;

use pl_core::{Real, TimeStep};
use pl_net::NetworkModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SimError, SimResult};
use crate::sink::{ResultSink, SinkError};

/// Reduction applied across the selected elements of a logged variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Max,
    Min,
    Sum,
    Mean,
}

impl Aggregate {
    fn label(self) -> &'static str {
        match self {
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Sum => "sum",
            Aggregate::Mean => "mean",
        }
    }

    fn apply(self, values: &[Real]) -> Real {
        if values.is_empty() {
            return Real::NAN;
        }
        match self {
            Aggregate::Max => values.iter().copied().fold(Real::NEG_INFINITY, Real::max),
            Aggregate::Min => values.iter().copied().fold(Real::INFINITY, Real::min),
            Aggregate::Sum => values.iter().sum(),
            Aggregate::Mean => values.iter().sum::<Real>() / values.len() as Real,
        }
    }
}

/// Element selection and reduction for one logged variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSpec {
    /// Elements to record; all elements of the table when `None`.
    #[serde(default)]
    pub indices: Option<Vec<usize>>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
}

/// Recorded series of one `(table, column)` variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    pub table: String,
    pub column: String,
    /// Column labels: element indices, or the aggregate name.
    pub labels: Vec<String>,
    /// One row per processed step; NaN marks a skipped step.
    #[serde(with = "nan_as_null")]
    pub rows: Vec<Vec<Real>>,
}

impl OutputTable {
    /// Series of one column over all recorded steps.
    pub fn series(&self, label: &str) -> Option<Vec<Real>> {
        let pos = self.labels.iter().position(|l| l == label)?;
        Some(self.rows.iter().map(|row| row[pos]).collect())
    }
}

/// Every logged variable, keyed by `table.column`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTables {
    /// Time index of each recorded row.
    pub time_steps: Vec<TimeStep>,
    pub tables: BTreeMap<String, OutputTable>,
}

impl OutputTables {
    pub fn get(&self, table: &str, column: &str) -> Option<&OutputTable> {
        self.tables.get(&output_key(table, column))
    }

    /// Number of recorded rows.
    pub fn len(&self) -> usize {
        self.time_steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_steps.is_empty()
    }
}

/// Key under which a variable is stored.
pub fn output_key(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

#[derive(Debug, Clone)]
struct LoggedVariable {
    table: String,
    column: String,
    spec: LogSpec,
    resolved: Vec<usize>,
}

impl LoggedVariable {
    fn key(&self) -> String {
        output_key(&self.table, &self.column)
    }

    fn labels(&self) -> Vec<String> {
        match self.spec.aggregate {
            Some(agg) => vec![agg.label().to_string()],
            None => self.resolved.iter().map(ToString::to_string).collect(),
        }
    }

    fn width(&self) -> usize {
        if self.spec.aggregate.is_some() {
            1
        } else {
            self.resolved.len()
        }
    }

    fn read(&self, net: &NetworkModel) -> SimResult<Vec<Real>> {
        let values = self
            .resolved
            .iter()
            .map(|&i| net.get(&self.table, i, &self.column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match self.spec.aggregate {
            Some(agg) => vec![agg.apply(&values)],
            None => values,
        })
    }
}

/// Collects logged variables for every processed time step.
#[derive(Debug, Default)]
pub struct OutputWriter {
    variables: Vec<LoggedVariable>,
    buffer: OutputTables,
    started: bool,
}

impl OutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every element of `table.column`.
    pub fn log(&mut self, table: impl Into<String>, column: impl Into<String>) -> SimResult<()> {
        self.log_with(table, column, LogSpec::default())
    }

    /// Log `table.column` with element selection and optional reduction.
    ///
    /// Registering the same variable twice replaces the earlier spec.
    pub fn log_with(
        &mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        spec: LogSpec,
    ) -> SimResult<()> {
        if self.started {
            return Err(SimError::InvalidArg {
                what: "variables must be logged before the run starts",
            });
        }
        let variable = LoggedVariable {
            table: table.into(),
            column: column.into(),
            spec,
            resolved: Vec::new(),
        };
        let key = variable.key();
        if let Some(existing) = self.variables.iter_mut().find(|v| v.key() == key) {
            warn!(variable = %key, "variable logged twice, keeping the latest spec");
            *existing = variable;
        } else {
            self.variables.push(variable);
        }
        Ok(())
    }

    /// Number of logged variables.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Resolve element selections and reset the buffer.
    ///
    /// A result table that does not exist yet (`res_bus` before the first
    /// solve) takes its elements from the matching element table (`bus`).
    pub fn start(&mut self, net: &NetworkModel) -> SimResult<()> {
        for variable in &mut self.variables {
            let source_table = if net.has_table(&variable.table) {
                variable.table.as_str()
            } else {
                variable
                    .table
                    .strip_prefix("res_")
                    .filter(|t| net.has_table(t))
                    .ok_or_else(|| SimError::Output {
                        what: format!("table '{}' not present in network", variable.table),
                    })?
            };
            variable.resolved = match &variable.spec.indices {
                Some(indices) => {
                    if let Some(missing) = indices.iter().find(|&&i| !net.contains(source_table, i)) {
                        return Err(SimError::Output {
                            what: format!("{}[{missing}] not present in network", variable.table),
                        });
                    }
                    indices.clone()
                }
                None => net.indices(source_table)?,
            };
        }

        self.buffer = OutputTables {
            time_steps: Vec::new(),
            tables: self
                .variables
                .iter()
                .map(|v| {
                    (
                        v.key(),
                        OutputTable {
                            table: v.table.clone(),
                            column: v.column.clone(),
                            labels: v.labels(),
                            rows: Vec::new(),
                        },
                    )
                })
                .collect(),
        };
        self.started = true;
        debug!(variables = self.variables.len(), "output started");
        Ok(())
    }

    /// Append the current values of every logged variable.
    ///
    /// Either every variable gets its row or none does.
    pub fn record(&mut self, time: TimeStep, net: &NetworkModel) -> SimResult<()> {
        self.ensure_started()?;
        let rows = self
            .variables
            .iter()
            .map(|v| v.read(net).map(|row| (v.key(), row)))
            .collect::<SimResult<Vec<_>>>()?;
        self.push(time, rows);
        Ok(())
    }

    /// Append a row of NaN gap markers for a skipped step.
    pub fn record_gap(&mut self, time: TimeStep) -> SimResult<()> {
        self.ensure_started()?;
        let rows = self
            .variables
            .iter()
            .map(|v| (v.key(), vec![Real::NAN; v.width()]))
            .collect();
        self.push(time, rows);
        Ok(())
    }

    /// Hand the cumulative buffer to `sink`.
    pub fn flush(&self, sink: &mut dyn ResultSink) -> Result<(), SinkError> {
        sink.write(&self.buffer)
    }

    /// Read-only view of the buffer.
    pub fn tables(&self) -> &OutputTables {
        &self.buffer
    }

    fn ensure_started(&self) -> SimResult<()> {
        if self.started {
            Ok(())
        } else {
            Err(SimError::InvalidArg {
                what: "output writer was not started",
            })
        }
    }

    fn push(&mut self, time: TimeStep, rows: Vec<(String, Vec<Real>)>) {
        self.buffer.time_steps.push(time);
        for (key, row) in rows {
            if let Some(table) = self.buffer.tables.get_mut(&key) {
                table.rows.push(row);
            }
        }
    }
}

/// JSON has no NaN; gap markers travel as `null`.
mod nan_as_null {
    use pl_core::Real;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(rows: &[Vec<Real>], serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<Vec<Option<Real>>> = rows
            .iter()
            .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
            .collect();
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<Real>>, D::Error> {
        let rows: Vec<Vec<Option<Real>>> = Vec::deserialize(deserializer)?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(Real::NAN)).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_net::Row;

    fn net() -> NetworkModel {
        let mut net = NetworkModel::new();
        for (i, p) in [(0, 1.0), (1, 3.0), (2, 2.0)] {
            net.insert_row("load", i, Row::new().with("p_mw", p)).unwrap();
        }
        net.insert_row("bus", 0, Row::new()).unwrap();
        net
    }

    #[test]
    fn records_selected_elements() {
        let mut out = OutputWriter::new();
        out.log_with(
            "load",
            "p_mw",
            LogSpec {
                indices: Some(vec![2, 0]),
                aggregate: None,
            },
        )
        .unwrap();
        out.start(&net()).unwrap();
        out.record(5, &net()).unwrap();

        let table = out.tables().get("load", "p_mw").unwrap();
        assert_eq!(table.labels, vec!["2", "0"]);
        assert_eq!(table.rows, vec![vec![2.0, 1.0]]);
        assert_eq!(out.tables().time_steps, vec![5]);
    }

    #[test]
    fn aggregates_reduce_to_one_column() {
        let mut out = OutputWriter::new();
        out.log_with(
            "load",
            "p_mw",
            LogSpec {
                indices: None,
                aggregate: Some(Aggregate::Max),
            },
        )
        .unwrap();
        out.start(&net()).unwrap();
        out.record(0, &net()).unwrap();
        assert_eq!(out.tables().get("load", "p_mw").unwrap().series("max"), Some(vec![3.0]));

        assert_eq!(Aggregate::Mean.apply(&[1.0, 3.0, 2.0]), 2.0);
        assert_eq!(Aggregate::Sum.apply(&[1.0, 3.0, 2.0]), 6.0);
        assert_eq!(Aggregate::Min.apply(&[1.0, 3.0, 2.0]), 1.0);
    }

    #[test]
    fn result_tables_resolve_from_element_table() {
        let mut out = OutputWriter::new();
        out.log("res_bus", "vm_pu").unwrap();
        let mut net = net();
        out.start(&net).unwrap();

        assert!(out.record(0, &net).is_err());
        assert!(out.tables().is_empty());

        net.set_result("res_bus", 0, "vm_pu", 0.99).unwrap();
        out.record(0, &net).unwrap();
        assert_eq!(out.tables().get("res_bus", "vm_pu").unwrap().rows, vec![vec![0.99]]);
    }

    #[test]
    fn gaps_keep_lengths_in_sync() {
        let mut out = OutputWriter::new();
        out.log("load", "p_mw").unwrap();
        out.log_with(
            "load",
            "q_mvar",
            LogSpec {
                indices: Some(vec![7]),
                aggregate: None,
            },
        )
        .unwrap();
        assert!(out.start(&net()).is_err());

        let mut out = OutputWriter::new();
        out.log("load", "p_mw").unwrap();
        out.start(&net()).unwrap();
        out.record(0, &net()).unwrap();
        out.record_gap(1).unwrap();
        let rows = &out.tables().get("load", "p_mw").unwrap().rows;
        assert_eq!(rows.len(), 2);
        assert!(rows[1].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn logging_after_start_is_rejected() {
        let mut out = OutputWriter::new();
        out.start(&net()).unwrap();
        assert!(out.log("load", "p_mw").is_err());
        assert!(OutputWriter::new().record_gap(0).is_err());
    }

    #[test]
    fn duplicate_log_replaces_spec() {
        let mut out = OutputWriter::new();
        out.log("load", "p_mw").unwrap();
        out.log_with(
            "load",
            "p_mw",
            LogSpec {
                indices: None,
                aggregate: Some(Aggregate::Sum),
            },
        )
        .unwrap();
        assert_eq!(out.variable_count(), 1);
    }
}
