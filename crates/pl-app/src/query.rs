//! Query helpers for extracting data from loaded runs.

use pl_timeseries::OutputTables;

use crate::error::{AppError, AppResult};

/// Shape of a run's output buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TablesSummary {
    pub first_step: Option<usize>,
    pub last_step: Option<usize>,
    pub row_count: usize,
    /// Rows recorded for skipped steps.
    pub gap_rows: usize,
    pub variables: Vec<String>,
}

pub fn summarize_tables(tables: &OutputTables) -> TablesSummary {
    let gap_rows = tables
        .tables
        .values()
        .next()
        .map(|t| {
            t.rows
                .iter()
                .filter(|row| !row.is_empty() && row.iter().all(|v| v.is_nan()))
                .count()
        })
        .unwrap_or(0);

    TablesSummary {
        first_step: tables.time_steps.first().copied(),
        last_step: tables.time_steps.last().copied(),
        row_count: tables.len(),
        gap_rows,
        variables: list_variables(tables),
    }
}

/// Logged variables as `table.column` keys.
pub fn list_variables(tables: &OutputTables) -> Vec<String> {
    tables.tables.keys().cloned().collect()
}

/// `(time, value)` pairs for one column of a logged variable.
///
/// `label` is an element index or the aggregate name.
pub fn extract_series(
    tables: &OutputTables,
    table: &str,
    column: &str,
    label: &str,
) -> AppResult<Vec<(usize, f64)>> {
    let variable = tables.get(table, column).ok_or_else(|| {
        AppError::InvalidInput(format!("variable {table}.{column} was not logged"))
    })?;
    let values = variable.series(label).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "{table}.{column} has no column '{label}' (available: {})",
            variable.labels.join(", ")
        ))
    })?;
    Ok(tables.time_steps.iter().copied().zip(values).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_timeseries::OutputTable;
    use std::collections::BTreeMap;

    fn tables() -> OutputTables {
        OutputTables {
            time_steps: vec![0, 1, 2],
            tables: BTreeMap::from([(
                "res_bus.vm_pu".to_string(),
                OutputTable {
                    table: "res_bus".to_string(),
                    column: "vm_pu".to_string(),
                    labels: vec!["1".to_string(), "2".to_string()],
                    rows: vec![vec![0.99, 0.98], vec![f64::NAN, f64::NAN], vec![1.0, 0.97]],
                },
            )]),
        }
    }

    #[test]
    fn series_pairs_time_with_values() {
        let series = extract_series(&tables(), "res_bus", "vm_pu", "2").unwrap();
        assert_eq!(series[0], (0, 0.98));
        assert!(series[1].1.is_nan());
        assert_eq!(series[2], (2, 0.97));
    }

    #[test]
    fn unknown_variable_or_label_is_invalid_input() {
        assert!(matches!(
            extract_series(&tables(), "res_bus", "p_mw", "1"),
            Err(AppError::InvalidInput(_))
        ));
        let err = extract_series(&tables(), "res_bus", "vm_pu", "7").unwrap_err();
        assert!(err.to_string().contains("available: 1, 2"));
    }

    #[test]
    fn summary_counts_gap_rows() {
        let summary = summarize_tables(&tables());
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.gap_rows, 1);
        assert_eq!(summary.first_step, Some(0));
        assert_eq!(summary.last_step, Some(2));
        assert_eq!(summary.variables, vec!["res_bus.vm_pu"]);
    }
}
