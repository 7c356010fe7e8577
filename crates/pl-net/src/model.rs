//! Core network model data structures.

use std::collections::BTreeMap;

use pl_core::Real;
use serde::{Deserialize, Serialize};

use crate::cell::CellRef;
use crate::error::{NetError, NetResult};

/// One element: named numeric attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, Real>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, column: impl Into<String>, value: Real) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<Real> {
        self.values.get(column).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, Real)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, Real)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Real)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A collection of elements keyed by element index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    rows: BTreeMap<usize, Row>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows.iter().map(|(i, r)| (*i, r))
    }
}

/// The shared, mutable network model.
///
/// Tables, elements, and attributes are kept in ordered maps so every
/// iteration over the model is deterministic. There is no write buffering:
/// a `set` is visible to the very next read, solver included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    tables: BTreeMap<String, Table>,
}

impl NetworkModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table if it does not exist yet.
    pub fn add_table(&mut self, table: impl Into<String>) {
        self.tables.entry(table.into()).or_default();
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table(&self, table: &str) -> NetResult<&Table> {
        self.tables.get(table).ok_or_else(|| NetError::UnknownTable {
            table: table.to_string(),
        })
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Insert a new element, creating the table on demand.
    pub fn insert_row(&mut self, table: &str, index: usize, row: Row) -> NetResult<()> {
        for (column, value) in row.columns() {
            check_finite(table, index, column, value)?;
        }
        let rows = &mut self.tables.entry(table.to_string()).or_default().rows;
        if rows.contains_key(&index) {
            return Err(NetError::DuplicateElement {
                table: table.to_string(),
                index,
            });
        }
        rows.insert(index, row);
        Ok(())
    }

    /// Element indices of a table in ascending order.
    pub fn indices(&self, table: &str) -> NetResult<Vec<usize>> {
        Ok(self.table(table)?.rows.keys().copied().collect())
    }

    pub fn contains(&self, table: &str, index: usize) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.rows.contains_key(&index))
    }

    /// Point read. Absent tables, elements and attributes are errors.
    pub fn get(&self, table: &str, index: usize, column: &str) -> NetResult<Real> {
        let row = self.row(table, index)?;
        row.get(column).ok_or_else(|| NetError::UnknownAttribute {
            table: table.to_string(),
            index,
            column: column.to_string(),
        })
    }

    /// Point write on an existing element. The attribute is created if absent.
    pub fn set(&mut self, table: &str, index: usize, column: &str, value: Real) -> NetResult<()> {
        check_finite(table, index, column, value)?;
        let rows = &mut self
            .tables
            .get_mut(table)
            .ok_or_else(|| NetError::UnknownTable {
                table: table.to_string(),
            })?
            .rows;
        let row = rows
            .get_mut(&index)
            .ok_or_else(|| NetError::UnknownElement {
                table: table.to_string(),
                index,
            })?;
        row.values.insert(column.to_string(), value);
        Ok(())
    }

    /// Write a result cell, creating the table and element if needed.
    ///
    /// Reserved for solvers populating `res_*` tables.
    pub fn set_result(
        &mut self,
        table: &str,
        index: usize,
        column: &str,
        value: Real,
    ) -> NetResult<()> {
        check_finite(table, index, column, value)?;
        self.tables
            .entry(table.to_string())
            .or_default()
            .rows
            .entry(index)
            .or_default()
            .values
            .insert(column.to_string(), value);
        Ok(())
    }

    pub fn get_cell(&self, cell: &CellRef) -> NetResult<Real> {
        self.get(&cell.table, cell.index, &cell.column)
    }

    pub fn set_cell(&mut self, cell: &CellRef, value: Real) -> NetResult<()> {
        self.set(&cell.table, cell.index, &cell.column, value)
    }

    /// All `(index, value)` pairs of one column; elements lacking the
    /// attribute are skipped.
    pub fn column(&self, table: &str, column: &str) -> NetResult<Vec<(usize, Real)>> {
        Ok(self
            .table(table)?
            .rows
            .iter()
            .filter_map(|(i, r)| r.get(column).map(|v| (*i, v)))
            .collect())
    }

    fn row(&self, table: &str, index: usize) -> NetResult<&Row> {
        self.table(table)?
            .rows
            .get(&index)
            .ok_or_else(|| NetError::UnknownElement {
                table: table.to_string(),
                index,
            })
    }
}

fn check_finite(table: &str, index: usize, column: &str, value: Real) -> NetResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NetError::NonFinite {
            table: table.to_string(),
            index,
            column: column.to_string(),
            value,
        })
    }
}
