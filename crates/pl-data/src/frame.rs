//! In-memory, column-oriented profile table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use pl_core::{Real, TimeStep};

use crate::error::{DataError, DataResult};
use crate::source::DataSource;

/// Profile table with an explicit time-step index.
///
/// Each column is one profile; each row is one time step. The index does not
/// have to be contiguous, but every label must be unique.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    index: Vec<TimeStep>,
    rows: HashMap<TimeStep, usize>,
    columns: BTreeMap<String, Vec<Real>>,
}

impl FrameData {
    /// Build a frame from an explicit index and named columns.
    pub fn new(index: Vec<TimeStep>, columns: BTreeMap<String, Vec<Real>>) -> DataResult<Self> {
        let mut rows = HashMap::with_capacity(index.len());
        for (row, &time) in index.iter().enumerate() {
            if rows.insert(time, row).is_some() {
                return Err(DataError::DuplicateTimeStep { time });
            }
        }

        for (profile, values) in &columns {
            if values.len() != index.len() {
                return Err(DataError::ShapeMismatch {
                    profile: profile.clone(),
                    len: values.len(),
                    expected: index.len(),
                });
            }
            if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
                return Err(DataError::NonFinite {
                    profile: profile.clone(),
                    time: index[pos],
                });
            }
        }

        Ok(Self {
            index,
            rows,
            columns,
        })
    }

    /// Build a frame whose index is `0..n`, `n` being the column length.
    pub fn from_columns<I, S>(columns: I) -> DataResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<Real>)>,
        S: Into<String>,
    {
        let columns: BTreeMap<String, Vec<Real>> =
            columns.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let len = columns.values().map(Vec::len).max().unwrap_or(0);
        Self::new((0..len).collect(), columns)
    }

    /// Time-step labels in row order.
    pub fn index(&self) -> &[TimeStep] {
        &self.index
    }

    /// Full column for a profile.
    pub fn column(&self, profile: &str) -> DataResult<&[Real]> {
        self.columns
            .get(profile)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::UnknownProfile {
                profile: profile.to_string(),
            })
    }
}

impl DataSource for FrameData {
    fn value(&self, time: TimeStep, profile: &str) -> DataResult<Real> {
        let column = self.column(profile)?;
        let row = *self
            .rows
            .get(&time)
            .ok_or(DataError::UnknownTimeStep { time })?;
        Ok(column[row])
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn profiles(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }
}

impl fmt::Display for FrameData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameData with {} rows and {} columns",
            self.index.len(),
            self.columns.len()
        )?;
        if self.columns.len() <= 10 {
            write!(f, ": {:?}", self.profiles())?;
        }
        Ok(())
    }
}
