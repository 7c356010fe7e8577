//! Profile loading: inline scenario columns or a CSV file.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use pl_core::{Real, TimeStep};
use pl_data::FrameData;
use pl_project::ProfilesDef;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Build the profile table declared by a scenario.
///
/// CSV paths are resolved against `base_dir`, the scenario's directory.
pub fn load_profiles(def: &ProfilesDef, base_dir: &Path) -> AppResult<FrameData> {
    match def {
        ProfilesDef::Inline { index, columns } => {
            let frame = match index {
                Some(index) => FrameData::new(index.clone(), columns.clone())?,
                None => FrameData::from_columns(columns.clone())?,
            };
            Ok(frame)
        }
        ProfilesDef::Csv { path, time_column } => {
            let full_path = base_dir.join(path);
            let file = std::fs::File::open(&full_path).map_err(|e| {
                AppError::Profiles(format!("cannot open {}: {e}", full_path.display()))
            })?;
            let frame = read_profiles_csv(file, time_column.as_deref())?;
            debug!(path = %full_path.display(), rows = frame.index().len(), "profiles loaded");
            Ok(frame)
        }
    }
}

/// Parse a headered CSV of numeric columns.
///
/// With `time_column` the named column supplies the time-step labels;
/// otherwise rows are labeled `0..n`.
pub fn read_profiles_csv<R: io::Read>(reader: R, time_column: Option<&str>) -> AppResult<FrameData> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let time_pos = match time_column {
        Some(name) => Some(headers.iter().position(|h| h == name).ok_or_else(|| {
            AppError::Profiles(format!("time column '{name}' not found in CSV header"))
        })?),
        None => None,
    };

    let mut index: Vec<TimeStep> = Vec::new();
    let mut columns: BTreeMap<String, Vec<Real>> = headers
        .iter()
        .enumerate()
        .filter(|(pos, _)| Some(*pos) != time_pos)
        .map(|(_, name)| (name.to_string(), Vec::new()))
        .collect();

    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        match time_pos {
            Some(pos) => {
                let raw = record.get(pos).unwrap_or_default();
                let time = raw.parse::<TimeStep>().map_err(|_| {
                    AppError::Profiles(format!("row {}: invalid time index '{raw}'", row + 1))
                })?;
                index.push(time);
            }
            None => index.push(row),
        }

        for (pos, name) in headers.iter().enumerate() {
            if Some(pos) == time_pos {
                continue;
            }
            let raw = record.get(pos).unwrap_or_default();
            let value = raw.parse::<Real>().map_err(|_| {
                AppError::Profiles(format!("row {}: invalid value '{raw}' in column '{name}'", row + 1))
            })?;
            if let Some(column) = columns.get_mut(name) {
                column.push(value);
            }
        }
    }

    Ok(FrameData::new(index, columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_data::DataSource;

    #[test]
    fn csv_with_time_column() {
        let csv = "time,load_a,pv\n4,1.0,0.0\n5,1.5,0.25\n7,2.0,0.5\n";
        let frame = read_profiles_csv(csv.as_bytes(), Some("time")).unwrap();

        assert_eq!(frame.index(), &[4, 5, 7]);
        assert_eq!(frame.profiles(), vec!["load_a", "pv"]);
        assert_eq!(frame.value(5, "load_a").unwrap(), 1.5);
        assert_eq!(frame.value(7, "pv").unwrap(), 0.5);
    }

    #[test]
    fn csv_without_time_column_uses_row_numbers() {
        let csv = "a, b\n1.0, 2.0\n3.0, 4.0\n";
        let frame = read_profiles_csv(csv.as_bytes(), None).unwrap();

        assert_eq!(frame.index(), &[0, 1]);
        assert_eq!(frame.value(1, "b").unwrap(), 4.0);
    }

    #[test]
    fn bad_cells_are_reported() {
        let csv = "time,a\n0,1.0\n1,oops\n";
        let err = read_profiles_csv(csv.as_bytes(), Some("time")).unwrap_err();
        assert!(err.to_string().contains("oops"));

        let err = read_profiles_csv("a\n1.0\n".as_bytes(), Some("time")).unwrap_err();
        assert!(err.to_string().contains("time column"));
    }

    #[test]
    fn duplicate_time_labels_rejected() {
        let csv = "time,a\n0,1.0\n0,2.0\n";
        assert!(matches!(
            read_profiles_csv(csv.as_bytes(), Some("time")),
            Err(AppError::Profiles(_))
        ));
    }

    #[test]
    fn inline_profiles_default_to_row_index() {
        let def = ProfilesDef::Inline {
            index: None,
            columns: BTreeMap::from([("p".to_string(), vec![10.0, 20.0, 30.0])]),
        };
        let frame = load_profiles(&def, Path::new(".")).unwrap();
        assert_eq!(frame.index(), &[0, 1, 2]);
        assert_eq!(frame.value(2, "p").unwrap(), 30.0);
    }
}
