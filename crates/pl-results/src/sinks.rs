//! File sinks for flushed output.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pl_timeseries::{OutputTable, OutputTables, ResultSink, SinkError};

use crate::ResultsResult;

/// Writes every table into one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_tables(&self, tables: &OutputTables) -> ResultsResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(tables)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl ResultSink for JsonSink {
    fn write(&mut self, tables: &OutputTables) -> Result<(), SinkError> {
        Ok(self.write_tables(tables)?)
    }
}

/// Writes one `<table>.<column>.csv` file per logged variable.
///
/// Columns are `time` followed by the table labels. Gap rows are written
/// as `NaN`.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_tables(&self, tables: &OutputTables) -> ResultsResult<()> {
        fs::create_dir_all(&self.dir)?;
        for (key, table) in &tables.tables {
            let file = File::create(self.dir.join(format!("{key}.csv")))?;
            write_table_csv(&tables.time_steps, table, io::BufWriter::new(file))?;
        }
        Ok(())
    }
}

impl ResultSink for CsvSink {
    fn write(&mut self, tables: &OutputTables) -> Result<(), SinkError> {
        Ok(self.write_tables(tables)?)
    }
}

/// Write one variable as CSV to any writer.
pub fn write_table_csv(
    time_steps: &[usize],
    table: &OutputTable,
    writer: impl Write,
) -> ResultsResult<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let mut header = vec!["time".to_string()];
    header.extend(table.labels.iter().cloned());
    wtr.write_record(&header)?;

    for (time, row) in time_steps.iter().zip(&table.rows) {
        let mut record = vec![time.to_string()];
        record.extend(row.iter().map(ToString::to_string));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> OutputTable {
        OutputTable {
            table: "res_bus".to_string(),
            column: "vm_pu".to_string(),
            labels: vec!["0".to_string(), "1".to_string()],
            rows: vec![vec![1.0, 0.98], vec![f64::NAN, f64::NAN]],
        }
    }

    #[test]
    fn csv_has_header_and_gap_markers() {
        let mut buf = Vec::new();
        write_table_csv(&[4, 5], &table(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["time,0,1", "4,1,0.98", "5,NaN,NaN"]);
    }
}
