//! CSV export of history records.
//!
//! Comma-joined, no quoting. A comma or newline inside a field (typically an
//! alert message) ends up verbatim in the output and splits the row for any
//! reader.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;

use crate::models::{HistoryRecord, MetricValue};

pub const EXPORT_FILENAME: &str = "irrigation_history.csv";

pub const COLUMNS: [&str; 12] = [
    "timestamp",
    "type",
    "soil_moisture",
    "soil_temp",
    "tank_level",
    "ambient_temp",
    "humidity",
    "irrigation_mode",
    "irrigation_state",
    "pump_river",
    "pump_farmland",
    "sms_alert",
];

/// Columns rendered as `On`/`Off`.
const SWITCH_COLUMNS: [&str; 3] = ["irrigation_state", "pump_river", "pump_farmland"];

const MISSING: &str = "-";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Render `records` as CSV text. Always starts with the header line, even
/// for an empty slice.
pub fn to_csv(records: &[HistoryRecord]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_csv(&mut buf, records)?;
    Ok(String::from_utf8(buf)?)
}

pub fn write_csv<W: Write>(out: W, records: &[HistoryRecord]) -> Result<(), ExportError> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);

    wtr.write_record(COLUMNS)?;
    for record in records {
        wtr.write_record(row(record))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write `irrigation_history.csv` into `dir` and return its path.
pub fn write_file(dir: &Path, records: &[HistoryRecord]) -> Result<PathBuf, ExportError> {
    let path = dir.join(EXPORT_FILENAME);
    let text = to_csv(records)?;
    std::fs::write(&path, text).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn row(record: &HistoryRecord) -> Vec<String> {
    COLUMNS
        .iter()
        .map(|&column| match column {
            "timestamp" => record.timestamp.clone(),
            "type" => record.record_type.to_string(),
            "sms_alert" => record
                .sms_alert
                .clone()
                .unwrap_or_else(|| MISSING.to_owned()),
            name => cell(name, record.get(name)),
        })
        .collect()
}

fn cell(column: &str, value: Option<&MetricValue>) -> String {
    let Some(value) = value else {
        return MISSING.to_owned();
    };

    if SWITCH_COLUMNS.contains(&column) {
        if let Some(on) = value.as_flag() {
            return if on { "On" } else { "Off" }.to_owned();
        }
    }

    match value {
        MetricValue::Flag(true) => "On".to_owned(),
        MetricValue::Flag(false) => "Off".to_owned(),
        other => other.to_string(),
    }
}
