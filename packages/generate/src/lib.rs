#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Writers for run outputs.
//!
//! The aggregate table is written as one CSV row per segment with the
//! hourly arrays spread into zero-padded columns (`crowdedness_h00` ..
//! `crowdedness_h23`). Run summaries are written as pretty JSON next to it.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use sidewalk_crowd_aggregate_models::{
    AggregateRow, AggregateTable, COUNT_CLASSES, CrowdednessColumn, HOURS_PER_DAY,
};

/// Errors from writing outputs.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// CSV serialization error.
    #[error("CSV error writing {path}: {source}")]
    Csv {
        /// Output path.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// I/O error creating or writing a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Output path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Column headers of the aggregate CSV, in write order.
#[must_use]
pub fn header() -> Vec<String> {
    let mut columns = vec![
        "segment_id".to_string(),
        "parent_id".to_string(),
        "width".to_string(),
        "relative_width".to_string(),
    ];
    columns.extend((0..COUNT_CLASSES).map(|class| format!("mean_count_{class}")));
    columns.push("observation_count".to_string());
    columns.push(CrowdednessColumn::Overall.to_string());
    columns.extend((0..HOURS_PER_DAY).map(|hour| format!("mean_count_0_h{hour:02}")));
    columns.extend(
        (0..HOURS_PER_DAY)
            .filter_map(|hour| u8::try_from(hour).ok())
            .map(|hour| CrowdednessColumn::Hour(hour).to_string()),
    );
    columns
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One CSV record for `row`, aligned with [`header`].
#[must_use]
pub fn record(row: &AggregateRow) -> Vec<String> {
    let mut fields = vec![
        row.segment_id.to_string(),
        row.parent_id.clone(),
        optional(row.width),
        optional(row.relative_width),
    ];
    fields.extend(row.mean_counts.iter().map(ToString::to_string));
    fields.push(row.observation_count.to_string());
    fields.push(row.crowdedness.to_string());
    fields.extend(row.hourly_mean_counts.iter().map(ToString::to_string));
    fields.extend(row.hourly_crowdedness.iter().map(ToString::to_string));
    fields
}

/// Writes the table as CSV to any writer.
///
/// # Errors
///
/// Returns the underlying CSV error if a record cannot be written.
pub fn write_table_to<W: Write>(table: &AggregateTable, writer: W) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(header())?;
    for row in &table.rows {
        csv_writer.write_record(record(row))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the table as CSV to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn write_table(table: &AggregateTable, path: &Path) -> Result<(), GenerateError> {
    let file = create_file(path)?;
    write_table_to(table, std::io::BufWriter::new(file)).map_err(|e| GenerateError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;

    log::info!("Wrote {} segment rows to {}", table.len(), path.display());
    Ok(())
}

/// Writes any serializable value as pretty JSON to `path`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), GenerateError> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = create_file(path)?;
    file.write_all(json.as_bytes())
        .map_err(|e| GenerateError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

    log::info!("Wrote {}", path.display());
    Ok(())
}

fn create_file(path: &Path) -> Result<std::fs::File, GenerateError> {
    let io_err = |e| GenerateError::Io {
        path: path.display().to_string(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::File::create(path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> AggregateTable {
        let mut busy = AggregateRow::zeroed("s1".into(), "sw1".to_string(), Some(2.0));
        busy.relative_width = Some(1.5);
        busy.observation_count = 3;
        busy.mean_counts = [4.0, 1.0, 0.5];
        busy.crowdedness = 2.0;
        busy.hourly_mean_counts[10] = 4.0;
        busy.hourly_crowdedness[10] = 2.0;

        let degenerate = AggregateRow::zeroed("s2".into(), "sw1".to_string(), None);
        AggregateTable::new(vec![busy, degenerate])
    }

    #[test]
    fn header_matches_record_width() {
        let table = sample_table();
        let header = header();
        assert_eq!(header.len(), 5 + COUNT_CLASSES + 1 + 2 * HOURS_PER_DAY);
        assert_eq!(record(&table.rows[0]).len(), header.len());
        assert_eq!(header[8], "crowdedness");
        assert_eq!(header[9], "mean_count_0_h00");
        assert_eq!(header.last().map(String::as_str), Some("crowdedness_h23"));
    }

    #[test]
    fn writes_one_line_per_segment() {
        let mut buf = Vec::new();
        write_table_to(&sample_table(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("s1,sw1,2,1.5,4,1,0.5,3,2,"));
        assert!(lines[2].starts_with("s2,sw1,,,0,0,0,0,0,"));
    }

    #[test]
    fn writes_files_and_parent_directories() {
        let tmp = std::env::temp_dir().join("sidewalk_crowd_generate_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let csv_path = tmp.join("out").join("crowdedness.csv");
        write_table(&sample_table(), &csv_path).unwrap();
        assert!(csv_path.exists());

        let json_path = tmp.join("out").join("summary.json");
        write_json(&serde_json::json!({"segments": 2}), &json_path).unwrap();
        let json = std::fs::read_to_string(&json_path).unwrap();
        assert!(json.contains("\"segments\": 2"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
