#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV readers for the two pipeline inputs.
//!
//! Observations come as one directory per capture day holding `md.csv`
//! (frame metadata) and `detections.csv` (per-class counts). Segments come
//! as a single CSV with WKT or `GeoJSON` geometry. Rows that cannot be used
//! are skipped and counted, never fatal.

pub mod observations;
pub mod segments;

pub use observations::{ObservationLoadReport, RawObservation, load_days, snap_directions};
pub use segments::{SegmentLoadReport, load_segments};

/// Errors from reading input files.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// A required column is absent from the header.
    #[error("Missing column '{column}' in {path}")]
    MissingColumn {
        /// Path to the CSV file.
        path: String,
        /// Name of the missing column.
        column: String,
    },

    /// Input file does not exist.
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Position of `name` in `headers`.
pub(crate) fn column_index(
    headers: &csv::StringRecord,
    name: &str,
    path: &std::path::Path,
) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| IngestError::MissingColumn {
            path: path.display().to_string(),
            column: name.to_string(),
        })
}

/// Parses a numeric cell, treating blanks and junk as missing.
pub(crate) fn parse_cell(record: &csv::StringRecord, index: usize) -> Option<f64> {
    record
        .get(index)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub(crate) fn open_reader(
    path: &std::path::Path,
) -> Result<csv::Reader<std::fs::File>, IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound(path.display().to_string()));
    }
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| IngestError::Csv {
            path: path.display().to_string(),
            source: e,
        })
}
