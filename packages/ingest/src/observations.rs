//! Per-day camera observation loading.
//!
//! Each day directory holds `md.csv` (one row per frame: position, compass
//! direction label, capture time) and `detections.csv` (frame id in the
//! first column, then per-class counts in columns `0`, `1`, `2`). Metadata
//! rows are kept only when a detection row exists for the same frame.

use std::collections::BTreeMap;
use std::path::Path;

use geo::Point;
use serde::{Deserialize, Serialize};
use sidewalk_crowd_observation_models::{
    DETECTION_CLASSES, DetectionCounts, Direction, Observation, ObservationSet,
};

use crate::{IngestError, column_index, open_reader, parse_cell};

/// Frame metadata file name inside a day directory.
pub const METADATA_FILE: &str = "md.csv";

/// Detection counts file name inside a day directory.
pub const DETECTIONS_FILE: &str = "detections.csv";

/// A metadata row as written by the capture tooling.
#[derive(Debug, Deserialize)]
struct MetadataRecord {
    frame_id: String,
    #[serde(rename = "gps_info.longitude", deserialize_with = "csv::invalid_option")]
    longitude: Option<f64>,
    #[serde(rename = "gps_info.latitude", deserialize_with = "csv::invalid_option")]
    latitude: Option<f64>,
    direction: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    captured_at: Option<f64>,
}

/// An observation before its direction label has been snapped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub frame_id: String,
    pub position: Point<f64>,
    /// Raw compass label, e.g. `NORTH_WEST`.
    pub direction: String,
    pub captured_at_ms: i64,
    pub counts: DetectionCounts,
}

/// Row counts from loading observations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObservationLoadReport {
    /// Metadata rows read across all days.
    pub rows_read: usize,
    /// Metadata rows that could not be decoded at all.
    pub malformed_rows: usize,
    /// Detection rows that could not be decoded. Their frames surface as
    /// `missing_detections`.
    pub malformed_detection_rows: usize,
    /// Metadata rows without a matching detections row.
    pub missing_detections: usize,
    /// Rows with a missing or non-finite position.
    pub invalid_position: usize,
    /// Rows with a missing capture time.
    pub invalid_timestamp: usize,
    /// Rows whose direction label is not one of the eight octants.
    pub unmapped_direction: usize,
    /// Unmapped labels and how often each occurred.
    pub unmapped_labels: BTreeMap<String, usize>,
    /// Observations handed to the pipeline.
    pub loaded: usize,
}

impl ObservationLoadReport {
    /// Total rows dropped for any reason.
    #[must_use]
    pub const fn excluded(&self) -> usize {
        self.malformed_rows
            + self.missing_detections
            + self.invalid_position
            + self.invalid_timestamp
            + self.unmapped_direction
    }
}

/// Snaps every direction label to an octant, dropping unmappable rows.
///
/// The number of dropped rows is recorded in `report.unmapped_direction`,
/// with a per-label breakdown in `report.unmapped_labels`.
pub fn snap_directions(
    raw: Vec<RawObservation>,
    report: &mut ObservationLoadReport,
) -> Vec<Observation> {
    let mut snapped = Vec::with_capacity(raw.len());

    for row in raw {
        let Some(direction) = Direction::from_label(&row.direction) else {
            report.unmapped_direction += 1;
            *report
                .unmapped_labels
                .entry(row.direction)
                .or_insert(0) += 1;
            continue;
        };

        snapped.push(Observation {
            frame_id: row.frame_id,
            position: row.position,
            direction,
            captured_at_ms: row.captured_at_ms,
            counts: row.counts,
        });
    }

    snapped
}

/// Loads and snaps observations for every day under `data_dir`.
///
/// Positions are tagged with `crs` as-is; no reprojection happens here.
///
/// # Errors
///
/// Returns an error if a day's files are missing or unreadable, or lack a
/// required column.
pub fn load_days(
    data_dir: &Path,
    days: &[String],
    crs: &str,
) -> Result<(ObservationSet, ObservationLoadReport), IngestError> {
    let mut report = ObservationLoadReport::default();
    let mut raw = Vec::new();

    for day in days {
        log::info!("Loading observations for {day}");
        let day_dir = data_dir.join(day);
        let before = raw.len();
        load_day(&day_dir, &mut raw, &mut report)?;
        log::info!("  {day}: {} frames with detections", raw.len() - before);
    }

    let observations = snap_directions(raw, &mut report);
    report.loaded = observations.len();

    if report.unmapped_direction > 0 {
        log::warn!(
            "Dropped {} observations with unmapped direction labels: {:?}",
            report.unmapped_direction,
            report.unmapped_labels
        );
    }
    if report.malformed_rows + report.malformed_detection_rows > 0 {
        log::warn!(
            "Skipped {} undecodable metadata rows and {} undecodable detection rows",
            report.malformed_rows,
            report.malformed_detection_rows
        );
    }
    log::info!(
        "Loaded {} observations ({} of {} rows excluded)",
        report.loaded,
        report.excluded(),
        report.rows_read
    );

    Ok((ObservationSet::new(crs.to_string(), observations), report))
}

fn load_day(
    day_dir: &Path,
    raw: &mut Vec<RawObservation>,
    report: &mut ObservationLoadReport,
) -> Result<(), IngestError> {
    let detections = load_detections(&day_dir.join(DETECTIONS_FILE), report)?;

    let md_path = day_dir.join(METADATA_FILE);
    let mut reader = open_reader(&md_path)?;

    for result in reader.deserialize::<MetadataRecord>() {
        report.rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                report.malformed_rows += 1;
                continue;
            }
        };

        let Some(counts) = detections.get(&record.frame_id) else {
            report.missing_detections += 1;
            continue;
        };

        let (Some(lon), Some(lat)) = (record.longitude, record.latitude) else {
            report.invalid_position += 1;
            continue;
        };
        if !lon.is_finite() || !lat.is_finite() {
            report.invalid_position += 1;
            continue;
        }

        let Some(captured_at) = record.captured_at.filter(|t| t.is_finite()) else {
            report.invalid_timestamp += 1;
            continue;
        };

        #[allow(clippy::cast_possible_truncation)]
        let captured_at_ms = captured_at.round() as i64;
        raw.push(RawObservation {
            frame_id: record.frame_id,
            position: Point::new(lon, lat),
            direction: record.direction.unwrap_or_default(),
            captured_at_ms,
            counts: *counts,
        });
    }

    Ok(())
}

/// Reads `detections.csv` into a frame id -> counts map. Blank cells are
/// zero.
fn load_detections(
    path: &Path,
    report: &mut ObservationLoadReport,
) -> Result<BTreeMap<String, DetectionCounts>, IngestError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| IngestError::Csv {
            path: path.display().to_string(),
            source: e,
        })?
        .clone();

    let class_columns = [
        column_index(&headers, "0", path)?,
        column_index(&headers, "1", path)?,
        column_index(&headers, "2", path)?,
    ];

    let mut map = BTreeMap::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed detection row: {e}");
                report.malformed_detection_rows += 1;
                continue;
            }
        };
        let Some(frame_id) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };

        let cells: [Option<f64>; DETECTION_CLASSES] =
            class_columns.map(|index| parse_cell(&record, index));
        map.insert(frame_id.to_string(), DetectionCounts::from_optional(cells));
    }

    log::debug!("Read {} detection rows from {}", map.len(), path.display());
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_day(root: &Path, day: &str, md: &str, detections: &str) {
        let dir = root.join(day);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(METADATA_FILE), md).unwrap();
        std::fs::write(dir.join(DETECTIONS_FILE), detections).unwrap();
    }

    fn raw(frame: &str, direction: &str) -> RawObservation {
        RawObservation {
            frame_id: frame.to_string(),
            position: Point::new(0.0, 0.0),
            direction: direction.to_string(),
            captured_at_ms: 0,
            counts: DetectionCounts::default(),
        }
    }

    #[test]
    fn drops_exactly_the_unmapped_directions() {
        let rows = vec![
            raw("a", "NORTH"),
            raw("b", "UNKNOWN"),
            raw("c", "SOUTH_WEST"),
            raw("d", ""),
            raw("e", "UNKNOWN"),
        ];
        let mut report = ObservationLoadReport::default();
        let snapped = snap_directions(rows, &mut report);

        assert_eq!(snapped.len(), 3);
        assert_eq!(report.unmapped_direction, 3);
        assert_eq!(report.unmapped_labels.get("UNKNOWN"), Some(&2));
        assert_eq!(report.unmapped_labels.get(""), Some(&1));
        assert_eq!(snapped[1].direction, Direction::SouthWest);
    }

    #[test]
    fn loads_and_merges_day_files() {
        let tmp = std::env::temp_dir().join("sidewalk_crowd_ingest_observations");
        let _ = std::fs::remove_dir_all(&tmp);

        write_day(
            &tmp,
            "2023-08-11",
            ",frame_id,gps_info.longitude,gps_info.latitude,direction,captured_at\n\
             0,f1,-73.95,40.70,NORTH,1691762400000\n\
             1,f2,-73.96,40.71,SIDEWAYS,1691762400000\n\
             2,f3,-73.97,40.72,EAST,1691762400000\n\
             3,f4,,40.72,EAST,1691762400000\n\
             4,f5,-73.97,40.72,WEST,\n",
            ",0,1,2\n\
             f1,2,1,\n\
             f2,1,0,0\n\
             f4,1,0,0\n\
             f5,1,0,0\n",
        );
        write_day(
            &tmp,
            "2023-08-12",
            "frame_id,gps_info.longitude,gps_info.latitude,direction,captured_at\n\
             g1,-73.90,40.60,SOUTH_EAST,1691848800000\n",
            "frame,0,1,2\ng1,5,0,1\n",
        );

        let days = vec!["2023-08-11".to_string(), "2023-08-12".to_string()];
        let (set, report) = load_days(&tmp, &days, "EPSG:4326").unwrap();

        assert_eq!(set.crs, "EPSG:4326");
        assert_eq!(report.rows_read, 6);
        assert_eq!(report.missing_detections, 1);
        assert_eq!(report.invalid_position, 1);
        assert_eq!(report.invalid_timestamp, 1);
        assert_eq!(report.unmapped_direction, 1);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.excluded(), 4);

        let f1 = &set.observations[0];
        assert_eq!(f1.frame_id, "f1");
        assert_eq!(f1.direction, Direction::North);
        assert_eq!(f1.counts, DetectionCounts([2.0, 1.0, 0.0]));
        assert!((f1.position.x() + 73.95).abs() < 1e-12);

        let g1 = &set.observations[1];
        assert_eq!(g1.direction, Direction::SouthEast);
        assert_eq!(g1.captured_at_ms, 1_691_848_800_000);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn junk_cells_and_undecodable_rows_are_counted() {
        let tmp = std::env::temp_dir().join("sidewalk_crowd_ingest_junk_rows");
        let _ = std::fs::remove_dir_all(&tmp);
        let dir = tmp.join("2023-08-11");
        std::fs::create_dir_all(&dir).unwrap();

        let mut md = b"frame_id,gps_info.longitude,gps_info.latitude,direction,captured_at\n\
            f1,-73.95,40.70,NORTH,1691762400000\n\
            f2,-73.95,abc,NORTH,1691762400000\n\
            f3,-73.95,40.70,NORTH,soon\n"
            .to_vec();
        md.extend_from_slice(b"\xff\xfe,-73.95,40.70,NORTH,1691762400000\n");
        std::fs::write(dir.join(METADATA_FILE), md).unwrap();

        let mut detections = b"frame,0,1,2\nf1,1,0,0\nf2,1,0,0\nf3,1,0,0\n".to_vec();
        detections.extend_from_slice(b"\xff\xfe,1,0,0\n");
        std::fs::write(dir.join(DETECTIONS_FILE), detections).unwrap();

        let (set, report) = load_days(&tmp, &["2023-08-11".to_string()], "EPSG:4326").unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(report.rows_read, 4);
        assert_eq!(report.invalid_position, 1);
        assert_eq!(report.invalid_timestamp, 1);
        assert_eq!(report.malformed_rows, 1);
        assert_eq!(report.malformed_detection_rows, 1);
        assert_eq!(report.loaded + report.excluded(), report.rows_read);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_day_is_an_error() {
        let tmp = std::env::temp_dir().join("sidewalk_crowd_ingest_missing_day");
        let _ = std::fs::remove_dir_all(&tmp);

        let err = load_days(&tmp, &["2023-01-01".to_string()], "EPSG:4326").unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }
}
