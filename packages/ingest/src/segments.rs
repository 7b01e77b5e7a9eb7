//! Sidewalk segment catalog loading.
//!
//! The first column is the segment id regardless of its header. Geometry is
//! WKT (`POLYGON ((...))`) or a `GeoJSON` geometry object. Widths are
//! derived from `shape_area / shape_leng` once, here.

use std::collections::BTreeSet;
use std::path::Path;

use geo::{Geometry, GeometryCollection};
use geojson::GeoJson;
use serde::Serialize;
use sidewalk_crowd_segment_models::{Segment, SegmentCatalog, SegmentId};
use wkt::TryFromWkt as _;

use crate::{IngestError, column_index, open_reader, parse_cell};

/// Row counts from loading the segment catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentLoadReport {
    /// Data rows read.
    pub rows_read: usize,
    /// Rows that could not be decoded at all.
    pub malformed_rows: usize,
    /// Segments kept with an empty geometry because theirs did not parse.
    pub invalid_geometry: usize,
    /// Rows repeating an earlier segment id.
    pub duplicate: usize,
    /// Segments kept without a usable width.
    pub degenerate: usize,
    /// Segments in the catalog.
    pub loaded: usize,
}

impl SegmentLoadReport {
    /// Rows that did not become a catalog segment.
    #[must_use]
    pub const fn excluded(&self) -> usize {
        self.malformed_rows + self.duplicate
    }
}

/// Loads the segment catalog, tagging it with `crs`.
///
/// # Errors
///
/// Returns an error if the file is missing or unreadable or lacks one of the
/// `source_id`, `shape_area`, `shape_leng` or `geometry` columns.
pub fn load_segments(
    path: &Path,
    crs: &str,
) -> Result<(SegmentCatalog, SegmentLoadReport), IngestError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| IngestError::Csv {
            path: path.display().to_string(),
            source: e,
        })?
        .clone();

    let parent_col = column_index(&headers, "source_id", path)?;
    let area_col = column_index(&headers, "shape_area", path)?;
    let length_col = column_index(&headers, "shape_leng", path)?;
    let geometry_col = column_index(&headers, "geometry", path)?;

    let mut report = SegmentLoadReport::default();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut segments = Vec::new();

    for result in reader.records() {
        report.rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                report.malformed_rows += 1;
                continue;
            }
        };

        let id = record.get(0).unwrap_or_default().trim().to_string();

        if !seen.insert(id.clone()) {
            report.duplicate += 1;
            continue;
        }

        // Kept with an empty geometry so the id still reaches the output.
        let geometry = record
            .get(geometry_col)
            .and_then(parse_geometry)
            .unwrap_or_else(|| {
                log::warn!("Failed to parse geometry for segment {id}; it cannot match");
                report.invalid_geometry += 1;
                Geometry::GeometryCollection(GeometryCollection::default())
            });

        let segment = Segment::new(
            SegmentId(id),
            record.get(parent_col).unwrap_or_default().trim().to_string(),
            geometry,
            parse_cell(&record, area_col).unwrap_or(f64::NAN),
            parse_cell(&record, length_col).unwrap_or(f64::NAN),
        );
        if segment.is_degenerate() {
            log::debug!("Segment {} has no usable width", segment.id);
            report.degenerate += 1;
        }
        segments.push(segment);
    }

    report.loaded = segments.len();
    log::info!(
        "Loaded {} segments from {} ({} degenerate, {} invalid geometry, {} duplicate, {} malformed)",
        report.loaded,
        path.display(),
        report.degenerate,
        report.invalid_geometry,
        report.duplicate,
        report.malformed_rows
    );

    Ok((SegmentCatalog::new(crs.to_string(), segments), report))
}

/// Parses a WKT or `GeoJSON` geometry string.
///
/// Only areal and linear geometry is accepted; points and collections are
/// rejected.
#[must_use]
pub fn parse_geometry(text: &str) -> Option<Geometry<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let geometry = if text.starts_with('{') {
        parse_geojson(text)?
    } else {
        Geometry::<f64>::try_from_wkt_str(text).ok()?
    };

    match geometry {
        Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::LineString(_)
        | Geometry::MultiLineString(_)
        | Geometry::Rect(_) => Some(geometry),
        _ => None,
    }
}

fn parse_geojson(text: &str) -> Option<Geometry<f64>> {
    let GeoJson::Geometry(geom) = text.parse::<GeoJson>().ok()? else {
        return None;
    };
    let geo_geom: Geometry<f64> = geom.try_into().ok()?;
    match geo_geom {
        Geometry::MultiPolygon(mp) if mp.0.len() == 1 => {
            mp.0.into_iter().next().map(Geometry::Polygon)
        }
        other => Some(other),
    }
}
