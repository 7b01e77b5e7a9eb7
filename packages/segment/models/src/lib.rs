#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sidewalk segment types.
//!
//! A [`Segment`] is the smallest addressable piece of the sidewalk network
//! and the key every aggregate is reported against. Its physical width is
//! derived once from the source area and length.

use geo::Geometry;
use serde::{Deserialize, Serialize};

/// Stable segment identifier (the join key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A sidewalk segment with its cached width.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    /// Identifier of the sidewalk this segment was cut from.
    pub parent_id: String,
    /// Polygon (or thin line) geometry in the catalog's coordinate reference.
    pub geometry: Geometry<f64>,
    /// Source area in squared planar units.
    pub area: f64,
    /// Source length in planar units.
    pub length: f64,
    /// `area / length`, or `None` when the segment is degenerate.
    pub width: Option<f64>,
}

impl Segment {
    /// Creates a segment, deriving its width.
    #[must_use]
    pub fn new(
        id: SegmentId,
        parent_id: String,
        geometry: Geometry<f64>,
        area: f64,
        length: f64,
    ) -> Self {
        Self {
            id,
            parent_id,
            geometry,
            area,
            length,
            width: derive_width(area, length),
        }
    }

    /// Whether the segment has no usable width.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        self.width.is_none()
    }
}

/// Width as `area / length`.
///
/// Returns `None` for zero or negative length, negative area, or any
/// non-finite result.
#[must_use]
pub fn derive_width(area: f64, length: f64) -> Option<f64> {
    if length.is_nan() || area.is_nan() || length <= 0.0 || area < 0.0 {
        return None;
    }
    let width = area / length;
    (width.is_finite() && width > 0.0).then_some(width)
}

/// The full set of segments, sharing one coordinate reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentCatalog {
    /// Authority code of the coordinate reference (e.g. `EPSG:2263`).
    pub crs: String,
    pub segments: Vec<Segment>,
}

impl SegmentCatalog {
    #[must_use]
    pub const fn new(crs: String, segments: Vec<Segment>) -> Self {
        Self { crs, segments }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments without a usable width.
    #[must_use]
    pub fn degenerate_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_degenerate()).count()
    }

    /// Mean width across non-degenerate segments.
    #[must_use]
    pub fn mean_width(&self) -> Option<f64> {
        let widths: Vec<f64> = self.segments.iter().filter_map(|s| s.width).collect();
        if widths.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = widths.len() as f64;
        Some(widths.iter().sum::<f64>() / n)
    }
}
