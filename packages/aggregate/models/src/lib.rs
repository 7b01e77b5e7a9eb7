#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-segment aggregate table types.
//!
//! The [`AggregateTable`] is the only durable output of a run: one
//! [`AggregateRow`] per catalog segment with overall and hourly mean counts
//! and the width-normalized crowdedness derived from them.

use serde::{Deserialize, Serialize};
use sidewalk_crowd_segment_models::SegmentId;

/// Number of hour-of-day partitions.
pub const HOURS_PER_DAY: usize = 24;

/// Number of detection classes averaged per segment.
pub const COUNT_CLASSES: usize = 3;

/// One output row, keyed by segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub segment_id: SegmentId,
    pub parent_id: String,
    /// Segment width, `None` for degenerate segments.
    pub width: Option<f64>,
    /// Width relative to the catalog's mean width.
    pub relative_width: Option<f64>,
    /// Number of observations whose cone intersected this segment.
    pub observation_count: u64,
    /// Mean count per detection class across all matched observations.
    pub mean_counts: [f64; COUNT_CLASSES],
    /// Mean primary-class count per local hour of day.
    pub hourly_mean_counts: [f64; HOURS_PER_DAY],
    /// Overall crowdedness (primary count per unit width).
    pub crowdedness: f64,
    /// Crowdedness per local hour of day.
    pub hourly_crowdedness: [f64; HOURS_PER_DAY],
}

impl AggregateRow {
    /// A row with every derived column set to zero.
    #[must_use]
    pub const fn zeroed(segment_id: SegmentId, parent_id: String, width: Option<f64>) -> Self {
        Self {
            segment_id,
            parent_id,
            width,
            relative_width: None,
            observation_count: 0,
            mean_counts: [0.0; COUNT_CLASSES],
            hourly_mean_counts: [0.0; HOURS_PER_DAY],
            crowdedness: 0.0,
            hourly_crowdedness: [0.0; HOURS_PER_DAY],
        }
    }
}

/// Identifies one crowdedness column of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CrowdednessColumn {
    Overall,
    Hour(u8),
}

impl std::fmt::Display for CrowdednessColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overall => f.write_str("crowdedness"),
            Self::Hour(hour) => write!(f, "crowdedness_h{hour:02}"),
        }
    }
}

/// The aggregate table, one row per catalog segment in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateTable {
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    #[must_use]
    pub const fn new(rows: Vec<AggregateRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a row by segment id.
    #[must_use]
    pub fn row(&self, id: &SegmentId) -> Option<&AggregateRow> {
        self.rows.iter().find(|r| &r.segment_id == id)
    }

    /// Values of a crowdedness column in row order.
    #[must_use]
    pub fn column(&self, column: CrowdednessColumn) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| match column {
                CrowdednessColumn::Overall => row.crowdedness,
                CrowdednessColumn::Hour(h) => row.hourly_crowdedness[usize::from(h)],
            })
            .collect()
    }

    /// Number of rows whose overall crowdedness is exactly zero.
    #[must_use]
    pub fn zero_crowdedness_count(&self) -> usize {
        self.rows.iter().filter(|r| r.crowdedness == 0.0).count()
    }
}

/// Descriptive statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// `(quantile, value)` pairs in ascending quantile order.
    pub percentiles: Vec<(f64, f64)>,
}

impl std::fmt::Display for ColumnSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "count={} mean={:.4} min={:.4} max={:.4}",
            self.count, self.mean, self.min, self.max
        )?;
        for (q, value) in &self.percentiles {
            write!(f, " p{}={value:.4}", q * 100.0)?;
        }
        Ok(())
    }
}
