#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Camera observation types.
//!
//! An [`Observation`] is one camera capture: where it was taken, which
//! compass octant the camera was facing, when it was captured, and how many
//! objects of each detection class were seen in the frame.

use geo::Point;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Number of detection classes carried by every observation.
pub const DETECTION_CLASSES: usize = 3;

/// One of the eight canonical compass octants a camera heading is snapped
/// to before a field-of-view cone is built.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// Heading of this octant in degrees.
    #[must_use]
    pub const fn degrees(self) -> f64 {
        match self {
            Self::North => 0.0,
            Self::NorthEast => 45.0,
            Self::East => 90.0,
            Self::SouthEast => 135.0,
            Self::South => 180.0,
            Self::SouthWest => 225.0,
            Self::West => 270.0,
            Self::NorthWest => 315.0,
        }
    }

    /// Snaps a raw direction label to an octant.
    ///
    /// Labels are matched exactly (`NORTH_EAST`, not `north east`). Returns
    /// `None` for anything else, including empty labels.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        label.trim().parse().ok()
    }
}

/// Raw per-class detection counts for a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionCounts(pub [f64; DETECTION_CLASSES]);

impl DetectionCounts {
    /// Count for the primary class (pedestrians).
    #[must_use]
    pub const fn primary(&self) -> f64 {
        self.0[0]
    }

    /// Builds counts from optional cells, treating missing values as zero.
    #[must_use]
    pub fn from_optional(cells: [Option<f64>; DETECTION_CLASSES]) -> Self {
        Self(cells.map(|c| c.filter(|v| v.is_finite()).unwrap_or(0.0)))
    }
}

/// A camera capture with its octant heading already resolved.
///
/// `position` is expressed in whatever coordinate reference the owning
/// [`ObservationSet`] declares.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Unique frame identifier.
    pub frame_id: String,
    /// Capture position.
    pub position: Point<f64>,
    /// Snapped compass octant.
    pub direction: Direction,
    /// Capture time in epoch milliseconds (UTC).
    pub captured_at_ms: i64,
    /// Detection counts per class.
    pub counts: DetectionCounts,
}

impl Observation {
    /// Heading in degrees derived from the snapped octant.
    #[must_use]
    pub const fn heading_degrees(&self) -> f64 {
        self.direction.degrees()
    }
}

/// Observations that share one coordinate reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    /// Authority code of the coordinate reference (e.g. `EPSG:2263`).
    pub crs: String,
    pub observations: Vec<Observation>,
}

impl ObservationSet {
    #[must_use]
    pub const fn new(crs: String, observations: Vec<Observation>) -> Self {
        Self { crs, observations }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
