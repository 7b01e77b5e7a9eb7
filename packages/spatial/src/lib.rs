#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry for matching camera observations to sidewalk segments.
//!
//! Builds field-of-view cones from observation positions and headings,
//! bulk-loads segment envelopes into an R-tree, and answers which segments
//! each cone intersects. Also holds the planar reprojection used to bring
//! observations and segments into one coordinate reference beforehand.

pub mod cone;
pub mod index;
pub mod progress;
pub mod projection;

pub use cone::{ConeError, ConeShape, build_cone};
pub use index::{JoinError, JoinPair, JoinResult, SegmentIndex, join_all};
pub use progress::{NullProgress, ProgressCallback};
pub use projection::{ProjectionError, Reprojector, projection_between};
