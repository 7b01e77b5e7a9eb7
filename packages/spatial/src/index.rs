//! R-tree index over sidewalk segments and the cone join built on it.
//!
//! Segment envelopes are bulk-loaded once; each cone first narrows the
//! candidate set by envelope overlap and then applies the exact
//! `intersects` test, so touching a segment's boundary counts as a match.

use std::collections::BTreeSet;

use geo::{BoundingRect, Geometry, Intersects, Polygon, Rect};
use rstar::{AABB, RTree, RTreeObject};
use sidewalk_crowd_observation_models::{Observation, ObservationSet};
use sidewalk_crowd_segment_models::{SegmentCatalog, SegmentId};

use crate::cone::ConeShape;
use crate::progress::ProgressCallback;

/// Fatal join preconditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// Observations and segments are not in the same coordinate reference.
    #[error("Coordinate reference mismatch: observations in {observations}, segments in {segments}")]
    CrsMismatch {
        /// Reference of the observation set.
        observations: String,
        /// Reference of the segment catalog.
        segments: String,
    },
}

/// A segment stored in the R-tree with its catalog position.
struct SegmentEntry<'a> {
    position: usize,
    envelope: AABB<[f64; 2]>,
    geometry: &'a Geometry<f64>,
}

impl RTreeObject for SegmentEntry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// One `(observation, segment)` match, by position in their inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JoinPair {
    pub observation: usize,
    pub segment: usize,
}

/// Every cone/segment intersection of a run, ordered by observation then
/// segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinResult {
    pub pairs: Vec<JoinPair>,
}

impl JoinResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of distinct observations with at least one match.
    #[must_use]
    pub fn matched_observations(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for pair in &self.pairs {
            if last != Some(pair.observation) {
                count += 1;
                last = Some(pair.observation);
            }
        }
        count
    }
}

/// Read-only spatial index over a segment catalog.
///
/// Built once per run and shared by every query; it borrows the catalog so
/// segment geometry is never copied.
pub struct SegmentIndex<'a> {
    catalog: &'a SegmentCatalog,
    tree: RTree<SegmentEntry<'a>>,
}

impl<'a> SegmentIndex<'a> {
    /// Bulk-loads every segment with a non-empty geometry.
    #[must_use]
    pub fn build(catalog: &'a SegmentCatalog) -> Self {
        let mut entries = Vec::with_capacity(catalog.len());

        for (position, segment) in catalog.segments.iter().enumerate() {
            let Some(envelope) = compute_envelope(&segment.geometry) else {
                log::warn!("Segment {} has empty geometry; it cannot match", segment.id);
                continue;
            };
            entries.push(SegmentEntry {
                position,
                envelope,
                geometry: &segment.geometry,
            });
        }

        let tree = RTree::bulk_load(entries);
        log::info!("Loaded {} segments into spatial index", tree.size());

        Self { catalog, tree }
    }

    /// Coordinate reference of the indexed catalog.
    #[must_use]
    pub fn crs(&self) -> &str {
        &self.catalog.crs
    }

    /// Number of indexed segments.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Catalog positions of every segment intersecting `polygon`, ascending.
    #[must_use]
    pub fn find_intersecting(&self, polygon: &Polygon<f64>) -> Vec<usize> {
        let Some(query_env) = polygon.bounding_rect().map(to_aabb) else {
            return Vec::new();
        };

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.geometry.intersects(polygon))
            .map(|entry| entry.position)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Identifiers of every segment intersecting `polygon`.
    #[must_use]
    pub fn intersecting_ids(&self, polygon: &Polygon<f64>) -> BTreeSet<&'a SegmentId> {
        let catalog = self.catalog;
        self.find_intersecting(polygon)
            .into_iter()
            .map(|pos| &catalog.segments[pos].id)
            .collect()
    }

    /// Builds each observation's cone and matches it against the index.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::CrsMismatch`] if the observations are not in the
    /// catalog's coordinate reference. Nothing is computed in that case.
    pub fn join_all(
        &self,
        observations: &ObservationSet,
        shape: &ConeShape,
        progress: &dyn ProgressCallback,
    ) -> Result<JoinResult, JoinError> {
        if !observations.crs.eq_ignore_ascii_case(self.crs()) {
            return Err(JoinError::CrsMismatch {
                observations: observations.crs.clone(),
                segments: self.crs().to_string(),
            });
        }

        progress.set_total(observations.len() as u64);
        progress.set_message("Matching cones to segments".to_string());

        let pairs = self.collect_pairs(&observations.observations, shape, progress);
        let result = JoinResult { pairs };

        progress.finish(format!(
            "{} observations matched {} segment pairs",
            result.matched_observations(),
            result.len()
        ));
        log::info!(
            "Joined {} observations into {} (observation, segment) pairs",
            observations.len(),
            result.len()
        );

        Ok(result)
    }

    fn match_one(&self, position: usize, obs: &Observation, shape: &ConeShape) -> Vec<JoinPair> {
        let cone = shape.build(obs.position, obs.heading_degrees());
        self.find_intersecting(&cone)
            .into_iter()
            .map(|segment| JoinPair {
                observation: position,
                segment,
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn collect_pairs(
        &self,
        observations: &[Observation],
        shape: &ConeShape,
        progress: &dyn ProgressCallback,
    ) -> Vec<JoinPair> {
        use rayon::prelude::*;

        observations
            .par_iter()
            .enumerate()
            .flat_map_iter(|(position, obs)| {
                let pairs = self.match_one(position, obs, shape);
                progress.inc(1);
                pairs
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn collect_pairs(
        &self,
        observations: &[Observation],
        shape: &ConeShape,
        progress: &dyn ProgressCallback,
    ) -> Vec<JoinPair> {
        self.collect_pairs_sequential(observations, shape, progress)
    }

    #[cfg(any(test, not(feature = "parallel")))]
    fn collect_pairs_sequential(
        &self,
        observations: &[Observation],
        shape: &ConeShape,
        progress: &dyn ProgressCallback,
    ) -> Vec<JoinPair> {
        let mut pairs = Vec::new();
        for (position, obs) in observations.iter().enumerate() {
            pairs.extend(self.match_one(position, obs, shape));
            progress.inc(1);
        }
        pairs
    }
}

/// Builds a throwaway index over `catalog` and joins `observations` to it.
///
/// # Errors
///
/// Returns [`JoinError::CrsMismatch`] if the inputs are in different
/// coordinate references.
pub fn join_all(
    observations: &ObservationSet,
    catalog: &SegmentCatalog,
    shape: &ConeShape,
    progress: &dyn ProgressCallback,
) -> Result<JoinResult, JoinError> {
    SegmentIndex::build(catalog).join_all(observations, shape, progress)
}

/// Bounding box envelope of a geometry, `None` when it is empty.
fn compute_envelope(geometry: &Geometry<f64>) -> Option<AABB<[f64; 2]>> {
    geometry.bounding_rect().map(to_aabb)
}

fn to_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Point, polygon};
    use sidewalk_crowd_observation_models::{DetectionCounts, Direction};
    use sidewalk_crowd_segment_models::Segment;

    use super::*;
    use crate::progress::NullProgress;

    const CRS: &str = "EPSG:2263";

    fn square_segment(id: &str, x: f64, y: f64, size: f64) -> Segment {
        let poly = polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ];
        Segment::new(id.into(), "sidewalk".to_string(), poly.into(), size * size, size)
    }

    fn observation(frame: &str, x: f64, y: f64, direction: Direction) -> Observation {
        Observation {
            frame_id: frame.to_string(),
            position: Point::new(x, y),
            direction,
            captured_at_ms: 0,
            counts: DetectionCounts([1.0, 0.0, 0.0]),
        }
    }

    fn grid_catalog() -> SegmentCatalog {
        let mut segments = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let id = format!("{i}-{j}");
                segments.push(square_segment(
                    &id,
                    f64::from(i) * 100.0,
                    f64::from(j) * 100.0,
                    10.0,
                ));
            }
        }
        SegmentCatalog::new(CRS.to_string(), segments)
    }

    #[test]
    fn finds_only_nearby_segments() {
        let catalog = grid_catalog();
        let index = SegmentIndex::build(&catalog);
        assert_eq!(index.size(), 100);

        let shape = ConeShape::with_distance(50.0).unwrap();
        // Facing +x from just left of segment 5-5.
        let cone = shape.build(Point::new(480.0, 505.0), 0.0);
        let ids = index.intersecting_ids(&cone);

        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&SegmentId::from("5-5")));
    }

    #[test]
    fn matches_partially_covered_and_touching_segments() {
        let catalog = SegmentCatalog::new(
            CRS.to_string(),
            vec![
                square_segment("partial", 5.0, -5.0, 10.0),
                square_segment("touching", -10.0, 0.0, 10.0),
                square_segment("behind", -30.0, -5.0, 10.0),
            ],
        );
        let index = SegmentIndex::build(&catalog);

        let shape = ConeShape::with_distance(10.0).unwrap();
        let cone = shape.build(Point::new(0.0, 0.0), 0.0);

        // "touching" only shares the fan's left edge along x = 0.
        assert_eq!(index.find_intersecting(&cone), vec![0, 1]);
    }

    #[test]
    fn matches_thin_line_segments() {
        let line = LineString::from(vec![Point::new(5.0, -50.0), Point::new(5.0, 50.0)]);
        let catalog = SegmentCatalog::new(
            CRS.to_string(),
            vec![Segment::new("line".into(), String::new(), line.into(), 100.0, 100.0)],
        );
        let index = SegmentIndex::build(&catalog);
        let cone = ConeShape::with_distance(10.0)
            .unwrap()
            .build(Point::new(0.0, 0.0), 0.0);

        assert_eq!(index.find_intersecting(&cone), vec![0]);
    }

    #[test]
    fn joins_every_observation() {
        let catalog = grid_catalog();
        let index = SegmentIndex::build(&catalog);
        let shape = ConeShape::with_distance(50.0).unwrap();

        let observations = ObservationSet::new(
            CRS.to_string(),
            vec![
                observation("a", 480.0, 505.0, Direction::North),
                observation("b", 2000.0, 2000.0, Direction::East),
                observation("c", 5.0, 5.0, Direction::South),
            ],
        );

        let result = index.join_all(&observations, &shape, &NullProgress).unwrap();

        assert_eq!(
            result.pairs,
            vec![
                JoinPair {
                    observation: 0,
                    segment: 55
                },
                JoinPair {
                    observation: 2,
                    segment: 0
                },
            ]
        );
        assert_eq!(result.matched_observations(), 2);
    }

    #[test]
    fn sequential_and_default_joins_agree() {
        let catalog = grid_catalog();
        let index = SegmentIndex::build(&catalog);
        let shape = ConeShape::with_distance(120.0).unwrap();

        let directions = [
            Direction::North,
            Direction::NorthEast,
            Direction::East,
            Direction::SouthEast,
            Direction::South,
            Direction::SouthWest,
            Direction::West,
            Direction::NorthWest,
        ];
        let observations: Vec<Observation> = (0_u32..200)
            .map(|i| {
                observation(
                    &format!("f{i}"),
                    f64::from(i % 20) * 53.0,
                    f64::from(i / 20) * 97.0,
                    directions[(i % 8) as usize],
                )
            })
            .collect();

        let default = index.collect_pairs(&observations, &shape, &NullProgress);
        let sequential = index.collect_pairs_sequential(&observations, &shape, &NullProgress);

        assert!(!default.is_empty());
        assert_eq!(default, sequential);
        assert!(sequential.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn refuses_mismatched_references() {
        let catalog = grid_catalog();
        let observations = ObservationSet::new(
            "EPSG:4326".to_string(),
            vec![observation("a", 480.0, 505.0, Direction::North)],
        );
        let shape = ConeShape::with_distance(50.0).unwrap();

        let err = join_all(&observations, &catalog, &shape, &NullProgress).unwrap_err();
        assert_eq!(
            err,
            JoinError::CrsMismatch {
                observations: "EPSG:4326".to_string(),
                segments: CRS.to_string(),
            }
        );
    }
}
