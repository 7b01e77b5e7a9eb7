#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Per-segment aggregation and crowdedness normalization.
//!
//! Takes the `(observation, segment)` matches produced by the spatial join,
//! reduces them to mean detection counts per segment (overall and by local
//! hour of day), and converts those means into width-normalized, clipped
//! crowdedness values.

pub mod engine;
pub mod hours;
pub mod normalize;
pub mod stats;

pub use engine::{AggregateError, AggregateReport, aggregate};
pub use normalize::{ClipBounds, NormalizationReport, NormalizeOptions, normalize};

#[cfg(test)]
mod tests {
    use geo::{Point, polygon};
    use sidewalk_crowd_observation_models::{
        DetectionCounts, Direction, Observation, ObservationSet,
    };
    use sidewalk_crowd_segment_models::{Segment, SegmentCatalog};
    use sidewalk_crowd_spatial::{ConeShape, NullProgress, join_all};

    use super::*;

    #[test]
    fn three_headings_over_one_segment() {
        let crs = "EPSG:2263".to_string();
        let square = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        let catalog = SegmentCatalog::new(
            crs.clone(),
            vec![Segment::new("s1".into(), "sw".to_string(), square.into(), 100.0, 100.0)],
        );

        // 2023-08-11 10:15 in New York.
        let at = 1_691_762_400_000 + 15 * 60 * 1000;
        let observations = ObservationSet::new(
            crs,
            [
                (Direction::North, 2.0, 2.0),
                (Direction::East, 5.0, 4.0),
                (Direction::South, 8.0, 6.0),
            ]
            .into_iter()
            .map(|(direction, x, count)| Observation {
                frame_id: format!("{direction}"),
                position: Point::new(x, 5.0),
                direction,
                captured_at_ms: at,
                counts: DetectionCounts([count, 0.0, 0.0]),
            })
            .collect(),
        );

        let shape = ConeShape::with_distance(150.0).unwrap();
        let join = join_all(&observations, &catalog, &shape, &NullProgress).unwrap();
        assert_eq!(join.len(), 3);

        let (table, report) =
            aggregate(&join, &observations, &catalog, hours::DEFAULT_TIME_ZONE).unwrap();
        assert_eq!(report.unmatched_segments, 0);

        let pre_clip = normalize::width_normalize(table.clone());
        assert!((pre_clip.rows[0].crowdedness - 4.0).abs() < 1e-12);

        let (table, _) = normalize(table, &NormalizeOptions::default());
        let row = &table.rows[0];
        assert!((row.mean_counts[0] - 4.0).abs() < 1e-12);
        assert!((row.crowdedness - 4.0).abs() < 1e-12);
        for (hour, value) in row.hourly_crowdedness.iter().enumerate() {
            if hour == 10 {
                assert!((value - 4.0).abs() < 1e-12);
            } else {
                assert!(value.abs() < f64::EPSILON, "hour {hour} = {value}");
            }
        }
    }
}
