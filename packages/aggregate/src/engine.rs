//! Reduces cone/segment matches to one row per catalog segment.
//!
//! Every catalog segment gets exactly one row, in catalog order. Segments
//! no cone reached keep zeroes in every derived column, and so do hours in
//! which a segment had no matched observation.

use chrono_tz::Tz;
use sidewalk_crowd_aggregate_models::{AggregateRow, AggregateTable, COUNT_CLASSES, HOURS_PER_DAY};
use sidewalk_crowd_observation_models::ObservationSet;
use sidewalk_crowd_segment_models::SegmentCatalog;
use sidewalk_crowd_spatial::{JoinPair, JoinResult};

use crate::hours::local_hour;

/// Errors from aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// A join pair refers to an observation or segment that does not exist.
    #[error("Join pair ({observation}, {segment}) is out of range")]
    PairOutOfRange {
        /// Observation position.
        observation: usize,
        /// Segment position.
        segment: usize,
    },
}

/// Counters describing what the aggregation saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateReport {
    /// Segments with no matched observation.
    pub unmatched_segments: usize,
    /// Observations whose timestamp could not be placed in an hour. They
    /// still contribute to the overall means.
    pub unplaced_observations: usize,
}

#[derive(Clone, Copy, Default)]
struct Accumulator {
    sums: [f64; COUNT_CLASSES],
    count: u64,
}

impl Accumulator {
    fn means(&self) -> [f64; COUNT_CLASSES] {
        if self.count == 0 {
            return [0.0; COUNT_CLASSES];
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        self.sums.map(|s| s / n)
    }
}

/// Aggregates matched observations per segment, overall and per local hour.
///
/// Only the primary detection class is averaged per hour. Crowdedness
/// columns are left at zero; see [`crate::normalize`].
///
/// # Errors
///
/// Returns [`AggregateError::PairOutOfRange`] if `join` was not produced from
/// `observations` and `catalog`.
pub fn aggregate(
    join: &JoinResult,
    observations: &ObservationSet,
    catalog: &SegmentCatalog,
    tz: Tz,
) -> Result<(AggregateTable, AggregateReport), AggregateError> {
    for pair in &join.pairs {
        if pair.observation >= observations.len() || pair.segment >= catalog.len() {
            return Err(AggregateError::PairOutOfRange {
                observation: pair.observation,
                segment: pair.segment,
            });
        }
    }

    let hours: Vec<Option<u8>> = observations
        .observations
        .iter()
        .map(|obs| local_hour(obs.captured_at_ms, tz))
        .collect();
    let unplaced_observations = hours.iter().filter(|h| h.is_none()).count();
    if unplaced_observations > 0 {
        log::warn!("{unplaced_observations} observations have timestamps outside the supported range");
    }

    let mut overall = vec![Accumulator::default(); catalog.len()];
    for pair in &join.pairs {
        let acc = &mut overall[pair.segment];
        let counts = observations.observations[pair.observation].counts.0;
        for (sum, count) in acc.sums.iter_mut().zip(counts) {
            *sum += count;
        }
        acc.count += 1;
    }

    let primary: Vec<f64> = observations
        .observations
        .iter()
        .map(|obs| obs.counts.primary())
        .collect();
    let hourly = hourly_means(&join.pairs, &hours, &primary, catalog.len());

    let mean_width = catalog.mean_width();
    let mut unmatched_segments = 0;

    let rows = catalog
        .segments
        .iter()
        .zip(overall)
        .enumerate()
        .map(|(position, (segment, acc))| {
            if acc.count == 0 {
                unmatched_segments += 1;
            }

            let mut row =
                AggregateRow::zeroed(segment.id.clone(), segment.parent_id.clone(), segment.width);
            row.relative_width = segment.width.zip(mean_width).map(|(w, mean)| w / mean);
            row.observation_count = acc.count;
            row.mean_counts = acc.means();
            for (hour, column) in hourly.iter().enumerate() {
                row.hourly_mean_counts[hour] = column[position];
            }
            row
        })
        .collect();

    let report = AggregateReport {
        unmatched_segments,
        unplaced_observations,
    };
    log::info!(
        "Aggregated {} segments ({} without any matched observation)",
        catalog.len(),
        report.unmatched_segments
    );

    Ok((AggregateTable::new(rows), report))
}

/// Mean primary count per segment for a single hour.
fn hour_column(
    hour: u8,
    pairs: &[JoinPair],
    hours: &[Option<u8>],
    primary: &[f64],
    segments: usize,
) -> Vec<f64> {
    let mut sums = vec![0.0; segments];
    let mut counts = vec![0_u64; segments];

    for pair in pairs.iter().filter(|p| hours[p.observation] == Some(hour)) {
        sums[pair.segment] += primary[pair.observation];
        counts[pair.segment] += 1;
    }

    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let n = count as f64;
                sum / n
            }
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn hourly_means(
    pairs: &[JoinPair],
    hours: &[Option<u8>],
    primary: &[f64],
    segments: usize,
) -> Vec<Vec<f64>> {
    use rayon::prelude::*;

    (0..HOURS_PER_DAY)
        .into_par_iter()
        .map(|hour| hour_column(hour_u8(hour), pairs, hours, primary, segments))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn hourly_means(
    pairs: &[JoinPair],
    hours: &[Option<u8>],
    primary: &[f64],
    segments: usize,
) -> Vec<Vec<f64>> {
    hourly_means_sequential(pairs, hours, primary, segments)
}

#[cfg(any(test, not(feature = "parallel")))]
fn hourly_means_sequential(
    pairs: &[JoinPair],
    hours: &[Option<u8>],
    primary: &[f64],
    segments: usize,
) -> Vec<Vec<f64>> {
    (0..HOURS_PER_DAY)
        .map(|hour| hour_column(hour_u8(hour), pairs, hours, primary, segments))
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
const fn hour_u8(hour: usize) -> u8 {
    hour as u8
}
