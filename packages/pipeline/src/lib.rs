#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end crowdedness run.
//!
//! Loads observations and segments, brings both into the target reference
//! once, matches every observation's cone against the segment index,
//! aggregates per segment and hour, normalizes by width, and writes the
//! table plus a JSON [`RunSummary`].

pub mod config;

use std::collections::BTreeMap;

use serde::Serialize;
use sidewalk_crowd_aggregate::{AggregateError, aggregate, normalize, stats};
use sidewalk_crowd_aggregate_models::{AggregateTable, ColumnSummary};
use sidewalk_crowd_generate::GenerateError;
use sidewalk_crowd_ingest::{
    IngestError, ObservationLoadReport, SegmentLoadReport, load_days, load_segments,
};
use sidewalk_crowd_spatial::projection::{reproject_catalog, reproject_observations};
use sidewalk_crowd_spatial::{
    ConeError, JoinError, ProgressCallback, ProjectionError, SegmentIndex, projection_between,
};

pub use config::PipelineConfig;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file is not valid TOML.
    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Cone parameters are invalid.
    #[error(transparent)]
    Cone(#[from] ConeError),

    /// Input files could not be read.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Inputs could not be brought into the target reference.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// Observations and segments disagree on their reference.
    #[error(transparent)]
    Join(#[from] JoinError),

    /// Join output does not match its inputs.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Outputs could not be written.
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// Diagnostics of one run, logged at the end and written as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub observations: ObservationLoadReport,
    pub segments: SegmentLoadReport,
    /// `(observation, segment)` matches produced by the join.
    pub join_pairs: usize,
    /// Observations whose cone reached at least one segment.
    pub matched_observations: usize,
    /// Segments no cone reached.
    pub unmatched_segments: usize,
    /// Observations whose timestamp has no local hour.
    pub unplaced_observations: usize,
    /// Segments whose overall crowdedness is zero.
    pub zero_crowdedness: usize,
    pub zero_crowdedness_percent: f64,
    /// Overall crowdedness over non-degenerate segments.
    pub crowdedness: Option<ColumnSummary>,
    /// `[lower, upper]` per column, `None` where clipping was skipped.
    pub clip_bounds: BTreeMap<String, Option<[f64; 2]>>,
}

impl RunSummary {
    fn log(&self) {
        log::info!(
            "Observations: {} loaded, {} excluded ({} malformed, {} without detections, {} bad position, {} bad timestamp, {} unmapped direction)",
            self.observations.loaded,
            self.observations.excluded(),
            self.observations.malformed_rows,
            self.observations.missing_detections,
            self.observations.invalid_position,
            self.observations.invalid_timestamp,
            self.observations.unmapped_direction
        );
        log::info!(
            "Segments: {} loaded, {} degenerate, {} invalid geometry, {} excluded, {} without any match",
            self.segments.loaded,
            self.segments.degenerate,
            self.segments.invalid_geometry,
            self.segments.excluded(),
            self.unmatched_segments
        );
        log::info!(
            "Join: {} pairs from {} matched observations",
            self.join_pairs,
            self.matched_observations
        );
        log::info!(
            "{} segments ({:.2}%) have zero crowdedness",
            self.zero_crowdedness,
            self.zero_crowdedness_percent
        );
        if let Some(summary) = &self.crowdedness {
            log::info!("Crowdedness: {summary}");
        }
    }
}

/// Runs every stage in memory and returns the normalized table.
///
/// Nothing is written; see [`run`].
///
/// # Errors
///
/// Returns an error if the configuration is invalid, an input cannot be
/// read, the references cannot be reconciled, or the join and aggregation
/// disagree.
pub fn compute(
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Result<(AggregateTable, RunSummary), PipelineError> {
    config.validate()?;
    let shape = config.cone_shape()?;
    let tz = config.time_zone()?;
    let options = config.normalize_options()?;

    let (observations, observation_report) =
        load_days(&config.data_dir, &config.days, &config.observation_crs)?;
    let (catalog, segment_report) = load_segments(&config.segments_path, &config.segment_crs)?;

    let observations = reproject_observations(
        observations,
        projection_between(&config.observation_crs, &config.target_crs)?.as_ref(),
    )?;
    let catalog = reproject_catalog(
        catalog,
        projection_between(&config.segment_crs, &config.target_crs)?.as_ref(),
    )?;

    let index = SegmentIndex::build(&catalog);
    log::info!("Indexed {} segments in {}", index.size(), index.crs());
    let join = index.join_all(&observations, &shape, progress)?;

    let (table, aggregate_report) = aggregate(&join, &observations, &catalog, tz)?;
    let (table, normalization) = normalize(table, &options);

    let zero_crowdedness = table.zero_crowdedness_count();
    #[allow(clippy::cast_precision_loss)]
    let zero_crowdedness_percent = if table.is_empty() {
        0.0
    } else {
        zero_crowdedness as f64 * 100.0 / table.len() as f64
    };

    let summary = RunSummary {
        observations: observation_report,
        segments: segment_report,
        join_pairs: join.len(),
        matched_observations: join.matched_observations(),
        unmatched_segments: aggregate_report.unmatched_segments,
        unplaced_observations: aggregate_report.unplaced_observations,
        zero_crowdedness,
        zero_crowdedness_percent,
        crowdedness: stats::summarize(
            table
                .rows
                .iter()
                .filter(|row| row.width.is_some())
                .map(|row| row.crowdedness),
        ),
        clip_bounds: normalization
            .bounds
            .iter()
            .map(|(column, bounds)| (column.to_string(), bounds.map(|b| [b.lower, b.upper])))
            .collect(),
    };
    summary.log();

    Ok((table, summary))
}

/// Runs every stage and writes the table and summary.
///
/// The table goes to `config.output_path`, the summary to
/// [`PipelineConfig::summary_path`].
///
/// # Errors
///
/// Returns any error from [`compute`] or from writing the outputs.
pub fn run(
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Result<RunSummary, PipelineError> {
    let (table, summary) = compute(config, progress)?;

    sidewalk_crowd_generate::write_table(&table, &config.output_path)?;
    sidewalk_crowd_generate::write_json(&summary, &config.summary_path())?;

    Ok(summary)
}
