//! Run configuration.
//!
//! A run is described by a TOML document whose keys all default to the
//! parameters of the reference analysis, so an empty file is a valid
//! configuration apart from the input paths and days.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sidewalk_crowd_aggregate::NormalizeOptions;
use sidewalk_crowd_aggregate::hours::parse_time_zone;
use sidewalk_crowd_spatial::ConeShape;

use crate::PipelineError;

/// Annotated configuration with every default spelled out.
pub const EXAMPLE_CONFIG: &str = include_str!("../pipeline.example.toml");

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Cone radius in planar units of `target_crs`.
    pub max_distance: f64,
    /// Angular width of each cone.
    pub field_of_view_degrees: f64,
    /// Points sampled along each cone's arc.
    pub cone_samples: usize,
    /// IANA zone used for hour-of-day bucketing.
    pub time_zone: String,
    /// Reference both inputs are projected into before the join.
    pub target_crs: String,
    /// Reference the observation positions are recorded in.
    pub observation_crs: String,
    /// Reference the segment geometry is recorded in.
    pub segment_crs: String,
    /// Directory holding one sub-directory per day.
    pub data_dir: PathBuf,
    /// Day sub-directories to load, in order.
    pub days: Vec<String>,
    pub segments_path: PathBuf,
    /// Aggregate table CSV destination.
    pub output_path: PathBuf,
    /// Lower and upper clip quantiles of the overall column.
    pub overall_clip: [f64; 2],
    /// Lower and upper clip quantiles of each hourly column.
    pub hourly_clip: [f64; 2],
    /// Hourly columns are clipped only above this positive fraction.
    pub hourly_min_positive_fraction: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_distance: 150.0,
            field_of_view_degrees: 180.0,
            cone_samples: 10,
            time_zone: "America/New_York".to_string(),
            target_crs: "EPSG:2263".to_string(),
            observation_crs: "EPSG:4326".to_string(),
            segment_crs: "EPSG:2263".to_string(),
            data_dir: PathBuf::from("data"),
            days: Vec::new(),
            segments_path: PathBuf::from("data/segments.csv"),
            output_path: PathBuf::from("output/crowdedness.csv"),
            overall_clip: [0.01, 0.99],
            hourly_clip: [0.001, 0.999],
            hourly_min_positive_fraction: 0.01,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Toml`] if the text is not valid TOML or has
    /// unknown or mistyped keys.
    pub fn from_toml(text: &str) -> Result<Self, PipelineError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&text)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Where the run summary JSON is written: next to the table, as
    /// `<stem>.summary.json`.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.output_path.with_extension("summary.json")
    }

    /// Validated cone parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cone`] for a non-positive distance, a field
    /// of view outside `(0, 360)` or too few samples.
    pub fn cone_shape(&self) -> Result<ConeShape, PipelineError> {
        Ok(ConeShape::new(
            self.max_distance,
            self.field_of_view_degrees,
            self.cone_samples,
        )?)
    }

    /// Parsed time zone.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the zone name is unknown.
    pub fn time_zone(&self) -> Result<Tz, PipelineError> {
        parse_time_zone(&self.time_zone)
            .map_err(|e| PipelineError::Config(format!("time_zone: {e}")))
    }

    /// Clip options for the normalizer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a quantile pair is out of
    /// `[0, 1]` or descending, or the positive fraction is outside `[0, 1)`.
    pub fn normalize_options(&self) -> Result<NormalizeOptions, PipelineError> {
        let overall = quantile_pair("overall_clip", self.overall_clip)?;
        let hourly = quantile_pair("hourly_clip", self.hourly_clip)?;

        if !(0.0..1.0).contains(&self.hourly_min_positive_fraction) {
            return Err(PipelineError::Config(format!(
                "hourly_min_positive_fraction must be within [0, 1), got {}",
                self.hourly_min_positive_fraction
            )));
        }

        Ok(NormalizeOptions {
            overall_quantiles: overall,
            hourly_quantiles: hourly,
            hourly_min_positive_fraction: self.hourly_min_positive_fraction,
        })
    }

    /// Checks every parameter without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns the first invalid parameter found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.cone_shape()?;
        self.time_zone()?;
        self.normalize_options()?;
        if self.days.is_empty() {
            return Err(PipelineError::Config("days must list at least one day".to_string()));
        }
        Ok(())
    }
}

fn quantile_pair(name: &str, [lower, upper]: [f64; 2]) -> Result<(f64, f64), PipelineError> {
    let in_range = |q: f64| (0.0..=1.0).contains(&q);
    if !in_range(lower) || !in_range(upper) || lower > upper {
        return Err(PipelineError::Config(format!(
            "{name} must be two ascending quantiles within [0, 1], got [{lower}, {upper}]"
        )));
    }
    Ok((lower, upper))
}
