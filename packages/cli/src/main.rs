#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the sidewalk crowdedness pipeline.
//!
//! Uses `indicatif-log-bridge` (via [`sidewalk_crowd_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the join progress bar never fight for the terminal.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sidewalk_crowd_cli_utils::IndicatifProgress;
use sidewalk_crowd_pipeline::PipelineConfig;

#[derive(Parser)]
#[command(name = "sidewalk_crowd", about = "Sidewalk crowdedness from dashcam detections")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the crowdedness table
    Run {
        /// TOML configuration file
        #[arg(long)]
        config: PathBuf,

        /// Override the cone radius (planar units of the target CRS)
        #[arg(long)]
        max_distance: Option<f64>,

        /// Override the output CSV path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Override the IANA time zone used for hourly bucketing
        #[arg(long)]
        time_zone: Option<String>,
    },
    /// Print the effective configuration as TOML
    DescribeConfig {
        /// TOML configuration file; defaults are shown when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = sidewalk_crowd_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            max_distance,
            output,
            time_zone,
        } => {
            let mut config = load_config(&config)?;
            if let Some(max_distance) = max_distance {
                config.max_distance = max_distance;
            }
            if let Some(output) = output {
                config.output_path = output;
            }
            if let Some(time_zone) = time_zone {
                config.time_zone = time_zone;
            }

            let progress = IndicatifProgress::join_bar(&multi, "Joining observations");
            let summary = sidewalk_crowd_pipeline::run(&config, progress.as_ref())?;

            log::info!(
                "Wrote {} ({} segments, {:.2}% with zero crowdedness)",
                config.output_path.display(),
                summary.segments.loaded,
                summary.zero_crowdedness_percent
            );
        }
        Commands::DescribeConfig { config } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => PipelineConfig::default(),
            };
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    log::info!("Loading configuration from {}", path.display());
    Ok(PipelineConfig::load(path)?)
}
