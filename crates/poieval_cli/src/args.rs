//! Command-line definition for `poieval`.

use clap::{Args, Parser, Subcommand};
use poieval_core::eval::attributes::DEFAULT_MAX_MATCH_DISTANCE;
use poieval_core::{DistanceThresholds, ProviderRef, DEFAULT_SOURCES_FILE};
use std::path::PathBuf;

pub const DEFAULT_DB_FILE: &str = "poieval.db";

/// Compare points-of-interest datasets stored in a CARTO account.
///
/// `nearest` and `compare` read CARTO_USERNAME, CARTO_API_KEY and
/// CARTO_BASE_URL from the environment.
#[derive(Parser, Debug)]
#[command(name = "poieval", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct GlobalOptions {
    /// Provider configuration file
    #[arg(long, global = true, env = "POIEVAL_SOURCES", default_value = DEFAULT_SOURCES_FILE)]
    pub sources: PathBuf,

    /// Log level for file logging
    #[arg(
        long,
        global = true,
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files; file logging is off without it
    #[arg(long, global = true, env = "POIEVAL_LOG_DIR")]
    pub log_dir: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Nearest `to` match of every `from` POI, with distance summary
    Nearest {
        /// Source dataset as provider:region
        #[arg(long, value_parser = parse_provider)]
        from: ProviderRef,

        /// Target dataset as provider:region
        #[arg(long, value_parser = parse_provider)]
        to: ProviderRef,

        /// Store the nearest-match table under this snapshot name
        #[arg(long)]
        save: Option<String>,

        /// Snapshot database
        #[arg(long, env = "POIEVAL_DB", default_value = DEFAULT_DB_FILE)]
        db: PathBuf,
    },

    /// Nearest match plus per-row name/address/category lookups
    Compare {
        #[arg(long, value_parser = parse_provider)]
        from: ProviderRef,

        #[arg(long, value_parser = parse_provider)]
        to: ProviderRef,

        /// Pairs farther apart than this are not looked up
        #[arg(long, default_value_t = DEFAULT_MAX_MATCH_DISTANCE, value_parser = parse_meters)]
        max_distance: f64,
    },

    /// Distance summary of a stored snapshot
    Eval {
        snapshot: String,

        #[arg(long, env = "POIEVAL_DB", default_value = DEFAULT_DB_FILE)]
        db: PathBuf,

        #[arg(long, default_value_t = DistanceThresholds::default().far_meters, value_parser = parse_meters)]
        far: f64,

        #[arg(long, default_value_t = DistanceThresholds::default().close_meters, value_parser = parse_meters)]
        close: f64,
    },

    /// List stored snapshots, newest first
    Snapshots {
        #[arg(long, env = "POIEVAL_DB", default_value = DEFAULT_DB_FILE)]
        db: PathBuf,
    },

    /// List configured providers and regions
    Providers,

    /// Print version
    Version,
}

impl Command {
    /// Thresholds requested by `eval`; defaults for every other command.
    pub fn thresholds(&self) -> DistanceThresholds {
        match self {
            Self::Eval { far, close, .. } => DistanceThresholds {
                far_meters: *far,
                close_meters: *close,
            },
            _ => DistanceThresholds::default(),
        }
    }
}

fn parse_provider(value: &str) -> Result<ProviderRef, String> {
    value.parse::<ProviderRef>().map_err(|err| err.to_string())
}

fn parse_meters(value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|meters| meters.is_finite() && *meters >= 0.0)
        .ok_or_else(|| format!("expected a non-negative number of meters, got `{value}`"))
}
