//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vehicle Tracker - telemetry normalization, filtering and map matching pipeline
#[derive(Parser, Debug)]
#[command(
    name = "vehicle-tracker",
    author,
    version,
    about = "Vehicle telemetry tracking pipeline",
    long_about = "Consumes vehicle location reports, filters and map-matches them against a \n\
                  road network, keeps per-vehicle state and history, and classifies \n\
                  per-road traffic density."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "VEHICLE_TRACKER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "VEHICLE_TRACKER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tracking pipeline
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and road network information
    Info(InfoArgs),

    /// Map-match points against the road network
    Match(MatchArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "VEHICLE_TRACKER_CONFIG"
    )]
    pub config: PathBuf,

    /// Replay recorded messages from a JSON Lines file instead of the mock fleet
    #[arg(long, env = "VEHICLE_TRACKER_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Replay speed multiplier (omit to replay as fast as possible)
    #[arg(long, env = "VEHICLE_TRACKER_REPLAY_SPEED")]
    pub replay_speed: Option<f64>,

    /// Number of simulated vehicles (mock mode)
    #[arg(long, default_value = "5", env = "VEHICLE_TRACKER_MOCK_VEHICLES")]
    pub mock_vehicles: usize,

    /// Reports per simulated vehicle (mock mode, 0 = unlimited)
    #[arg(long, default_value = "0", env = "VEHICLE_TRACKER_MOCK_TICKS")]
    pub mock_ticks: u64,

    /// Simulated report frequency in Hz (mock mode)
    #[arg(long, default_value = "10", env = "VEHICLE_TRACKER_MOCK_FREQUENCY")]
    pub mock_frequency: f64,

    /// Maximum number of reports to dispatch (0 = unlimited)
    #[arg(long, default_value = "0", env = "VEHICLE_TRACKER_MAX_REPORTS")]
    pub max_reports: u64,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "VEHICLE_TRACKER_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size between normalizer and dispatcher
    #[arg(long, default_value = "256", env = "VEHICLE_TRACKER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "VEHICLE_TRACKER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Write the store contents as JSON when the run ends
    #[arg(long, env = "VEHICLE_TRACKER_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Print the recent history of one vehicle when the run ends
    #[arg(long, value_name = "VEHICLE_ID")]
    pub trajectory: Option<String>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml", env = "VEHICLE_TRACKER_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "VEHICLE_TRACKER_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show per-road node breakdown
    #[arg(long)]
    pub roads: bool,
}

/// Arguments for the `match` command
#[derive(Parser, Debug)]
pub struct MatchArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "VEHICLE_TRACKER_CONFIG")]
    pub config: PathBuf,

    /// Point to match as `x,y`, repeatable (`-p -3.5,7` takes a negative x)
    #[arg(
        short,
        long = "point",
        required = true,
        value_name = "X,Y",
        allow_hyphen_values = true
    )]
    pub points: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
