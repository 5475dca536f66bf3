//! Clap derive structures for the `narwal` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use narwal_core::{FanSpeed, MopHumidity};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// narwal -- talk to a Narwal robot vacuum over the local network
#[derive(Debug, Parser)]
#[command(
    name = "narwal",
    version,
    about = "Control Narwal robot vacuums on the local network",
    long_about = "Talks to the robot's local WebSocket endpoint directly, no cloud account.\n\n\
        The robot sleeps between jobs; every command wakes it first and waits\n\
        (see --wait) for it to answer.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Robot profile to use
    #[arg(long, short = 'p', env = "NARWAL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Robot address (overrides profile)
    #[arg(long, short = 'H', env = "NARWAL_HOST", global = true)]
    pub host: Option<String>,

    /// WebSocket port (overrides profile)
    #[arg(long, env = "NARWAL_PORT", global = true)]
    pub port: Option<u16>,

    /// Device id used in topics (overrides profile)
    #[arg(long, env = "NARWAL_DEVICE_ID", global = true)]
    pub device_id: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(long, env = "NARWAL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for the robot to wake up
    #[arg(long, short = 'w', env = "NARWAL_WAIT", default_value = "30", global = true)]
    pub wait: u64,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NARWAL_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable detail view (default)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show battery, activity and settings
    #[command(alias = "st")]
    Status,

    /// Stream status and map updates until interrupted
    Watch(WatchArgs),

    /// Start a full clean
    Start,

    /// Start a quick clean with default settings
    EasyClean,

    /// Stop the current task
    Stop,

    /// Pause the current task
    Pause,

    /// Resume a paused task
    Resume,

    /// Send the robot back to its dock
    #[command(alias = "home")]
    Dock,

    /// Make the robot announce its position
    Locate,

    /// Set suction power
    Fan {
        #[arg(value_enum)]
        level: FanLevel,
    },

    /// Set mop water flow
    Mop {
        #[arg(value_enum)]
        level: MopLevel,
    },

    /// Run a dock maintenance action
    Station(StationArgs),

    /// Fetch the floor map and save it as PNG
    Map(MapArgs),

    /// Manage profiles and the config file
    #[command(alias = "cfg")]
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    /// Where to write the PNG
    #[arg(long, short = 'f', default_value = "map.png")]
    pub file: PathBuf,

    /// Seconds to wait for the map after requesting it
    #[arg(long, default_value = "20")]
    pub timeout: u64,
}

#[derive(Debug, Args)]
pub struct StationArgs {
    #[command(subcommand)]
    pub action: StationAction,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum StationAction {
    /// Wash the mop pads
    Wash,
    /// Dry the mop pads
    Dry,
    /// Empty the dustbin into the dock
    Empty,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Print the effective configuration
    Show,

    /// Add or replace a robot profile (takes --port and --device-id too)
    Add {
        /// Profile name
        name: String,
        /// Robot address
        host: String,
        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Remove a robot profile
    Remove { name: String },

    /// Set the default profile
    Use { name: String },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Level enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FanLevel {
    Quiet,
    Normal,
    Strong,
    Max,
}

impl From<FanLevel> for FanSpeed {
    fn from(level: FanLevel) -> Self {
        match level {
            FanLevel::Quiet => Self::Quiet,
            FanLevel::Normal => Self::Normal,
            FanLevel::Strong => Self::Strong,
            FanLevel::Max => Self::Max,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MopLevel {
    Dry,
    Normal,
    Wet,
}

impl From<MopLevel> for MopHumidity {
    fn from(level: MopLevel) -> Self {
        match level {
            MopLevel::Dry => Self::Dry,
            MopLevel::Normal => Self::Normal,
            MopLevel::Wet => Self::Wet,
        }
    }
}
