//! CLI argument definitions
//!
//! All Clap derive structs for `smartcross` command-line parsing. Flags that
//! mirror a configuration field override the value loaded from the file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::schema::TieBreak;
use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Adaptive traffic-signal phase scheduler and intersection simulator.
#[derive(Parser, Debug)]
#[command(name = "smartcross", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "SMARTCROSS_COLOR")]
    pub color: ColorChoice,

    /// Log line format on stderr.
    #[arg(
        long,
        default_value = "human",
        global = true,
        env = "SMARTCROSS_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the decision and traffic-score endpoints over HTTP.
    Serve(ServeArgs),

    /// Run the intersection simulation.
    Simulate(SimulateArgs),

    /// Compute one decision from a JSON snapshot.
    Decide(DecideArgs),

    /// List or show built-in scenarios.
    Scenarios(ScenariosCommand),

    /// Validate configuration files.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Shared Argument Groups
// ============================================================================

/// Flags for the decision source and heuristic.
#[derive(Args, Debug, Clone, Default)]
pub struct DecisionArgs {
    /// Remote decision service (`POST` JSON); local heuristic when absent.
    #[arg(long, env = "SMARTCROSS_DECISION_URL")]
    pub decision_url: Option<String>,

    /// Bound on each remote decision call (e.g. `2s`, `500ms`).
    #[arg(long, value_parser = humantime::parse_duration, env = "SMARTCROSS_DECISION_TIMEOUT")]
    pub decision_timeout: Option<Duration>,

    /// Policy for equal fairness scores.
    #[arg(long, env = "SMARTCROSS_TIE_BREAK")]
    pub tie_break: Option<TieBreak>,
}

// ============================================================================
// Serve
// ============================================================================

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "SMARTCROSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind on `[host:]port`.
    #[arg(long, env = "SMARTCROSS_BIND")]
    pub bind: Option<String>,

    /// Also run a real-time simulation and expose it under `/api/simulation`.
    #[arg(long)]
    pub simulate: bool,

    /// Starting scenario for the in-process simulation.
    #[arg(long, requires = "simulate", env = "SMARTCROSS_SCENARIO")]
    pub scenario: Option<String>,

    /// RNG seed for arrivals and mock scores.
    #[arg(long, env = "SMARTCROSS_SEED")]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub decision: DecisionArgs,

    /// Write simulation events as JSONL to this file.
    #[arg(long, requires = "simulate", env = "SMARTCROSS_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on `127.0.0.1:<port>`.
    #[arg(long, env = "SMARTCROSS_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

// ============================================================================
// Simulate
// ============================================================================

/// Arguments for `simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "SMARTCROSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scenario id (built-in or from the configuration).
    #[arg(short, long, env = "SMARTCROSS_SCENARIO")]
    pub scenario: Option<String>,

    /// Stop after this long (e.g. `10m`); runs until interrupted when absent.
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Run ticks back to back instead of in real time; `--duration` is then
    /// simulated time.
    #[arg(long, requires = "duration")]
    pub accelerated: bool,

    /// Tick period (e.g. `100ms`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub tick: Option<Duration>,

    /// RNG seed for arrivals and mock scores.
    #[arg(long, env = "SMARTCROSS_SEED")]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub decision: DecisionArgs,

    /// Remote `/api/traffic` endpoint for congestion scores.
    #[arg(long, env = "SMARTCROSS_TRAFFIC_URL")]
    pub traffic_url: Option<String>,

    /// Where to write JSONL events; `-` for stdout.
    #[arg(long, env = "SMARTCROSS_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Format of the summary printed when the run stops.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Serve Prometheus metrics on `127.0.0.1:<port>`.
    #[arg(long, env = "SMARTCROSS_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

// ============================================================================
// Decide
// ============================================================================

/// Arguments for `decide`.
#[derive(Args, Debug)]
pub struct DecideArgs {
    /// JSON request file; reads stdin when absent or `-`.
    pub input: Option<PathBuf>,

    /// Path to YAML configuration file (for `timing` and `tie_break`).
    #[arg(short, long, env = "SMARTCROSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Policy for equal fairness scores.
    #[arg(long)]
    pub tie_break: Option<TieBreak>,

    /// Pretty-print the result.
    #[arg(long)]
    pub pretty: bool,
}

// ============================================================================
// Scenarios
// ============================================================================

/// Scenario library commands.
#[derive(Args, Debug)]
pub struct ScenariosCommand {
    #[command(subcommand)]
    pub subcommand: ScenariosSubcommand,
}

/// Scenario subcommands.
#[derive(Subcommand, Debug)]
pub enum ScenariosSubcommand {
    /// List available scenarios.
    List(ScenariosListArgs),

    /// Print the YAML of a built-in scenario.
    Show(ScenariosShowArgs),
}

/// Arguments for `scenarios list`.
#[derive(Args, Debug)]
pub struct ScenariosListArgs {
    /// Filter by tag.
    #[arg(long)]
    pub tag: Option<String>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `scenarios show`.
#[derive(Args, Debug)]
pub struct ScenariosShowArgs {
    /// Scenario name.
    pub name: String,
}

// ============================================================================
// Validate / Version
// ============================================================================

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
