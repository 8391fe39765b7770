use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let d = humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m): {e}"))?;
    if d.is_zero() {
        return Err(format!("duration '{s}' must be positive"));
    }
    Ok(d)
}

fn parse_positive(input: &str) -> Result<u64, String> {
    match input.trim().parse::<u64>() {
        Ok(0) => Err("must be a positive integer".to_string()),
        Ok(v) => Ok(v),
        Err(e) => Err(format!("invalid number '{input}': {e}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    #[value(alias = "human")]
    HumanReadable,
    /// One JSON summary object on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    version,
    about = "HTTP load generator for the reservation API",
    long_about = "surge drives a fixed pool of virtual users against an HTTP endpoint.\n\nEach iteration POSTs a reservation, evaluates checks on the response and records metrics. Thresholds over those metrics decide whether the run passes.",
    after_help = "Examples:\n  surge init\n  surge run workload.yaml\n  surge run workload.yaml --vus 50 --duration 30s\n  surge run workload.yaml --iterations 5 --base-url http://localhost:8080 --output json\n\nLogging: SURGE_LOG (or RUST_LOG) sets the tracing filter, e.g. SURGE_LOG=surge_core=debug."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a workload file
    #[command(
        long_about = "Run a workload file.\n\nCLI flags override values from the workload file. The exit code is 0 when every threshold holds and 11 when at least one fails."
    )]
    Run(RunArgs),

    /// Parse and validate a workload file without sending any request
    Validate(ValidateArgs),

    /// Write a starter workload file
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Target directory (created if missing)
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite an existing workload file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the workload file (.yaml)
    pub workload: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Args)]
pub struct OverrideArgs {
    /// Per-VU iteration cap (otherwise `iterations` from the file, or 1 without a duration)
    #[arg(long, value_parser = parse_positive)]
    pub iterations: Option<u64>,

    /// Number of virtual users
    #[arg(long, value_parser = parse_positive)]
    pub vus: Option<u64>,

    /// Run duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Target base URL, e.g. http://localhost:8080
    #[arg(long, env = "SURGE_BASE_URL")]
    pub base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the workload file (.yaml)
    pub workload: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Debug-level logging (ignored when SURGE_LOG or RUST_LOG is set)
    #[arg(short, long)]
    pub verbose: bool,
}

impl OverrideArgs {
    pub fn run_config(&self) -> surge_core::RunConfig {
        surge_core::RunConfig {
            vus: self.vus,
            duration: self.duration,
            iterations: self.iterations,
            base_url: self.base_url.clone(),
        }
    }
}
