use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scheduler::CompletionMode;

#[derive(Parser, Debug)]
#[command(
    name = "framepace",
    author,
    version,
    about = "Runs an interruptible image generator under an adaptive frame budget"
)]
pub struct Cli {
    /// Configuration file; defaults to `config.toml` in the config directory.
    #[arg(long, global = true, value_name = "PATH", env = "FRAMEPACE_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive the generator one frame at a time against a frame clock.
    Simulate(SimulateArgs),
    /// Run every configured bake view to completion and save the results.
    Bake(BakeArgs),
    /// Manage the starter configuration and weights.
    Defaults(DefaultsCommand),
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Image fed to the generator on every run.
    #[arg(value_name = "IMAGE")]
    pub source: PathBuf,

    /// Where to write the last completed output (defaults to the cache directory).
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Number of frames to simulate.
    #[arg(long, value_name = "N")]
    pub frames: Option<u32>,

    /// Seed for frame-time jitter.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Host time spent per frame outside the generator (e.g. `12ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub host_frame: Option<Duration>,

    /// Simulated time per unit of generator cost (e.g. `10us`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub unit_cost: Option<Duration>,

    /// Uniform jitter applied to every simulated frame (e.g. `1ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub jitter: Option<Duration>,

    /// What to do when a run finishes mid-frame: `restart` or `stop`.
    #[arg(long, value_name = "MODE", value_parser = parse_completion_mode)]
    pub on_complete: Option<CompletionMode>,

    /// Measure real elapsed time instead of simulating it.
    #[arg(long)]
    pub realtime: bool,

    /// Log the throughput readout every N frames (0 disables).
    #[arg(long, value_name = "N", default_value_t = 60)]
    pub status_every: u32,
}

#[derive(Parser, Debug)]
pub struct BakeArgs {
    /// Only bake the named views (repeatable).
    #[arg(long = "view", value_name = "NAME")]
    pub views: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct DefaultsCommand {
    #[command(subcommand)]
    pub action: DefaultsAction,
}

#[derive(Subcommand, Debug)]
pub enum DefaultsAction {
    /// Write the starter config, identity weights, and a sample image.
    Init {
        /// Overwrite files that already exist.
        #[arg(long)]
        force: bool,
    },
    /// Print resolved directories and the active configuration file.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

pub fn parse_completion_mode(value: &str) -> Result<CompletionMode, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "restart" | "continue" => Ok(CompletionMode::Restart),
        "stop" | "yield" => Ok(CompletionMode::Stop),
        other => Err(format!(
            "unknown completion mode '{other}'; expected restart or stop"
        )),
    }
}
