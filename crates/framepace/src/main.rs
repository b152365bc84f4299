mod bake;
mod bootstrap;
mod cli;
mod clock;
mod defaults;
mod paths;
mod report;
mod run;
mod simulate;

use std::path::Path;

use anyhow::Result;
use cli::{Command, DefaultsAction};
use defaults::{describe_paths, init_defaults, InitOptions};
use paths::AppPaths;
use report::SimulationReport;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let config = cli.config.as_deref();
    match cli.command {
        Command::Simulate(args) => run::run_simulate(config, args),
        Command::Bake(args) => run::run_bake(config, args),
        Command::Defaults(defaults_cmd) => handle_defaults_command(config, defaults_cmd.action),
    }
}

fn handle_defaults_command(config: Option<&Path>, action: DefaultsAction) -> Result<()> {
    let paths = AppPaths::discover()?;
    bootstrap::bootstrap_filesystem(&paths)?;

    match action {
        DefaultsAction::Init { force } => run_defaults_init(&paths, force),
        DefaultsAction::Where => run_defaults_where(&paths, config),
    }
}

fn run_defaults_init(paths: &AppPaths, force: bool) -> Result<()> {
    let report = init_defaults(paths, InitOptions { force })?;

    if report.wrote_any() {
        println!("Installed defaults:");
        for path in &report.written {
            println!("  {}", path.display());
        }
    } else {
        println!("All defaults already installed.");
    }
    if !report.skipped.is_empty() {
        println!("Kept existing files (use --force to overwrite):");
        for path in &report.skipped {
            println!("  {}", path.display());
        }
    }
    Ok(())
}

fn run_defaults_where(paths: &AppPaths, config: Option<&Path>) -> Result<()> {
    let overview = describe_paths(paths);
    println!("Configuration directories:");
    println!("  config:     {}", overview.config_dir.display());
    println!("  data:       {}", overview.data_dir.display());
    println!("  cache:      {}", overview.cache_dir.display());
    let active = config.map_or(overview.config_file.clone(), |path| path.to_path_buf());
    let status = if active.exists() { "" } else { " (missing)" };
    println!("  config file: {}{status}", active.display());
    println!("  weights:    {}", overview.weights_dir.display());
    println!("  sample:     {}", overview.sample_image.display());

    if let Some(last) = SimulationReport::load(&overview.last_simulation)? {
        println!("Last simulation:");
        println!("  source:     {}", last.source.display());
        println!(
            "  frames:     {} ({} runs)",
            last.frames, last.completed_runs
        );
        println!("  {}", last.status);
    }
    Ok(())
}
