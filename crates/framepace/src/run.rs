use std::path::Path;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::bake::bake_views;
use crate::bootstrap::{bootstrap_filesystem, load_config};
use crate::cli::{BakeArgs, SimulateArgs};
use crate::paths::AppPaths;
use crate::simulate::{run_simulation, SimulateOptions};

pub fn run_simulate(config_path: Option<&Path>, args: SimulateArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    bootstrap_filesystem(&paths)?;
    let loaded = load_config(&paths, config_path)?;
    tracing::debug!(
        config = ?loaded.origin,
        weights = %loaded.config.generator.weights.display(),
        "resolved simulation inputs"
    );

    let options = simulate_options(&loaded.config, &paths, args);
    let report = run_simulation(&loaded.config, &options)?;
    report.persist(&paths.last_simulation_file())?;

    println!("Simulated {} frames", report.frames);
    println!("  completed runs: {}", report.completed_runs);
    if let Some(frames_per_run) = report.frames_per_run() {
        println!("  frames per run: {frames_per_run:.2}");
    }
    println!(
        "  budget:         {:.1} (min {:.1}, max {:.1})",
        report.final_budget, report.min_budget, report.max_budget
    );
    println!(
        "  frame time:     {:.2} ms mean, {:.2} ms max",
        report.mean_frame_ms, report.max_frame_ms
    );
    println!(
        "  submissions:    {} ({} commands)",
        report.submissions, report.commands
    );
    println!("  {}", report.status);
    if let Some(output) = &report.output {
        println!("  output:         {}", output.display());
    }
    Ok(())
}

fn simulate_options(
    config: &paceconfig::PaceConfig,
    paths: &AppPaths,
    args: SimulateArgs,
) -> SimulateOptions {
    let mut options = SimulateOptions::from_config(config, args.source);
    options.output = Some(args.output.unwrap_or_else(|| paths.default_output()));
    if let Some(frames) = args.frames {
        options.frames = frames;
    }
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    if let Some(host_frame) = args.host_frame {
        options.model.host_frame = host_frame;
    }
    if let Some(unit_cost) = args.unit_cost {
        options.model.unit_cost = unit_cost;
    }
    if let Some(jitter) = args.jitter {
        options.model.jitter = jitter;
    }
    if let Some(mode) = args.on_complete {
        options.mode = mode;
    }
    options.realtime = args.realtime;
    options.status_every = args.status_every;
    options
}

pub fn run_bake(config_path: Option<&Path>, args: BakeArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    bootstrap_filesystem(&paths)?;
    let loaded = load_config(&paths, config_path)?;

    let baked = bake_views(&loaded.config, &args.views)?;
    println!("Baked {} view(s):", baked.len());
    for view in baked {
        println!(
            "  {:<12} {:>9.2} ms  {:>10.1} units  {}",
            view.name,
            view.elapsed.as_secs_f64() * 1000.0,
            view.cost,
            view.output.display()
        );
    }
    Ok(())
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
