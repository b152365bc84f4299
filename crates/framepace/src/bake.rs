use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use convnet::{CommandQueue, ConvGenerator, JsonWeights, Texture};
use paceconfig::{BakeView, PaceConfig};
use scheduler::RunCoordinator;
use tracing::info;

#[derive(Debug, Clone)]
pub struct BakedView {
    pub name: String,
    pub output: PathBuf,
    pub elapsed: Duration,
    pub cost: f32,
}

/// Picks the configured views named in `filter`, or all of them.
fn select_views<'a>(config: &'a PaceConfig, filter: &[String]) -> Result<Vec<&'a BakeView>> {
    if config.bake.views.is_empty() {
        bail!("no bake views configured; add [[bake.views]] entries to the configuration");
    }
    if filter.is_empty() {
        return Ok(config.bake.views.iter().collect());
    }
    filter
        .iter()
        .map(|name| {
            config
                .view(name)
                .with_context(|| format!("unknown bake view '{name}'"))
        })
        .collect()
}

/// Runs each selected view to completion within one call, reusing a single
/// generator, and writes every result to its configured output.
pub fn bake_views(config: &PaceConfig, filter: &[String]) -> Result<Vec<BakedView>> {
    let views = select_views(config, filter)?;
    let generator_config = &config.generator;

    let queue = CommandQueue::new();
    let mut coordinator = RunCoordinator::from_config(config, JsonWeights::new(), queue.clone());
    let generator_queue = queue.clone();
    let rows_per_step = generator_config.rows_per_step;
    coordinator
        .initialize(&generator_config.weights, move |table| {
            ConvGenerator::from_table(table, rows_per_step, generator_queue)
        })
        .context("failed to initialise generator")?;

    let size = Some((generator_config.width, generator_config.height));
    let mut output = Texture::new(generator_config.width, generator_config.height);
    let mut baked = Vec::with_capacity(views.len());
    for view in views {
        let source = Texture::open(&view.source, size)
            .with_context(|| format!("failed to load source for view '{}'", view.name))?;

        let started = Instant::now();
        let report = coordinator
            .run_blocking(&source, &mut output, &mut |_: &Texture| {})
            .with_context(|| format!("failed to bake view '{}'", view.name))?;
        let elapsed = started.elapsed();

        output
            .save(&view.output)
            .with_context(|| format!("failed to save view '{}'", view.name))?;
        info!(
            view = %view.name,
            ms = elapsed.as_secs_f64() * 1000.0,
            steps = report.steps,
            cost = report.cost,
            output = %view.output.display(),
            "baked view"
        );
        baked.push(BakedView {
            name: view.name.clone(),
            output: view.output.clone(),
            elapsed,
            cost: report.cost,
        });
    }

    info!(
        views = baked.len(),
        submissions = queue.stats().submissions,
        "bake finished"
    );
    coordinator.dispose();
    Ok(baked)
}
