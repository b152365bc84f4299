use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use convnet::{CommandQueue, ConvGenerator, JsonWeights, Texture};
use paceconfig::PaceConfig;
use scheduler::{CompletionMode, RunCoordinator};
use tracing::{debug, info};

use crate::clock::{FrameModel, HostClock, SimulatedClock, WallClock};
use crate::report::SimulationReport;

/// Settings for one `simulate` session after CLI overrides were applied.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub frames: u32,
    pub seed: u64,
    pub model: FrameModel,
    pub mode: CompletionMode,
    pub realtime: bool,
    pub status_every: u32,
}

impl SimulateOptions {
    pub fn from_config(config: &PaceConfig, source: PathBuf) -> Self {
        Self {
            source,
            output: None,
            frames: config.simulation.frames,
            seed: config.simulation.seed,
            model: FrameModel::from_config(&config.simulation),
            mode: config.generator.on_complete,
            realtime: false,
            status_every: 60,
        }
    }
}

/// Running totals over every frame of a session.
#[derive(Debug)]
struct FrameStats {
    frames: u64,
    min_budget: f32,
    max_budget: f32,
    total_frame_secs: f64,
    max_frame_secs: f64,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            frames: 0,
            min_budget: f32::INFINITY,
            max_budget: f32::NEG_INFINITY,
            total_frame_secs: 0.0,
            max_frame_secs: 0.0,
        }
    }

    fn record(&mut self, budget: f32, frame_secs: f32) {
        self.frames += 1;
        self.min_budget = self.min_budget.min(budget);
        self.max_budget = self.max_budget.max(budget);
        self.total_frame_secs += f64::from(frame_secs);
        self.max_frame_secs = self.max_frame_secs.max(f64::from(frame_secs));
    }

    fn mean_frame_ms(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_frame_secs * 1000.0 / self.frames as f64
        }
    }
}

/// Runs the amortised frame loop for `options.frames` frames and saves the
/// last completed output, if any run finished.
pub fn run_simulation(config: &PaceConfig, options: &SimulateOptions) -> Result<SimulationReport> {
    if options.frames == 0 {
        bail!("simulation needs at least one frame");
    }

    let generator_config = &config.generator;
    let source = Texture::open(
        &options.source,
        Some((generator_config.width, generator_config.height)),
    )
    .context("failed to load simulation source")?;

    let queue = CommandQueue::new();
    let mut coordinator = RunCoordinator::new(
        config.budget,
        options.mode,
        JsonWeights::new(),
        queue.clone(),
    );
    let generator_queue = queue.clone();
    let rows_per_step = generator_config.rows_per_step;
    coordinator
        .initialize(&generator_config.weights, move |table| {
            ConvGenerator::from_table(table, rows_per_step, generator_queue)
        })
        .context("failed to initialise generator")?;

    if let Some(generator) = coordinator.generator() {
        let run_cost = generator.net().run_cost(source.width(), source.height());
        info!(
            source = %options.source.display(),
            layers = generator.net().depth(),
            run_cost,
            unamortised_frame_ms = single_frame_cost(run_cost, &options.model).as_secs_f64() * 1000.0,
            frames = options.frames,
            mode = ?options.mode,
            realtime = options.realtime,
            "starting simulation"
        );
    }

    let mut clock = if options.realtime {
        HostClock::Wall {
            clock: WallClock::new(options.model.host_frame),
            host_frame: options.model.host_frame,
        }
    } else {
        HostClock::Simulated(SimulatedClock::new(options.model, options.seed))
    };

    let mut output = Texture::new(source.width(), source.height());
    let mut completions = 0u64;
    let mut on_complete = |texture: &Texture| {
        completions += 1;
        debug!(
            run = completions,
            mean = mean_intensity(texture),
            "run output ready"
        );
    };

    let mut stats = FrameStats::new();
    for _ in 0..options.frames {
        let report = coordinator
            .tick(&clock, &source, &mut output, &mut on_complete)
            .context("frame failed")?;
        stats.record(report.budget, report.frame_seconds);
        clock.end_frame(report.advance.cost);

        if options.status_every > 0 && report.frame_index % u64::from(options.status_every) == 0 {
            info!(
                frame = report.frame_index,
                budget = report.budget,
                cost = report.advance.cost,
                frame_ms = f64::from(report.frame_seconds) * 1000.0,
                "{}",
                coordinator.status_line()
            );
        }
    }

    let completed_runs = coordinator.scheduler().completed_runs();
    let saved = match completed_runs {
        0 => None,
        _ => match options.output.as_deref() {
            Some(path) => {
                output
                    .save(path)
                    .with_context(|| format!("failed to save output to {}", path.display()))?;
                info!(path = %path.display(), "saved last completed output");
                Some(path.to_path_buf())
            }
            None => None,
        },
    };

    let queue_stats = queue.stats();
    let report = SimulationReport {
        source: options.source.clone(),
        output: saved,
        frames: stats.frames,
        completed_runs,
        final_budget: coordinator.budget().budget(),
        min_budget: stats.min_budget,
        max_budget: stats.max_budget,
        mean_frame_ms: stats.mean_frame_ms(),
        max_frame_ms: stats.max_frame_secs * 1000.0,
        submissions: queue_stats.submissions,
        commands: queue_stats.commands,
        status: coordinator.status_line(),
    };
    coordinator.dispose();
    Ok(report)
}

fn mean_intensity(texture: &Texture) -> f32 {
    let data = texture.data();
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f32>() / data.len() as f32
}

/// Time the simulated host would need to finish one full run in a single frame.
pub fn single_frame_cost(run_cost: f32, model: &FrameModel) -> Duration {
    model.host_frame + model.unit_cost.mul_f64(f64::from(run_cost.max(0.0)))
}
