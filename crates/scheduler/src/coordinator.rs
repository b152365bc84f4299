use std::path::Path;

use paceconfig::{BudgetConfig, CompletionMode, PaceConfig};
use tracing::{debug, info, warn};

use crate::budget::BudgetController;
use crate::contract::{BoxError, Consumer, FrameClock, Generator, GpuFlush, WeightSource};
use crate::error::{InitError, SchedulerError};
use crate::step::{AdvanceReport, StepScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Disposed,
}

/// Per-frame summary returned by [`RunCoordinator::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub frame_seconds: f32,
    pub budget: f32,
    pub advance: AdvanceReport,
}

impl FrameReport {
    pub fn completed(&self) -> bool {
        self.advance.completed()
    }
}

/// Composition root owning the generator, its weights, the budget loop and
/// the step scheduler.
///
/// The host calls [`initialize`](Self::initialize) once before use and
/// [`dispose`](Self::dispose) after the last frame; dispose also runs on drop.
pub struct RunCoordinator<G, W, F>
where
    G: Generator,
    W: WeightSource,
    F: GpuFlush,
{
    lifecycle: Lifecycle,
    budget: BudgetController,
    scheduler: StepScheduler,
    weight_source: W,
    flush: F,
    table: Option<W::Table>,
    generator: Option<G>,
    frames: u64,
}

impl<G, W, F> RunCoordinator<G, W, F>
where
    G: Generator,
    W: WeightSource,
    F: GpuFlush,
{
    pub fn new(budget: BudgetConfig, mode: CompletionMode, weight_source: W, flush: F) -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            budget: BudgetController::new(budget),
            scheduler: StepScheduler::new(mode),
            weight_source,
            flush,
            table: None,
            generator: None,
            frames: 0,
        }
    }

    pub fn from_config(config: &PaceConfig, weight_source: W, flush: F) -> Self {
        Self::new(
            config.budget,
            config.generator.on_complete,
            weight_source,
            flush,
        )
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn budget(&self) -> &BudgetController {
        &self.budget
    }

    pub fn scheduler(&self) -> &StepScheduler {
        &self.scheduler
    }

    pub fn generator(&self) -> Option<&G> {
        self.generator.as_ref()
    }

    pub fn weight_source(&self) -> &W {
        &self.weight_source
    }

    pub fn flusher(&self) -> &F {
        &self.flush
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Loads the weight table at `path` and builds the generator from it.
    ///
    /// Anything acquired before a failure is released again and the
    /// coordinator stays unusable. Calling this while ready is a no-op.
    pub fn initialize<B, E>(&mut self, path: &Path, build: B) -> Result<(), InitError>
    where
        B: FnOnce(&W::Table) -> Result<G, E>,
        E: Into<BoxError>,
    {
        if self.lifecycle == Lifecycle::Ready {
            warn!(path = %path.display(), "coordinator already initialised; ignoring");
            return Ok(());
        }

        let table = self
            .weight_source
            .load(path)
            .map_err(|err| InitError::Weights {
                path: path.to_path_buf(),
                source: Box::new(err),
            })?;

        let generator = match build(&table) {
            Ok(generator) => generator,
            Err(err) => {
                self.weight_source.release(table);
                return Err(InitError::Generator(err.into()));
            }
        };

        self.table = Some(table);
        self.generator = Some(generator);
        self.scheduler = StepScheduler::new(self.scheduler.mode());
        self.lifecycle = Lifecycle::Ready;
        info!(weights = %path.display(), "generator initialised");
        Ok(())
    }

    /// Runs one frame: updates the budget from `clock`, spends it on the
    /// generator, and hands `output` to `consumer` if a run completed.
    ///
    /// In `Restart` mode a single tick may finish several runs; the consumer
    /// is still called once, with the output of the last one.
    pub fn tick<C>(
        &mut self,
        clock: &impl FrameClock,
        source: &G::Source,
        output: &mut G::Output,
        consumer: &mut C,
    ) -> Result<FrameReport, SchedulerError>
    where
        C: Consumer<G::Output>,
    {
        if self.lifecycle != Lifecycle::Ready {
            return Err(SchedulerError::NotInitialized);
        }
        let Some(generator) = self.generator.as_mut() else {
            return Err(SchedulerError::NotInitialized);
        };

        let frame_seconds = clock.last_frame_seconds();
        let budget = self.budget.update(frame_seconds)?;
        let advance = self
            .scheduler
            .advance(budget, generator, source, output, &mut self.flush)?;

        if advance.completed() {
            consumer.consume(output);
            debug!(
                frame = self.frames,
                runs = advance.completed_runs,
                total = self.scheduler.completed_runs(),
                "run completed"
            );
        }

        let report = FrameReport {
            frame_index: self.frames,
            frame_seconds,
            budget,
            advance,
        };
        self.frames = self.frames.wrapping_add(1);
        Ok(report)
    }

    /// Drives a fresh run on `source` to completion within this call,
    /// bypassing the frame budget.
    pub fn run_blocking<C>(
        &mut self,
        source: &G::Source,
        output: &mut G::Output,
        consumer: &mut C,
    ) -> Result<AdvanceReport, SchedulerError>
    where
        C: Consumer<G::Output>,
    {
        if self.lifecycle != Lifecycle::Ready {
            return Err(SchedulerError::NotInitialized);
        }
        let Some(generator) = self.generator.as_mut() else {
            return Err(SchedulerError::NotInitialized);
        };

        let report = self
            .scheduler
            .run_blocking(generator, source, output, &mut self.flush)?;
        consumer.consume(output);
        Ok(report)
    }

    /// Human-readable throughput readout for overlays and logs.
    pub fn status_line(&self) -> String {
        format!(
            "refresh rate: {:.1} Hz ({})",
            self.budget.refresh_rate_hz(),
            self.budget.performance()
        )
    }

    /// Releases the generator and weight table. Safe to call repeatedly and
    /// after a failed or skipped initialisation.
    pub fn dispose(&mut self) {
        let was_ready = self.lifecycle == Lifecycle::Ready;
        if let Some(mut generator) = self.generator.take() {
            generator.dispose();
        }
        if let Some(table) = self.table.take() {
            self.weight_source.release(table);
        }
        self.lifecycle = Lifecycle::Disposed;
        if was_ready {
            info!(
                frames = self.frames,
                runs = self.scheduler.completed_runs(),
                "generator disposed"
            );
        }
    }
}

impl<G, W, F> Drop for RunCoordinator<G, W, F>
where
    G: Generator,
    W: WeightSource,
    F: GpuFlush,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingFlush, FixedClock, MockError, MockWeights, ScriptedGenerator};
    use crate::RunState;

    type TestCoordinator = RunCoordinator<ScriptedGenerator, MockWeights, CountingFlush>;

    fn coordinator(mode: CompletionMode) -> TestCoordinator {
        RunCoordinator::new(
            BudgetConfig::default(),
            mode,
            MockWeights::default(),
            CountingFlush::default(),
        )
    }

    fn ready(steps: u32, cost: f32, mode: CompletionMode) -> TestCoordinator {
        let mut coordinator = coordinator(mode);
        coordinator
            .initialize(Path::new("weights.json"), |_table: &String| {
                Ok::<_, MockError>(ScriptedGenerator::new(steps, cost))
            })
            .unwrap();
        coordinator
    }

    #[test]
    fn tick_before_initialize_fails_fast() {
        let mut coordinator = coordinator(CompletionMode::Restart);
        let mut output = Vec::new();
        let err = coordinator
            .tick(&FixedClock(0.016), &1, &mut output, &mut |_: &Vec<u32>| {})
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotInitialized));

        let err = coordinator
            .run_blocking(&1, &mut output, &mut |_: &Vec<u32>| {})
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotInitialized));
        assert_eq!(coordinator.flusher().flushes, 0);
    }

    #[test]
    fn tick_updates_budget_then_advances() {
        let mut coordinator = ready(100, 10.0, CompletionMode::Stop);
        let mut output = Vec::new();
        let report = coordinator
            .tick(&FixedClock(1.0 / 30.0), &4, &mut output, &mut |_: &Vec<u32>| {})
            .unwrap();

        assert_eq!(report.budget, 150.0);
        assert_eq!(report.advance.steps, 15);
        assert_eq!(coordinator.flusher().flushes, 1);
        assert_eq!(coordinator.scheduler().state(), RunState::Running);
        assert_eq!(coordinator.frames(), 1);
    }

    #[test]
    fn consumer_sees_each_completion_once() {
        let mut coordinator = ready(40, 10.0, CompletionMode::Stop);
        let mut output = Vec::new();
        let mut delivered = 0u32;
        let mut completions = 0u32;

        for _ in 0..30 {
            let report = coordinator
                .tick(&FixedClock(1.25 / 60.0), &8, &mut output, &mut |_: &Vec<u32>| {
                    delivered += 1
                })
                .unwrap();
            completions += report.advance.completed_runs;
        }

        assert!(completions > 0);
        assert_eq!(delivered, completions);
        assert_eq!(output.len() as u32, completions);
    }

    #[test]
    fn restart_tick_delivers_once_for_several_runs() {
        let mut coordinator = ready(2, 10.0, CompletionMode::Restart);
        let mut output = Vec::new();
        let mut delivered = Vec::new();

        let report = coordinator
            .tick(&FixedClock(1.0 / 30.0), &5, &mut output, &mut |out: &Vec<u32>| {
                delivered.push(out.len())
            })
            .unwrap();

        assert!(report.advance.completed_runs > 1);
        assert_eq!(output.len() as u32, report.advance.completed_runs);
        assert_eq!(delivered, vec![output.len()]);
    }

    #[test]
    fn blocking_run_bypasses_budget() {
        let mut coordinator = ready(500, 50.0, CompletionMode::Restart);
        let mut output = Vec::new();
        let mut delivered = Vec::new();

        let report = coordinator
            .run_blocking(&11, &mut output, &mut |out: &Vec<u32>| {
                delivered.push(out.len())
            })
            .unwrap();

        assert_eq!(report.steps, 500);
        assert_eq!(output, vec![11]);
        assert_eq!(delivered, vec![1]);
        assert_eq!(coordinator.budget().updates(), 0);
        assert_eq!(coordinator.flusher().flushes, 1);
    }

    #[test]
    fn failed_weight_load_stays_uninitialized() {
        let mut coordinator: TestCoordinator = RunCoordinator::new(
            BudgetConfig::default(),
            CompletionMode::Restart,
            MockWeights {
                fail: true,
                ..MockWeights::default()
            },
            CountingFlush::default(),
        );

        let err = coordinator
            .initialize(Path::new("missing.json"), |_table: &String| {
                Ok::<_, MockError>(ScriptedGenerator::new(1, 1.0))
            })
            .unwrap_err();

        assert!(matches!(err, InitError::Weights { .. }));
        assert_eq!(coordinator.lifecycle(), Lifecycle::Uninitialized);
        coordinator.dispose();
        assert_eq!(coordinator.weight_source().releases, 0);
    }

    #[test]
    fn failed_generator_build_releases_weights() {
        let mut coordinator = coordinator(CompletionMode::Restart);
        let err = coordinator
            .initialize(Path::new("weights.json"), |_table: &String| {
                Err::<ScriptedGenerator, _>(MockError("bad tensor shape"))
            })
            .unwrap_err();

        assert!(matches!(err, InitError::Generator(_)));
        assert_eq!(coordinator.lifecycle(), Lifecycle::Uninitialized);
        assert_eq!(coordinator.weight_source().loads, 1);
        assert_eq!(coordinator.weight_source().releases, 1);
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut coordinator = ready(4, 1.0, CompletionMode::Restart);
        let disposals = coordinator.generator().unwrap().disposals.clone();

        coordinator.dispose();
        coordinator.dispose();

        assert_eq!(coordinator.lifecycle(), Lifecycle::Disposed);
        assert_eq!(disposals.get(), 1);
        assert_eq!(coordinator.weight_source().releases, 1);

        let mut output = Vec::new();
        let err = coordinator
            .tick(&FixedClock(0.016), &1, &mut output, &mut |_: &Vec<u32>| {})
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotInitialized));
    }

    #[test]
    fn dispose_without_initialize_is_harmless() {
        let mut coordinator = coordinator(CompletionMode::Restart);
        coordinator.dispose();
        coordinator.dispose();
        assert_eq!(coordinator.weight_source().releases, 0);
    }

    #[test]
    fn drop_disposes_generator() {
        let coordinator = ready(4, 1.0, CompletionMode::Restart);
        let disposals = coordinator.generator().unwrap().disposals.clone();
        drop(coordinator);
        assert_eq!(disposals.get(), 1);
    }

    #[test]
    fn reinitialize_after_dispose() {
        let mut coordinator = ready(4, 1.0, CompletionMode::Restart);
        coordinator.dispose();
        coordinator
            .initialize(Path::new("weights.json"), |_table: &String| {
                Ok::<_, MockError>(ScriptedGenerator::new(4, 1.0))
            })
            .unwrap();
        assert_eq!(coordinator.lifecycle(), Lifecycle::Ready);
        assert_eq!(coordinator.weight_source().loads, 2);

        coordinator
            .initialize(Path::new("weights.json"), |_table: &String| {
                Ok::<_, MockError>(ScriptedGenerator::new(4, 1.0))
            })
            .unwrap();
        assert_eq!(coordinator.weight_source().loads, 2);
    }

    #[test]
    fn invalid_frame_delta_is_surfaced() {
        let mut coordinator = ready(4, 1.0, CompletionMode::Restart);
        let mut output = Vec::new();
        let err = coordinator
            .tick(&FixedClock(-1.0), &1, &mut output, &mut |_: &Vec<u32>| {})
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidFrameDelta { .. }));
        assert_eq!(coordinator.flusher().flushes, 0);
    }

    #[test]
    fn status_line_reports_calibration() {
        let mut coordinator = ready(4, 1.0, CompletionMode::Restart);
        let mut output = Vec::new();
        coordinator
            .tick(&FixedClock(1.0 / 30.0), &1, &mut output, &mut |_: &Vec<u32>| {})
            .unwrap();
        assert_eq!(
            coordinator.status_line(),
            "refresh rate: 9.0 Hz (Measuring GPU performance...)"
        );
    }
}
