use paceconfig::CompletionMode;
use tracing::{debug, trace};

use crate::contract::{Generator, GpuFlush};
use crate::error::SchedulerError;

/// Scheduler-side view of the current run. The generator remains the source
/// of truth for whether work is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
}

/// Outcome of one scheduling call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdvanceReport {
    /// Cost accumulated across every step taken.
    pub cost: f32,
    pub steps: u32,
    /// Runs that finished and were extracted during this call.
    pub completed_runs: u32,
}

impl AdvanceReport {
    /// True when the output sink received a fresh result during the call.
    pub fn completed(&self) -> bool {
        self.completed_runs > 0
    }
}

/// Drives a [`Generator`] in bounded slices.
///
/// A call never stops mid-step, so the accumulated cost may exceed the budget
/// by at most the cost of the final step. Every successful call ends with
/// exactly one flush.
#[derive(Debug, Clone)]
pub struct StepScheduler {
    state: RunState,
    mode: CompletionMode,
    completed_runs: u64,
}

impl StepScheduler {
    pub fn new(mode: CompletionMode) -> Self {
        Self {
            state: RunState::Idle,
            mode,
            completed_runs: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    /// Runs completed over the scheduler's lifetime.
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs
    }

    /// Forgets the last run's outcome. A run in flight cannot be abandoned,
    /// so this only moves `Done` back to `Idle`.
    pub fn reset(&mut self) {
        if self.state == RunState::Done {
            self.state = RunState::Idle;
        }
    }

    /// Amortised mode: spends up to `budget` cost units on the generator,
    /// starting a run on `source` whenever none is in flight.
    pub fn advance<G>(
        &mut self,
        budget: f32,
        generator: &mut G,
        source: &G::Source,
        output: &mut G::Output,
        flush: &mut dyn GpuFlush,
    ) -> Result<AdvanceReport, SchedulerError>
    where
        G: Generator,
    {
        let mut report = AdvanceReport::default();
        let mut run_cost_start = 0.0;

        if generator.is_running() {
            self.state = RunState::Running;
        }

        while report.cost < budget {
            if !generator.is_running() {
                generator.start(source).map_err(SchedulerError::generator)?;
                self.state = RunState::Running;
                run_cost_start = report.cost;
                trace!("generator run started");
            }

            let cost = checked_cost(generator.step())?;
            report.cost += cost;
            report.steps += 1;

            if !generator.is_running() {
                generator
                    .get_result(output)
                    .map_err(SchedulerError::generator)?;
                self.finish_run();
                report.completed_runs += 1;

                let idle_run = report.cost <= run_cost_start;
                if self.mode == CompletionMode::Stop || idle_run {
                    break;
                }
            }
        }

        flush.flush().map_err(SchedulerError::Flush)?;

        trace!(
            budget,
            cost = report.cost,
            steps = report.steps,
            completed = report.completed_runs,
            "advance finished"
        );
        Ok(report)
    }

    /// Synchronous mode: ignores any budget and drives a fresh run on
    /// `source` to completion before returning.
    ///
    /// Refuses to run while an amortised run is in flight, since that run
    /// cannot be cancelled.
    pub fn run_blocking<G>(
        &mut self,
        generator: &mut G,
        source: &G::Source,
        output: &mut G::Output,
        flush: &mut dyn GpuFlush,
    ) -> Result<AdvanceReport, SchedulerError>
    where
        G: Generator,
    {
        if generator.is_running() {
            return Err(SchedulerError::RunInFlight);
        }

        generator.start(source).map_err(SchedulerError::generator)?;
        self.state = RunState::Running;

        let mut report = AdvanceReport::default();
        loop {
            let cost = checked_cost(generator.step())?;
            report.cost += cost;
            report.steps += 1;
            if !generator.is_running() {
                break;
            }
        }

        generator
            .get_result(output)
            .map_err(SchedulerError::generator)?;
        self.finish_run();
        report.completed_runs = 1;

        flush.flush().map_err(SchedulerError::Flush)?;

        debug!(
            cost = report.cost,
            steps = report.steps,
            "blocking run finished"
        );
        Ok(report)
    }

    fn finish_run(&mut self) {
        self.state = RunState::Done;
        self.completed_runs = self.completed_runs.saturating_add(1);
    }
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new(CompletionMode::default())
    }
}

fn checked_cost(cost: f32) -> Result<f32, SchedulerError> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(cost)
    } else {
        Err(SchedulerError::InvalidStepCost { cost })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingFlush, ScriptedGenerator};

    #[test]
    fn blocking_run_extracts_exactly_once() {
        for (steps, cost) in [(1, 0.0), (3, 1000.0), (17, 2.5), (64, 0.125)] {
            let mut generator = ScriptedGenerator::new(steps, cost);
            let mut scheduler = StepScheduler::default();
            let mut flush = CountingFlush::default();
            let mut output = Vec::new();

            let report = scheduler
                .run_blocking(&mut generator, &7, &mut output, &mut flush)
                .unwrap();

            assert_eq!(report.steps, steps);
            assert_eq!(report.completed_runs, 1);
            assert_eq!(output, vec![7]);
            assert_eq!(generator.extractions, 1);
            assert_eq!(flush.flushes, 1);
            assert_eq!(scheduler.state(), RunState::Done);
        }
    }

    #[test]
    fn blocking_run_refuses_in_flight_run() {
        let mut generator = ScriptedGenerator::new(10, 10.0);
        let mut scheduler = StepScheduler::default();
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();

        scheduler
            .advance(25.0, &mut generator, &1, &mut output, &mut flush)
            .unwrap();
        assert_eq!(scheduler.state(), RunState::Running);

        let err = scheduler
            .run_blocking(&mut generator, &2, &mut output, &mut flush)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::RunInFlight));
    }

    #[test]
    fn amortised_run_spans_frames() {
        let mut generator = ScriptedGenerator::new(10, 10.0);
        let mut scheduler = StepScheduler::new(CompletionMode::Stop);
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();

        let first = scheduler
            .advance(35.0, &mut generator, &3, &mut output, &mut flush)
            .unwrap();
        assert_eq!(first.steps, 4);
        assert!(!first.completed());
        assert!(output.is_empty());

        let mut frames = 1;
        loop {
            let report = scheduler
                .advance(35.0, &mut generator, &3, &mut output, &mut flush)
                .unwrap();
            frames += 1;
            if report.completed() {
                break;
            }
        }

        assert_eq!(frames, 3);
        assert_eq!(output, vec![3]);
        assert_eq!(flush.flushes, 3);
        assert_eq!(scheduler.state(), RunState::Done);
    }

    #[test]
    fn extraction_count_matches_completions() {
        let mut generator = ScriptedGenerator::new(7, 3.0);
        let mut scheduler = StepScheduler::new(CompletionMode::Restart);
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();
        let mut reported = 0u64;

        for frame in 0..200 {
            let budget = 5.0 + (frame % 13) as f32 * 4.0;
            let report = scheduler
                .advance(budget, &mut generator, &1, &mut output, &mut flush)
                .unwrap();
            reported += u64::from(report.completed_runs);
        }

        assert_eq!(reported, scheduler.completed_runs());
        assert_eq!(u64::from(generator.extractions), reported);
        assert_eq!(output.len() as u64, reported);
        assert_eq!(flush.flushes, 200);
        assert!(!generator.extracted_while_running);
    }

    #[test]
    fn overrun_is_bounded_by_one_step() {
        for (budget, cost) in [(10.0, 3.0), (100.0, 33.0), (1.0, 250.0), (64.0, 8.0)] {
            let mut generator = ScriptedGenerator::new(1_000, cost);
            let mut scheduler = StepScheduler::default();
            let mut flush = CountingFlush::default();
            let mut output = Vec::new();

            let report = scheduler
                .advance(budget, &mut generator, &0, &mut output, &mut flush)
                .unwrap();

            assert!(report.cost >= budget);
            assert!(report.cost < budget + cost, "{} overran {budget}", report.cost);
        }
    }

    #[test]
    fn restart_mode_keeps_spending_budget() {
        let mut generator = ScriptedGenerator::new(2, 5.0);
        let mut scheduler = StepScheduler::new(CompletionMode::Restart);
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();

        let report = scheduler
            .advance(40.0, &mut generator, &9, &mut output, &mut flush)
            .unwrap();

        assert_eq!(report.steps, 8);
        assert_eq!(report.completed_runs, 4);
        assert_eq!(generator.starts, 4);
        assert_eq!(output, vec![9, 9, 9, 9]);
        assert_eq!(flush.flushes, 1);
    }

    #[test]
    fn stop_mode_returns_at_first_completion() {
        let mut generator = ScriptedGenerator::new(2, 5.0);
        let mut scheduler = StepScheduler::new(CompletionMode::Stop);
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();

        let report = scheduler
            .advance(40.0, &mut generator, &9, &mut output, &mut flush)
            .unwrap();

        assert_eq!(report.steps, 2);
        assert_eq!(report.completed_runs, 1);
        assert_eq!(flush.flushes, 1);
    }

    #[test]
    fn zero_cost_runs_do_not_spin() {
        let mut generator = ScriptedGenerator::new(4, 0.0);
        let mut scheduler = StepScheduler::new(CompletionMode::Restart);
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();

        let report = scheduler
            .advance(100.0, &mut generator, &5, &mut output, &mut flush)
            .unwrap();

        assert_eq!(report.steps, 4);
        assert_eq!(report.completed_runs, 1);
    }

    #[test]
    fn zero_budget_only_flushes() {
        let mut generator = ScriptedGenerator::new(4, 1.0);
        let mut scheduler = StepScheduler::default();
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();

        let report = scheduler
            .advance(0.0, &mut generator, &5, &mut output, &mut flush)
            .unwrap();

        assert_eq!(report.steps, 0);
        assert_eq!(generator.starts, 0);
        assert_eq!(flush.flushes, 1);
        assert_eq!(scheduler.state(), RunState::Idle);
    }

    #[test]
    fn invalid_step_costs_are_surfaced() {
        for cost in [-1.0, f32::NAN, f32::INFINITY] {
            let mut generator = ScriptedGenerator::new(4, cost);
            let mut scheduler = StepScheduler::default();
            let mut flush = CountingFlush::default();
            let mut output = Vec::new();

            let err = scheduler
                .advance(10.0, &mut generator, &5, &mut output, &mut flush)
                .unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidStepCost { .. }));

            let mut fresh = ScriptedGenerator::new(4, cost);
            let err = scheduler
                .run_blocking(&mut fresh, &5, &mut output, &mut flush)
                .unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidStepCost { .. }));
            assert!(output.is_empty());
        }
    }

    #[test]
    fn flush_failure_is_fatal() {
        let mut generator = ScriptedGenerator::new(2, 1.0);
        let mut scheduler = StepScheduler::default();
        let mut flush = CountingFlush::failing();
        let mut output = Vec::new();

        let err = scheduler
            .run_blocking(&mut generator, &5, &mut output, &mut flush)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Flush(_)));
    }

    #[test]
    fn closure_flush_is_accepted() {
        let mut generator = ScriptedGenerator::new(2, 1.0);
        let mut scheduler = StepScheduler::default();
        let mut output = Vec::new();
        let mut submitted = 0;
        let mut flush = || -> Result<(), crate::BoxError> {
            submitted += 1;
            Ok(())
        };

        scheduler
            .run_blocking(&mut generator, &5, &mut output, &mut flush)
            .unwrap();
        assert_eq!(submitted, 1);
    }

    #[test]
    fn reset_only_clears_finished_runs() {
        let mut generator = ScriptedGenerator::new(3, 1.0);
        let mut scheduler = StepScheduler::new(CompletionMode::Stop);
        let mut flush = CountingFlush::default();
        let mut output = Vec::new();

        scheduler
            .advance(1.0, &mut generator, &5, &mut output, &mut flush)
            .unwrap();
        scheduler.reset();
        assert_eq!(scheduler.state(), RunState::Running);

        scheduler
            .advance(10.0, &mut generator, &5, &mut output, &mut flush)
            .unwrap();
        assert_eq!(scheduler.state(), RunState::Done);
        scheduler.reset();
        assert_eq!(scheduler.state(), RunState::Idle);
    }
}
