//! Adaptive-budget pacing for interruptible GPU work.
//!
//! A [`BudgetController`] sizes how much work fits in a frame, a
//! [`StepScheduler`] spends that budget on a [`Generator`], and a
//! [`RunCoordinator`] wires both to a frame clock once per frame.

mod budget;
mod contract;
mod coordinator;
mod error;
mod step;

#[cfg(test)]
mod testing;

pub use budget::{BudgetController, Calibration, PerformanceLabel};
pub use contract::{BoxError, Consumer, FrameClock, Generator, GpuFlush, WeightSource};
pub use coordinator::{FrameReport, Lifecycle, RunCoordinator};
pub use error::{InitError, SchedulerError};
pub use paceconfig::{BudgetConfig, CompletionMode};
pub use step::{AdvanceReport, RunState, StepScheduler};
