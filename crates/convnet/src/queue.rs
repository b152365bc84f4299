use std::cell::RefCell;
use std::rc::Rc;

use scheduler::{BoxError, GpuFlush};
use tracing::trace;

/// Work recorded by the generator, executed on the next flush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Upload { pixels: usize },
    Convolve { layer: usize, rows: u32, cost: f32 },
    Readback { pixels: usize },
}

/// Totals across every batch submitted so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueStats {
    pub submissions: u64,
    pub commands: u64,
    pub cost: f64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<Command>,
    stats: QueueStats,
}

/// Shared command buffer. Clones refer to the same queue, so the generator
/// records into it while the coordinator owns the handle that flushes.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Rc<RefCell<QueueState>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, command: Command) {
        self.inner.borrow_mut().pending.push(command);
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.borrow().stats
    }

    /// Drops queued commands without submitting them.
    pub fn discard(&self) {
        self.inner.borrow_mut().pending.clear();
    }
}

impl GpuFlush for CommandQueue {
    fn flush(&mut self) -> Result<(), BoxError> {
        let mut state = self.inner.borrow_mut();
        let batch = std::mem::take(&mut state.pending);
        let cost: f64 = batch
            .iter()
            .map(|command| match command {
                Command::Convolve { cost, .. } => f64::from(*cost),
                _ => 0.0,
            })
            .sum();
        state.stats.submissions += 1;
        state.stats.commands += batch.len() as u64;
        state.stats.cost += cost;
        trace!(commands = batch.len(), cost, "submitted command batch");
        Ok(())
    }
}
