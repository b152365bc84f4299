use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use crate::contract::{BoxError, FrameClock, Generator, GpuFlush, WeightSource};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub &'static str);

/// Generator finishing after a fixed number of equally priced steps. Outputs
/// record the source each completed run was started with.
pub struct ScriptedGenerator {
    steps_per_run: u32,
    cost: f32,
    remaining: u32,
    running: bool,
    current: u32,
    pub starts: u32,
    pub extractions: u32,
    pub extracted_while_running: bool,
    pub disposals: Rc<Cell<u32>>,
}

impl ScriptedGenerator {
    pub fn new(steps_per_run: u32, cost: f32) -> Self {
        Self {
            steps_per_run: steps_per_run.max(1),
            cost,
            remaining: 0,
            running: false,
            current: 0,
            starts: 0,
            extractions: 0,
            extracted_while_running: false,
            disposals: Rc::new(Cell::new(0)),
        }
    }
}

impl Generator for ScriptedGenerator {
    type Source = u32;
    type Output = Vec<u32>;
    type Error = MockError;

    fn start(&mut self, source: &u32) -> Result<(), MockError> {
        if self.running {
            return Err(MockError("generator already running"));
        }
        self.running = true;
        self.remaining = self.steps_per_run;
        self.current = *source;
        self.starts += 1;
        Ok(())
    }

    fn step(&mut self) -> f32 {
        if !self.running {
            return 0.0;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.running = false;
        }
        self.cost
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn get_result(&mut self, output: &mut Vec<u32>) -> Result<(), MockError> {
        if self.running {
            self.extracted_while_running = true;
            return Err(MockError("result requested while running"));
        }
        output.push(self.current);
        self.extractions += 1;
        Ok(())
    }

    fn dispose(&mut self) {
        self.disposals.set(self.disposals.get() + 1);
    }
}

#[derive(Debug, Default)]
pub struct CountingFlush {
    pub flushes: u32,
    fail: bool,
}

impl CountingFlush {
    pub fn failing() -> Self {
        Self {
            flushes: 0,
            fail: true,
        }
    }
}

impl GpuFlush for CountingFlush {
    fn flush(&mut self) -> Result<(), BoxError> {
        self.flushes += 1;
        if self.fail {
            return Err(Box::new(MockError("device lost")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockWeights {
    pub fail: bool,
    pub loads: u32,
    pub releases: u32,
}

impl WeightSource for MockWeights {
    type Table = String;
    type Error = MockError;

    fn load(&mut self, path: &Path) -> Result<String, MockError> {
        if self.fail {
            return Err(MockError("weights missing"));
        }
        self.loads += 1;
        Ok(path.display().to_string())
    }

    fn release(&mut self, _table: String) {
        self.releases += 1;
    }
}

pub struct FixedClock(pub f32);

impl FrameClock for FixedClock {
    fn last_frame_seconds(&self) -> f32 {
        self.0
    }
}
