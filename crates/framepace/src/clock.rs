//! Frame clocks feeding the budget controller.
//!
//! `SimulatedClock` derives each frame's duration from the work scheduled in
//! it, which makes runs reproducible for a given seed. `WallClock` measures
//! real elapsed time between frames.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scheduler::FrameClock;

/// Shortest frame the wall clock reports.
const MIN_FRAME: Duration = Duration::from_micros(100);
/// Longest frame the wall clock reports, so a stall reads as one slow frame.
const MAX_FRAME: Duration = Duration::from_millis(250);

/// Host model for simulated frames: a fixed host cost, a per-unit cost for
/// scheduled work, and uniform jitter around the sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameModel {
    pub host_frame: Duration,
    pub unit_cost: Duration,
    pub jitter: Duration,
}

impl FrameModel {
    pub fn from_config(config: &paceconfig::SimulationConfig) -> Self {
        Self {
            host_frame: config.host_frame,
            unit_cost: config.unit_cost,
            jitter: config.jitter,
        }
    }
}

#[derive(Debug)]
pub struct SimulatedClock {
    model: FrameModel,
    rng: StdRng,
    last: f32,
}

impl SimulatedClock {
    pub fn new(model: FrameModel, seed: u64) -> Self {
        Self {
            last: model.host_frame.as_secs_f32(),
            model,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Closes the current frame after `cost` units of work were scheduled.
    pub fn end_frame(&mut self, cost: f32) -> f32 {
        let work = self.model.unit_cost.as_secs_f64() * f64::from(cost.max(0.0));
        let jitter = self.model.jitter.as_secs_f64();
        let noise = if jitter > 0.0 {
            self.rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        let seconds = (self.model.host_frame.as_secs_f64() + work + noise).max(0.0);
        self.last = seconds as f32;
        self.last
    }
}

impl FrameClock for SimulatedClock {
    fn last_frame_seconds(&self) -> f32 {
        self.last
    }
}

#[derive(Debug)]
pub struct WallClock {
    frame_start: Instant,
    last: Duration,
}

impl WallClock {
    pub fn new(expected_frame: Duration) -> Self {
        Self {
            frame_start: Instant::now(),
            last: expected_frame.clamp(MIN_FRAME, MAX_FRAME),
        }
    }

    /// Closes the current frame and starts timing the next one.
    pub fn end_frame(&mut self) -> f32 {
        let now = Instant::now();
        self.last = now
            .saturating_duration_since(self.frame_start)
            .clamp(MIN_FRAME, MAX_FRAME);
        self.frame_start = now;
        self.last.as_secs_f32()
    }
}

impl FrameClock for WallClock {
    fn last_frame_seconds(&self) -> f32 {
        self.last.as_secs_f32()
    }
}

/// Either clock behind one interface for the simulate loop.
#[derive(Debug)]
pub enum HostClock {
    Simulated(SimulatedClock),
    Wall {
        clock: WallClock,
        host_frame: Duration,
    },
}

impl HostClock {
    pub fn end_frame(&mut self, cost: f32) -> f32 {
        match self {
            HostClock::Simulated(clock) => clock.end_frame(cost),
            HostClock::Wall { clock, host_frame } => {
                std::thread::sleep(*host_frame);
                clock.end_frame()
            }
        }
    }
}

impl FrameClock for HostClock {
    fn last_frame_seconds(&self) -> f32 {
        match self {
            HostClock::Simulated(clock) => clock.last_frame_seconds(),
            HostClock::Wall { clock, .. } => clock.last_frame_seconds(),
        }
    }
}
