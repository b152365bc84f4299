use std::fmt;

use paceconfig::BudgetConfig;
use tracing::{info, trace};

use crate::error::SchedulerError;

/// Coarse rating of how much work the host sustains per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PerformanceLabel {
    NotAvailable,
    Poor,
    Moderate,
    Good,
    Great,
    Excellent,
}

impl PerformanceLabel {
    const BUCKETS: [PerformanceLabel; 6] = [
        PerformanceLabel::NotAvailable,
        PerformanceLabel::Poor,
        PerformanceLabel::Moderate,
        PerformanceLabel::Good,
        PerformanceLabel::Great,
        PerformanceLabel::Excellent,
    ];

    /// Buckets a budget in steps of 100 units, saturating at `Excellent`.
    pub fn from_budget(budget: f32) -> Self {
        let bucket = (budget / 100.0).floor();
        let index = if bucket.is_nan() || bucket < 0.0 {
            0
        } else {
            (bucket as usize).min(Self::BUCKETS.len() - 1)
        };
        Self::BUCKETS[index]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceLabel::NotAvailable => "N/A",
            PerformanceLabel::Poor => "Poor",
            PerformanceLabel::Moderate => "Moderate",
            PerformanceLabel::Good => "Good",
            PerformanceLabel::Great => "Great",
            PerformanceLabel::Excellent => "Excellent",
        }
    }
}

impl fmt::Display for PerformanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic view of the controller; never feeds back into control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calibration {
    Calibrating,
    Measured(PerformanceLabel),
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Calibration::Calibrating => f.write_str("Measuring GPU performance..."),
            Calibration::Measured(label) => label.fmt(f),
        }
    }
}

/// Damped feedback loop sizing the per-frame work budget.
///
/// Each update compares the last frame time against the target rate and
/// nudges the budget by `error * adjust_rate`. The adjust rate decays
/// linearly with every update until it reaches its floor, so early noisy
/// measurements move the budget a lot and later ones only fine-tune it.
#[derive(Debug, Clone)]
pub struct BudgetController {
    config: BudgetConfig,
    budget: f32,
    updates: u32,
}

impl BudgetController {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            budget: config.initial,
            config,
            updates: 0,
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn budget(&self) -> f32 {
        self.budget
    }

    pub fn updates(&self) -> u32 {
        self.updates
    }

    /// Correction magnitude the next update will apply.
    ///
    /// Derived from the update count instead of repeated subtraction so the
    /// floor is reached on exactly the same update regardless of float drift.
    pub fn adjust_rate(&self) -> f32 {
        let decayed = f64::from(self.config.adjust_rate)
            - f64::from(self.config.adjust_decay) * f64::from(self.updates);
        decayed.max(f64::from(self.config.adjust_floor)) as f32
    }

    pub fn is_calibrated(&self) -> bool {
        self.adjust_rate() < self.config.calibrated_below
    }

    pub fn performance(&self) -> Calibration {
        if self.is_calibrated() {
            Calibration::Measured(PerformanceLabel::from_budget(self.budget))
        } else {
            Calibration::Calibrating
        }
    }

    /// Completed runs per second implied by the current budget.
    pub fn refresh_rate_hz(&self) -> f32 {
        self.config.target_hz * self.budget / 1000.0
    }

    /// Feeds the previous frame's duration into the control law and returns
    /// the budget for the coming frame.
    ///
    /// Negative or non-finite deltas are rejected and leave the controller
    /// untouched.
    pub fn update(&mut self, frame_delta_secs: f32) -> Result<f32, SchedulerError> {
        if !frame_delta_secs.is_finite() || frame_delta_secs < 0.0 {
            return Err(SchedulerError::InvalidFrameDelta {
                delta: frame_delta_secs,
            });
        }

        let rate = self.adjust_rate();
        let error = (frame_delta_secs - self.config.neutral_frame_secs()) * self.config.target_hz;
        let proposed = self.budget - error * rate;
        let clamped = proposed.clamp(self.config.min, self.config.max);
        if clamped != proposed {
            trace!(proposed, budget = clamped, "budget saturated");
        }

        let was_calibrated = self.is_calibrated();
        self.budget = clamped;
        self.updates = self.updates.saturating_add(1);

        if !was_calibrated && self.is_calibrated() {
            info!(
                budget = self.budget,
                refresh_hz = self.refresh_rate_hz(),
                performance = %self.performance(),
                "budget calibration settled"
            );
        }

        Ok(self.budget)
    }

    /// Restores the initial budget and restarts calibration.
    pub fn reset(&mut self) {
        self.budget = self.config.initial;
        self.updates = 0;
    }
}

impl Default for BudgetController {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}
