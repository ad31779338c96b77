//! Session progress tracking over the fixed 0..=12 step scale.

use crate::error::ProgressError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Index of the terminal step.
pub const TERMINAL_STEP: u8 = 12;

/// Human-readable labels, indexed by step.
pub const STEP_LABELS: [&str; 13] = [
    "received",
    "pre-fill search",
    "triangulation",
    "intent classification",
    "mode selected",
    "role execution",
    "dual-model review",
    "correction review",
    "post-hoc audit",
    "extended analyses",
    "report assembly",
    "cache write",
    "done",
];

/// One started step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressStep {
    pub index: u8,
    pub label: &'static str,
    pub started_at: DateTime<Utc>,
}

/// Percentage reported for a step: `round(index / 12 * 100)`.
pub fn percent_for(index: u8) -> u8 {
    let idx = index.min(TERMINAL_STEP) as f64;
    (idx / TERMINAL_STEP as f64 * 100.0).round() as u8
}

/// Label for a step, or `"unknown"` past the terminal step.
pub fn label_for(index: u8) -> &'static str {
    STEP_LABELS.get(index as usize).copied().unwrap_or("unknown")
}

/// Append-only record of started steps plus the session clock.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    steps: Vec<ProgressStep>,
    reached: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            steps: Vec::with_capacity(STEP_LABELS.len()),
            reached: 0,
        }
    }

    /// Record `index` as started.
    ///
    /// A lower index than the one already reached is accepted and appended;
    /// it does not move the high-water mark or the clock.
    pub fn start_step(&mut self, index: u8) -> Result<&ProgressStep, ProgressError> {
        if index > TERMINAL_STEP {
            return Err(ProgressError::StepOutOfRange {
                index,
                terminal: TERMINAL_STEP,
            });
        }
        self.reached = self.reached.max(index);
        self.steps.push(ProgressStep {
            index,
            label: label_for(index),
            started_at: Utc::now(),
        });
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Elapsed time since the session started.
    pub fn get_progress(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.get_progress().as_millis() as u64
    }

    /// Highest step started so far.
    pub fn reached(&self) -> u8 {
        self.reached
    }

    pub fn percent(&self) -> u8 {
        percent_for(self.reached)
    }

    pub fn is_finished(&self) -> bool {
        self.reached == TERMINAL_STEP
    }

    pub fn steps(&self) -> &[ProgressStep] {
        &self.steps
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
