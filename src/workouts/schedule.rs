//! Time-indexed effort schedules.
//!
//! A schedule tells the simulation which effort (multiple of FTP) a rider is
//! asked to hold at a given simulated time. Schedules are total for `t >= 0`
//! and hold their last value once they run out.

use serde::{Deserialize, Serialize};

/// Commanded effort as a function of simulated time.
pub trait EffortSchedule {
    /// Effort at `t` seconds into the simulation.
    fn effort_at(&self, t: f64) -> f64;
}

/// Fixed effort for the whole ride.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantEffort(pub f64);

impl EffortSchedule for ConstantEffort {
    fn effort_at(&self, _t: f64) -> f64 {
        self.0
    }
}

/// A block of constant effort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffortBlock {
    /// Duration in seconds
    pub duration: f64,
    /// Effort as a multiple of FTP (e.g. 0.7, 1.2, 1.5)
    pub effort: f64,
}

impl EffortBlock {
    pub fn new(duration: f64, effort: f64) -> Self {
        Self { duration, effort }
    }
}

/// Consecutive blocks of constant effort.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEffortSchedule {
    blocks: Vec<EffortBlock>,
    /// End time of each block
    ends: Vec<f64>,
    total_duration: f64,
}

impl StepEffortSchedule {
    /// Create a schedule from blocks in order.
    pub fn new(blocks: Vec<EffortBlock>) -> Self {
        let mut t = 0.0;
        let ends = blocks
            .iter()
            .map(|b| {
                t += b.duration;
                t
            })
            .collect();

        Self {
            blocks,
            ends,
            total_duration: t,
        }
    }

    pub fn blocks(&self) -> &[EffortBlock] {
        &self.blocks
    }

    /// Sum of all block durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }
}

impl EffortSchedule for StepEffortSchedule {
    fn effort_at(&self, t: f64) -> f64 {
        let Some(last) = self.blocks.last() else {
            return 0.0;
        };

        let idx = self.ends.partition_point(|end| *end <= t);
        self.blocks.get(idx).unwrap_or(last).effort
    }
}
