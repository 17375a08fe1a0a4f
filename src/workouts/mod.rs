//! Effort schedules that drive riders during a simulation.

pub mod schedule;

pub use schedule::{ConstantEffort, EffortBlock, EffortSchedule, StepEffortSchedule};
