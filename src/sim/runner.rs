//! Offline driver: steps a simulation as fast as possible.

use crate::sim::engine::PhysicsEngine;
use crate::sim::error::{SimError, SimResult};
use crate::sim::scheduler::Simulation;
use crate::sim::snapshot::RiderSnapshot;

/// Default cap on the number of steps of one offline run.
pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;

/// When an offline run is over.
#[derive(Debug, Clone, PartialEq)]
pub enum EndCondition {
    /// Every rider has crossed the finish line.
    FinishLine,
    /// Simulated time reached the given number of seconds.
    TimeLimit(f64),
    /// Any of the inner conditions holds.
    Any(Vec<EndCondition>),
}

impl EndCondition {
    pub fn should_stop(&self, engine: &PhysicsEngine, sim_seconds: f64) -> bool {
        match self {
            EndCondition::FinishLine => engine.all_finished(),
            EndCondition::TimeLimit(limit) => sim_seconds >= *limit,
            EndCondition::Any(conditions) => {
                conditions.iter().any(|c| c.should_stop(engine, sim_seconds))
            }
        }
    }
}

/// Outcome of an offline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Fixed steps taken
    pub steps: u64,
    /// Simulated seconds at the end
    pub sim_seconds: f64,
    /// Whether the end condition was met before the step cap
    pub completed: bool,
    pub snapshots: Vec<RiderSnapshot>,
}

/// Runs a simulation on the caller's thread until an end condition holds.
pub struct OfflineRunner<'a> {
    sim: &'a Simulation,
    end: EndCondition,
    max_steps: u64,
}

impl<'a> OfflineRunner<'a> {
    pub fn new(sim: &'a Simulation, end: EndCondition) -> Self {
        Self {
            sim,
            end,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Step with the simulation's `dt` until done.
    pub fn run(&self) -> SimResult<RunSummary> {
        let dt = self.sim.dt();
        let mut steps = 0;

        let completed = loop {
            if self.is_done()? {
                break true;
            }
            if steps >= self.max_steps {
                tracing::warn!(steps, "Offline run hit its step cap");
                break false;
            }
            self.sim.step_fixed(dt)?;
            steps += 1;
        };

        let summary = RunSummary {
            steps,
            sim_seconds: self.sim.sim_seconds()?,
            completed,
            snapshots: self.sim.snapshots()?,
        };
        tracing::info!(
            "Offline run finished after {} steps ({:.1} s simulated)",
            summary.steps,
            summary.sim_seconds
        );
        Ok(summary)
    }

    fn is_done(&self) -> Result<bool, SimError> {
        let sim_seconds = self.sim.sim_seconds()?;
        self.sim.with_engine(|engine| {
            engine.riders().is_empty() || self.end.should_stop(engine, sim_seconds)
        })
    }
}
