//! Simulation error types.

use thiserror::Error;

use crate::sim::rider::RiderId;
use crate::storage::config::ConfigError;
use crate::world::CourseError;

/// Errors raised while building or stepping a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// A course query failed.
    #[error("Course error: {0}")]
    Course(#[from] CourseError),

    /// A rider's position or speed stopped being finite.
    #[error("Rider {0} reached a non-finite state")]
    NonFiniteState(RiderId),

    /// No rider with the given id.
    #[error("Unknown rider {0}")]
    UnknownRider(RiderId),

    /// Two riders share a configuration id.
    #[error("Rider {0} already added")]
    DuplicateRider(RiderId),

    /// The frame lock was poisoned by a panicking thread.
    #[error("Frame lock poisoned")]
    LockPoisoned,

    /// The real-time loop is already running.
    #[error("Simulation already running")]
    AlreadyRunning,

    /// A previous step failed; the simulation will not restart.
    #[error("Physics error: {0}")]
    PhysicsFault(String),

    /// The physics thread could not be spawned.
    #[error("Failed to spawn physics thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The physics thread panicked.
    #[error("Physics thread panicked")]
    ThreadPanicked,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
