//! Simulation layer: riders on a course, the physics engine and its drivers.

pub mod engine;
pub mod error;
pub mod rider;
pub mod runner;
pub mod scheduler;
pub mod snapshot;

pub use engine::{PhysicsEngine, SharedCourse};
pub use error::{SimError, SimResult};
pub use rider::{Bike, Rider, RiderConfig, RiderId, RiderUid, Team};
pub use runner::{EndCondition, OfflineRunner, RunSummary};
pub use scheduler::{FixedStepClock, SharedSchedule, SimEvent, Simulation};
pub use snapshot::RiderSnapshot;
