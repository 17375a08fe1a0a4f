//! Velosim - Cycling Physics Simulation
//!
//! Simulates riders on a course with a W' balance fatigue model, three
//! interchangeable speed solvers, and a fixed-timestep scheduler that runs
//! the physics on a background thread in real time or offline.

pub mod physics;
pub mod sim;
pub mod storage;
pub mod workouts;
pub mod world;

// Re-export commonly used types
pub use physics::{EnergyState, EnvState, RiderState, SolverKind, StepDiagnostics};
pub use sim::{PhysicsEngine, RiderConfig, RiderId, SimError, Simulation};
pub use storage::config::SimConfig;
pub use world::{Course, CourseView};
