//! Cycling physics core.
//!
//! This module provides the numerical heart of the simulation:
//! - W' balance energy model and effort limiting
//! - Force/power model for a rider on a graded road
//! - Implicit and explicit speed solvers
//! - Per-rider fixed-step update

pub mod energy;
pub mod limiter;
pub mod power;
pub mod solver;
pub mod state;

pub use energy::EnergyState;
pub use limiter::{piecewise, sigmoid, EffortLimiter};
pub use power::{EnvState, PowerBreakdown, PowerTerm};
pub use solver::{SolverKind, StepDiagnostics};
pub use state::RiderState;
