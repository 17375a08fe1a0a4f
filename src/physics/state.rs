//! Per-rider physical state and the fixed-step update.

use serde::{Deserialize, Serialize};

use super::energy::EnergyState;
use super::power::{EnvState, PowerBreakdown};
use super::solver::{SolverKind, StepDiagnostics};

/// Generic road bike mass (kg)
pub const DEFAULT_BIKE_MASS: f64 = 7.0;
/// Moment of inertia of both wheels (kg·m²)
pub const DEFAULT_WHEEL_INERTIA: f64 = 0.14;
/// Wheel radius (m)
pub const DEFAULT_WHEEL_RADIUS: f64 = 0.311;
/// Rolling resistance for road tires
pub const DEFAULT_CRR: f64 = 0.006;
/// Fraction of crank power lost in the drivetrain
pub const DEFAULT_DRIVETRAIN_LOSS: f64 = 0.02;

/// Kinematic and configuration state of one rider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiderState {
    /// Distance along the course (m)
    pub pos: f64,
    /// Speed along the course (m/s), never negative
    pub speed: f64,
    /// Altitude at `pos` (m)
    pub altitude: f64,
    /// Grade at `pos` as rise/run
    pub slope: f64,
    /// Direction of travel (radians)
    pub heading: f64,

    pub mass_rider: f64,
    pub mass_bike: f64,
    /// Wheel moment of inertia (kg·m²)
    pub wheel_i: f64,
    /// Wheel radius (m)
    pub wheel_r: f64,
    pub crr: f64,
    /// Fraction of crank power lost, in `[0, 1)`
    pub drivetrain_loss: f64,
    pub cda_rider: f64,
    pub cda_wheel_drag: f64,

    /// Threshold power used to turn effort into watts
    pub ftp: f64,
    /// Commanded effort (multiple of FTP)
    pub target_effort: f64,
    /// Effort actually applied after the W' ceiling
    pub effort: f64,
    /// Crank power applied during the last step (W)
    pub power: f64,

    pub energy: EnergyState,
    pub solver: SolverKind,
    /// Crank power split of the last step
    pub breakdown: PowerBreakdown,
}

impl RiderState {
    /// Create a rider at the start line on a generic road bike.
    pub fn new(ftp: f64, w_prime: f64, max_effort: f64, mass_rider: f64, cda_rider: f64) -> Self {
        Self {
            pos: 0.0,
            speed: 0.0,
            altitude: 0.0,
            slope: 0.0,
            heading: 0.0,
            mass_rider,
            mass_bike: DEFAULT_BIKE_MASS,
            wheel_i: DEFAULT_WHEEL_INERTIA,
            wheel_r: DEFAULT_WHEEL_RADIUS,
            crr: DEFAULT_CRR,
            drivetrain_loss: DEFAULT_DRIVETRAIN_LOSS,
            cda_rider,
            cda_wheel_drag: 0.0,
            ftp,
            target_effort: 0.0,
            effort: 0.0,
            power: 0.0,
            energy: EnergyState::new(ftp, w_prime, max_effort),
            solver: SolverKind::default(),
            breakdown: PowerBreakdown::default(),
        }
    }

    /// Back to the start line, fresh.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.speed = 0.0;
        self.altitude = 0.0;
        self.slope = 0.0;
        self.effort = 0.0;
        self.power = 0.0;
        self.breakdown = PowerBreakdown::default();
        self.energy.reset();
    }

    /// Advance one fixed step in the given environment.
    ///
    /// Order: cap the commanded effort by the current W' ceiling, convert to
    /// power, solve for the new speed, move, then charge the energy model.
    /// A non-positive `dt` does nothing.
    pub fn step(&mut self, env: &EnvState, dt: f64) -> Option<StepDiagnostics> {
        if !(dt > 0.0) {
            return None;
        }

        let limit = self.energy.effort_limit();
        self.effort = self.target_effort.min(limit).max(0.0);
        self.power = self.effort * self.ftp;

        let v_old = self.speed;
        let (speed, diagnostics) = self.solver.solve(self, env, self.power, dt);
        self.speed = speed;
        self.pos += self.speed * dt;

        self.breakdown = self.power_breakdown(self.speed, v_old, dt, env);
        self.energy.update(self.power, dt);

        diagnostics
    }

    /// Remaining W' as a fraction of capacity.
    pub fn energy_fraction(&self) -> f64 {
        self.energy.wbal_fraction()
    }
}
