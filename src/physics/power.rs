//! Force and power model shared by every speed solver.
//!
//! Power terms at speed `v` (m/s):
//! - Aerodynamic: `0.5 * rho * CdA * (v + headwind)^2 * v`
//! - Rolling: `crr * m * g * v`
//! - Bearings: `(c0 + c1 * v) * v`
//! - Gravity: `m * g * sin(atan(slope)) * v`
//! - Inertia: `0.5 * m_eq * (v^2 - v_old^2) / dt` (implicit solver only)
//!
//! Crank power is the sum divided by `1 - drivetrain_loss`.

use serde::{Deserialize, Serialize};

use super::state::RiderState;

/// Air density at sea level (kg/m³)
pub const AIR_DENSITY: f64 = 1.2234;
/// Standard gravity (m/s²)
pub const GRAVITY: f64 = 9.80665;
/// Constant bearing friction term (N)
pub const BEARING_C0: f64 = 0.091;
/// Speed-proportional bearing friction term (N·s/m)
pub const BEARING_C1: f64 = 0.0087;

/// Environment at the rider's current position, refreshed every step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvState {
    /// Air density (kg/m³)
    pub rho: f64,
    /// Gravitational acceleration (m/s²)
    pub g: f64,
    /// Road grade as rise/run
    pub slope: f64,
    /// Wind component along the direction of travel, positive when opposing (m/s)
    pub headwind: f64,
    pub bearing_c0: f64,
    pub bearing_c1: f64,
}

impl Default for EnvState {
    fn default() -> Self {
        Self {
            rho: AIR_DENSITY,
            g: GRAVITY,
            slope: 0.0,
            headwind: 0.0,
            bearing_c0: BEARING_C0,
            bearing_c1: BEARING_C1,
        }
    }
}

impl EnvState {
    /// Flat road, still air.
    pub fn flat() -> Self {
        Self::default()
    }

    /// Copy of this environment on a different grade.
    pub fn with_slope(self, slope: f64) -> Self {
        Self { slope, ..self }
    }

    /// Copy of this environment with a different headwind.
    pub fn with_headwind(self, headwind: f64) -> Self {
        Self { headwind, ..self }
    }

    /// Sine of the grade angle. Steep grades are not linearized.
    pub fn sin_grade(&self) -> f64 {
        self.slope.atan().sin()
    }
}

/// Individual contributions to crank power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerTerm {
    Aerodynamic,
    Rolling,
    Bearings,
    Gravity,
    Inertia,
    Drivetrain,
}

impl PowerTerm {
    pub const ALL: [PowerTerm; 6] = [
        PowerTerm::Aerodynamic,
        PowerTerm::Rolling,
        PowerTerm::Bearings,
        PowerTerm::Gravity,
        PowerTerm::Inertia,
        PowerTerm::Drivetrain,
    ];

    /// Short label for compact displays.
    pub fn label(&self) -> &'static str {
        match self {
            PowerTerm::Aerodynamic => "Aero",
            PowerTerm::Rolling => "Roll",
            PowerTerm::Bearings => "Bear",
            PowerTerm::Gravity => "Grav",
            PowerTerm::Inertia => "Inert",
            PowerTerm::Drivetrain => "Drive",
        }
    }
}

impl std::fmt::Display for PowerTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Where the crank power went during one step (W).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerBreakdown {
    pub aerodynamic: f64,
    pub rolling: f64,
    pub bearings: f64,
    pub gravity: f64,
    pub inertia: f64,
    pub drivetrain: f64,
}

impl PowerBreakdown {
    /// Value of a single term.
    pub fn get(&self, term: PowerTerm) -> f64 {
        match term {
            PowerTerm::Aerodynamic => self.aerodynamic,
            PowerTerm::Rolling => self.rolling,
            PowerTerm::Bearings => self.bearings,
            PowerTerm::Gravity => self.gravity,
            PowerTerm::Inertia => self.inertia,
            PowerTerm::Drivetrain => self.drivetrain,
        }
    }

    /// Sum of all terms, equal to the crank power.
    pub fn total(&self) -> f64 {
        PowerTerm::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

impl RiderState {
    /// Rider plus bike mass (kg).
    pub fn total_mass(&self) -> f64 {
        self.mass_rider + self.mass_bike
    }

    /// Translating mass with the wheels' rotational inertia folded in (kg).
    pub fn equivalent_mass(&self) -> f64 {
        self.total_mass() + self.wheel_i / (self.wheel_r * self.wheel_r)
    }

    /// Combined rider and wheel drag area (m²).
    pub fn total_cda(&self) -> f64 {
        self.cda_rider + self.cda_wheel_drag
    }

    fn drag_coeff(&self, env: &EnvState) -> f64 {
        0.5 * env.rho * self.total_cda()
    }

    /// Drag, rolling, bearing and gravity force at speed `v` (N).
    pub fn resistive_force(&self, v: f64, env: &EnvState) -> f64 {
        let m = self.total_mass();
        let v_air = v + env.headwind;

        let f_aero = self.drag_coeff(env) * v_air * v_air;
        let f_roll = self.crr * m * env.g;
        let f_bear = env.bearing_c0 + env.bearing_c1 * v;
        let f_grav = m * env.g * env.sin_grade();

        f_aero + f_roll + f_bear + f_grav
    }

    /// Power needed at the wheel to end a step of length `dt` at speed `v`
    /// having started it at `v_old` (W).
    pub fn raw_power(&self, v: f64, v_old: f64, dt: f64, env: &EnvState) -> f64 {
        let p_inertia = 0.5 * self.equivalent_mass() * (v * v - v_old * v_old) / dt;
        self.resistive_force(v, env) * v + p_inertia
    }

    /// Crank power for the same step, including drivetrain losses (W).
    pub fn crank_power(&self, v: f64, v_old: f64, dt: f64, env: &EnvState) -> f64 {
        self.raw_power(v, v_old, dt, env) / (1.0 - self.drivetrain_loss)
    }

    /// Analytic derivative of [`RiderState::crank_power`] with respect to `v`.
    pub fn crank_power_derivative(&self, v: f64, dt: f64, env: &EnvState) -> f64 {
        let m = self.total_mass();
        let v_air = v + env.headwind;

        let d_aero = self.drag_coeff(env) * (v_air * v_air + 2.0 * v_air * v);
        let d_roll = self.crr * m * env.g;
        let d_bear = env.bearing_c0 + 2.0 * env.bearing_c1 * v;
        let d_grav = m * env.g * env.sin_grade();
        let d_inertia = self.equivalent_mass() * v / dt;

        (d_aero + d_roll + d_bear + d_grav + d_inertia) / (1.0 - self.drivetrain_loss)
    }

    /// Break the crank power for a step from `v_old` to `v` into its terms.
    pub fn power_breakdown(&self, v: f64, v_old: f64, dt: f64, env: &EnvState) -> PowerBreakdown {
        let m = self.total_mass();
        let v_air = v + env.headwind;

        let aerodynamic = self.drag_coeff(env) * v_air * v_air * v;
        let rolling = self.crr * m * env.g * v;
        let bearings = (env.bearing_c0 + env.bearing_c1 * v) * v;
        let gravity = m * env.g * env.sin_grade() * v;
        let inertia = if dt > 0.0 {
            0.5 * self.equivalent_mass() * (v * v - v_old * v_old) / dt
        } else {
            0.0
        };

        let raw = aerodynamic + rolling + bearings + gravity + inertia;
        let drivetrain = raw * self.drivetrain_loss / (1.0 - self.drivetrain_loss);

        PowerBreakdown {
            aerodynamic,
            rolling,
            bearings,
            gravity,
            inertia,
            drivetrain,
        }
    }
}
