//! Riders: configuration, identity and the per-step course coupling.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::physics::state::{
    DEFAULT_BIKE_MASS, DEFAULT_CRR, DEFAULT_DRIVETRAIN_LOSS, DEFAULT_WHEEL_INERTIA,
    DEFAULT_WHEEL_RADIUS,
};
use crate::physics::{EffortLimiter, EnvState, RiderState, SolverKind, StepDiagnostics};
use crate::sim::error::SimError;
use crate::world::CourseView;

/// Stable, configuration-level rider identity. Survives serialization and
/// is what callers use to address a rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiderId(pub u32);

impl std::fmt::Display for RiderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime instance identity, allocated by the physics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RiderUid(pub u32);

impl std::fmt::Display for RiderUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bicycle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bike {
    /// Mass in kilograms
    pub mass: f64,
    /// Moment of inertia of both wheels (kg·m²)
    pub wheel_i: f64,
    /// Wheel radius in meters
    pub wheel_r: f64,
    /// Extra drag area from the wheels (m²)
    pub wheel_drag_factor: f64,
    /// Rolling resistance coefficient
    pub crr: f64,
    /// Fraction of crank power lost in the drivetrain
    pub drivetrain_loss: f64,
}

impl Default for Bike {
    fn default() -> Self {
        Self::generic()
    }
}

impl Bike {
    /// Generic road bike.
    pub fn generic() -> Self {
        Self {
            mass: DEFAULT_BIKE_MASS,
            wheel_i: DEFAULT_WHEEL_INERTIA,
            wheel_r: DEFAULT_WHEEL_RADIUS,
            wheel_drag_factor: 0.0,
            crr: DEFAULT_CRR,
            drivetrain_loss: DEFAULT_DRIVETRAIN_LOSS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
}

impl Team {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

fn default_initial_effort() -> f64 {
    1.0
}

/// Everything needed to create a rider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderConfig {
    pub rider_id: RiderId,
    pub name: String,
    /// Functional threshold power in watts
    pub ftp_base: f64,
    /// Effort ceiling when fresh
    pub max_effort: f64,
    /// Rider mass in kilograms
    pub mass: f64,
    /// Rider drag area (m²)
    pub cda: f64,
    /// Anaerobic work capacity in joules
    pub w_prime_base: f64,
    /// Effort commanded before any schedule or caller sets one
    #[serde(default = "default_initial_effort")]
    pub initial_effort: f64,
    #[serde(default)]
    pub solver: SolverKind,
    #[serde(default)]
    pub bike: Bike,
    #[serde(default)]
    pub team: Team,
    #[serde(default)]
    pub limiter: EffortLimiter,
}

impl RiderConfig {
    /// All-round rider on a generic bike.
    pub fn generic() -> Self {
        Self {
            rider_id: RiderId(0),
            name: "Joe Moe".to_string(),
            ftp_base: 250.0,
            max_effort: 6.0,
            mass: 65.0,
            cda: 0.3,
            w_prime_base: 24000.0,
            initial_effort: default_initial_effort(),
            solver: SolverKind::default(),
            bike: Bike::generic(),
            team: Team::default(),
            limiter: EffortLimiter::default(),
        }
    }

    /// Initial physical state for this configuration.
    pub fn to_state(&self) -> RiderState {
        let mut state = RiderState::new(
            self.ftp_base,
            self.w_prime_base,
            self.max_effort,
            self.mass,
            self.cda,
        );
        state.mass_bike = self.bike.mass;
        state.wheel_i = self.bike.wheel_i;
        state.wheel_r = self.bike.wheel_r;
        state.crr = self.bike.crr;
        state.drivetrain_loss = self.bike.drivetrain_loss;
        state.cda_wheel_drag = self.bike.wheel_drag_factor;
        state.solver = self.solver;
        state.target_effort = self.initial_effort;
        state.energy = state.energy.with_limiter(self.limiter);
        state
    }
}

/// A rider placed on a course.
#[derive(Debug, Clone)]
pub struct Rider {
    uid: RiderUid,
    id: RiderId,
    pub name: String,
    pub team: Team,
    pub bike: Bike,
    state: RiderState,
    pos2d: DVec2,
    last_diagnostics: Option<StepDiagnostics>,
}

impl Rider {
    pub(crate) fn new(uid: RiderUid, config: &RiderConfig) -> Self {
        Self {
            uid,
            id: config.rider_id,
            name: config.name.clone(),
            team: config.team.clone(),
            bike: config.bike,
            state: config.to_state(),
            pos2d: DVec2::ZERO,
            last_diagnostics: None,
        }
    }

    pub fn uid(&self) -> RiderUid {
        self.uid
    }

    pub fn id(&self) -> RiderId {
        self.id
    }

    pub fn state(&self) -> &RiderState {
        &self.state
    }

    /// Course position and altitude.
    pub fn pos2d(&self) -> DVec2 {
        self.pos2d
    }

    /// Diagnostics of the most recent implicit solve, if any.
    pub fn last_diagnostics(&self) -> Option<StepDiagnostics> {
        self.last_diagnostics
    }

    pub fn set_effort(&mut self, effort: f64) {
        self.state.target_effort = effort;
    }

    pub fn km(&self) -> f64 {
        self.state.pos / 1000.0
    }

    pub fn km_h(&self) -> f64 {
        self.state.speed * 3.6
    }

    pub fn finished(&self, course_length: f64) -> bool {
        self.state.pos >= course_length
    }

    /// Back to the start line with a fresh energy state.
    pub fn reset(&mut self) {
        self.state.reset();
        self.pos2d = DVec2::ZERO;
        self.last_diagnostics = None;
    }

    /// Advance one fixed step on `course`.
    ///
    /// `base_env` supplies air density, gravity and bearing friction; grade
    /// and headwind come from the course at the current position.
    pub fn update(
        &mut self,
        dt: f64,
        course: &dyn CourseView,
        base_env: &EnvState,
    ) -> Result<Option<StepDiagnostics>, SimError> {
        if !(dt > 0.0) {
            return Ok(None);
        }

        let pos = self.state.pos;
        let heading = course.heading_at(pos)?;
        let wind = course.wind_at(pos)?;
        self.state.heading = heading;

        let env = EnvState {
            slope: course.slope_at(pos)?,
            headwind: wind.headwind(heading),
            ..*base_env
        };

        let diagnostics = self.state.step(&env, dt);
        if let Some(diag) = diagnostics.filter(|d| !d.converged) {
            tracing::warn!(
                rider = %self.id,
                residual = diag.residual_power,
                iterations = diag.iterations,
                "Newton solve did not converge"
            );
        }

        if !self.state.pos.is_finite() || !self.state.speed.is_finite() {
            return Err(SimError::NonFiniteState(self.id));
        }

        let pos = self.state.pos;
        self.state.heading = course.heading_at(pos)?;
        self.state.slope = course.slope_at(pos)?;
        self.state.altitude = course.altitude_at(pos)?;
        self.pos2d = DVec2::new(pos, self.state.altitude);
        self.last_diagnostics = diagnostics;

        Ok(diagnostics)
    }
}
