//! Speed solvers.
//!
//! Three interchangeable ways of turning commanded power into the speed at
//! the end of a step:
//! - [`SolverKind::PowerBalance`]: implicit, solves the step's power balance
//!   for the end speed with Newton-Raphson. Stable on steep grades and large
//!   power changes at the cost of a few iterations.
//! - [`SolverKind::AccelForce`]: explicit Euler on acceleration from net force.
//! - [`SolverKind::AccelEnergy`]: explicit Euler on kinetic energy from net
//!   power. Avoids the `P / v` force singularity near standstill.

use serde::{Deserialize, Serialize};

use super::power::EnvState;
use super::state::RiderState;

/// Speed floor used where a solver divides by speed.
pub const MIN_SOLVER_SPEED: f64 = 0.1;
/// Newton iteration cap.
pub const MAX_NEWTON_ITERATIONS: u32 = 25;
/// Absolute power residual tolerance (W).
pub const POWER_ABS_TOL: f64 = 1e-1;
/// Relative power residual tolerance.
pub const POWER_REL_TOL: f64 = 1e-3;
/// Absolute speed step tolerance (m/s).
pub const SPEED_ABS_TOL: f64 = 2e-3;
/// Relative speed step tolerance.
pub const SPEED_REL_TOL: f64 = 1e-4;
/// Derivatives flatter than this abort the iteration.
pub const MIN_DERIVATIVE: f64 = 1e-12;

/// Which solver advances a rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Implicit Newton-Raphson power balance
    #[default]
    PowerBalance,
    /// Explicit force integration
    AccelForce,
    /// Explicit kinetic energy integration
    AccelEnergy,
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverKind::PowerBalance => write!(f, "Power Balance"),
            SolverKind::AccelForce => write!(f, "Accel (Force)"),
            SolverKind::AccelEnergy => write!(f, "Accel (Energy)"),
        }
    }
}

impl SolverKind {
    /// Speed at the end of a step of length `dt` at `power`.
    ///
    /// Only the implicit solver can fail to converge, so only it returns
    /// diagnostics.
    pub fn solve(
        self,
        state: &RiderState,
        env: &EnvState,
        power: f64,
        dt: f64,
    ) -> (f64, Option<StepDiagnostics>) {
        match self {
            SolverKind::PowerBalance => {
                let (speed, diag) = solve_power_balance(state, env, power, dt);
                (speed, Some(diag))
            }
            SolverKind::AccelForce => (integrate_force(state, env, power, dt), None),
            SolverKind::AccelEnergy => (integrate_energy(state, env, power, dt), None),
        }
    }
}

/// Outcome of one implicit solve.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepDiagnostics {
    /// Whether the power residual at the returned speed is within tolerance
    pub converged: bool,
    /// Iterations used
    pub iterations: u32,
    /// Crank power minus commanded power (W), evaluated at the returned
    /// speed. That is the iterate after the last update, not the one the
    /// convergence test was run on.
    pub residual_power: f64,
}

fn is_close(value: f64, target: f64, tol: f64, rtol: f64) -> bool {
    (value - target).abs() <= tol + rtol * target.abs()
}

fn power_within_tolerance(residual: f64, power: f64) -> bool {
    is_close(residual + power, power, POWER_ABS_TOL, POWER_REL_TOL)
}

/// Solve `crank_power(v) = power` for the end-of-step speed.
///
/// Never fails: when no tolerance is met within [`MAX_NEWTON_ITERATIONS`]
/// (or the derivative goes flat) the last iterate is returned with
/// `converged = false`.
pub fn solve_power_balance(
    state: &RiderState,
    env: &EnvState,
    power: f64,
    dt: f64,
) -> (f64, StepDiagnostics) {
    solve_power_balance_capped(state, env, power, dt, MAX_NEWTON_ITERATIONS)
}

/// [`solve_power_balance`] with an explicit iteration cap.
///
/// A Newton step is only taken when the derivative is positive and the step
/// lands above zero. Otherwise the iterate is doubled when more power is
/// needed and halved when less is, so a rider pulled downhill from rest
/// walks out of the low-speed dip instead of collapsing onto zero. Those
/// fallback steps never count towards the speed tolerance.
pub fn solve_power_balance_capped(
    state: &RiderState,
    env: &EnvState,
    power: f64,
    dt: f64,
    max_iterations: u32,
) -> (f64, StepDiagnostics) {
    let v_old = state.speed;
    let residual = |v: f64| state.crank_power(v, v_old, dt, env) - power;

    let mut x = v_old.max(MIN_SOLVER_SPEED);
    let mut iterations = 0;

    while iterations < max_iterations {
        let f = residual(x);
        let df = state.crank_power_derivative(x, dt, env);
        if df.abs() < MIN_DERIVATIVE {
            break;
        }
        iterations += 1;

        let newton = x - f / df;
        let newton_ok = df > 0.0 && newton > 0.0;
        let x_next = if newton_ok {
            newton
        } else if f < 0.0 {
            2.0 * x
        } else {
            0.5 * x
        };

        let power_ok = power_within_tolerance(f, power);
        let speed_ok = newton_ok && is_close(x_next, x, SPEED_ABS_TOL, SPEED_REL_TOL);
        x = x_next;

        if power_ok || speed_ok {
            let residual_power = residual(x);
            if power_within_tolerance(residual_power, power) {
                return (
                    x,
                    StepDiagnostics {
                        converged: true,
                        iterations,
                        residual_power,
                    },
                );
            }
        }
    }

    (
        x,
        StepDiagnostics {
            converged: false,
            iterations,
            residual_power: residual(x),
        },
    )
}

/// Explicit Euler step on `m_eq * dv/dt = F_prop - F_res`.
pub fn integrate_force(state: &RiderState, env: &EnvState, power: f64, dt: f64) -> f64 {
    let v = state.speed.max(MIN_SOLVER_SPEED);
    let m_eq = state.equivalent_mass();

    let f_prop = power * (1.0 - state.drivetrain_loss) / v;
    let f_res = state.resistive_force(v, env);
    let accel = (f_prop - f_res) / m_eq;

    (state.speed + accel * dt).max(0.0)
}

/// Explicit Euler step on kinetic energy `dE/dt = P_wheel - F_res * v`.
pub fn integrate_energy(state: &RiderState, env: &EnvState, power: f64, dt: f64) -> f64 {
    let v = state.speed;
    let m_eq = state.equivalent_mass();

    let p_res = state.resistive_force(v, env) * v;
    let d_energy = (power * (1.0 - state.drivetrain_loss) - p_res) * dt;
    let v2 = v * v + 2.0 * d_energy / m_eq;

    v2.max(0.0).sqrt()
}
