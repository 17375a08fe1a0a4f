//! Unit tests for the speed solvers and the per-rider step.

use velosim::physics::solver::{
    solve_power_balance, solve_power_balance_capped, MAX_NEWTON_ITERATIONS, MIN_SOLVER_SPEED,
    POWER_ABS_TOL, POWER_REL_TOL,
};
use velosim::physics::{EnvState, PowerTerm, RiderState, SolverKind};

fn rider(solver: SolverKind) -> RiderState {
    let mut r = RiderState::new(300.0, 20000.0, 1.5, 75.0, 0.30);
    r.mass_bike = 8.0;
    r.solver = solver;
    r.target_effort = 1.0;
    r
}

fn ride(r: &mut RiderState, env: &EnvState, dt: f64, seconds: f64) {
    let steps = (seconds / dt).round() as usize;
    for _ in 0..steps {
        r.step(env, dt);
    }
}

// =============================================================================
// Newton Solver Tests
// =============================================================================

#[test]
fn test_newton_converges_for_common_steps() {
    let env = EnvState::flat();
    let tolerance = POWER_ABS_TOL + POWER_REL_TOL * 300.0;

    for dt in [0.001, 0.01, 0.1, 1.0] {
        let mut r = rider(SolverKind::PowerBalance);
        r.speed = 0.1;
        let (speed, diag) = solve_power_balance(&r, &env, 300.0, dt);

        assert!(diag.converged, "no convergence at dt = {}", dt);
        assert!(diag.iterations >= 1 && diag.iterations <= MAX_NEWTON_ITERATIONS);
        assert!(
            diag.residual_power.abs() <= tolerance,
            "residual {} at dt = {}",
            diag.residual_power,
            dt
        );
        assert!(speed > 0.1);
    }
}

#[test]
fn test_newton_on_climb_and_headwind() {
    let mut r = rider(SolverKind::PowerBalance);
    r.speed = 4.0;
    let env = EnvState::flat().with_slope(0.15).with_headwind(5.0);

    let (speed, diag) = solve_power_balance(&r, &env, 450.0, 0.01);
    assert!(diag.converged);
    assert!(speed > 0.0);
}

#[test]
fn test_newton_rolls_away_downhill_from_rest() {
    let env = EnvState::flat().with_slope(-0.15);
    let tolerance = POWER_ABS_TOL + POWER_REL_TOL * 250.0;

    let mut implicit = rider(SolverKind::PowerBalance);
    let mut explicit = rider(SolverKind::AccelEnergy);
    implicit.target_effort = 250.0 / 300.0;
    explicit.target_effort = 250.0 / 300.0;

    let diag = implicit.step(&env, 0.1).unwrap();
    assert!(diag.converged, "first step: {:?}", diag);
    assert!(diag.residual_power.abs() <= tolerance, "first step: {:?}", diag);
    assert!(implicit.speed > 0.0 && implicit.pos > 0.0);
    explicit.step(&env, 0.1);

    for _ in 1..50 {
        let diag = implicit.step(&env, 0.1).unwrap();
        assert!(diag.converged, "{:?} at {} m/s", diag, implicit.speed);
        explicit.step(&env, 0.1);
    }

    assert!(implicit.speed > 5.0, "speed after 5 s was {}", implicit.speed);
    assert!(
        (implicit.speed - explicit.speed).abs() < 2.0,
        "implicit {} m/s vs explicit {} m/s",
        implicit.speed,
        explicit.speed
    );
}

#[test]
fn test_steep_descent_with_long_step() {
    let mut r = rider(SolverKind::PowerBalance);
    let env = EnvState::flat().with_slope(-0.5);

    let (speed, diag) = solve_power_balance(&r, &env, 2000.0, 10.0);
    assert!(diag.converged, "{:?}", diag);
    assert!(diag.residual_power.abs() <= POWER_ABS_TOL + POWER_REL_TOL * 2000.0);
    assert!(speed > 10.0, "speed was {}", speed);

    r.speed = speed;
    let (_, diag) = solve_power_balance(&r, &env, 0.0, 10.0);
    assert!(diag.converged, "coasting: {:?}", diag);
}

#[test]
fn test_iteration_cap_is_reported() {
    let mut r = rider(SolverKind::PowerBalance);
    r.speed = 0.1;
    let env = EnvState::flat();

    let (speed, diag) = solve_power_balance_capped(&r, &env, 300.0, 0.01, 2);
    assert!(!diag.converged);
    assert_eq!(diag.iterations, 2);
    assert!(speed > 0.1);
    assert!(diag.residual_power.abs() > POWER_ABS_TOL + POWER_REL_TOL * 300.0);

    // The full cap is plenty for the same solve
    let (_, diag) = solve_power_balance(&r, &env, 300.0, 0.01);
    assert!(diag.converged);
    assert!(diag.iterations > 2 && diag.iterations <= MAX_NEWTON_ITERATIONS);
}

#[test]
fn test_unconverged_step_still_moves_rider() {
    // Massless, dragless rider: crank power is flat in speed
    let mut r = rider(SolverKind::PowerBalance);
    r.mass_rider = 0.0;
    r.mass_bike = 0.0;
    r.wheel_i = 0.0;
    r.cda_rider = 0.0;
    let env = EnvState {
        bearing_c0: 0.0,
        bearing_c1: 0.0,
        ..EnvState::flat()
    };

    let diag = r.step(&env, 0.1).unwrap();
    assert!(!diag.converged);
    assert_eq!(diag.iterations, 0);
    assert_eq!(diag.residual_power, -300.0);
    assert_eq!(r.speed, MIN_SOLVER_SPEED);
    assert!((r.pos - MIN_SOLVER_SPEED * 0.1).abs() < 1e-12);
}

#[test]
fn test_step_records_diagnostics_only_for_newton() {
    let env = EnvState::flat();
    let mut implicit = rider(SolverKind::PowerBalance);
    let mut explicit = rider(SolverKind::AccelEnergy);

    assert!(implicit.step(&env, 0.01).is_some());
    assert!(explicit.step(&env, 0.01).is_none());
}

// =============================================================================
// Steady State Tests
// =============================================================================

#[test]
fn test_all_solvers_reach_power_balance() {
    let env = EnvState::flat();

    for solver in [
        SolverKind::PowerBalance,
        SolverKind::AccelForce,
        SolverKind::AccelEnergy,
    ] {
        let mut r = rider(solver);
        ride(&mut r, &env, 0.01, 300.0);

        let needed = r.crank_power(r.speed, r.speed, 0.01, &env);
        assert!(
            (needed - 300.0).abs() < 2.0,
            "{} settled at {} m/s needing {} W",
            solver,
            r.speed,
            needed
        );
    }
}

#[test]
fn test_climbing_is_slower() {
    let mut flat = rider(SolverKind::PowerBalance);
    let mut climb = rider(SolverKind::PowerBalance);

    ride(&mut flat, &EnvState::flat(), 0.1, 120.0);
    ride(&mut climb, &EnvState::flat().with_slope(0.08), 0.1, 120.0);

    assert!(climb.speed < flat.speed);
    assert!(climb.breakdown.get(PowerTerm::Gravity) > 0.0);
    assert_eq!(flat.breakdown.get(PowerTerm::Gravity), 0.0);
}

#[test]
fn test_breakdown_sums_to_power() {
    let mut r = rider(SolverKind::PowerBalance);
    let env = EnvState::flat().with_slope(0.03);
    ride(&mut r, &env, 0.01, 30.0);

    // Converged Newton steps balance within the solver tolerance
    let total = r.breakdown.total();
    assert!((total - r.power).abs() < 1.0, "breakdown {} vs power {}", total, r.power);
}

#[test]
fn test_sustained_overload_is_capped() {
    let mut r = rider(SolverKind::PowerBalance);
    r.target_effort = 2.0;
    let env = EnvState::flat();

    r.step(&env, 0.1);
    assert_eq!(r.effort, 1.5);

    ride(&mut r, &env, 0.1, 600.0);
    assert!(r.effort <= 1.5);
    assert!(r.energy.wbal() >= 0.0);
    assert!(r.effort >= 0.8 - 1e-9);
}
