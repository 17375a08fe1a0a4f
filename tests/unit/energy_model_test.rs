//! Unit tests for the W' balance energy model and effort limiters.

use velosim::physics::limiter::{DEFAULT_EFFORT_FLOOR, DEFAULT_RAMP_THRESHOLD};
use velosim::physics::{piecewise, EffortLimiter, EnergyState};

fn rider_energy() -> EnergyState {
    EnergyState::new(300.0, 20000.0, 1.5)
}

// =============================================================================
// W' Balance Tests
// =============================================================================

#[test]
fn test_wbal_never_negative_under_sustained_overload() {
    let mut e = rider_energy();

    for i in 0..1000 {
        e.update(450.0, 0.1);
        assert!(e.wbal() >= 0.0, "wbal went negative at step {}: {}", i, e.wbal());
        assert!(e.fatigue() <= e.w_prime);
    }

    // 150 W over threshold for 100 s is 15 kJ of a 20 kJ reservoir
    assert!((e.wbal() - 5000.0).abs() < 1e-6);
}

#[test]
fn test_wbal_clamps_at_empty() {
    let mut e = rider_energy();
    for _ in 0..5000 {
        e.update(600.0, 0.1);
    }
    assert_eq!(e.wbal(), 0.0);
    assert_eq!(e.wbal_fraction(), 0.0);
}

#[test]
fn test_recovery_is_monotonic_below_threshold() {
    let mut e = rider_energy();
    for _ in 0..600 {
        e.update(500.0, 0.1);
    }

    let mut previous = e.wbal();
    for i in 0..3000 {
        e.update(150.0, 0.1);
        assert!(
            e.wbal() >= previous,
            "wbal dropped during recovery at step {}",
            i
        );
        previous = e.wbal();
    }
    assert!(e.wbal() <= e.w_prime);
}

#[test]
fn test_easier_riding_recovers_faster() {
    let easy = rider_energy().recovery_tau(100.0);
    let hard = rider_energy().recovery_tau(280.0);
    assert!(easy < hard);
    // At threshold tau is base + offset
    assert!((rider_energy().recovery_tau(300.0) - 862.0).abs() < 1e-9);
}

#[test]
fn test_non_positive_dt_is_noop() {
    let mut e = rider_energy();
    e.update(500.0, 10.0);
    let before = e;
    e.update(500.0, 0.0);
    e.update(500.0, -1.0);
    assert_eq!(e, before);
}

#[test]
fn test_zero_capacity_is_safe() {
    let mut e = EnergyState::new(300.0, 0.0, 1.5);
    e.update(400.0, 1.0);
    assert_eq!(e.wbal_fraction(), 0.0);
    assert_eq!(e.fatigue(), 0.0);
    assert!(e.effort_limit() >= DEFAULT_EFFORT_FLOOR);
}

#[test]
fn test_reset_is_exact() {
    let mut e = rider_energy();
    for _ in 0..2000 {
        e.update(520.0, 0.1);
    }
    e.ftp = 250.0;

    e.reset();
    assert_eq!(e.fatigue(), 0.0);
    assert_eq!(e.effort_limit(), e.max_effort_base);
    assert_eq!(e.ftp, e.ftp_base);
    assert_eq!(e.w_expended, 0.0);

    let once = e;
    e.reset();
    assert_eq!(e, once);
}

#[test]
fn test_time_to_exhaustion() {
    let mut e = rider_energy();
    assert_eq!(e.time_to_exhaustion(300.0), None);
    assert_eq!(e.time_to_exhaustion(400.0), Some(200.0));

    for _ in 0..100 {
        e.update(400.0, 1.0);
    }
    let remaining = e.time_to_exhaustion(400.0).unwrap();
    assert!((remaining - 100.0).abs() < 1e-6);
}

// =============================================================================
// Effort Limit Tests
// =============================================================================

#[test]
fn test_effort_limit_approaches_floor() {
    let mut e = rider_energy();
    let mut previous = e.effort_limit();

    for _ in 0..3000 {
        e.update(450.0, 0.1);
        let limit = e.effort_limit();
        assert!(limit >= DEFAULT_EFFORT_FLOOR, "limit {} below floor", limit);
        assert!(limit <= e.max_effort_base, "limit {} above max", limit);
        assert!(limit <= previous + 1e-12);
        previous = limit;
    }

    assert!((e.effort_limit() - DEFAULT_EFFORT_FLOOR).abs() < 1e-9);
}

#[test]
fn test_effort_limit_full_above_threshold() {
    let mut e = rider_energy();
    // 10 kJ used leaves half of W', well above the ramp threshold
    for _ in 0..100 {
        e.update(400.0, 1.0);
    }
    assert_eq!(e.effort_limit(), 1.5);
}

#[test]
fn test_sigmoid_limiter_bounds() {
    let limiter = EffortLimiter::sigmoid_default();
    assert!((limiter.effort_limit(0.0, 1.5) - DEFAULT_EFFORT_FLOOR).abs() < 1e-12);
    assert!((limiter.effort_limit(1.0, 1.5) - 1.5).abs() < 1e-12);

    let mut previous = limiter.effort_limit(0.0, 1.5);
    for i in 1..=100 {
        let limit = limiter.effort_limit(i as f64 / 100.0, 1.5);
        assert!(limit >= previous);
        previous = limit;
    }
}

#[test]
fn test_floor_never_exceeds_max() {
    let limiter = EffortLimiter::default();
    assert_eq!(limiter.effort_limit(0.0, 0.5), 0.5);
    assert_eq!(limiter.effort_limit(1.0, 0.5), 0.5);
}

#[test]
fn test_with_limiter_refreshes_ceiling() {
    let e = rider_energy().with_limiter(EffortLimiter::sigmoid_default());
    assert_eq!(*e.limiter(), EffortLimiter::sigmoid_default());
    assert!((e.effort_limit() - 1.5).abs() < 1e-12);
}

// =============================================================================
// Piecewise Ramp Tests
// =============================================================================

#[test]
fn test_piecewise_values() {
    assert_eq!(piecewise(0.5, DEFAULT_RAMP_THRESHOLD), Some(1.0));
    assert!((piecewise(0.1, DEFAULT_RAMP_THRESHOLD).unwrap() - 0.5).abs() < 1e-12);
    assert_eq!(piecewise(-0.1, DEFAULT_RAMP_THRESHOLD), Some(0.0));
}

#[test]
fn test_piecewise_invalid_threshold() {
    assert_eq!(piecewise(0.5, 0.0), None);
    assert_eq!(piecewise(0.5, -1.0), None);
    assert_eq!(piecewise(0.5, f64::NAN), None);

    // A limiter with a degenerate ramp falls back to a step
    let limiter = EffortLimiter::Piecewise {
        threshold: 0.0,
        floor: 0.8,
    };
    assert_eq!(limiter.effort_limit(0.01, 1.5), 1.5);
    assert_eq!(limiter.effort_limit(0.0, 1.5), 0.8);
}
