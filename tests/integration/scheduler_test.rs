//! Integration tests for the real-time physics thread.

use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use velosim::physics::EnvState;
use velosim::sim::{PhysicsEngine, RiderConfig, RiderId, SimError, SimEvent, Simulation};
use velosim::world::{Course, CourseError, CourseView, Wind};

/// Course that fails every query past `fail_after` meters.
struct FaultyCourse {
    inner: Course,
    fail_after: f64,
}

impl FaultyCourse {
    fn check(&self, pos: f64) -> Result<(), CourseError> {
        if pos > self.fail_after {
            Err(CourseError::OutOfBounds(pos))
        } else {
            Ok(())
        }
    }
}

impl CourseView for FaultyCourse {
    fn slope_at(&self, pos: f64) -> Result<f64, CourseError> {
        self.check(pos)?;
        self.inner.slope_at(pos)
    }

    fn altitude_at(&self, pos: f64) -> Result<f64, CourseError> {
        self.check(pos)?;
        self.inner.altitude_at(pos)
    }

    fn wind_at(&self, pos: f64) -> Result<Wind, CourseError> {
        self.check(pos)?;
        self.inner.wind_at(pos)
    }

    fn heading_at(&self, pos: f64) -> Result<f64, CourseError> {
        self.check(pos)?;
        self.inner.heading_at(pos)
    }

    fn total_length(&self) -> f64 {
        self.inner.total_length()
    }
}

fn simulation_on(course: Arc<dyn CourseView + Send + Sync>) -> Simulation {
    let mut engine = PhysicsEngine::new(course, EnvState::default());
    engine.add_rider(&RiderConfig::generic()).unwrap();
    Simulation::new(engine, 0.01, 0.25)
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_lifecycle() {
    let mut sim = simulation_on(Arc::new(Course::flat()));
    let events = sim.event_receiver();
    assert!(!sim.is_running());

    sim.start().unwrap();
    assert!(sim.is_running());
    assert!(matches!(sim.start(), Err(SimError::AlreadyRunning)));

    assert!(wait_for(Duration::from_secs(5), || sim.sim_seconds().unwrap() > 0.05));

    sim.pause();
    assert!(sim.is_paused());
    sleep(Duration::from_millis(50));
    let paused_at = sim.sim_seconds().unwrap();
    sleep(Duration::from_millis(100));
    assert_eq!(sim.sim_seconds().unwrap(), paused_at);

    sim.resume();
    assert!(!sim.is_paused());
    assert!(wait_for(Duration::from_secs(5), || sim.sim_seconds().unwrap() > paused_at));

    sim.stop();
    sim.join().unwrap();
    assert!(!sim.is_running());
    assert!(sim.physics_error().is_none());

    let received: Vec<SimEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            SimEvent::Started,
            SimEvent::Paused,
            SimEvent::Resumed,
            SimEvent::Stopped
        ]
    );

    let snap = sim.rider_snapshot(RiderId(0)).unwrap().unwrap();
    assert!(snap.pos > 0.0);
    assert!(snap.speed > 0.0);
}

#[test]
fn test_restart_after_stop() {
    let mut sim = simulation_on(Arc::new(Course::flat()));
    sim.start().unwrap();
    sim.stop();
    sim.join().unwrap();

    sim.start().unwrap();
    assert!(sim.is_running());
    sim.stop();
    sim.join().unwrap();
}

#[test]
fn test_time_factor_speeds_up_simulation() {
    let mut sim = simulation_on(Arc::new(Course::flat()));
    sim.set_time_factor(4.0);
    sim.start().unwrap();

    sleep(Duration::from_millis(300));
    sim.stop();
    sim.join().unwrap();

    // Real time would have reached about 0.3 s
    assert!(sim.sim_seconds().unwrap() > 0.3);
    assert!(sim.interp_alpha() >= 0.0 && sim.interp_alpha() < 1.0);
}

#[test]
fn test_physics_error_is_sticky() {
    let course = Arc::new(FaultyCourse {
        inner: Course::flat(),
        fail_after: 5.0,
    });
    let mut sim = simulation_on(course);
    sim.set_time_factor(20.0);
    let events = sim.event_receiver();

    sim.start().unwrap();
    assert!(wait_for(Duration::from_secs(10), || sim.physics_error().is_some()));
    sim.join().unwrap();

    assert!(!sim.is_running());
    let message = sim.physics_error().unwrap();
    assert!(message.contains("outside the course"), "message was {}", message);

    assert!(matches!(sim.start(), Err(SimError::PhysicsFault(_))));
    assert!(matches!(sim.step_fixed(0.01), Err(SimError::PhysicsFault(_))));

    let received: Vec<SimEvent> = events.try_iter().collect();
    assert_eq!(received.first(), Some(&SimEvent::Started));
    assert!(received.contains(&SimEvent::PhysicsError { message }));
    assert_eq!(received.last(), Some(&SimEvent::Stopped));

    // The failing step never got applied past the fault
    let snap = sim.rider_snapshot(RiderId(0)).unwrap().unwrap();
    assert!(snap.pos > 5.0);
}

#[test]
fn test_started_precedes_immediate_failure() {
    // Every query fails, so the very first step errors out
    let course = Arc::new(FaultyCourse {
        inner: Course::flat(),
        fail_after: -1.0,
    });
    let mut sim = simulation_on(course);
    let events = sim.event_receiver();

    sim.start().unwrap();
    assert!(wait_for(Duration::from_secs(10), || sim.physics_error().is_some()));
    sim.join().unwrap();

    let received: Vec<SimEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 3, "events were {:?}", received);
    assert_eq!(received[0], SimEvent::Started);
    assert!(matches!(received[1], SimEvent::PhysicsError { .. }));
    assert_eq!(received[2], SimEvent::Stopped);
}

#[test]
fn test_step_fixed_shares_state_with_loop() {
    let sim = simulation_on(Arc::new(Course::flat()));
    sim.set_rider_effort(RiderId(0), 1.5).unwrap();
    for _ in 0..100 {
        sim.step_fixed(0.01).unwrap();
    }
    let snap = sim.rider_snapshot(RiderId(0)).unwrap().unwrap();
    assert_eq!(snap.effort, 1.5);
    assert!((snap.power - 375.0).abs() < 1e-9);
    assert!(matches!(
        sim.set_rider_effort(RiderId(3), 1.0),
        Err(SimError::UnknownRider(RiderId(3)))
    ));
}
