//! Fixed-timestep real-time scheduler.
//!
//! A background thread accumulates wall-clock time (scaled by the time
//! factor) and drains it in fixed `dt` steps, holding the frame lock for one
//! step at a time. Readers take the same lock only long enough to copy
//! snapshots.
//!
//! Lifecycle: `Stopped -> Running <-> Paused -> Stopped`. A step that fails
//! stops the loop and leaves a sticky physics error that blocks restarts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};

use crate::sim::engine::PhysicsEngine;
use crate::sim::error::SimError;
use crate::sim::rider::{RiderConfig, RiderId, RiderUid};
use crate::sim::snapshot::RiderSnapshot;
use crate::storage::config::SimConfig;
use crate::workouts::EffortSchedule;

/// Default fixed step in seconds
pub const DEFAULT_DT: f64 = 0.01;
/// Default cap on owed simulated time per frame, in seconds
pub const DEFAULT_MAX_ACCUMULATOR: f64 = 0.25;

/// Sleep between loop iterations
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Shared effort schedule handle.
pub type SharedSchedule = Arc<dyn EffortSchedule + Send + Sync>;

/// Scheduler lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// The physics thread was started.
    Started,
    /// Stepping was paused.
    Paused,
    /// Stepping resumed after a pause.
    Resumed,
    /// The physics thread exited.
    Stopped,
    /// A step failed and the loop stopped.
    PhysicsError { message: String },
}

/// Accumulator that turns frame times into a whole number of fixed steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedStepClock {
    dt: f64,
    max_accumulator: f64,
    accumulator: f64,
}

impl FixedStepClock {
    pub fn new(dt: f64, max_accumulator: f64) -> Self {
        Self {
            dt,
            max_accumulator,
            accumulator: 0.0,
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Simulated time owed but not yet stepped.
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Add one frame of wall time and return how many steps to run.
    ///
    /// The owed time is capped at `max_accumulator`; anything beyond it is
    /// dropped so a stall never turns into a burst of catch-up steps.
    pub fn advance(&mut self, frame_time: f64, time_factor: f64) -> u32 {
        if !(self.dt > 0.0) {
            return 0;
        }

        let scaled = frame_time * time_factor;
        if scaled > 0.0 {
            self.accumulator += scaled;
        }
        if self.accumulator > self.max_accumulator {
            tracing::debug!(
                owed = self.accumulator,
                cap = self.max_accumulator,
                "Physics behind wall clock, dropping simulated time"
            );
            self.accumulator = self.max_accumulator;
        }

        let mut steps = 0;
        while self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            steps += 1;
        }
        steps
    }

    /// Fraction of a step left in the accumulator, for interpolation.
    pub fn alpha(&self) -> f64 {
        if self.dt > 0.0 {
            self.accumulator / self.dt
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// Everything the physics thread mutates, guarded by one mutex.
pub(crate) struct Frame {
    engine: PhysicsEngine,
    schedules: HashMap<RiderId, SharedSchedule>,
    sim_seconds: f64,
}

impl Frame {
    fn new(engine: PhysicsEngine) -> Self {
        Self {
            engine,
            schedules: HashMap::new(),
            sim_seconds: 0.0,
        }
    }

    /// Apply schedules at the current time, then advance every rider.
    fn step(&mut self, dt: f64) -> Result<(), SimError> {
        for (id, schedule) in &self.schedules {
            self.engine
                .set_rider_effort(*id, schedule.effort_at(self.sim_seconds))?;
        }
        self.engine.update(dt)?;
        self.sim_seconds += dt;
        Ok(())
    }
}

/// Flags shared between the owner and the physics thread.
struct Control {
    running: AtomicBool,
    paused: AtomicBool,
    physics_error: AtomicBool,
    error_message: Mutex<Option<String>>,
    time_factor_bits: AtomicU64,
    interp_alpha_bits: AtomicU64,
}

impl Control {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            physics_error: AtomicBool::new(false),
            error_message: Mutex::new(None),
            time_factor_bits: AtomicU64::new(1.0f64.to_bits()),
            interp_alpha_bits: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    fn time_factor(&self) -> f64 {
        f64::from_bits(self.time_factor_bits.load(Ordering::Relaxed))
    }

    fn set_interp_alpha(&self, alpha: f64) {
        self.interp_alpha_bits
            .store(alpha.to_bits(), Ordering::Relaxed);
    }

    /// Record a fatal step error. The first message wins.
    fn fail(&self, error: &SimError) -> String {
        let message = error.to_string();
        tracing::error!("Physics step failed: {}", message);

        if let Ok(mut slot) = self.error_message.lock() {
            slot.get_or_insert_with(|| message.clone());
        }
        self.physics_error.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        message
    }

    fn error_message(&self) -> Option<String> {
        if !self.physics_error.load(Ordering::SeqCst) {
            return None;
        }
        let message = self
            .error_message
            .lock()
            .ok()
            .and_then(|slot| slot.clone());
        Some(message.unwrap_or_else(|| "unknown physics error".to_string()))
    }
}

fn send_event(tx: &Option<Sender<SimEvent>>, event: SimEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

/// A physics engine driven either by a background real-time loop or by
/// explicit `step_fixed` calls.
pub struct Simulation {
    frame: Arc<Mutex<Frame>>,
    control: Arc<Control>,
    dt: f64,
    max_accumulator: f64,
    event_tx: Option<Sender<SimEvent>>,
    handle: Option<JoinHandle<()>>,
}

impl Simulation {
    /// Wrap an engine with the given fixed step and accumulator cap.
    pub fn new(engine: PhysicsEngine, dt: f64, max_accumulator: f64) -> Self {
        Self {
            frame: Arc::new(Mutex::new(Frame::new(engine))),
            control: Arc::new(Control::new()),
            dt,
            max_accumulator,
            event_tx: None,
            handle: None,
        }
    }

    /// Build the course, riders and schedules described by `config`.
    pub fn from_config(config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        let course = config.course.build()?;
        let mut engine = PhysicsEngine::new(Arc::new(course), config.environment.to_env_state());
        for rider in &config.riders {
            engine.add_rider(rider)?;
        }

        let sim = Self::new(engine, config.physics.dt, config.physics.max_accumulator);
        sim.set_time_factor(config.physics.time_factor);
        for schedule in &config.schedules {
            sim.set_effort_schedule(schedule.rider_id, Arc::new(schedule.to_schedule()))?;
        }

        Ok(sim)
    }

    /// Get an event receiver for lifecycle events.
    ///
    /// Must be called before `start` for the physics thread to see it.
    pub fn event_receiver(&mut self) -> Receiver<SimEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.event_tx = Some(tx);
        rx
    }

    fn lock(&self) -> Result<MutexGuard<'_, Frame>, SimError> {
        self.frame.lock().map_err(|_| SimError::LockPoisoned)
    }

    /// Spawn the real-time loop.
    pub fn start(&mut self) -> Result<(), SimError> {
        if let Some(message) = self.physics_error() {
            return Err(SimError::PhysicsFault(message));
        }
        if self.control.running.load(Ordering::SeqCst) {
            return Err(SimError::AlreadyRunning);
        }
        self.join()?;

        self.control.paused.store(false, Ordering::SeqCst);
        self.control.running.store(true, Ordering::SeqCst);

        let frame = Arc::clone(&self.frame);
        let control = Arc::clone(&self.control);
        let event_tx = self.event_tx.clone();
        let clock = FixedStepClock::new(self.dt, self.max_accumulator);

        // Sent before spawning so it precedes every event from the loop.
        send_event(&self.event_tx, SimEvent::Started);

        let spawned = thread::Builder::new()
            .name("velosim-physics".to_string())
            .spawn(move || run_loop(frame, control, event_tx, clock));

        match spawned {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                self.control.running.store(false, Ordering::SeqCst);
                send_event(&self.event_tx, SimEvent::Stopped);
                return Err(SimError::Spawn(e));
            }
        }

        tracing::info!(
            "Simulation started (dt = {} s, time factor {})",
            self.dt,
            self.time_factor()
        );
        Ok(())
    }

    /// Stop stepping without losing accumulated state.
    pub fn pause(&self) {
        if !self.is_running() || self.control.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Simulation paused");
        send_event(&self.event_tx, SimEvent::Paused);
    }

    pub fn resume(&self) {
        if !self.is_running() || !self.control.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Simulation resumed");
        send_event(&self.event_tx, SimEvent::Resumed);
    }

    /// Ask the loop to exit at the next iteration boundary. Call `join` to
    /// wait for it.
    pub fn stop(&self) {
        self.control.paused.store(false, Ordering::SeqCst);
        if self.control.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Simulation stopping");
        }
    }

    /// Wait for the physics thread to exit.
    pub fn join(&mut self) -> Result<(), SimError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SimError::ThreadPanicked),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.is_running() && self.control.paused.load(Ordering::SeqCst)
    }

    /// Advance one fixed step on the caller's thread.
    ///
    /// Shares the frame lock with the real-time loop. Fails with the sticky
    /// error once any step has failed.
    pub fn step_fixed(&self, dt: f64) -> Result<(), SimError> {
        if let Some(message) = self.physics_error() {
            return Err(SimError::PhysicsFault(message));
        }
        if !(dt > 0.0) {
            return Ok(());
        }

        let result = self.lock()?.step(dt);
        if let Err(e) = &result {
            let message = self.control.fail(e);
            send_event(&self.event_tx, SimEvent::PhysicsError { message });
        }
        result
    }

    /// Message of the first failed step, if any.
    pub fn physics_error(&self) -> Option<String> {
        self.control.error_message()
    }

    pub fn snapshots(&self) -> Result<Vec<RiderSnapshot>, SimError> {
        Ok(self.lock()?.engine.snapshots())
    }

    pub fn rider_snapshot(&self, id: RiderId) -> Result<Option<RiderSnapshot>, SimError> {
        Ok(self.lock()?.engine.rider_by_id(id).map(RiderSnapshot::from))
    }

    /// Simulated seconds since the start.
    pub fn sim_seconds(&self) -> Result<f64, SimError> {
        Ok(self.lock()?.sim_seconds)
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut PhysicsEngine) -> R) -> Result<R, SimError> {
        Ok(f(&mut self.lock()?.engine))
    }

    pub fn add_rider(&self, config: &RiderConfig) -> Result<RiderUid, SimError> {
        self.lock()?.engine.add_rider(config)
    }

    pub fn resolve_rider_id(&self, uid: RiderUid) -> Result<Option<RiderId>, SimError> {
        Ok(self.lock()?.engine.resolve_rider_id(uid))
    }

    /// Drive a rider's effort from `schedule`, replacing any previous one.
    pub fn set_effort_schedule(
        &self,
        id: RiderId,
        schedule: SharedSchedule,
    ) -> Result<(), SimError> {
        let mut frame = self.lock()?;
        if frame.engine.rider_by_id(id).is_none() {
            return Err(SimError::UnknownRider(id));
        }
        frame.schedules.insert(id, schedule);
        Ok(())
    }

    /// Remove a rider's schedule. Returns whether one was set.
    pub fn clear_effort_schedule(&self, id: RiderId) -> Result<bool, SimError> {
        Ok(self.lock()?.schedules.remove(&id).is_some())
    }

    /// Set a rider's commanded effort. A schedule on the same rider
    /// overrides it at the next step.
    pub fn set_rider_effort(&self, id: RiderId, effort: f64) -> Result<(), SimError> {
        self.lock()?.engine.set_rider_effort(id, effort)
    }

    /// Put every rider back at the start and rewind the clock.
    pub fn reset(&self) -> Result<(), SimError> {
        let mut frame = self.lock()?;
        frame.engine.reset();
        frame.sim_seconds = 0.0;
        Ok(())
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn time_factor(&self) -> f64 {
        self.control.time_factor()
    }

    /// Simulated seconds per wall-clock second. Negative or NaN means 0.
    pub fn set_time_factor(&self, factor: f64) {
        let factor = factor.max(0.0);
        self.control
            .time_factor_bits
            .store(factor.to_bits(), Ordering::Relaxed);
    }

    /// Fraction of a step owed after the last drain.
    pub fn interp_alpha(&self) -> f64 {
        f64::from_bits(self.control.interp_alpha_bits.load(Ordering::Relaxed))
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Run `steps` fixed steps, taking the frame lock once per step so readers
/// never wait longer than a single step.
fn step_batch<'a>(
    mut lock: impl FnMut() -> Result<MutexGuard<'a, Frame>, SimError>,
    steps: u32,
    dt: f64,
) -> Result<(), SimError> {
    for _ in 0..steps {
        lock()?.step(dt)?;
    }
    Ok(())
}

fn run_loop(
    frame: Arc<Mutex<Frame>>,
    control: Arc<Control>,
    event_tx: Option<Sender<SimEvent>>,
    mut clock: FixedStepClock,
) {
    let dt = clock.dt();
    let mut t_prev = Instant::now();

    while control.running.load(Ordering::SeqCst) {
        if control.paused.load(Ordering::SeqCst) {
            t_prev = Instant::now();
            thread::sleep(IDLE_SLEEP);
            continue;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(t_prev).as_secs_f64();
        t_prev = now;

        let steps = clock.advance(frame_time, control.time_factor());
        if steps > 0 {
            let started = Instant::now();
            let lock = || frame.lock().map_err(|_| SimError::LockPoisoned);
            if let Err(e) = step_batch(lock, steps, dt) {
                let message = control.fail(&e);
                send_event(&event_tx, SimEvent::PhysicsError { message });
                break;
            }

            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > dt * f64::from(steps) {
                tracing::debug!(steps, elapsed, "Physics steps slower than real time");
            }
        }

        control.set_interp_alpha(clock.alpha());
        thread::sleep(IDLE_SLEEP);
    }

    tracing::info!("Physics thread exiting");
    send_event(&event_tx, SimEvent::Stopped);
}
