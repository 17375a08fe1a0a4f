//! Physics engine: owns the course and the riders and steps them together.

use std::sync::Arc;

use crate::physics::EnvState;
use crate::sim::error::SimError;
use crate::sim::rider::{Rider, RiderConfig, RiderId, RiderUid};
use crate::sim::snapshot::RiderSnapshot;
use crate::world::CourseView;

/// Shared course handle.
pub type SharedCourse = Arc<dyn CourseView + Send + Sync>;

/// Steps every rider on one course with a shared base environment.
pub struct PhysicsEngine {
    course: SharedCourse,
    /// Air density, gravity and bearing constants
    env: EnvState,
    riders: Vec<Rider>,
    /// Next runtime uid to hand out
    next_uid: u32,
}

impl PhysicsEngine {
    /// Create an engine with no riders.
    pub fn new(course: SharedCourse, env: EnvState) -> Self {
        Self {
            course,
            env,
            riders: Vec::new(),
            next_uid: 0,
        }
    }

    fn allocate_uid(&mut self) -> RiderUid {
        let uid = RiderUid(self.next_uid);
        self.next_uid += 1;
        uid
    }

    /// Add a rider at the start line.
    pub fn add_rider(&mut self, config: &RiderConfig) -> Result<RiderUid, SimError> {
        if self.rider_by_id(config.rider_id).is_some() {
            return Err(SimError::DuplicateRider(config.rider_id));
        }

        let uid = self.allocate_uid();
        self.riders.push(Rider::new(uid, config));

        tracing::info!(
            "Added rider {} ({}) as {} using {}",
            config.name,
            config.rider_id,
            uid,
            config.solver
        );
        Ok(uid)
    }

    /// Advance every rider by `dt`.
    pub fn update(&mut self, dt: f64) -> Result<(), SimError> {
        let course = self.course.as_ref();
        let env = &self.env;
        for rider in &mut self.riders {
            rider.update(dt, course, env)?;
        }
        Ok(())
    }

    pub fn course(&self) -> &SharedCourse {
        &self.course
    }

    pub fn course_length(&self) -> f64 {
        self.course.total_length()
    }

    pub fn env(&self) -> &EnvState {
        &self.env
    }

    pub fn riders(&self) -> &[Rider] {
        &self.riders
    }

    pub fn rider_by_id(&self, id: RiderId) -> Option<&Rider> {
        self.riders.iter().find(|r| r.id() == id)
    }

    pub fn rider_by_uid(&self, uid: RiderUid) -> Option<&Rider> {
        self.riders.iter().find(|r| r.uid() == uid)
    }

    /// Configuration id of the rider with runtime id `uid`.
    pub fn resolve_rider_id(&self, uid: RiderUid) -> Option<RiderId> {
        self.rider_by_uid(uid).map(Rider::id)
    }

    /// Set a rider's commanded effort.
    pub fn set_rider_effort(&mut self, id: RiderId, effort: f64) -> Result<(), SimError> {
        let rider = self
            .riders
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(SimError::UnknownRider(id))?;
        rider.set_effort(effort);
        Ok(())
    }

    /// Whether every rider has crossed the finish.
    pub fn all_finished(&self) -> bool {
        let length = self.course_length();
        self.riders.iter().all(|r| r.finished(length))
    }

    /// Put every rider back at the start line.
    pub fn reset(&mut self) {
        for rider in &mut self.riders {
            rider.reset();
        }
    }

    pub fn snapshots(&self) -> Vec<RiderSnapshot> {
        self.riders.iter().map(RiderSnapshot::from).collect()
    }
}
