//! Point-in-time copies of rider state for readers outside the physics thread.

use glam::DVec2;

use crate::physics::{PowerBreakdown, SolverKind};
use crate::sim::rider::{Rider, RiderId, RiderUid};

/// Everything a display needs about one rider, copied under the frame lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderSnapshot {
    pub uid: RiderUid,
    pub id: RiderId,
    pub name: String,
    pub team_id: u32,
    /// Distance along the course (m)
    pub pos: f64,
    pub altitude: f64,
    pub slope: f64,
    /// (pos, altitude)
    pub pos2d: DVec2,
    /// Crank power (W)
    pub power: f64,
    pub effort: f64,
    pub target_effort: f64,
    pub effort_limit: f64,
    pub max_effort: f64,
    /// Speed (m/s)
    pub speed: f64,
    pub km_h: f64,
    pub heading: f64,
    /// Remaining W' (J)
    pub wbal: f64,
    /// Remaining W' as a fraction of capacity
    pub energy_fraction: f64,
    pub solver: SolverKind,
    pub power_breakdown: PowerBreakdown,
}

impl From<&Rider> for RiderSnapshot {
    fn from(rider: &Rider) -> Self {
        let state = rider.state();
        Self {
            uid: rider.uid(),
            id: rider.id(),
            name: rider.name.clone(),
            team_id: rider.team.id,
            pos: state.pos,
            altitude: state.altitude,
            slope: state.slope,
            pos2d: rider.pos2d(),
            power: state.power,
            effort: state.effort,
            target_effort: state.target_effort,
            effort_limit: state.energy.effort_limit(),
            max_effort: state.energy.max_effort_base,
            speed: state.speed,
            km_h: rider.km_h(),
            heading: state.heading,
            wbal: state.energy.wbal(),
            energy_fraction: state.energy_fraction(),
            solver: state.solver,
            power_breakdown: state.breakdown,
        }
    }
}
