//! W' balance energy model.
//!
//! Tracks how much of a rider's anaerobic work capacity (W') is in use:
//! - Power above threshold (FTP) depletes W' linearly
//! - Power at or below threshold recovers it exponentially, faster the
//!   further power sits below threshold (Skiba/Waterworth time constant)
//! - The remaining fraction is turned into an effort ceiling by an
//!   [`EffortLimiter`]

use serde::{Deserialize, Serialize};

use super::limiter::EffortLimiter;

/// Baseline recovery time constant in seconds.
pub const DEFAULT_TAU_BASE: f64 = 546.0;
/// Exponential sensitivity of tau to the power deficit below FTP (1/W).
pub const DEFAULT_TAU_SLOPE: f64 = 0.01;
/// Constant part of tau in seconds.
pub const DEFAULT_TAU_OFFSET: f64 = 316.0;

/// One rider's anaerobic work reservoir.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyState {
    /// Threshold power when fresh (W)
    pub ftp_base: f64,
    /// Current threshold power (W)
    pub ftp: f64,
    /// Total anaerobic capacity (J)
    pub w_prime: f64,
    /// Total work done since the last reset (J)
    pub w_expended: f64,
    /// Effort ceiling when fully recovered
    pub max_effort_base: f64,
    /// Baseline recovery time constant (s)
    pub tau_base: f64,
    /// Sensitivity of tau to the power deficit (1/W)
    pub tau_slope: f64,
    /// Constant part of tau (s)
    pub tau_offset: f64,
    fatigue: f64,
    effort_limit: f64,
    limiter: EffortLimiter,
}

impl EnergyState {
    /// Create a fresh energy state with the default recovery constants and
    /// the piecewise limiter.
    pub fn new(ftp: f64, w_prime: f64, max_effort_base: f64) -> Self {
        Self {
            ftp_base: ftp,
            ftp,
            w_prime,
            w_expended: 0.0,
            max_effort_base,
            tau_base: DEFAULT_TAU_BASE,
            tau_slope: DEFAULT_TAU_SLOPE,
            tau_offset: DEFAULT_TAU_OFFSET,
            fatigue: 0.0,
            effort_limit: max_effort_base,
            limiter: EffortLimiter::default(),
        }
    }

    /// Replace the effort limiter.
    pub fn with_limiter(mut self, limiter: EffortLimiter) -> Self {
        self.limiter = limiter;
        self.refresh_effort_limit();
        self
    }

    /// Return to the fresh state without changing any parameters.
    pub fn reset(&mut self) {
        self.fatigue = 0.0;
        self.w_expended = 0.0;
        self.effort_limit = self.max_effort_base;
        self.ftp = self.ftp_base;
    }

    /// Advance the reservoir by one step at constant `power`.
    ///
    /// A non-positive `dt` leaves the state untouched.
    pub fn update(&mut self, power: f64, dt: f64) {
        if !(dt > 0.0) {
            return;
        }

        self.w_expended += power * dt;

        if power > self.ftp {
            self.fatigue += (power - self.ftp) * dt;
        } else {
            let alpha = (-dt / self.recovery_tau(power)).exp();
            self.fatigue *= alpha;
        }

        // w_prime <= 0 must not make the clamp bounds cross
        self.fatigue = self.fatigue.max(0.0).min(self.w_prime.max(0.0));

        self.refresh_effort_limit();
    }

    /// Recovery time constant at the given (sub-threshold) power.
    pub fn recovery_tau(&self, power: f64) -> f64 {
        let deficit = self.ftp - power;
        self.tau_base * (-self.tau_slope * deficit).exp() + self.tau_offset
    }

    /// Remaining W' in joules.
    pub fn wbal(&self) -> f64 {
        self.w_prime - self.fatigue
    }

    /// Remaining W' as a fraction of capacity, 0 for a non-positive capacity.
    pub fn wbal_fraction(&self) -> f64 {
        if self.w_prime <= 0.0 {
            return 0.0;
        }
        self.wbal() / self.w_prime
    }

    /// Current effort ceiling.
    pub fn effort_limit(&self) -> f64 {
        self.effort_limit
    }

    /// Accumulated fatigue integral in joules.
    pub fn fatigue(&self) -> f64 {
        self.fatigue
    }

    pub fn limiter(&self) -> &EffortLimiter {
        &self.limiter
    }

    /// Time until W' is empty when riding at `power`.
    /// Returns None at or below threshold, where W' does not deplete.
    pub fn time_to_exhaustion(&self, power: f64) -> Option<f64> {
        if power <= self.ftp {
            return None;
        }
        Some(self.wbal().max(0.0) / (power - self.ftp))
    }

    fn refresh_effort_limit(&mut self) {
        self.effort_limit = self
            .limiter
            .effort_limit(self.wbal_fraction(), self.max_effort_base);
    }
}
