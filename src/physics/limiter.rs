//! Effort ceiling as a function of remaining W'.
//!
//! The limiter maps the W' balance fraction (1.0 = fresh, 0.0 = empty) onto
//! an effort multiplier between a floor and the rider's fresh maximum. The
//! floor keeps an exhausted rider turning the pedals instead of stopping dead.

use serde::{Deserialize, Serialize};

/// W' fraction below which the piecewise ramp starts limiting effort.
pub const DEFAULT_RAMP_THRESHOLD: f64 = 0.2;
/// Effort ceiling retained at total exhaustion.
pub const DEFAULT_EFFORT_FLOOR: f64 = 0.8;
/// Sigmoid steepness.
pub const DEFAULT_SIGMOID_K: f64 = 30.0;
/// Sigmoid midpoint (W' fraction).
pub const DEFAULT_SIGMOID_X0: f64 = 0.15;

/// Linear ramp from 0 at `x <= 0` to 1 at `x >= threshold`.
///
/// Returns `None` for a non-positive (or NaN) threshold, which has no
/// meaningful ramp.
pub fn piecewise(x: f64, threshold: f64) -> Option<f64> {
    if !(threshold > 0.0) {
        return None;
    }

    let s = if x <= 0.0 {
        0.0
    } else if x >= threshold {
        1.0
    } else {
        x / threshold
    };
    Some(s)
}

/// Logistic curve `1 / (1 + exp(-k (x - x0)))`.
pub fn sigmoid(x: f64, k: f64, x0: f64) -> f64 {
    1.0 / (1.0 + (-k * (x - x0)).exp())
}

/// Mapping from W' fraction to effort ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffortLimiter {
    /// Linear ramp below `threshold`, flat above it.
    Piecewise { threshold: f64, floor: f64 },
    /// Logistic curve rescaled to hit `floor` at 0 and the maximum at 1.
    Sigmoid { k: f64, x0: f64, floor: f64 },
}

impl Default for EffortLimiter {
    fn default() -> Self {
        EffortLimiter::Piecewise {
            threshold: DEFAULT_RAMP_THRESHOLD,
            floor: DEFAULT_EFFORT_FLOOR,
        }
    }
}

impl EffortLimiter {
    /// Sigmoid limiter with the default steepness and midpoint.
    pub fn sigmoid_default() -> Self {
        EffortLimiter::Sigmoid {
            k: DEFAULT_SIGMOID_K,
            x0: DEFAULT_SIGMOID_X0,
            floor: DEFAULT_EFFORT_FLOOR,
        }
    }

    /// Configured effort floor.
    pub fn floor(&self) -> f64 {
        match *self {
            EffortLimiter::Piecewise { floor, .. } | EffortLimiter::Sigmoid { floor, .. } => floor,
        }
    }

    /// Normalized limiting factor in `[0, 1]`.
    pub fn shape(&self, wbal_fraction: f64) -> f64 {
        let step = if wbal_fraction > 0.0 { 1.0 } else { 0.0 };

        match *self {
            EffortLimiter::Piecewise { threshold, .. } => {
                piecewise(wbal_fraction, threshold).unwrap_or(step)
            }
            EffortLimiter::Sigmoid { k, x0, .. } => {
                let lo = sigmoid(0.0, k, x0);
                let hi = sigmoid(1.0, k, x0);
                let span = hi - lo;
                if !(span > 0.0) {
                    return step;
                }
                let x = wbal_fraction.clamp(0.0, 1.0);
                ((sigmoid(x, k, x0) - lo) / span).clamp(0.0, 1.0)
            }
        }
    }

    /// Effort ceiling for the given W' fraction and fresh maximum.
    ///
    /// The result always lies in `[min(floor, max_effort), max_effort]`.
    pub fn effort_limit(&self, wbal_fraction: f64, max_effort: f64) -> f64 {
        let s = self.shape(wbal_fraction);
        if s >= 1.0 {
            return max_effort;
        }

        let floor = self.floor().min(max_effort).max(0.0);
        (floor + (max_effort - floor) * s).clamp(floor, max_effort.max(floor))
    }
}
