//! Simulation configuration.
//!
//! Loaded from TOML at the platform data directory, or from an explicit
//! path. Every section has defaults, so a missing file or a partial file
//! both produce a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::physics::power::{AIR_DENSITY, BEARING_C0, BEARING_C1, GRAVITY};
use crate::physics::EnvState;
use crate::sim::rider::{RiderConfig, RiderId};
use crate::sim::scheduler::{DEFAULT_DT, DEFAULT_MAX_ACCUMULATOR};
use crate::workouts::{EffortBlock, StepEffortSchedule};
use crate::world::{Course, CourseError, SegmentSpec, Wind};

/// How the binary drives the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Background thread paced by the wall clock
    #[default]
    Realtime,
    /// Step as fast as possible until the riders finish
    Offline,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Realtime => write!(f, "Realtime"),
            RunMode::Offline => write!(f, "Offline"),
        }
    }
}

/// Simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Application version
    pub version: String,
    /// Directory the configuration was loaded from
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub physics: PhysicsSettings,
    pub environment: EnvironmentSettings,
    pub course: CourseSettings,
    pub run: RunSettings,
    pub riders: Vec<RiderConfig>,
    pub schedules: Vec<ScheduleConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            physics: PhysicsSettings::default(),
            environment: EnvironmentSettings::default(),
            course: CourseSettings::default(),
            run: RunSettings::default(),
            riders: vec![RiderConfig::generic()],
            schedules: Vec::new(),
        }
    }
}

/// Fixed-step integration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Fixed step in seconds
    pub dt: f64,
    /// Simulated seconds per wall-clock second
    pub time_factor: f64,
    /// Most simulated time one frame may owe, in seconds
    pub max_accumulator: f64,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            dt: DEFAULT_DT,
            time_factor: 1.0,
            max_accumulator: DEFAULT_MAX_ACCUMULATOR,
        }
    }
}

/// Physical constants shared by all riders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Air density (kg/m³)
    pub rho: f64,
    /// Gravitational acceleration (m/s²)
    pub g: f64,
    pub bearing_c0: f64,
    pub bearing_c1: f64,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            rho: AIR_DENSITY,
            g: GRAVITY,
            bearing_c0: BEARING_C0,
            bearing_c1: BEARING_C1,
        }
    }
}

impl EnvironmentSettings {
    /// Base environment: still air on a flat road.
    pub fn to_env_state(&self) -> EnvState {
        EnvState {
            rho: self.rho,
            g: self.g,
            bearing_c0: self.bearing_c0,
            bearing_c1: self.bearing_c1,
            ..EnvState::default()
        }
    }
}

/// Course layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseSettings {
    pub segments: Vec<SegmentSpec>,
    pub wind: Wind,
}

impl Default for CourseSettings {
    fn default() -> Self {
        Self {
            segments: Course::rolling()
                .segments()
                .iter()
                .map(|s| SegmentSpec {
                    length: s.length(),
                    slope: s.slope,
                    heading: s.heading,
                })
                .collect(),
            wind: Wind::default(),
        }
    }
}

impl CourseSettings {
    pub fn build(&self) -> Result<Course, CourseError> {
        Ok(Course::from_segments(&self.segments)?.with_wind(self.wind))
    }
}

/// Effort blocks for one rider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub rider_id: RiderId,
    pub blocks: Vec<EffortBlock>,
}

impl ScheduleConfig {
    pub fn to_schedule(&self) -> StepEffortSchedule {
        StepEffortSchedule::new(self.blocks.clone())
    }
}

/// Settings for the binary's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub mode: RunMode,
    /// Longest run in simulated seconds
    pub duration_secs: f64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: RunMode::Realtime,
            duration_secs: 3600.0,
        }
    }
}

impl SimConfig {
    /// Check that every value is physically sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let physics = &self.physics;
        if !(physics.dt > 0.0) || !physics.dt.is_finite() {
            return Err(invalid(format!("physics.dt must be positive, got {}", physics.dt)));
        }
        if !(physics.time_factor >= 0.0) || !physics.time_factor.is_finite() {
            return Err(invalid(format!(
                "physics.time_factor must be non-negative, got {}",
                physics.time_factor
            )));
        }
        if !(physics.max_accumulator >= physics.dt) || !physics.max_accumulator.is_finite() {
            return Err(invalid(format!(
                "physics.max_accumulator must be at least dt, got {}",
                physics.max_accumulator
            )));
        }

        let env = &self.environment;
        if !(env.rho > 0.0) || !(env.g > 0.0) {
            return Err(invalid("environment.rho and environment.g must be positive"));
        }
        if !(env.bearing_c0 >= 0.0) || !(env.bearing_c1 >= 0.0) {
            return Err(invalid("bearing coefficients must be non-negative"));
        }

        self.course
            .build()
            .map_err(|e| invalid(format!("course: {}", e)))?;

        for (i, rider) in self.riders.iter().enumerate() {
            validate_rider(rider)?;
            if self.riders[..i].iter().any(|r| r.rider_id == rider.rider_id) {
                return Err(invalid(format!("duplicate rider id {}", rider.rider_id)));
            }
        }

        for schedule in &self.schedules {
            if !self.riders.iter().any(|r| r.rider_id == schedule.rider_id) {
                return Err(invalid(format!(
                    "schedule for unknown rider {}",
                    schedule.rider_id
                )));
            }
            if schedule
                .blocks
                .iter()
                .any(|b| !(b.duration >= 0.0) || !b.effort.is_finite())
            {
                return Err(invalid(format!(
                    "schedule for rider {} has an invalid block",
                    schedule.rider_id
                )));
            }
        }

        if !(self.run.duration_secs > 0.0) {
            return Err(invalid(format!(
                "run.duration_secs must be positive, got {}",
                self.run.duration_secs
            )));
        }

        Ok(())
    }
}

fn validate_rider(rider: &RiderConfig) -> Result<(), ConfigError> {
    let id = rider.rider_id;
    let positive = [
        ("ftp_base", rider.ftp_base),
        ("w_prime_base", rider.w_prime_base),
        ("max_effort", rider.max_effort),
        ("mass", rider.mass),
        ("bike.mass", rider.bike.mass),
        ("bike.wheel_r", rider.bike.wheel_r),
    ];
    if let Some((name, value)) = positive.iter().find(|(_, v)| !(*v > 0.0) || !v.is_finite()) {
        return Err(invalid(format!("rider {}: {} must be positive, got {}", id, name, value)));
    }

    let non_negative = [
        ("cda", rider.cda),
        ("bike.wheel_i", rider.bike.wheel_i),
        ("bike.wheel_drag_factor", rider.bike.wheel_drag_factor),
        ("bike.crr", rider.bike.crr),
    ];
    if let Some((name, value)) = non_negative
        .iter()
        .find(|(_, v)| !(*v >= 0.0) || !v.is_finite())
    {
        return Err(invalid(format!(
            "rider {}: {} must be non-negative, got {}",
            id, name, value
        )));
    }

    let loss = rider.bike.drivetrain_loss;
    if !(0.0..1.0).contains(&loss) {
        return Err(invalid(format!(
            "rider {}: bike.drivetrain_loss must be in [0, 1), got {}",
            id, loss
        )));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "velosim", "Velosim")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load configuration from the data directory.
pub fn load_config() -> Result<SimConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<SimConfig, ConfigError> {
    let data_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    if !path.exists() {
        tracing::info!("No config at {}, using defaults", path.display());
        return Ok(SimConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: SimConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = data_dir;
    tracing::info!(
        "Loaded config from {} ({} riders)",
        path.display(),
        config.riders.len()
    );

    Ok(config)
}

/// Save configuration to the data directory.
pub fn save_config(config: &SimConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save configuration to `path`.
pub fn save_config_to(config: &SimConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
