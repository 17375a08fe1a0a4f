//! Course profile queried by the physics step.
//!
//! A course is an ordered list of straight segments, each with a length,
//! a constant grade and a heading. Altitude is continuous and piecewise
//! linear along the course.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Course query errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CourseError {
    /// Position is negative or not a number.
    #[error("Position {0} is outside the course")]
    OutOfBounds(f64),

    /// Course has no segments.
    #[error("Course has no segments")]
    Empty,

    /// Segment has a non-positive or non-finite length.
    #[error("Segment {index} has invalid length {length}")]
    InvalidSegment { index: usize, length: f64 },
}

/// Uniform wind over the course.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wind {
    /// Direction the wind blows against, in radians (same frame as segment headings)
    pub heading: f64,
    /// Wind speed in m/s
    pub speed: f64,
}

impl Wind {
    /// Component opposing a rider travelling along `rider_heading`.
    pub fn headwind(&self, rider_heading: f64) -> f64 {
        self.speed * (self.heading - rider_heading).cos()
    }
}

/// Read-only course queries used by the physics step.
pub trait CourseView {
    /// Grade (rise/run) at `pos`.
    fn slope_at(&self, pos: f64) -> Result<f64, CourseError>;
    /// Altitude in meters at `pos`.
    fn altitude_at(&self, pos: f64) -> Result<f64, CourseError>;
    /// Wind at `pos`.
    fn wind_at(&self, pos: f64) -> Result<Wind, CourseError>;
    /// Direction of travel at `pos`, in radians.
    fn heading_at(&self, pos: f64) -> Result<f64, CourseError>;
    /// Course length in meters.
    fn total_length(&self) -> f64;
}

/// Segment description as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    /// Length in meters
    pub length: f64,
    /// Grade as rise/run
    pub slope: f64,
    /// Heading in radians
    #[serde(default)]
    pub heading: f64,
}

impl SegmentSpec {
    pub fn new(length: f64, slope: f64) -> Self {
        Self {
            length,
            slope,
            heading: 0.0,
        }
    }
}

/// A placed course segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start_x: f64,
    pub end_x: f64,
    pub slope: f64,
    pub heading: f64,
    /// Altitude at `start_x`
    pub start_altitude: f64,
}

impl Segment {
    pub fn length(&self) -> f64 {
        self.end_x - self.start_x
    }

    fn altitude_at(&self, x: f64) -> f64 {
        self.start_altitude + self.slope * (x - self.start_x)
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} m at {}%", self.length(), self.slope * 100.0)
    }
}

/// Segment-based course.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    segments: Vec<Segment>,
    total_length: f64,
    wind: Wind,
}

impl Course {
    /// Build a course from segment descriptions.
    pub fn from_segments(specs: &[SegmentSpec]) -> Result<Self, CourseError> {
        if specs.is_empty() {
            return Err(CourseError::Empty);
        }
        if let Some((index, spec)) = specs
            .iter()
            .enumerate()
            .find(|(_, s)| !(s.length > 0.0) || !s.length.is_finite())
        {
            return Err(CourseError::InvalidSegment {
                index,
                length: spec.length,
            });
        }

        Ok(Self::build(specs))
    }

    fn build(specs: &[SegmentSpec]) -> Self {
        let mut segments = Vec::with_capacity(specs.len());
        let mut x = 0.0;
        let mut y = 0.0;

        for spec in specs {
            segments.push(Segment {
                start_x: x,
                end_x: x + spec.length,
                slope: spec.slope,
                heading: spec.heading,
                start_altitude: y,
            });
            x += spec.length;
            y += spec.length * spec.slope;
        }

        Self {
            segments,
            total_length: x,
            wind: Wind::default(),
        }
    }

    /// 300 km of flat road.
    pub fn flat() -> Self {
        Self::build(&[SegmentSpec::new(300_000.0, 0.0)])
    }

    /// Short rolling course: flat, 10% and 15% ramps, flat finish.
    pub fn rolling() -> Self {
        Self::build(&[
            SegmentSpec::new(100.0, 0.0),
            SegmentSpec::new(200.0, 0.10),
            SegmentSpec::new(200.0, 0.15),
            SegmentSpec::new(500.0, 0.0),
        ])
    }

    /// Set the course-wide wind.
    pub fn with_wind(mut self, wind: Wind) -> Self {
        self.wind = wind;
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn wind(&self) -> Wind {
        self.wind
    }

    /// Index of the segment containing `pos`.
    ///
    /// Positions past the finish resolve to the last segment.
    pub fn find_segment(&self, pos: f64) -> Result<usize, CourseError> {
        if !(pos >= 0.0) {
            return Err(CourseError::OutOfBounds(pos));
        }
        let idx = self.segments.partition_point(|s| s.end_x <= pos);
        Ok(idx.min(self.segments.len() - 1))
    }

    fn segment_at(&self, pos: f64) -> Result<&Segment, CourseError> {
        let idx = self.find_segment(pos)?;
        Ok(&self.segments[idx])
    }

    /// Altitude profile between two positions: both endpoints plus every
    /// segment break strictly between them.
    pub fn profile_points(&self, x_min: f64, x_max: f64) -> Result<Vec<DVec2>, CourseError> {
        let (lo, hi) = if x_min <= x_max {
            (x_min, x_max)
        } else {
            (x_max, x_min)
        };
        let lo = lo.max(0.0);
        let hi = hi.max(lo).min(self.total_length);

        let mut points = vec![DVec2::new(lo, self.altitude_at(lo)?)];
        points.extend(
            self.segments
                .iter()
                .filter(|s| s.start_x > lo && s.start_x < hi)
                .map(|s| DVec2::new(s.start_x, s.start_altitude)),
        );
        points.push(DVec2::new(hi, self.altitude_at(hi)?));

        Ok(points)
    }
}

impl CourseView for Course {
    fn slope_at(&self, pos: f64) -> Result<f64, CourseError> {
        Ok(self.segment_at(pos)?.slope)
    }

    fn altitude_at(&self, pos: f64) -> Result<f64, CourseError> {
        let segment = self.segment_at(pos)?;
        Ok(segment.altitude_at(pos.min(self.total_length)))
    }

    fn wind_at(&self, pos: f64) -> Result<Wind, CourseError> {
        if !(pos >= 0.0) {
            return Err(CourseError::OutOfBounds(pos));
        }
        Ok(self.wind)
    }

    fn heading_at(&self, pos: f64) -> Result<f64, CourseError> {
        Ok(self.segment_at(pos)?.heading)
    }

    fn total_length(&self) -> f64 {
        self.total_length
    }
}
