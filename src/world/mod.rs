//! Course geometry consumed by the physics step.

pub mod course;

pub use course::{Course, CourseError, CourseView, SegmentSpec, Wind};
