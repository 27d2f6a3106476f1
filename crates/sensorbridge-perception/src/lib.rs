//! `sensorbridge-perception` – offline analysis of tracker recordings.
//!
//! # Modules
//!
//! - [`calibration`] – [`CalibrationReport`][calibration::CalibrationReport]:
//!   checks whether a tracker-mounted probe tip reports a stable position
//!   when pivoted around a fixed point.

pub mod calibration;

pub use calibration::{CalibrationReport, load_dataset, load_position};
