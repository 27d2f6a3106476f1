//! `sensorbridge-types` – shared vocabulary of the sensor bridges.
//!
//! Leaf crate with no dependency on the rest of the workspace.
//!
//! # Modules
//!
//! - [`geometry`] – [`Vec3`], [`Quaternion`], [`RotationMatrix`] and the
//!   tracking-space [`TrackerTransform`].
//! - [`pose`] – [`PoseSample`], the record the hardware poller publishes.
//! - [`frame`] – [`PixelGrid`], [`IntensityGrid`] and [`CapturedFrame`], the
//!   record the capture endpoint publishes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod frame;
pub mod geometry;
pub mod pose;

pub use frame::{CAPTURE_EPOCH_KEY, CapturedFrame, IntensityGrid, Metadata, PixelGrid};
pub use geometry::{Quaternion, RotationMatrix, TrackerTransform, Vec3};
pub use pose::PoseSample;

/// Seconds since the Unix epoch, with sub-second precision.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// The current wall-clock time as [`epoch_seconds`].
pub fn now_epoch() -> f64 {
    epoch_seconds(Utc::now())
}

/// Error type spanning malformed input, hardware faults, response
/// conversion faults, and resource lifecycle failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("No file uploaded")]
    MissingUpload,

    #[error("No image data in request body")]
    EmptyBody,

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("No generic tracker detected; check that it is powered on and in view of the base stations")]
    NoTrackerFound,

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Pose conversion failed: {0}")]
    Conversion(String),

    #[error("Failed to bind {addr}: {details}")]
    Bind { addr: String, details: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{component} did not shut down within {waited:?}")]
    ShutdownTimeout { component: String, waited: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calibration analysis failed: {0}")]
    Calibration(String),
}

impl BridgeError {
    /// Shorthand for a [`BridgeError::HardwareFault`].
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        Self::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// `true` for errors caused by the caller's request rather than by the
    /// bridge itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedContentType(_)
                | Self::MissingUpload
                | Self::EmptyBody
                | Self::BodyTooLarge { .. }
                | Self::InvalidUpload(_)
                | Self::Decode(_)
        )
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
