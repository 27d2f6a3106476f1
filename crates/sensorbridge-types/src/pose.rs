//! [`PoseSample`] – one reading of a tracked device.

use serde::{Deserialize, Serialize};

use crate::geometry::TrackerTransform;

/// A single pose reading published by the hardware poller.
///
/// Samples are replaced wholesale on every poll tick; readers always receive
/// an owned copy, so a reader can never see fields from two different ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Seconds since the Unix epoch, read immediately before the hardware
    /// query.
    pub timestamp: f64,
    /// Device pose in tracking space.
    pub transform: TrackerTransform,
    /// `false` when the device has no tracking lock or the poller has faulted.
    pub valid: bool,
    /// Hardware serial number.  Empty until a device has been discovered;
    /// retained across invalid samples afterwards.
    pub device_id: String,
}

impl PoseSample {
    /// A tracked reading.
    pub fn new(
        timestamp: f64,
        transform: TrackerTransform,
        valid: bool,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            transform,
            valid,
            device_id: device_id.into(),
        }
    }

    /// A placeholder that carries no pose, only (optionally) the device id.
    pub fn unavailable(device_id: impl Into<String>) -> Self {
        Self::new(0.0, TrackerTransform::identity(), false, device_id)
    }

    /// Same reading, marked invalid.  Keeps the device id and last pose.
    pub fn invalidated(mut self) -> Self {
        self.valid = false;
        self
    }

    /// `true` once a device has been discovered.
    pub fn has_device_id(&self) -> bool {
        !self.device_id.is_empty()
    }
}
