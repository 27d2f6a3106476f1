//! Generic `TrackingSystem` trait for pose-tracking hardware.
//!
//! Modelled on lighthouse-style runtimes: a session is initialised once,
//! devices live at fixed indices `0..device_count()`, and each index reports
//! its class, serial number and current pose.

use sensorbridge_types::{BridgeError, RotationMatrix, TrackerTransform, Vec3};
use tracing::{info, warn};

/// Upper bound on device indices a tracking runtime exposes.
pub const MAX_TRACKED_DEVICES: usize = 64;

/// Kind of device occupying a tracking index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Empty index.
    Invalid,
    /// Head-mounted display.
    Hmd,
    /// Hand-held controller.
    Controller,
    /// Stand-alone puck tracker (e.g. strapped to a probe).
    GenericTracker,
    /// Base station.
    TrackingReference,
    DisplayRedirect,
}

/// One pose reading as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPose {
    /// Row-major 3×4 device-to-tracking-space matrix.
    pub device_to_absolute: [[f32; 4]; 3],
    /// `false` when the device has no tracking lock.
    pub valid: bool,
}

impl TrackedPose {
    pub fn new(transform: &TrackerTransform, valid: bool) -> Self {
        let rows = transform.to_rows_3x4();
        let mut device_to_absolute = [[0.0f32; 4]; 3];
        for (dst, src) in device_to_absolute.iter_mut().zip(rows.iter()) {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = *s as f32;
            }
        }
        Self {
            device_to_absolute,
            valid,
        }
    }

    /// Widen to `f64` and split into position and orientation.
    pub fn transform(&self) -> TrackerTransform {
        let m = &self.device_to_absolute;
        let row = |r: usize| {
            [
                f64::from(m[r][0]),
                f64::from(m[r][1]),
                f64::from(m[r][2]),
            ]
        };
        TrackerTransform::new(
            Vec3::new(
                f64::from(m[0][3]),
                f64::from(m[1][3]),
                f64::from(m[2][3]),
            ),
            RotationMatrix([row(0), row(1), row(2)]),
        )
    }
}

/// A pose-tracking runtime (lighthouse, optical, simulated, …).
///
/// Implementations are owned by exactly one polling thread, hence `Send`
/// but not `Sync`.
pub trait TrackingSystem: Send {
    /// Human-readable backend name for logs, e.g. `"sim"`.
    fn name(&self) -> &str;

    /// Open the runtime session.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::HardwareFault`] if the runtime is unavailable.
    fn init(&mut self) -> Result<(), BridgeError>;

    /// Number of device indices to scan.
    fn device_count(&self) -> usize;

    /// Class of the device at `index`; [`DeviceClass::Invalid`] when empty.
    fn device_class(&self, index: usize) -> DeviceClass;

    /// Stable hardware serial number of the device at `index`.
    fn serial_number(&self, index: usize) -> Result<String, BridgeError>;

    /// Current (unpredicted) pose of the device at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::HardwareFault`] when the runtime fails; a
    /// device without tracking lock is *not* an error, it reports
    /// `valid == false`.
    fn device_pose(&mut self, index: usize) -> Result<TrackedPose, BridgeError>;

    /// Close the runtime session.  Must tolerate being called once after a
    /// successful [`init`](Self::init).
    fn shutdown(&mut self);
}

/// Scoped ownership of an initialised [`TrackingSystem`].
///
/// Dropping the session calls [`TrackingSystem::shutdown`], so the hardware
/// is released however the polling loop exits (normal stop, no device,
/// fault, or panic unwind).
pub struct TrackingSession<'a, S: TrackingSystem + ?Sized> {
    system: &'a mut S,
}

impl<'a, S: TrackingSystem + ?Sized> TrackingSession<'a, S> {
    /// Initialise `system` and take scoped ownership of the session.
    ///
    /// When `init` fails nothing was opened and nothing will be released.
    pub fn open(system: &'a mut S) -> Result<Self, BridgeError> {
        system.init()?;
        info!(backend = system.name(), "tracking session initialised");
        Ok(Self { system })
    }

    /// Index of the first device of `class`, scanning from index 0.
    pub fn find_first(&self, class: DeviceClass) -> Option<usize> {
        let count = self.system.device_count().min(MAX_TRACKED_DEVICES);
        (0..count).find(|&i| self.system.device_class(i) == class)
    }

    pub fn serial_number(&self, index: usize) -> Result<String, BridgeError> {
        self.system.serial_number(index)
    }

    pub fn device_pose(&mut self, index: usize) -> Result<TrackedPose, BridgeError> {
        self.system.device_pose(index)
    }
}

impl<S: TrackingSystem + ?Sized> Drop for TrackingSession<'_, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(backend = self.system.name(), "releasing tracking session during panic");
        } else {
            info!(backend = self.system.name(), "releasing tracking session");
        }
        self.system.shutdown();
    }
}
