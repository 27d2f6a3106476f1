//! In-process tracking simulation for CI/CD testing without physical hardware.
//!
//! [`SimTracker`] implements [`TrackingSystem`] with a configurable device
//! list, scripted motion, and fault injection.  A [`SimProbe`] handle lets
//! tests observe the session from outside the polling thread.
//!
//! # Example
//!
//! ```rust
//! use sensorbridge_hal::sim::{SimTracker, SimMotion};
//! use sensorbridge_hal::{DeviceClass, TrackingSession};
//! use sensorbridge_types::TrackerTransform;
//!
//! let mut sim = SimTracker::new()
//!     .with_device(DeviceClass::Hmd, "HMD-0")
//!     .with_tracker("LHR-SIM-1", SimMotion::Static(TrackerTransform::identity()));
//! let probe = sim.probe();
//!
//! {
//!     let mut session = TrackingSession::open(&mut sim).unwrap();
//!     let index = session.find_first(DeviceClass::GenericTracker).unwrap();
//!     assert!(session.device_pose(index).unwrap().valid);
//! }
//! assert!(probe.released());
//! ```

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use sensorbridge_types::{BridgeError, Quaternion, TrackerTransform, Vec3};

use crate::tracker::{DeviceClass, TrackedPose, TrackingSystem};

// ────────────────────────────────────────────────────────────────────────────
// Motion scripts
// ────────────────────────────────────────────────────────────────────────────

/// How a simulated device moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimMotion {
    /// Fixed pose.
    Static(TrackerTransform),
    /// Horizontal circle around the tracking-space origin at `height`
    /// metres, facing the direction of travel, one lap per `period`.
    Orbit {
        radius: f64,
        height: f64,
        period: Duration,
    },
}

impl SimMotion {
    fn transform_at(&self, elapsed: Duration) -> TrackerTransform {
        match *self {
            SimMotion::Static(t) => t,
            SimMotion::Orbit {
                radius,
                height,
                period,
            } => {
                let period = period.as_secs_f64().max(f64::EPSILON);
                let angle = TAU * (elapsed.as_secs_f64() / period);
                let position = Vec3::new(radius * angle.cos(), height, radius * angle.sin());
                // Yaw about the vertical (+Y) axis.
                let (s, c) = (-angle / 2.0).sin_cos();
                let rotation = Quaternion::new(c, 0.0, s, 0.0).to_matrix();
                TrackerTransform::new(position, rotation)
            }
        }
    }
}

struct SimDevice {
    class: DeviceClass,
    serial: String,
    motion: SimMotion,
    tracking: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Probe
// ────────────────────────────────────────────────────────────────────────────

/// Shared view of a [`SimTracker`]'s session state.
#[derive(Debug, Clone, Default)]
pub struct SimProbe {
    initialised: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
}

impl SimProbe {
    /// `true` once `init` has succeeded.
    pub fn initialised(&self) -> bool {
        self.initialised.load(Ordering::SeqCst)
    }

    /// `true` once `shutdown` has been called.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of successful pose queries.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimTracker
// ────────────────────────────────────────────────────────────────────────────

/// Simulated tracking runtime.
///
/// Devices occupy indices in the order they were added.
pub struct SimTracker {
    devices: Vec<SimDevice>,
    init_error: Option<String>,
    fault_after: Option<usize>,
    started: Instant,
    probe: SimProbe,
}

impl Default for SimTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTracker {
    /// Create a runtime with no devices attached.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            init_error: None,
            fault_after: None,
            started: Instant::now(),
            probe: SimProbe::default(),
        }
    }

    /// A runtime with one generic tracker orbiting at desk height.  Used by
    /// the `sim` backend of the CLI.
    pub fn demo() -> Self {
        Self::new()
            .with_device(DeviceClass::TrackingReference, "LHB-SIM-A")
            .with_device(DeviceClass::TrackingReference, "LHB-SIM-B")
            .with_tracker(
                "LHR-SIM-0001",
                SimMotion::Orbit {
                    radius: 0.25,
                    height: 0.9,
                    period: Duration::from_secs(8),
                },
            )
    }

    /// Attach a non-moving device of any class.
    pub fn with_device(mut self, class: DeviceClass, serial: impl Into<String>) -> Self {
        self.devices.push(SimDevice {
            class,
            serial: serial.into(),
            motion: SimMotion::Static(TrackerTransform::identity()),
            tracking: true,
        });
        self
    }

    /// Attach a generic tracker following `motion`.
    pub fn with_tracker(mut self, serial: impl Into<String>, motion: SimMotion) -> Self {
        self.devices.push(SimDevice {
            class: DeviceClass::GenericTracker,
            serial: serial.into(),
            motion,
            tracking: true,
        });
        self
    }

    /// Make every device report `valid == false` (occluded from the base
    /// stations).
    pub fn without_tracking_lock(mut self) -> Self {
        for d in &mut self.devices {
            d.tracking = false;
        }
        self
    }

    /// Make `init` fail with `message`.
    pub fn fail_init(mut self, message: impl Into<String>) -> Self {
        self.init_error = Some(message.into());
        self
    }

    /// Fail every pose query after `polls` successful ones.
    pub fn fault_after(mut self, polls: usize) -> Self {
        self.fault_after = Some(polls);
        self
    }

    /// Handle for observing this runtime after it has moved to the poller.
    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }
}

impl TrackingSystem for SimTracker {
    fn name(&self) -> &str {
        "sim"
    }

    fn init(&mut self) -> Result<(), BridgeError> {
        if let Some(msg) = &self.init_error {
            return Err(BridgeError::hardware("sim", msg.clone()));
        }
        self.started = Instant::now();
        self.probe.initialised.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_class(&self, index: usize) -> DeviceClass {
        self.devices
            .get(index)
            .map_or(DeviceClass::Invalid, |d| d.class)
    }

    fn serial_number(&self, index: usize) -> Result<String, BridgeError> {
        self.devices
            .get(index)
            .map(|d| d.serial.clone())
            .ok_or_else(|| BridgeError::hardware("sim", format!("no device at index {index}")))
    }

    fn device_pose(&mut self, index: usize) -> Result<TrackedPose, BridgeError> {
        let device = self
            .devices
            .get(index)
            .ok_or_else(|| BridgeError::hardware("sim", format!("no device at index {index}")))?;
        if let Some(limit) = self.fault_after
            && self.probe.polls() >= limit
        {
            return Err(BridgeError::hardware(
                device.serial.clone(),
                "simulated runtime failure",
            ));
        }
        let transform = device.motion.transform_at(self.started.elapsed());
        self.probe.polls.fetch_add(1, Ordering::SeqCst);
        Ok(TrackedPose::new(&transform, device.tracking))
    }

    fn shutdown(&mut self) {
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_tracker_reports_its_pose() {
        let mut t = TrackerTransform::identity();
        t.position = Vec3::new(1.0, 2.0, 3.0);
        let mut sim = SimTracker::new().with_tracker("LHR-1", SimMotion::Static(t));
        sim.init().unwrap();
        let pose = sim.device_pose(0).unwrap();
        assert!(pose.valid);
        assert_eq!(pose.transform(), t);
        assert_eq!(sim.probe().polls(), 1);
    }

    #[test]
    fn orbit_stays_on_circle_with_proper_rotation() {
        let motion = SimMotion::Orbit {
            radius: 0.5,
            height: 1.0,
            period: Duration::from_secs(4),
        };
        for ms in [0u64, 700, 1_000, 2_500] {
            let t = motion.transform_at(Duration::from_millis(ms));
            let r = (t.position.x.powi(2) + t.position.z.powi(2)).sqrt();
            assert!((r - 0.5).abs() < 1e-9);
            assert!((t.position.y - 1.0).abs() < 1e-12);
            assert!((t.rotation.determinant() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn devices_keep_insertion_order() {
        let sim = SimTracker::demo();
        assert_eq!(sim.device_count(), 3);
        assert_eq!(sim.device_class(0), DeviceClass::TrackingReference);
        assert_eq!(sim.device_class(2), DeviceClass::GenericTracker);
        assert_eq!(sim.device_class(7), DeviceClass::Invalid);
        assert_eq!(sim.serial_number(2).unwrap(), "LHR-SIM-0001");
        assert!(sim.serial_number(9).is_err());
    }

    #[test]
    fn fault_after_fails_subsequent_polls() {
        let mut sim = SimTracker::new()
            .with_tracker("LHR-F", SimMotion::Static(TrackerTransform::identity()))
            .fault_after(2);
        sim.init().unwrap();
        assert!(sim.device_pose(0).is_ok());
        assert!(sim.device_pose(0).is_ok());
        assert!(matches!(
            sim.device_pose(0),
            Err(BridgeError::HardwareFault { .. })
        ));
    }

    #[test]
    fn lost_lock_is_not_an_error() {
        let mut sim = SimTracker::new()
            .with_tracker("LHR-O", SimMotion::Static(TrackerTransform::identity()))
            .without_tracking_lock();
        sim.init().unwrap();
        assert!(!sim.device_pose(0).unwrap().valid);
    }

    #[test]
    fn init_failure_and_release_are_observable() {
        let mut failing = SimTracker::new().fail_init("runtime missing");
        assert!(failing.init().is_err());
        assert!(!failing.probe().initialised());

        let mut sim = SimTracker::new();
        let probe = sim.probe();
        sim.init().unwrap();
        sim.shutdown();
        assert!(probe.initialised());
        assert!(probe.released());
    }
}
