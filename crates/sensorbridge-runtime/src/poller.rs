//! [`TrackerPoller`] – fixed-rate hardware polling loop.
//!
//! The poller is the only owner of its [`TrackingSystem`].  One run:
//!
//! 1. open a [`TrackingSession`] (released when the run ends, however it
//!    ends);
//! 2. pick the first device of the configured class, or publish an invalid
//!    sample and stop if there is none;
//! 3. until the shutdown flag is raised: stamp the wall clock, query the
//!    pose, publish it, sleep one interval.
//!
//! A hardware error invalidates the current sample and ends the run.  There
//! is no automatic retry; restarting the bridge is an operator action.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sensorbridge_hal::sim::{SimMotion, SimTracker};
//! use sensorbridge_middleware::LatestSlot;
//! use sensorbridge_runtime::poller::{PollOutcome, TrackerPoller};
//! use sensorbridge_types::TrackerTransform;
//!
//! let sim = SimTracker::new()
//!     .with_tracker("LHR-1", SimMotion::Static(TrackerTransform::identity()));
//! let poses = Arc::new(LatestSlot::new());
//! let mut handle = TrackerPoller::new(sim, Arc::clone(&poses)).spawn().unwrap();
//!
//! while poses.peek().is_none() {
//!     std::thread::sleep(Duration::from_millis(1));
//! }
//! assert!(poses.peek().unwrap().valid);
//! assert_eq!(handle.stop(Duration::from_secs(1)).unwrap(), PollOutcome::Stopped);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sensorbridge_hal::{DeviceClass, TrackingSession, TrackingSystem};
use sensorbridge_middleware::LatestSlot;
use sensorbridge_server::DEFAULT_SHUTDOWN_TIMEOUT;
use sensorbridge_types::{BridgeError, PoseSample, now_epoch};
use tracing::{debug, error, info, warn};

/// Default delay between two hardware queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

const THREAD_NAME: &str = "pose-poller";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration and outcome
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Class of the device to follow; the first one found wins.
    pub device_class: DeviceClass,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            device_class: DeviceClass::GenericTracker,
        }
    }
}

/// Why a polling run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The shutdown flag was raised.
    Stopped,
    /// No device of the configured class was attached.
    NoDevice,
    /// The tracking runtime failed (at init or mid-run).
    Fault(BridgeError),
}

// ─────────────────────────────────────────────────────────────────────────────
// TrackerPoller
// ─────────────────────────────────────────────────────────────────────────────

pub struct TrackerPoller<S> {
    system: S,
    poses: Arc<LatestSlot<PoseSample>>,
    shutdown: Arc<AtomicBool>,
    config: PollerConfig,
}

impl<S: TrackingSystem> TrackerPoller<S> {
    pub fn new(system: S, poses: Arc<LatestSlot<PoseSample>>) -> Self {
        Self {
            system,
            poses,
            shutdown: Arc::new(AtomicBool::new(false)),
            config: PollerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    /// Flag that ends the loop at the next iteration when set to `true`.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the polling loop on the current thread until it ends.
    pub fn run(&mut self) -> PollOutcome {
        let poses = Arc::clone(&self.poses);
        let shutdown = Arc::clone(&self.shutdown);
        let config = self.config;

        // Declared before the session so it is dropped after it.
        let _panic_guard = InvalidateOnPanic { poses: &poses };

        let mut session = match TrackingSession::open(&mut self.system) {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "failed to open tracking session");
                invalidate(&poses, "");
                return PollOutcome::Fault(e);
            }
        };

        let Some(index) = session.find_first(config.device_class) else {
            warn!(class = ?config.device_class, "no matching tracked device found");
            poses.publish(PoseSample::unavailable(""));
            return PollOutcome::NoDevice;
        };

        let serial = match session.serial_number(index) {
            Ok(serial) => serial,
            Err(e) => {
                error!(error = %e, index, "failed to read device serial number");
                invalidate(&poses, "");
                return PollOutcome::Fault(e);
            }
        };
        info!(device_id = %serial, index, interval = ?config.interval, "polling tracked device");

        while !shutdown.load(Ordering::SeqCst) {
            let timestamp = now_epoch();
            match session.device_pose(index) {
                Ok(pose) => {
                    if !pose.valid {
                        debug!(device_id = %serial, "device has no tracking lock");
                    }
                    poses.publish(PoseSample::new(
                        timestamp,
                        pose.transform(),
                        pose.valid,
                        serial.as_str(),
                    ));
                }
                Err(e) => {
                    error!(device_id = %serial, error = %e, "pose query failed; polling stopped");
                    invalidate(&poses, &serial);
                    return PollOutcome::Fault(e);
                }
            }
            thread::sleep(config.interval);
        }

        info!(device_id = %serial, "poller stopped");
        PollOutcome::Stopped
    }
}

impl<S: TrackingSystem + 'static> TrackerPoller<S> {
    /// Move the poller onto a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the thread cannot be spawned.
    pub fn spawn(mut self) -> Result<PollerHandle, BridgeError> {
        let shutdown = self.shutdown_flag();
        let (done_tx, done_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = self.run();
                let _ = done_tx.send(outcome);
            })?;
        Ok(PollerHandle {
            shutdown,
            done: done_rx,
            thread: Some(thread),
        })
    }
}

/// Mark the current sample invalid, keeping its device id and last pose.
fn invalidate(poses: &LatestSlot<PoseSample>, device_id: &str) {
    poses.update(|prev| match prev {
        Some(sample) => sample.clone().invalidated(),
        None => PoseSample::unavailable(device_id),
    });
}

struct InvalidateOnPanic<'a> {
    poses: &'a LatestSlot<PoseSample>,
}

impl Drop for InvalidateOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("poller panicked; marking pose invalid");
            invalidate(self.poses, "");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PollerHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a poller running on its own thread.
pub struct PollerHandle {
    shutdown: Arc<AtomicBool>,
    done: Receiver<PollOutcome>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// `true` once the loop has ended on its own or been stopped.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Raise the shutdown flag and wait at most `timeout` for the loop (and
    /// with it the tracking session) to end.
    ///
    /// Calling `stop` again after it returned reports [`PollOutcome::Stopped`].
    ///
    /// # Errors
    ///
    /// [`BridgeError::ShutdownTimeout`] if the thread is still running at the
    /// deadline (it is left detached), [`BridgeError::HardwareFault`] if it
    /// panicked.
    pub fn stop(&mut self, timeout: Duration) -> Result<PollOutcome, BridgeError> {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return Ok(PollOutcome::Stopped);
        };
        match self.done.recv_timeout(timeout) {
            Ok(outcome) => {
                let _ = thread.join();
                Ok(outcome)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(BridgeError::hardware(THREAD_NAME, "polling thread panicked"))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "poller did not stop in time; detaching");
                Err(BridgeError::ShutdownTimeout {
                    component: THREAD_NAME.to_string(),
                    waited: timeout,
                })
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.stop(DEFAULT_SHUTDOWN_TIMEOUT)
        {
            warn!(error = %e, "poller shutdown on drop was not clean");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
