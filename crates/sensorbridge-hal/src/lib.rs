//! `sensorbridge-hal` – hardware capabilities consumed by the bridges.
//!
//! The bridges never talk to a vendor SDK directly.  They hold a trait
//! object or generic implementing one of the capabilities below, so real
//! drivers and simulated ones are interchangeable.
//!
//! # Modules
//!
//! - [`tracker`] – [`TrackingSystem`]: device enumeration, per-device pose
//!   query, and session init/shutdown; [`TrackingSession`] releases the
//!   session on every exit path.
//! - [`decoder`] – [`ImageDecoder`]: turns an uploaded byte buffer into a
//!   [`PixelGrid`][sensorbridge_types::PixelGrid]; [`RasterDecoder`] is the
//!   `image`-crate implementation.
//! - [`sim`] – [`SimTracker`]: deterministic tracking system for tests and
//!   hardware-free runs.

pub mod decoder;
pub mod sim;
pub mod tracker;

pub use decoder::{ImageDecoder, RasterDecoder};
pub use sim::{SimMotion, SimProbe, SimTracker};
pub use tracker::{DeviceClass, MAX_TRACKED_DEVICES, TrackedPose, TrackingSession, TrackingSystem};
