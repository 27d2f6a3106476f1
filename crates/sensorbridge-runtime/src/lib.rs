//! `sensorbridge-runtime` – lifecycle objects for the two bridges.
//!
//! # Modules
//!
//! - [`poller`] – [`TrackerPoller`][poller::TrackerPoller]: owns a
//!   [`TrackingSystem`][sensorbridge_hal::TrackingSystem] on a dedicated
//!   thread and publishes a [`PoseSample`][sensorbridge_types::PoseSample]
//!   every poll interval.
//! - [`capture_bridge`] – [`CaptureBridge`][capture_bridge::CaptureBridge]:
//!   `POST /capture` server plus the blocking
//!   [`get_next_image`][capture_bridge::CaptureBridge::get_next_image]
//!   consumer call.
//! - [`pose_bridge`] – [`PoseBridge`][pose_bridge::PoseBridge]: poller plus
//!   `GET /pose` server with ordered shutdown.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.
//!
//! # Shutdown order
//!
//! [`PoseBridge::stop`][pose_bridge::PoseBridge::stop] signals the poller,
//! joins it with a deadline (the tracking session is released on the poller
//! thread as the loop exits), and only then closes the HTTP listener.  Both
//! waits are bounded; exceeding one is logged and reported, never hung on.

pub mod capture_bridge;
pub mod poller;
pub mod pose_bridge;
pub mod telemetry;

pub use capture_bridge::{CaptureBridge, CaptureConfig, FrameReceiver};
pub use poller::{PollOutcome, PollerConfig, PollerHandle, TrackerPoller};
pub use pose_bridge::{PoseBridge, PoseConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
