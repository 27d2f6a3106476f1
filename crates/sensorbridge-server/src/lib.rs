//! `sensorbridge-server` – the network endpoints of both bridges.
//!
//! Two independent axum routers, each backed by a shared
//! [`LatestSlot`][sensorbridge_middleware::LatestSlot]:
//!
//! | Router | Route | Direction |
//! |---|---|---|
//! | [`capture::router`] | `POST /capture` | clients push frames into the slot |
//! | [`pose::router`] | `GET /pose` | clients poll the latest pose out of the slot |
//!
//! Both answer CORS pre-flight requests permissively so browser pages can
//! call them directly.  [`http::spawn`] runs a router on its own Tokio
//! runtime and returns a [`ServerHandle`] for graceful shutdown.

pub mod capture;
pub mod cors;
pub mod http;
pub mod pose;

pub use capture::{CaptureAck, CaptureState, DEFAULT_CAPTURE_PORT};
pub use http::{DEFAULT_SHUTDOWN_TIMEOUT, ServerHandle};
pub use pose::{DEFAULT_POSE_PORT, PoseResponse, PoseState};
