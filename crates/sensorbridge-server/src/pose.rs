//! `GET /pose` – latest tracker pose as JSON.
//!
//! The handler only reads the pose slot; it never touches the hardware.  An
//! optional `epoch` query parameter is accepted for client-side
//! bookkeeping and otherwise ignored.

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sensorbridge_middleware::LatestSlot;
use sensorbridge_types::{BridgeError, PoseSample, Quaternion, Vec3};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::cors;

/// Default TCP port of the pose endpoint.
pub const DEFAULT_POSE_PORT: u16 = 3001;

pub const POSE_UNAVAILABLE: &str = "Tracker pose not available or invalid";
pub const POSE_INTERNAL_ERROR: &str = "Internal server error processing pose data";
pub const UNKNOWN_ENDPOINT: &str = "Endpoint not found. Use /pose";

/// Shared state of the pose router.
#[derive(Clone)]
pub struct PoseState {
    poses: Arc<LatestSlot<PoseSample>>,
}

impl PoseState {
    pub fn new(poses: Arc<LatestSlot<PoseSample>>) -> Self {
        Self { poses }
    }
}

/// Build the pose router.  Unknown paths get a plain-text 404; every
/// `OPTIONS` request is answered by the CORS layer.
pub fn router(state: PoseState) -> Router {
    Router::new()
        .route("/pose", get(pose))
        .fallback(unknown_endpoint)
        .layer(cors::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

/// `{"data":{"timestamp":…,"pose":{"position":…,"rotation":…},"serial_number":…}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseResponse {
    pub data: PoseData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseData {
    pub timestamp: f64,
    pub pose: PoseBody,
    pub serial_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseBody {
    pub position: Vec3,
    pub rotation: Quaternion,
}

impl PoseResponse {
    /// Convert a valid sample into its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Conversion`] when the rotation cannot be turned
    /// into a quaternion or any number is not finite.
    pub fn from_sample(sample: &PoseSample) -> Result<Self, BridgeError> {
        let position = sample.transform.position;
        if !position.is_finite() || !sample.timestamp.is_finite() {
            return Err(BridgeError::Conversion("non-finite position or timestamp".into()));
        }
        let rotation = sample.transform.rotation.to_quaternion()?;
        Ok(Self {
            data: PoseData {
                timestamp: sample.timestamp,
                pose: PoseBody { position, rotation },
                serial_number: sample.device_id.clone(),
            },
        })
    }
}

/// Error body of the pose endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

async fn pose(State(state): State<PoseState>, RawQuery(query): RawQuery) -> Response {
    if let Some(query) = query.as_deref() {
        debug!(query, "pose query parameters ignored");
    }

    let sample = match state.poses.peek() {
        Some(sample) if sample.valid => sample,
        other => {
            let serial_number = other
                .filter(PoseSample::has_device_id)
                .map(|s| s.device_id);
            let body = PoseError {
                error: POSE_UNAVAILABLE.to_string(),
                serial_number,
                details: None,
            };
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
    };

    match PoseResponse::from_sample(&sample) {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            error!(error = %e, device = %sample.device_id, "failed to render pose");
            let body = PoseError {
                error: POSE_INTERNAL_ERROR.to_string(),
                serial_number: None,
                details: Some(e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn unknown_endpoint() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(CONTENT_TYPE, "text/plain")],
        UNKNOWN_ENDPOINT,
    )
        .into_response()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
