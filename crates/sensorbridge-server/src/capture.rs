//! `POST /capture` – frame ingestion.
//!
//! Accepts either a `multipart/form-data` upload with a file part named
//! `file`, or a raw body declared as `image/*`.  The image is decoded on the
//! blocking pool, stamped with the server's receipt time, and published to
//! the frame slot, overwriting any frame the consumer has not taken yet.
//!
//! Metadata travels in the optional `X-Metadata` header and is only parsed
//! when `X-Metadata-Content-Type: application/json`.  Bad metadata never
//! rejects a frame; it is recorded inside the metadata instead.
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | accepted | 200 | `{"status":"success"}` |
//! | unsupported content type | 415 | `{"status":"error","message":"Unsupported content type: …"}` |
//! | missing file / empty body / malformed multipart | 400 | error envelope |
//! | body over the limit | 413 | error envelope |
//! | undecodable image | 422 | error envelope |
//! | decoder or internal fault | 500 | error envelope |

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use sensorbridge_hal::ImageDecoder;
use sensorbridge_middleware::LatestSlot;
use sensorbridge_types::{BridgeError, CapturedFrame, Metadata, PixelGrid, epoch_seconds};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::cors;

/// Default TCP port of the capture endpoint.
pub const DEFAULT_CAPTURE_PORT: u16 = 3000;

/// Default upper bound on an upload, multipart or raw.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub const METADATA_HEADER: &str = "x-metadata";
pub const METADATA_CONTENT_TYPE_HEADER: &str = "x-metadata-content-type";

/// Multipart part carrying the image.
const UPLOAD_FIELD: &str = "file";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared state of the capture router.
#[derive(Clone)]
pub struct CaptureState {
    frames: Arc<LatestSlot<CapturedFrame>>,
    decoder: Arc<dyn ImageDecoder>,
    max_body_bytes: usize,
}

impl CaptureState {
    pub fn new(frames: Arc<LatestSlot<CapturedFrame>>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            frames,
            decoder,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Override the upload size limit (builder-style).
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// Build the capture router.
pub fn router(state: CaptureState) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/capture", post(capture))
        .layer(DefaultBodyLimit::max(limit))
        .layer(cors::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// `{"status":"success"}` or `{"status":"error","message":…}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureAck {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CaptureAck {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

/// A rejected capture, rendered as an error envelope.
struct CaptureFailure(BridgeError);

impl IntoResponse for CaptureFailure {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            match &self.0 {
                BridgeError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                BridgeError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                BridgeError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_REQUEST,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(CaptureAck::error(self.0.to_string()))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

async fn capture(State(state): State<CaptureState>, request: Request) -> Response {
    // Receipt time, taken before any parsing.
    let capture_epoch = epoch_seconds(Utc::now());

    match ingest(&state, request).await {
        Ok((pixels, metadata)) => {
            let frame = CapturedFrame::new(pixels, metadata, capture_epoch);
            let id = frame.id;
            let (width, height, channels) =
                (frame.pixels.width, frame.pixels.height, frame.pixels.channels);
            if let Some(dropped) = state.frames.publish(frame) {
                debug!(dropped = %dropped.id, "overwrote unconsumed frame");
            }
            let sequence = state.frames.sequence();
            info!(frame_id = %id, sequence, width, height, channels, "frame captured");
            Json(CaptureAck::success()).into_response()
        }
        Err(e) => {
            if e.is_client_error() {
                warn!(error = %e, "capture rejected");
            } else {
                error!(error = %e, "capture failed");
            }
            CaptureFailure(e).into_response()
        }
    }
}

async fn ingest(
    state: &CaptureState,
    request: Request,
) -> Result<(PixelGrid, Metadata), BridgeError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let metadata = parse_metadata(request.headers());

    let (bytes, mime_hint) = if content_type.starts_with("multipart/form-data") {
        read_multipart(request, state.max_body_bytes).await?
    } else if content_type.starts_with("image/") {
        let bytes = read_raw(request, state.max_body_bytes).await?;
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        (bytes, Some(mime))
    } else {
        return Err(BridgeError::UnsupportedContentType(content_type));
    };

    let decoder = Arc::clone(&state.decoder);
    let pixels = tokio::task::spawn_blocking(move || decoder.decode(&bytes, mime_hint.as_deref()))
        .await
        .map_err(|e| BridgeError::Io(format!("decoder task failed: {e}")))??;
    Ok((pixels, metadata))
}

/// Raw `image/*` body, bounded by the router's [`DefaultBodyLimit`].
async fn read_raw(request: Request, limit: usize) -> Result<Bytes, BridgeError> {
    let bytes = Bytes::from_request(request, &()).await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            BridgeError::BodyTooLarge { limit }
        } else {
            BridgeError::InvalidUpload(e.body_text())
        }
    })?;
    if bytes.is_empty() {
        return Err(BridgeError::EmptyBody);
    }
    Ok(bytes)
}

/// First part named `file` that carries a filename.
async fn read_multipart(
    request: Request,
    limit: usize,
) -> Result<(Bytes, Option<String>), BridgeError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| BridgeError::InvalidUpload(e.to_string()))?;

    let field_error = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            BridgeError::BodyTooLarge { limit }
        } else {
            BridgeError::InvalidUpload(e.to_string())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        if field.name() != Some(UPLOAD_FIELD) || field.file_name().is_none() {
            continue;
        }
        let mime_hint = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(field_error)?;
        return Ok((bytes, mime_hint));
    }
    Err(BridgeError::MissingUpload)
}

/// Parse the sidecar metadata header.
///
/// Absent header, or a declared type other than `application/json`, yields
/// empty metadata.  Unparsable JSON (or JSON that is not an object) yields
/// `{"error":"Invalid X-Metadata format","raw":<header>}`.
pub fn parse_metadata(headers: &HeaderMap) -> Metadata {
    let raw = headers
        .get(METADATA_HEADER)
        .map(|v| v.as_bytes())
        .filter(|b| !b.is_empty());
    let declared = headers
        .get(METADATA_CONTENT_TYPE_HEADER)
        .and_then(|v| v.to_str().ok());

    match (raw, declared) {
        // Header values may carry UTF-8, so parse the bytes as sent.
        (Some(raw), Some("application/json")) => match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                let raw = String::from_utf8_lossy(raw);
                warn!(raw = %raw, "invalid X-Metadata header");
                let mut meta = Metadata::new();
                meta.insert("error".into(), Value::from("Invalid X-Metadata format"));
                meta.insert("raw".into(), Value::from(raw.into_owned()));
                meta
            }
        },
        _ => Metadata::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
