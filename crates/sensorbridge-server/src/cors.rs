//! Permissive CORS policy shared by both routers.

use std::time::Duration;

use tower_http::cors::{Any, CorsLayer};

/// How long browsers may cache a pre-flight answer.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Any origin, any method, any header.  Every `OPTIONS` request is answered
/// by the layer itself with `200 OK`.
pub fn permissive() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(PREFLIGHT_MAX_AGE)
}
