//! Defines routes for the gallery's storage operations.
//!
//! ## Structure
//! - **Object endpoints**
//!   - `POST   /upload/` : multipart upload, field `file`
//!   - `GET    /list/` : every object name
//!   - `GET    /download/{filename}` : signed download URL
//!   - `DELETE /delete/{filename}` : remove object
//!
//! - **Local download links** (in-memory backend only)
//!   - `GET    /signed/{filename}?expires=..&signature=..`
//!
//! - **Probes**
//!   - `GET    /healthz`, `GET /readyz`

use crate::{
    config::AppConfig,
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object, download_url, list_objects, missing_object_name, signed_download,
            upload_object,
        },
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Build and return the router for all object routes.
///
/// The router carries shared state (`StorageService`) to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Object routes
        .route("/upload/", post(upload_object))
        .route("/list/", get(list_objects))
        .route("/download/", get(missing_object_name))
        .route("/download/{filename}", get(download_url))
        .route("/delete/", delete(missing_object_name))
        .route("/delete/{filename}", delete(delete_object))
        .route("/signed/{filename}", get(signed_download))
}

/// The complete application: routes, middleware and state.
pub fn app(service: StorageService, cfg: &AppConfig) -> Router {
    let body_limit = match cfg.max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    routes()
        .layer(body_limit)
        .layer(cors_layer(&cfg.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// CORS for the gallery front end. A `*` entry opens the API to any origin
/// without credentials; otherwise only the listed origins are allowed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring malformed CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
