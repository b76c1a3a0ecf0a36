//! Call audio WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::bridge::bridge_handler;
use crate::handlers::call::CONNECT_PATH;
use crate::state::AppState;
use std::sync::Arc;

/// Create the call audio WebSocket router
///
/// # Endpoint
///
/// `GET /connect` - WebSocket upgrade for one call leg
///
/// # Protocol
///
/// The call leg sends binary frames of 16-bit linear PCM at the configured
/// sample rate. The bridge answers with one JSON text frame per recognition
/// message:
///
/// ```json
/// {"path": "speech.phrase", "request_id": "…", "payload": {"RecognitionStatus": "Success", "DisplayText": "Hello."}}
/// ```
///
/// Session failures are reported as `{"type": "error", "message": "..."}`.
pub fn create_bridge_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(CONNECT_PATH, get(bridge_handler))
        .layer(TraceLayer::new_for_http())
}
