use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::call::{self, NCCO_PATH};
use crate::state::AppState;
use std::sync::Arc;

/// Create the telephony webhook router
///
/// - `GET /` answer webhook
/// - `POST /` event webhook
/// - `GET /ncco` call-control document
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(call::answer).post(call::event))
        .route(NCCO_PATH, get(call::ncco))
        .layer(TraceLayer::new_for_http())
}
