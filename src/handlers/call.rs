//! Telephony webhook handlers
//!
//! The telephony platform fetches the answer document when a call comes in,
//! posts call events, and then opens a WebSocket to `/connect` carrying the
//! call audio as 16-bit linear PCM.

use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::state::AppState;

/// Path of the call-control document.
pub const NCCO_PATH: &str = "/ncco";

/// Path of the call audio WebSocket.
pub const CONNECT_PATH: &str = "/connect";

/// Answer webhook response.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer_url: &'static str,
}

/// Answer webhook: points the platform at the call-control document.
pub async fn answer() -> Json<AnswerResponse> {
    info!("Answer webhook received");
    Json(AnswerResponse {
        answer_url: NCCO_PATH,
    })
}

/// Event webhook: logs the call event and acknowledges it.
pub async fn event(body: Bytes) -> StatusCode {
    match serde_json::from_slice::<Value>(&body) {
        Ok(event) => info!(event = %event, "Call event received"),
        Err(_) => info!(bytes = body.len(), "Call event received"),
    }
    StatusCode::OK
}

/// Call-control document connecting the call audio to this bridge.
pub async fn ncco(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uri = format!("{}{}", state.config.public_ws_url(), CONNECT_PATH);
    let content_type = format!("audio/l16;rate={}", state.speech_config.audio_format.sample_rate);

    Json(json!([
        {
            "action": "connect",
            "endpoint": [
                {
                    "type": "websocket",
                    "uri": uri,
                    "content-type": content_type,
                    "headers": {}
                }
            ]
        }
    ]))
}
