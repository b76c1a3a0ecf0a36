//! Call audio WebSocket handler
//!
//! Each call socket gets its own [`SpeechSession`]. Binary frames from the
//! call are forwarded to the session as audio; every recognition message the
//! session decodes is sent back on the call socket as a JSON text frame.
//!
//! ```text
//! ┌──────────────┐  binary PCM   ┌───────────────┐  audio frames  ┌─────────────┐
//! │  Call leg    │──────────────▶│ SpeechSession │───────────────▶│   Speech    │
//! │  (WebSocket) │◀──────────────│  dispatcher   │◀───────────────│   service   │
//! └──────────────┘   JSON text   └───────────────┘  text frames   └─────────────┘
//! ```

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::speech::{
    HandlerError, SpeechError, SpeechMessage, SpeechSession, WILDCARD_EVENT,
};
use crate::state::AppState;

/// Outgoing frames buffered for the call socket.
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket message size accepted from the call leg (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Frames routed to the call socket writer.
#[derive(Debug)]
enum CallRoute {
    Text(String),
    Close,
}

/// Upgrade the call leg to a WebSocket and bridge it to a speech session.
pub async fn bridge_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Call audio WebSocket upgrade requested");

    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_call_socket(socket, state))
}

async fn handle_call_socket(socket: WebSocket, state: Arc<AppState>) {
    let _guard = state.track_call();
    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<CallRoute>(CHANNEL_BUFFER_SIZE);

    // Writer task for the call socket
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match route {
                CallRoute::Text(text) => sender.send(Message::Text(text.into())).await,
                CallRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                debug!("Call socket write failed: {}", e);
                break;
            }
        }
    });

    let session = match SpeechSession::new(state.config.subscription_key(), state.speech_config.clone()) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create speech session: {}", e);
            let _ = route_tx.send(CallRoute::Close).await;
            let _ = sender_task.await;
            return;
        }
    };

    register_forwarders(&session, &route_tx);

    if let Err(e) = session.connect().await {
        error!("Speech session failed to connect: {}", e);
        let _ = route_tx
            .send(CallRoute::Text(error_json(&e.to_string())))
            .await;
        let _ = route_tx.send(CallRoute::Close).await;
        let _ = sender_task.await;
        return;
    }

    info!(request_id = ?session.request_id(), "Call bridged to speech service");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Binary(audio)) => {
                if let Err(e) = session.send_audio(audio).await {
                    warn!("Dropping call audio: {}", e);
                    if !session.is_ready() {
                        break;
                    }
                }
            }
            Ok(Message::Text(text)) => {
                info!(text = %text.as_str(), "Text frame from call leg");
            }
            Ok(Message::Close(_)) => {
                info!("Call leg closed the socket");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Call socket error: {}", e);
                break;
            }
        }
    }

    session.close().await;
    let _ = route_tx.send(CallRoute::Close).await;
    drop(route_tx);
    if let Err(e) = sender_task.await {
        debug!("Call socket writer ended abnormally: {}", e);
    }
    info!("Call bridge finished");
}

/// Send every decoded message and every session error to the call socket.
fn register_forwarders(session: &SpeechSession, route_tx: &mpsc::Sender<CallRoute>) {
    let messages = route_tx.clone();
    session.on(WILDCARD_EVENT, move |message: Arc<SpeechMessage>| {
        let messages = messages.clone();
        async move {
            messages
                .send(CallRoute::Text(message.to_json().to_string()))
                .await
                .map_err(|_| HandlerError::from("call socket closed"))?;
            Ok::<(), HandlerError>(())
        }
    });

    let errors = route_tx.clone();
    session.on_error(move |error: SpeechError| {
        warn!("Speech session error: {}", error);
        if errors.try_send(CallRoute::Text(error_json(&error.to_string()))).is_err() {
            debug!("Call socket unavailable for error report");
        }
    });
}

fn error_json(message: &str) -> String {
    json!({ "type": "error", "message": message }).to_string()
}
