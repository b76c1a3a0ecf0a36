//! Recognition socket lifecycle.
//!
//! # State machine
//!
//! ```text
//! Idle ──connect()──▶ Authenticating ──token──▶ Connecting ──socket open──▶ Open
//!   ▲                      │                        │                        │
//!   │                      ▼                        ▼                        ▼
//!   └──── Error ◀──── (credential / socket failure) ┘         Closed (close() or service close)
//! ```
//!
//! `close()` moves any state to `Closed`. A `connect()` that is still in
//! flight when `close()` runs returns [`ConnectionError::Cancelled`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │   send_audio()  │────▶│  ws_sender (mpsc)│────▶│  Socket Task    │
//! └─────────────────┘     └──────────────────┘     └────────┬────────┘
//!                                                           │ decode_frame
//!                                                  ┌────────▼────────┐
//!                                                  │ inbound (mpsc)  │────▶ Dispatcher
//!                                                  └─────────────────┘
//! ```
//!
//! The control frame and the priming frame are written by `connect()` before
//! the socket task starts and before the state becomes `Open`, so no caller
//! audio can overtake them.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::auth::{BearerToken, CredentialProvider, SubscriptionKey};
use super::codec;
use super::config::SpeechConfig;
use super::error::{ConnectionError, ConnectionResult, SpeechError};
use super::messages::{PATH_SPEECH_CONFIG, RequestId, SpeechMessage};

/// Outbound frames queued between `send_audio()` and the socket task.
const WS_CHANNEL_CAPACITY: usize = 32;

/// How long `close()` waits for the socket task to send its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Header carrying the client-side connection id on the handshake.
pub const CONNECTION_ID_HEADER: &str = "X-ConnectionId";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Authenticating,
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionState {
    /// Whether `connect()` may start from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Error | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Items produced by the socket task for the session.
#[derive(Debug)]
pub enum Inbound {
    Message(SpeechMessage),
    Error(SpeechError),
}

/// Mutable session state, guarded by one mutex.
struct Shared {
    state: ConnectionState,
    /// Bumped by every `connect()`; a socket task only touches state of its own attempt.
    generation: u64,
    request_id: Option<RequestId>,
    ws_sender: Option<mpsc::Sender<Message>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    connection_handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Shared {
    /// Move `from` → `to`; false when the state changed underneath.
    fn advance(&mut self, from: ConnectionState, to: ConnectionState) -> bool {
        if self.state == from {
            debug!(from = %from, to = %to, "Speech connection state change");
            self.state = to;
            true
        } else {
            false
        }
    }

    /// Enter `Error` unless the session was closed meanwhile.
    fn fail(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Error;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

// =============================================================================
// ConnectionManager
// =============================================================================

/// Owns the recognition socket for one session.
pub struct ConnectionManager {
    config: SpeechConfig,
    credentials: CredentialProvider,
    shared: Arc<Mutex<Shared>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(config: SpeechConfig) -> ConnectionResult<Self> {
        let credentials = CredentialProvider::new(config.token_url.clone(), config.token_timeout)?;
        Ok(Self {
            config,
            credentials,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Idle,
                generation: 0,
                request_id: None,
                ws_sender: None,
                shutdown_tx: None,
                connection_handle: None,
                cancel: CancellationToken::new(),
            })),
        })
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn is_ready(&self) -> bool {
        let shared = self.shared.lock();
        shared.state == ConnectionState::Open && shared.ws_sender.is_some()
    }

    /// Request id stamped on every frame of the current connection.
    pub fn request_id(&self) -> Option<RequestId> {
        self.shared.lock().request_id.clone()
    }

    /// Fetch a token, open the socket and send the opening frames.
    ///
    /// Decoded inbound messages and asynchronous failures are pushed to
    /// `inbound` in socket order. Nothing is retried.
    pub async fn connect(
        &self,
        key: &SubscriptionKey,
        inbound: mpsc::Sender<Inbound>,
    ) -> ConnectionResult<()> {
        let (cancel, generation) = {
            let mut shared = self.shared.lock();
            if !shared.state.can_connect() {
                return Err(ConnectionError::InvalidState(shared.state));
            }
            shared.state = ConnectionState::Authenticating;
            shared.generation += 1;
            shared.cancel = CancellationToken::new();
            shared.request_id = None;
            (shared.cancel.clone(), shared.generation)
        };

        info!(endpoint = %self.config.endpoint, "Connecting to speech service");

        // Authenticating
        let token = tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            result = self.credentials.fetch_token(key) => result,
        };
        let token = match token {
            Ok(token) => token,
            Err(e) => {
                error!("Speech token request failed: {}", e);
                self.shared.lock().fail();
                return Err(e.into());
            }
        };

        if !self
            .shared
            .lock()
            .advance(ConnectionState::Authenticating, ConnectionState::Connecting)
        {
            return Err(ConnectionError::Cancelled);
        }

        // Connecting
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            result = self.open_socket(&token) => result,
        };
        let (ws_stream, request_id) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!("Speech socket failed to open: {}", e);
                self.shared.lock().fail();
                return Err(e);
            }
        };

        let (ws_tx, ws_rx) = mpsc::channel::<Message>(WS_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let mut shared = self.shared.lock();
        if shared.state != ConnectionState::Connecting
            || cancel.is_cancelled()
            || !shared.is_current(generation)
        {
            // Closed while the handshake finished; the stream drops here.
            return Err(ConnectionError::Cancelled);
        }

        let handle = tokio::spawn(run_socket(
            ws_stream,
            ws_rx,
            shutdown_rx,
            inbound,
            self.shared.clone(),
            generation,
        ));

        // Replacing a previous attempt's shutdown sender stops that task.
        shared.ws_sender = Some(ws_tx);
        shared.shutdown_tx = Some(shutdown_tx);
        shared.connection_handle = Some(handle);
        shared.request_id = Some(request_id);
        shared.advance(ConnectionState::Connecting, ConnectionState::Open);

        info!("Speech session open");
        Ok(())
    }

    /// Open the socket and write the control and priming frames.
    async fn open_socket(&self, token: &BearerToken) -> ConnectionResult<(WsStream, RequestId)> {
        let url = self.config.build_websocket_url()?;
        let request_id = RequestId::generate();
        let connection_id = RequestId::generate();

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::SocketFailure(format!("Invalid socket request: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(token.expose()).map_err(|_| {
                ConnectionError::AuthRejected("Bearer token is not a valid header value".into())
            })?,
        );
        if let Ok(value) = HeaderValue::from_str(connection_id.as_str()) {
            headers.insert(CONNECTION_ID_HEADER, value);
        }

        debug!(url = %url, connection_id = %connection_id, "Opening speech socket");

        let (mut ws_stream, _response) =
            match timeout(self.config.connect_timeout, connect_async(request)).await {
                Ok(Ok(opened)) => opened,
                Ok(Err(e)) => return Err(classify_handshake_error(e)),
                Err(_) => {
                    return Err(ConnectionError::Timeout(format!(
                        "Speech socket did not open within {:?}",
                        self.config.connect_timeout
                    )));
                }
            };

        info!(connection_id = %connection_id, "Speech socket opened");

        let control = codec::encode_control_frame(
            PATH_SPEECH_CONFIG,
            &self.config.context_message(),
            &request_id,
        )?;
        let priming = codec::encode_priming_frame(
            &self.config.audio_format,
            &request_id,
            &self.config.audio_content_type,
        )?;

        for frame in [control, priming] {
            let len = frame.len();
            if let Err(e) = ws_stream.send(Message::from(frame)).await {
                let _ = ws_stream.close(None).await;
                return Err(ConnectionError::SocketFailure(format!(
                    "Failed to send opening frame: {e}"
                )));
            }
            debug!(bytes = len, "Sent opening frame");
        }

        Ok((ws_stream, request_id))
    }

    /// Encode `audio` as one frame and queue it for the socket.
    ///
    /// Fails with [`ConnectionError::NotReady`] unless the session is `Open`;
    /// nothing is written in that case.
    pub async fn send_audio(&self, audio: Bytes) -> ConnectionResult<()> {
        let (sender, request_id) = {
            let shared = self.shared.lock();
            match (&shared.state, &shared.ws_sender, &shared.request_id) {
                (ConnectionState::Open, Some(sender), Some(id)) => (sender.clone(), id.clone()),
                _ => return Err(ConnectionError::NotReady),
            }
        };

        let frame =
            codec::encode_audio_frame(&audio, &request_id, &self.config.audio_content_type)?;

        sender
            .send(frame.into())
            .await
            .map_err(|_| ConnectionError::SocketFailure("Speech socket task has stopped".into()))?;

        debug!(bytes = audio.len(), "Queued audio frame");
        Ok(())
    }

    /// Terminate the socket from any state.
    ///
    /// Idempotent and infallible. Cancels a pending `connect()`.
    pub async fn close(&self) {
        let (shutdown_tx, handle) = {
            let mut shared = self.shared.lock();
            shared.cancel.cancel();
            if shared.state != ConnectionState::Closed {
                debug!(from = %shared.state, "Closing speech connection");
            }
            shared.state = ConnectionState::Closed;
            shared.ws_sender = None;
            shared.request_id = None;
            (shared.shutdown_tx.take(), shared.connection_handle.take())
        };

        if let Some(shutdown_tx) = shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        if let Some(mut handle) = handle {
            let stopped = timeout(CLOSE_TIMEOUT, &mut handle).await;
            match stopped {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Speech socket task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Speech socket task did not stop within {:?}; aborting", CLOSE_TIMEOUT);
                    // Dropping the task drops the stream and releases the socket.
                    handle.abort();
                }
            }
            info!("Speech session closed");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        shared.cancel.cancel();
        if let Some(shutdown_tx) = shared.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

fn classify_handshake_error(error: tokio_tungstenite::tungstenite::Error) -> ConnectionError {
    use tokio_tungstenite::tungstenite::Error as WsError;

    match error {
        WsError::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                ConnectionError::AuthRejected(format!("Handshake answered with {status}"))
            } else {
                ConnectionError::SocketFailure(format!("Handshake answered with {status}"))
            }
        }
        other => ConnectionError::SocketFailure(other.to_string()),
    }
}

// =============================================================================
// Socket task
// =============================================================================

/// Pump outbound frames and decode inbound ones until either side closes.
async fn run_socket(
    ws_stream: WsStream,
    mut ws_rx: mpsc::Receiver<Message>,
    mut shutdown_rx: oneshot::Receiver<()>,
    inbound: mpsc::Sender<Inbound>,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    // A task outlived by a newer `connect()` must leave the session alone.
    let fail = || {
        let mut shared = shared.lock();
        if shared.is_current(generation) {
            shared.fail();
        }
    };
    let closed_by_service = || {
        let mut shared = shared.lock();
        if shared.is_current(generation) {
            shared.advance(ConnectionState::Open, ConnectionState::Closed);
        }
    };

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!("Shutdown requested for speech socket");
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }

            Some(message) = ws_rx.recv() => {
                if let Err(e) = ws_sink.send(message).await {
                    let failure = ConnectionError::SocketFailure(format!("Failed to send frame: {e}"));
                    error!("{}", failure);
                    fail();
                    let _ = inbound.send(Inbound::Error(failure.into())).await;
                    break;
                }
            }

            message = ws_stream.next() => {
                match message {
                    Some(Ok(message)) => {
                        if !handle_message(message, &inbound).await {
                            info!("Speech service closed the socket");
                            closed_by_service();
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let failure = ConnectionError::SocketFailure(e.to_string());
                        error!("Speech socket error: {}", failure);
                        fail();
                        let _ = inbound.send(Inbound::Error(failure.into())).await;
                        break;
                    }
                    None => {
                        info!("Speech socket stream ended");
                        closed_by_service();
                        break;
                    }
                }
            }
        }
    }

    {
        let mut shared = shared.lock();
        if shared.is_current(generation) {
            shared.ws_sender = None;
            shared.shutdown_tx = None;
        } else {
            debug!(generation, "Stale speech socket task finished");
        }
    }
    let _ = ws_sink.close().await;
    debug!("Speech socket released");
}

/// Handle one inbound socket message. Returns false when the socket closed.
async fn handle_message(message: Message, inbound: &mpsc::Sender<Inbound>) -> bool {
    match message {
        Message::Text(text) => {
            let item = match codec::decode_frame(&text) {
                Ok(decoded) => {
                    debug!(path = ?decoded.path(), "Received speech message");
                    Inbound::Message(decoded)
                }
                Err(e) => {
                    warn!("Dropping undecodable speech frame: {}", e);
                    Inbound::Error(e.into())
                }
            };
            if inbound.send(item).await.is_err() {
                debug!("Inbound receiver dropped; discarding speech message");
            }
        }
        Message::Binary(data) => match codec::decode_binary_frame(&data) {
            Ok(parts) => debug!(
                path = ?parts.headers.path(),
                bytes = parts.payload.len(),
                "Ignoring binary frame from speech service"
            ),
            Err(e) => {
                warn!("Dropping undecodable binary speech frame: {}", e);
                let _ = inbound.send(Inbound::Error(e.into())).await;
            }
        },
        Message::Close(frame) => {
            info!("Speech service sent close frame: {:?}", frame);
            return false;
        }
        Message::Ping(_) | Message::Pong(_) => {
            debug!("Received keep-alive from speech service");
        }
        _ => {
            debug!("Received unexpected message type from speech service");
        }
    }
    true
}
