//! Speech session client.
//!
//! [`SpeechSession`] is the type callers hold for one call leg. It owns the
//! subscription key, the connection manager and the listener registry, and
//! runs one forwarding task that hands decoded messages to the dispatcher in
//! the order they arrived.
//!
//! # Example
//!
//! ```rust,no_run
//! use speech_bridge::core::speech::{SpeechConfig, SpeechSession, SubscriptionKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SpeechSession::new(SubscriptionKey::new("your-key"), SpeechConfig::default())?;
//!
//!     session.on("speech.phrase", |message| async move {
//!         println!("phrase: {}", message.payload);
//!         Ok(())
//!     });
//!
//!     session.connect().await?;
//!     session.send_audio(vec![0u8; 3200].into()).await?;
//!     session.close().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use super::auth::SubscriptionKey;
use super::config::SpeechConfig;
use super::connection::{ConnectionManager, ConnectionState, Inbound};
use super::dispatcher::{ErrorHandler, EventDispatcher, HandlerError};
use super::error::{ConnectionResult, SpeechError};
use super::messages::{RequestId, SpeechMessage};

/// Inbound messages buffered between the socket task and the dispatcher.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// How long `close()` lets the dispatcher drain messages already received.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One recognition session for one call leg.
pub struct SpeechSession {
    key: SubscriptionKey,
    connection: ConnectionManager,
    dispatcher: Arc<EventDispatcher>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSession")
            .field("connection", &self.connection)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl SpeechSession {
    pub fn new(key: SubscriptionKey, config: SpeechConfig) -> ConnectionResult<Self> {
        Ok(Self {
            key,
            connection: ConnectionManager::new(config)?,
            dispatcher: Arc::new(EventDispatcher::new()),
            dispatch_handle: Mutex::new(None),
        })
    }

    /// Register a listener for `event` (a `Path` value, or `"message"` for all).
    ///
    /// Listeners may be added before or after `connect()`.
    pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Arc<SpeechMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.dispatcher.on(event, handler);
    }

    /// Receive listener failures, dropped frames and socket failures.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(SpeechError) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        self.dispatcher.set_error_handler(handler);
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.connection.request_id()
    }

    pub fn config(&self) -> &SpeechConfig {
        self.connection.config()
    }

    /// Authenticate, open the socket and start dispatching.
    ///
    /// Resolves once the control and priming frames are written.
    pub async fn connect(&self) -> ConnectionResult<()> {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        self.connection.connect(&self.key, inbound_tx).await?;

        let handle = tokio::spawn(forward_inbound(inbound_rx, self.dispatcher.clone()));
        if let Some(previous) = self.dispatch_handle.lock().replace(handle) {
            // The previous connection's backlog and failure report are still
            // delivered; its forwarder ends when that socket task drops its sender.
            if !previous.is_finished() {
                debug!("Previous speech dispatcher still draining");
            }
        }
        Ok(())
    }

    /// Send one buffer of caller audio as one frame.
    pub async fn send_audio(&self, audio: Bytes) -> ConnectionResult<()> {
        self.connection.send_audio(audio).await
    }

    /// Close the session. Safe to call repeatedly and from any state.
    pub async fn close(&self) {
        self.connection.close().await;

        let handle = self.dispatch_handle.lock().take();
        if let Some(mut handle) = handle {
            // The socket task has dropped its sender, so the forwarder ends
            // once the backlog is dispatched.
            if timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("Speech dispatcher did not drain within {:?}", DRAIN_TIMEOUT);
                handle.abort();
            }
        }
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatch_handle.lock().take() {
            handle.abort();
        }
    }
}

async fn forward_inbound(mut inbound: mpsc::Receiver<Inbound>, dispatcher: Arc<EventDispatcher>) {
    while let Some(item) = inbound.recv().await {
        match item {
            Inbound::Message(message) => {
                let outcome = dispatcher.dispatch(Arc::new(message)).await;
                if outcome.invoked == 0 {
                    debug!("Speech message had no listeners");
                }
            }
            Inbound::Error(error) => dispatcher.report(error),
        }
    }
    debug!("Speech dispatcher stopped");
}
