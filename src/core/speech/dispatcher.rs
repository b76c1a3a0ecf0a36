//! Listener registry and dispatch of decoded messages.
//!
//! Listeners are registered per event type: either a `Path` value such as
//! `speech.phrase`, or [`WILDCARD_EVENT`] to receive every message. For each
//! message the wildcard listeners run first, then the listeners for the
//! message's path, each tier in registration order.
//!
//! A listener that returns an error or panics is reported and skipped; the
//! remaining listeners still run.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::error::SpeechError;
use super::messages::SpeechMessage;

/// Event type that matches every inbound message.
pub const WILDCARD_EVENT: &str = "message";

/// Error type listeners may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Async listener invoked with each matching message.
pub type EventHandler = Arc<
    dyn Fn(Arc<SpeechMessage>) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>
        + Send
        + Sync,
>;

/// Callback receiving listener failures and other session errors.
pub type ErrorHandler = Arc<dyn Fn(SpeechError) + Send + Sync>;

/// Counts for one dispatched message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub invoked: usize,
    pub failed: usize,
}

/// Maps event types to ordered listener lists.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<EventHandler>>>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(event, handlers)| (event.as_str(), handlers.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .field("error_handler", &self.error_handler.read().is_some())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under `event`. Listeners for the same event run in
    /// registration order.
    pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Arc<SpeechMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |message| Box::pin(handler(message)));
        self.register(event, handler);
    }

    /// Register an already boxed listener.
    pub fn register(&self, event: impl Into<String>, handler: EventHandler) {
        let event = event.into();
        debug!(event = %event, "Registering speech event listener");
        self.listeners.write().entry(event).or_default().push(handler);
    }

    /// Replace the callback that receives failures.
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.write() = Some(handler);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Deliver `error` to the error callback, or log it when none is set.
    pub fn report(&self, error: SpeechError) {
        let handler = self.error_handler.read().clone();
        match handler {
            Some(handler) => {
                if std::panic::catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
                    warn!("Speech error callback panicked");
                }
            }
            None => warn!("Speech session error (no callback registered): {}", error),
        }
    }

    /// Invoke every wildcard listener, then every listener for the message's path.
    pub async fn dispatch(&self, message: Arc<SpeechMessage>) -> DispatchOutcome {
        let handlers = self.matching_handlers(message.path());
        let mut outcome = DispatchOutcome::default();

        for (event, handler) in handlers {
            outcome.invoked += 1;
            if let Err(reason) = Self::invoke(&handler, message.clone()).await {
                outcome.failed += 1;
                warn!(event = %event, "Speech event listener failed: {}", reason);
                self.report(SpeechError::Handler { event, reason });
            }
        }

        outcome
    }

    // Snapshot under the read lock so listeners may register more listeners.
    fn matching_handlers(&self, path: Option<&str>) -> Vec<(String, EventHandler)> {
        let listeners = self.listeners.read();
        let mut matched = Vec::new();

        if let Some(handlers) = listeners.get(WILDCARD_EVENT) {
            matched.extend(handlers.iter().map(|h| (WILDCARD_EVENT.to_string(), h.clone())));
        }

        if let Some(path) = path.filter(|p| *p != WILDCARD_EVENT) {
            if let Some(handlers) = listeners.get(path) {
                matched.extend(handlers.iter().map(|h| (path.to_string(), h.clone())));
            }
        }

        matched
    }

    async fn invoke(handler: &EventHandler, message: Arc<SpeechMessage>) -> Result<(), String> {
        let future = std::panic::catch_unwind(AssertUnwindSafe(|| handler(message)))
            .map_err(|panic| panic_reason(&*panic))?;

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(panic_reason(&*panic)),
        }
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
