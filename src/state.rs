//! Shared application state for the call bridge.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::speech::SpeechConfig;

/// State shared by every request handler.
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    /// Session settings resolved once at startup.
    pub speech_config: SpeechConfig,
    active_calls: AtomicUsize,
}

impl AppState {
    /// Build the shared state, resolving the speech session settings.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let speech_config = config.speech_config()?;
        // Fail early on an endpoint that can never produce a socket URL.
        speech_config
            .build_websocket_url()
            .map_err(|e| format!("Invalid speech endpoint configuration: {e}"))?;

        if !config.has_subscription_key() {
            warn!("SPEECH_KEY is not configured; calls will fail to authenticate");
        }

        info!(
            endpoint = %speech_config.endpoint,
            language = %speech_config.language,
            mode = %speech_config.mode,
            "Speech session settings loaded"
        );

        Ok(Arc::new(Self {
            config,
            speech_config,
            active_calls: AtomicUsize::new(0),
        }))
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }

    /// Count a call for as long as the returned guard lives.
    pub fn track_call(self: &Arc<Self>) -> CallGuard {
        let active = self.active_calls.fetch_add(1, Ordering::Relaxed) + 1;
        info!(active_calls = active, "Call connected");
        CallGuard {
            state: Arc::clone(self),
        }
    }
}

/// Decrements the active call count on drop.
#[derive(Debug)]
pub struct CallGuard {
    state: Arc<AppState>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let remaining = self.state.active_calls.fetch_sub(1, Ordering::Relaxed) - 1;
        info!(active_calls = remaining, "Call disconnected");
    }
}
