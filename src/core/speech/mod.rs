//! Speech recognition protocol client.
//!
//! This module streams call audio to a cloud speech-recognition service over
//! one WebSocket and dispatches the decoded recognition messages to listeners.
//!
//! # Features
//!
//! - Subscription key to bearer token exchange, once per connection attempt
//! - Hybrid wire framing: text frames for JSON control messages, binary frames
//!   with a 16-bit header length prefix for audio
//! - Explicit `Idle → Authenticating → Connecting → Open → Closed` lifecycle
//!   with an `Error` state and cancellable `connect()`
//! - Per-path listeners plus a `"message"` wildcard, isolated from each
//!   other's failures
//!
//! # Protocol
//!
//! After the socket opens the client sends, in order:
//!
//! 1. a `speech.config` text frame with the device context
//! 2. a priming `audio` frame whose payload is a WAV header
//!
//! Every later `send_audio()` call becomes exactly one `audio` frame.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use speech_bridge::core::speech::{
//!     RecognitionEvent, SpeechConfig, SpeechSession, SubscriptionKey,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = SubscriptionKey::new(std::env::var("SPEECH_KEY")?);
//!     let session = SpeechSession::new(key, SpeechConfig::default())?;
//!
//!     session.on("message", |message| async move {
//!         if let RecognitionEvent::Phrase(phrase) = message.event() {
//!             println!("Final: {:?}", phrase.display_text);
//!         }
//!         Ok(())
//!     });
//!     session.on_error(|error| eprintln!("Speech error: {error}"));
//!
//!     session.connect().await?;
//!
//!     // PCM 16-bit mono, 16kHz: 100ms per buffer
//!     session.send_audio(vec![0u8; 3200].into()).await?;
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod messages;

#[cfg(test)]
mod tests;

pub use auth::{BearerToken, CredentialProvider, SUBSCRIPTION_KEY_HEADER, SubscriptionKey};
pub use client::SpeechSession;
pub use codec::{
    BinaryFrameParts, Frame, decode_binary_frame, decode_frame, encode_audio_frame,
    encode_binary_frame, encode_control_frame, encode_priming_frame,
};
pub use config::{
    AudioFormat, DEFAULT_SPEECH_ENDPOINT, DEFAULT_TOKEN_URL, OutputFormat, RecognitionMode,
    SpeechConfig, SpeechContext,
};
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatcher::{
    DispatchOutcome, ErrorHandler, EventDispatcher, EventHandler, HandlerError, WILDCARD_EVENT,
};
pub use error::{ConnectionError, CredentialError, FrameError, SpeechError};
pub use messages::{
    FrameHeaders, Hypothesis, Phrase, RecognitionEvent, RecognitionStatus, RequestId,
    SpeechMessage,
};
