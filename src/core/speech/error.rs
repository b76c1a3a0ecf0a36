//! Error types for the speech protocol client.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`CredentialError`]: subscription key to bearer token exchange
//! - [`FrameError`]: encoding and decoding of wire frames
//! - [`ConnectionError`]: socket lifecycle and outbound writes
//! - [`SpeechError`]: asynchronous failures reported on a session's error
//!   channel after `connect()` has returned

use thiserror::Error;

use super::connection::ConnectionState;

/// Errors raised while exchanging a subscription key for a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// No subscription key was configured.
    #[error("Subscription key is empty")]
    MissingKey,

    /// The token request could not be completed (DNS, TLS, timeout, ...).
    #[error("Token request failed: {0}")]
    Transport(String),

    /// The token endpoint answered with a non-200 status.
    #[error("Token request rejected with status code {status}")]
    Rejected { status: u16 },
}

/// Errors raised by the frame codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Header block does not fit the 16-bit length prefix of a binary frame.
    #[error("Header block is {0} bytes, binary frames allow at most 65535")]
    HeaderTooLarge(usize),

    /// A header line without a `:` separator, or a header block that is not UTF-8.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The text payload is not valid JSON.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A binary frame shorter than its length prefix announces.
    #[error("Truncated binary frame: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The priming audio header could not be produced for the configured format.
    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),
}

/// Errors raised by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Audio was submitted before the session reached `Open`.
    #[error("Session is not ready to accept audio")]
    NotReady,

    /// The socket could not be opened or a write failed.
    #[error("Socket failure: {0}")]
    SocketFailure(String),

    /// The recognition endpoint refused the bearer token.
    #[error("Recognition endpoint rejected the credentials: {0}")]
    AuthRejected(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// `connect()` was called while another attempt or an open socket exists.
    #[error("Cannot connect while session is {0}")]
    InvalidState(ConnectionState),

    /// `close()` was called while `connect()` was still in flight.
    #[error("Connection attempt cancelled by close()")]
    Cancelled,

    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Failures delivered to a session's error callback.
///
/// None of these end the session by themselves except `Connection`, which is
/// only reported once the socket has already failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    /// An inbound frame could not be decoded and was dropped.
    #[error("Dropped inbound frame: {0}")]
    Frame(#[from] FrameError),

    /// The socket failed after the session was open.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A registered listener returned an error or panicked.
    #[error("Listener for '{event}' failed: {reason}")]
    Handler { event: String, reason: String },
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;
