pub mod speech;

// Re-export commonly used types for convenience
pub use speech::{
    ConnectionError, ConnectionState, CredentialError, FrameError, RecognitionEvent, SpeechConfig,
    SpeechError, SpeechMessage, SpeechSession, SubscriptionKey,
};
