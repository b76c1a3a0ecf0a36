//! Speech session configuration.
//!
//! This module defines the endpoints, recognition options and audio format
//! used by one speech session, plus the `speech.config` context document sent
//! as the first control frame.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::ConnectionError;

// =============================================================================
// Constants
// =============================================================================

/// Token issuing endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://api.cognitive.microsoft.com/sts/v1.0/issueToken";

/// Recognition socket host.
pub const DEFAULT_SPEECH_ENDPOINT: &str = "wss://speech.platform.bing.com";

pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Content type of the audio frames.
pub const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/x-wav";

/// Version reported in `speech.config` `context.system.version`.
pub const DEFAULT_SYSTEM_VERSION: &str = "2.0.12341";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Recognition options
// =============================================================================

/// Recognition mode, selecting the endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    Interactive,
    Conversation,
    #[default]
    Dictation,
}

impl RecognitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Conversation => "conversation",
            Self::Dictation => "dictation",
        }
    }
}

impl std::fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecognitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "conversation" => Ok(Self::Conversation),
            "dictation" => Ok(Self::Dictation),
            _ => Err(format!(
                "Unsupported recognition mode: {s}. Supported modes: interactive, conversation, dictation"
            )),
        }
    }
}

/// Result payload format requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Simple,
    Detailed,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Detailed => "detailed",
        }
    }
}

/// PCM format of the audio stream, announced by the priming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

// =============================================================================
// speech.config context
// =============================================================================

/// Body of the `speech.config` control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechContextMessage {
    pub context: SpeechContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechContext {
    pub system: SystemInfo,
    pub os: OsInfo,
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsInfo {
    pub platform: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub version: String,
}

impl Default for SpeechContext {
    fn default() -> Self {
        let na = || "N/A".to_string();
        Self {
            system: SystemInfo {
                version: DEFAULT_SYSTEM_VERSION.to_string(),
            },
            os: OsInfo {
                platform: na(),
                name: na(),
                version: na(),
            },
            device: DeviceInfo {
                manufacturer: na(),
                model: na(),
                version: na(),
            },
        }
    }
}

// =============================================================================
// SpeechConfig
// =============================================================================

/// Configuration for one speech session.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    pub token_url: String,
    /// Scheme and host of the recognition socket, e.g. `wss://speech.platform.bing.com`.
    pub endpoint: String,
    pub mode: RecognitionMode,
    pub language: String,
    pub output_format: OutputFormat,
    pub audio_content_type: String,
    pub audio_format: AudioFormat,
    pub context: SpeechContext,
    pub connect_timeout: Duration,
    pub token_timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            endpoint: DEFAULT_SPEECH_ENDPOINT.to_string(),
            mode: RecognitionMode::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            output_format: OutputFormat::default(),
            audio_content_type: DEFAULT_AUDIO_CONTENT_TYPE.to_string(),
            audio_format: AudioFormat::default(),
            context: SpeechContext::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }
}

impl SpeechConfig {
    /// Path of the recognition resource for the configured mode.
    pub fn recognition_path(&self) -> String {
        format!("/speech/recognition/{}/cognitiveservices/v1", self.mode)
    }

    /// Full socket URL including the language and format query parameters.
    pub fn build_websocket_url(&self) -> Result<Url, ConnectionError> {
        let base = self.endpoint.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{}", self.recognition_path()))
            .map_err(|e| ConnectionError::SocketFailure(format!("Invalid speech endpoint: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectionError::SocketFailure(format!(
                "Speech endpoint must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }

        url.query_pairs_mut()
            .append_pair("language", &self.language)
            .append_pair("format", self.output_format.as_str());

        Ok(url)
    }

    /// Body of the `speech.config` control frame.
    pub fn context_message(&self) -> SpeechContextMessage {
        SpeechContextMessage {
            context: self.context.clone(),
        }
    }
}
