//! Configuration module for the speech bridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use speech_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::core::speech::{
    AudioFormat, DEFAULT_SPEECH_ENDPOINT, DEFAULT_TOKEN_URL, OutputFormat, RecognitionMode,
    SpeechConfig, SubscriptionKey,
};

mod env;
mod merge;
mod yaml;

pub use yaml::{ServerYaml, SpeechYaml, YamlConfig};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// Server configuration
///
/// Contains everything needed to run the call bridge:
/// - Server settings (host, port, public URL)
/// - Speech service subscription key
/// - Speech session overrides (endpoints, mode, language, format, sample rate)
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL (`http(s)://...`) used to build the
    /// call-control document. Falls back to `host:port` when unset.
    pub public_url: Option<String>,

    // Speech service
    pub speech_subscription_key: Option<String>,
    pub speech_token_url: String,
    pub speech_endpoint: String,
    pub speech_mode: String,
    pub speech_language: String,
    pub speech_format: String,
    /// Sample rate of the 16-bit mono PCM delivered by the call leg
    pub speech_sample_rate: u32,
    pub speech_connect_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let speech = SpeechConfig::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_url: None,
            speech_subscription_key: None,
            speech_token_url: DEFAULT_TOKEN_URL.to_string(),
            speech_endpoint: DEFAULT_SPEECH_ENDPOINT.to_string(),
            speech_mode: speech.mode.to_string(),
            speech_language: speech.language,
            speech_format: speech.output_format.as_str().to_string(),
            speech_sample_rate: speech.audio_format.sample_rate,
            speech_connect_timeout: speech.connect_timeout,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field(
                "speech_subscription_key",
                &self.speech_subscription_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("speech_token_url", &self.speech_token_url)
            .field("speech_endpoint", &self.speech_endpoint)
            .field("speech_mode", &self.speech_mode)
            .field("speech_language", &self.speech_language)
            .field("speech_format", &self.speech_format)
            .field("speech_sample_rate", &self.speech_sample_rate)
            .field("speech_connect_timeout", &self.speech_connect_timeout)
            .finish()
    }
}

/// Zeroize the subscription key when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.speech_subscription_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // Note: .env file is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;

        Ok(config)
    }

    /// Check the values that are only parsed lazily.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.speech_mode.parse::<RecognitionMode>()?;
        parse_output_format(&self.speech_format)?;

        if self.speech_sample_rate == 0 {
            return Err("speech sample_rate must be greater than zero".into());
        }

        if let Some(ref public_url) = self.public_url {
            let url = Url::parse(public_url)
                .map_err(|e| format!("Invalid public_url '{public_url}': {e}"))?;
            if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
                return Err(format!("public_url must be http(s) or ws(s), got {}", url.scheme()).into());
            }
        }

        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_subscription_key(&self) -> bool {
        self.speech_subscription_key
            .as_deref()
            .is_some_and(|k| !k.is_empty())
    }

    /// Subscription key for a new speech session; empty when unset.
    pub fn subscription_key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.speech_subscription_key.clone().unwrap_or_default())
    }

    /// Speech session settings derived from this configuration.
    pub fn speech_config(&self) -> Result<SpeechConfig, Box<dyn std::error::Error>> {
        let defaults = SpeechConfig::default();
        Ok(SpeechConfig {
            token_url: self.speech_token_url.clone(),
            endpoint: self.speech_endpoint.clone(),
            mode: self.speech_mode.parse()?,
            language: self.speech_language.clone(),
            output_format: parse_output_format(&self.speech_format)?,
            audio_format: AudioFormat {
                sample_rate: self.speech_sample_rate,
                ..defaults.audio_format
            },
            connect_timeout: self.speech_connect_timeout,
            ..defaults
        })
    }

    /// Base WebSocket URL of this bridge as seen by the telephony platform.
    ///
    /// `https://host` becomes `wss://host`; without a public URL the bind
    /// address is used with `ws://`.
    pub fn public_ws_url(&self) -> String {
        let base = match self.public_url {
            Some(ref url) => {
                if let Some(rest) = url.strip_prefix("https://") {
                    format!("wss://{rest}")
                } else if let Some(rest) = url.strip_prefix("http://") {
                    format!("ws://{rest}")
                } else {
                    url.clone()
                }
            }
            None => format!("ws://{}", self.address()),
        };
        base.trim_end_matches('/').to_string()
    }
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    match value.to_lowercase().as_str() {
        "simple" => Ok(OutputFormat::Simple),
        "detailed" => Ok(OutputFormat::Detailed),
        _ => Err(format!(
            "Unsupported output format: {value}. Supported formats: simple, detailed"
        )),
    }
}
