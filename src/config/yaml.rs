use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5000
///   public_url: "https://bridge.example.com"
///
/// speech:
///   subscription_key: "your-subscription-key"
///   token_url: "https://api.cognitive.microsoft.com/sts/v1.0/issueToken"
///   endpoint: "wss://speech.platform.bing.com"
///   mode: "dictation"
///   language: "en-US"
///   format: "simple"
///   sample_rate: 16000
///   connect_timeout_seconds: 30
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub speech: Option<SpeechYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Externally reachable base URL of this bridge, used in the call-control document
    pub public_url: Option<String>,
}

/// Speech service settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeechYaml {
    pub subscription_key: Option<String>,
    pub token_url: Option<String>,
    pub endpoint: Option<String>,
    /// `interactive`, `conversation` or `dictation`
    pub mode: Option<String>,
    pub language: Option<String>,
    /// `simple` or `detailed`
    pub format: Option<String>,
    pub sample_rate: Option<u32>,
    pub connect_timeout_seconds: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
