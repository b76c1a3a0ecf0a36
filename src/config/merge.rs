use std::time::Duration;

use super::ServerConfig;
use super::env::{
    ENV_HOST, ENV_PORT, ENV_PUBLIC_URL, ENV_SPEECH_CONNECT_TIMEOUT, ENV_SPEECH_ENDPOINT,
    ENV_SPEECH_FORMAT, ENV_SPEECH_KEY, ENV_SPEECH_LANGUAGE, ENV_SPEECH_MODE,
    ENV_SPEECH_SAMPLE_RATE, ENV_SPEECH_TOKEN_URL, parse_var, var,
};
use super::yaml::{ServerYaml, SpeechYaml, YamlConfig};

/// Build a [`ServerConfig`] from defaults, environment variables and an
/// optional YAML file, in increasing priority.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let speech = yaml.speech.unwrap_or_default();

    let mut config = ServerConfig::default();
    apply_env(&mut config)?;
    apply_server_yaml(&mut config, server);
    apply_speech_yaml(&mut config, speech);

    Ok(config)
}

fn apply_env(config: &mut ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(host) = var(ENV_HOST) {
        config.host = host;
    }
    if let Some(port) = parse_var::<u16>(ENV_PORT)? {
        config.port = port;
    }
    if let Some(public_url) = var(ENV_PUBLIC_URL) {
        config.public_url = Some(public_url);
    }
    if let Some(key) = var(ENV_SPEECH_KEY) {
        config.speech_subscription_key = Some(key);
    }
    if let Some(token_url) = var(ENV_SPEECH_TOKEN_URL) {
        config.speech_token_url = token_url;
    }
    if let Some(endpoint) = var(ENV_SPEECH_ENDPOINT) {
        config.speech_endpoint = endpoint;
    }
    if let Some(mode) = var(ENV_SPEECH_MODE) {
        config.speech_mode = mode;
    }
    if let Some(language) = var(ENV_SPEECH_LANGUAGE) {
        config.speech_language = language;
    }
    if let Some(format) = var(ENV_SPEECH_FORMAT) {
        config.speech_format = format;
    }
    if let Some(rate) = parse_var::<u32>(ENV_SPEECH_SAMPLE_RATE)? {
        config.speech_sample_rate = rate;
    }
    if let Some(seconds) = parse_var::<u64>(ENV_SPEECH_CONNECT_TIMEOUT)? {
        config.speech_connect_timeout = Duration::from_secs(seconds);
    }
    Ok(())
}

fn apply_server_yaml(config: &mut ServerConfig, server: ServerYaml) {
    if let Some(host) = server.host {
        config.host = host;
    }
    if let Some(port) = server.port {
        config.port = port;
    }
    if server.public_url.is_some() {
        config.public_url = server.public_url;
    }
}

fn apply_speech_yaml(config: &mut ServerConfig, speech: SpeechYaml) {
    if speech.subscription_key.is_some() {
        config.speech_subscription_key = speech.subscription_key;
    }
    if let Some(token_url) = speech.token_url {
        config.speech_token_url = token_url;
    }
    if let Some(endpoint) = speech.endpoint {
        config.speech_endpoint = endpoint;
    }
    if let Some(mode) = speech.mode {
        config.speech_mode = mode;
    }
    if let Some(language) = speech.language {
        config.speech_language = language;
    }
    if let Some(format) = speech.format {
        config.speech_format = format;
    }
    if let Some(rate) = speech.sample_rate {
        config.speech_sample_rate = rate;
    }
    if let Some(seconds) = speech.connect_timeout_seconds {
        config.speech_connect_timeout = Duration::from_secs(seconds);
    }
}
