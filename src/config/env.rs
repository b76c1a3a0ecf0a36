//! Environment variable loading.
//!
//! `.env` values are loaded into the process environment by `main` before
//! this runs, so real environment variables take precedence over them.

use std::env;

use super::ServerConfig;

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_PUBLIC_URL: &str = "PUBLIC_URL";
pub const ENV_SPEECH_KEY: &str = "SPEECH_KEY";
pub const ENV_SPEECH_TOKEN_URL: &str = "SPEECH_TOKEN_URL";
pub const ENV_SPEECH_ENDPOINT: &str = "SPEECH_ENDPOINT";
pub const ENV_SPEECH_MODE: &str = "SPEECH_MODE";
pub const ENV_SPEECH_LANGUAGE: &str = "SPEECH_LANGUAGE";
pub const ENV_SPEECH_FORMAT: &str = "SPEECH_FORMAT";
pub const ENV_SPEECH_SAMPLE_RATE: &str = "SPEECH_SAMPLE_RATE";
pub const ENV_SPEECH_CONNECT_TIMEOUT: &str = "SPEECH_CONNECT_TIMEOUT_SECONDS";

/// Non-empty value of `name`, if set.
pub(crate) fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `name` into `T`, failing with a readable message on bad input.
pub(crate) fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {raw} ({e})").into()),
        None => Ok(None),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    ///
    /// Unset variables fall back to the defaults of [`ServerConfig::default`].
    ///
    /// # Errors
    /// Returns an error if a numeric variable (`PORT`, `SPEECH_SAMPLE_RATE`,
    /// `SPEECH_CONNECT_TIMEOUT_SECONDS`) or `SPEECH_MODE` / `SPEECH_FORMAT`
    /// holds an unparseable value.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = super::merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }
}
