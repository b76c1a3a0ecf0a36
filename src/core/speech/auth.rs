//! Subscription key to bearer token exchange.
//!
//! A fresh token is requested for every connection attempt. Nothing is cached
//! here, so two attempts never share a token.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::CredentialError;

/// Header carrying the subscription key on the token request.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Long-lived secret issued with the speech resource.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubscriptionKey(***)")
    }
}

/// Short-lived token presented as the `Authorization` header on the socket.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken({} bytes)", self.0.len())
    }
}

/// Issues bearer tokens from the token endpoint.
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    client: reqwest::Client,
    token_url: String,
}

impl CredentialProvider {
    /// Create a provider for `token_url` with a per-request timeout.
    pub fn new(token_url: impl Into<String>, timeout: Duration) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| CredentialError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token_url: token_url.into(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange `key` for a bearer token.
    ///
    /// Performs exactly one POST. Any status other than 200 is a rejection;
    /// retrying is left to the caller.
    pub async fn fetch_token(&self, key: &SubscriptionKey) -> Result<BearerToken, CredentialError> {
        if key.is_empty() {
            return Err(CredentialError::MissingKey);
        }

        debug!(url = %self.token_url, "Requesting bearer token");

        let response = self
            .client
            .post(&self.token_url)
            .header(SUBSCRIPTION_KEY_HEADER, key.expose())
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), "Token endpoint rejected subscription key");
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::Transport(format!("Failed to read token body: {e}")))?;

        debug!(bytes = body.len(), "Received bearer token");
        Ok(BearerToken::new(body))
    }
}
