//! Exchange of a long-lived refresh credential for a short-lived bearer token.

use crate::error::{AuthError, truncate_body};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{fmt, time::Duration};
use tracing::{debug, info};

/// Long-lived credentials of the seller application.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Short-lived bearer token. Never printed in full.
#[derive(Clone)]
pub struct AccessToken {
    token: String,
    expires_in: Option<Duration>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            token: token.into(),
            expires_in,
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtains a fresh bearer token. One attempt, no retries.
    async fn access_token(&self) -> Result<AccessToken, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Refresh-token grant against an OAuth2 token endpoint.
pub struct OAuthTokenProvider {
    http_client: Client,
    token_url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl OAuthTokenProvider {
    pub fn new(http_client: Client, token_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            credentials,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        debug!(url = %self.token_url, client_id = %self.credentials.client_id, "Requesting access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "(failed to read error body)".to_string());
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body: TokenResponse = response.json().await?;
        if let Some(kind) = body.token_type.as_deref()
            && !kind.eq_ignore_ascii_case("bearer")
        {
            return Err(AuthError::InvalidResponse(format!(
                "unsupported token type `{kind}`"
            )));
        }

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("missing access_token".into()))?;

        info!(expires_in = ?body.expires_in, "Obtained access token");
        Ok(AccessToken::new(token, body.expires_in.map(Duration::from_secs)))
    }
}
