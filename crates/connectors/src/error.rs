use std::time::Duration;
use thiserror::Error;

/// Errors raised while exchanging the refresh credential for an access token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint answered with a non-success status.
    #[error("Token request rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The endpoint answered 2xx but without a usable token.
    #[error("Token response is invalid: {0}")]
    InvalidResponse(String),

    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised by a single page request against the events provider.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP 429. `retry_after` carries the server hint when one was sent.
    #[error("Rate limited by provider (retry after: {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider response is not valid JSON: {0}")]
    InvalidBody(String),
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Failed to encode or decode stored record: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Keeps provider error bodies short enough to live in logs and checkpoint annotations.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
