use connectors::error::{AuthError, SourceError, StoreError};
use model::errors::{PayloadError, WindowError};
use thiserror::Error;

/// Caller-facing failures of one harvest invocation.
///
/// Soft stops (rate limiting, page budget, provider or payload failures) are
/// not errors here: they end the run with an incomplete report instead.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Invalid harvest window: {0}")]
    Window(#[from] WindowError),

    #[error("Invalid harvest request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Checkpoint store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The checkpoint is already completed; a later invocation re-propagates it.
    #[error("Failed to write period total downstream: {0}")]
    Downstream(StoreError),

    #[error("Combined refund total of the window overflows")]
    TotalOverflow,
}

/// Why a single page could not be folded into the running total.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Rate limit persisted after {retries} retries")]
    RateLimitExceeded { retries: u32 },

    #[error("Provider request failed: {0}")]
    ProviderHttp(#[from] SourceError),

    #[error("Malformed page payload: {0}")]
    MalformedPayload(#[from] PayloadError),
}
