use crate::{auth::AccessToken, error::SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::pagination::cursor::Cursor;

pub mod http;

/// Parameters of one page request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub posted_after: DateTime<Utc>,
    pub posted_before: DateTime<Utc>,
    pub cursor: Option<Cursor>,
}

/// A paginated provider of financial events.
///
/// Implementations perform exactly one request per call and never retry; backoff
/// and pacing belong to the caller.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_page(
        &self,
        token: &AccessToken,
        query: &PageQuery,
    ) -> Result<serde_json::Value, SourceError>;
}
