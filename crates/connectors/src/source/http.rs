use crate::{
    auth::AccessToken,
    error::{SourceError, truncate_body},
    source::{EventSource, PageQuery},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EVENTS_PATH: &str = "/finances/v0/financialEvents";

/// Financial-events endpoint reached over HTTPS with a bearer token.
pub struct HttpEventSource {
    http_client: Client,
    base_url: String,
    events_path: String,
    page_size: u32,
}

impl HttpEventSource {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            events_path: DEFAULT_EVENTS_PATH.to_string(),
            page_size: 100,
        }
    }

    pub fn with_events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = path.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, self.events_path)
    }

    fn query_params(&self, query: &PageQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("PostedAfter", format_ts(query.posted_after)),
            ("PostedBefore", format_ts(query.posted_before)),
            ("MaxResultsPerPage", self.page_size.to_string()),
        ];
        if let Some(cursor) = &query.cursor {
            params.push(("NextToken", cursor.as_str().to_string()));
        }
        params
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn fetch_page(
        &self,
        token: &AccessToken,
        query: &PageQuery,
    ) -> Result<serde_json::Value, SourceError> {
        debug!(
            url = %self.url(),
            cursor = ?query.cursor.as_ref().map(|c| c.to_string()),
            "Requesting events page"
        );

        let response = self
            .http_client
            .get(self.url())
            .bearer_auth(token.secret())
            .query(&self.query_params(query))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            return Err(SourceError::RateLimited { retry_after });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| SourceError::InvalidBody(e.to_string()))
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a `Retry-After` value: delay seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
