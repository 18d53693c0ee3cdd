use connectors::auth::Credentials;
use std::{collections::HashMap, path::PathBuf, time::Duration};

pub mod validator;

pub use connectors::source::http::DEFAULT_EVENTS_PATH;

/// Everything one harvester process needs, validated.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderSettings,
    pub harvest: HarvestSettings,
    pub store: StoreSettings,
}

impl AppConfig {
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, crate::error::ConfigError> {
        validator::SettingsValidator::new(vars).validate()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_base_url: String,
    pub events_path: String,
    pub token_url: String,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub credentials: Credentials,
}

/// Tuning of the paginated fetch loop.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSettings {
    /// Minimum gap between two consecutive page requests.
    pub page_interval: Duration,
    pub rate_limit: RateLimitSettings,
    /// Progress is persisted after the first page, then every `checkpoint_every` pages.
    pub checkpoint_every: u32,
    /// Window ends later than `now - clamp_margin` are pulled back to that instant.
    pub clamp_margin: Duration,
    /// Page budget of a single sub-range call when the caller gives none.
    pub range_page_limit: u32,
    /// Page budget of a top-level call when the caller gives none.
    pub harvest_page_limit: u32,
    /// Longest sub-range a top-level call hands to the fetcher.
    pub max_window_span: Duration,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            page_interval: Duration::from_secs(2),
            rate_limit: RateLimitSettings::default(),
            checkpoint_every: 3,
            clamp_margin: Duration::from_secs(120),
            range_page_limit: 50,
            harvest_page_limit: 100,
            max_window_span: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Backoff applied to HTTP 429 answers of a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSettings {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Sled { path: PathBuf },
    Postgres { url: String },
}
