use crate::{
    error::ConfigError,
    settings::{
        AppConfig, DEFAULT_EVENTS_PATH, HarvestSettings, ProviderSettings, RateLimitSettings,
        StoreSettings,
    },
};
use connectors::auth::Credentials;
use std::{collections::HashMap, path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const MAX_WINDOW_DAYS: u64 = 3_660;

/// Turns raw `HARVEST_*` variables into an [`AppConfig`].
///
/// All variables are checked before giving up, so a single run reports every
/// missing or malformed value.
pub struct SettingsValidator<'a> {
    vars: &'a HashMap<String, String>,
    errors: Vec<ConfigError>,
}

impl<'a> SettingsValidator<'a> {
    pub fn new(vars: &'a HashMap<String, String>) -> Self {
        Self {
            vars,
            errors: Vec::new(),
        }
    }

    pub fn validate(mut self) -> Result<AppConfig, ConfigError> {
        let provider = self.validate_provider();
        let harvest = self.validate_harvest();
        let store = self.validate_store();

        match self.errors.len() {
            0 => {}
            1 => return Err(self.errors.remove(0)),
            _ => {
                let messages = self.errors.iter().map(ToString::to_string).collect();
                return Err(ConfigError::ValidationFailed(messages));
            }
        }

        let config = AppConfig {
            provider,
            harvest,
            store,
        };
        Self::log_validated_settings(&config);
        Ok(config)
    }

    fn validate_provider(&mut self) -> ProviderSettings {
        let client_id = self.required("HARVEST_CLIENT_ID");
        let client_secret = self.required("HARVEST_CLIENT_SECRET");
        let refresh_token = self.required("HARVEST_REFRESH_TOKEN");
        let token_url = self.required("HARVEST_TOKEN_URL");
        let api_base_url = self.required("HARVEST_API_BASE_URL");

        for (name, url) in [
            ("HARVEST_TOKEN_URL", &token_url),
            ("HARVEST_API_BASE_URL", &api_base_url),
        ] {
            if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
                self.invalid(name, "expected an http(s) URL");
            }
        }

        let page_size = self.number("HARVEST_PAGE_SIZE", 100u32);
        if page_size == 0 {
            self.invalid("HARVEST_PAGE_SIZE", "must be greater than zero");
        }

        ProviderSettings {
            api_base_url,
            events_path: self
                .optional("HARVEST_EVENTS_PATH")
                .unwrap_or_else(|| DEFAULT_EVENTS_PATH.to_string()),
            token_url,
            page_size,
            request_timeout: Duration::from_secs(self.number("HARVEST_REQUEST_TIMEOUT_SECS", 30)),
            credentials: Credentials {
                client_id,
                client_secret,
                refresh_token,
            },
        }
    }

    fn validate_harvest(&mut self) -> HarvestSettings {
        let defaults = HarvestSettings::default();

        let checkpoint_every = self.number("HARVEST_CHECKPOINT_EVERY", defaults.checkpoint_every);
        if checkpoint_every == 0 {
            self.invalid("HARVEST_CHECKPOINT_EVERY", "must be greater than zero");
        }

        let window_days = self.number("HARVEST_MAX_WINDOW_DAYS", 30u64);
        if window_days == 0 {
            self.invalid("HARVEST_MAX_WINDOW_DAYS", "must be greater than zero");
        } else if window_days > MAX_WINDOW_DAYS {
            self.invalid(
                "HARVEST_MAX_WINDOW_DAYS",
                &format!("must not exceed {MAX_WINDOW_DAYS}"),
            );
        }

        let base_ms = self.number("HARVEST_BACKOFF_BASE_MS", 2_000u64);
        let max_ms = self.number("HARVEST_BACKOFF_MAX_MS", 60_000u64);
        if max_ms < base_ms {
            self.invalid(
                "HARVEST_BACKOFF_MAX_MS",
                "must not be smaller than HARVEST_BACKOFF_BASE_MS",
            );
        }

        let max_retries = self.number("HARVEST_MAX_RETRIES", defaults.rate_limit.max_retries);
        if max_retries > 20 {
            warn!(max_retries, "Very high retry ceiling, a throttled page may block for a long time");
        }

        HarvestSettings {
            page_interval: Duration::from_millis(self.number("HARVEST_PAGE_INTERVAL_MS", 2_000)),
            rate_limit: RateLimitSettings {
                max_retries,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
            },
            checkpoint_every,
            clamp_margin: Duration::from_secs(self.number("HARVEST_CLAMP_MARGIN_SECS", 120)),
            max_window_span: Duration::from_secs(window_days.min(MAX_WINDOW_DAYS) * SECS_PER_DAY),
            ..defaults
        }
    }

    fn validate_store(&mut self) -> StoreSettings {
        if let Some(url) = self.optional("HARVEST_DATABASE_URL") {
            return StoreSettings::Postgres { url };
        }

        match self.optional("HARVEST_STATE_DIR") {
            Some(dir) => StoreSettings::Sled {
                path: PathBuf::from(dir),
            },
            None => match dirs::home_dir() {
                Some(home) => StoreSettings::Sled {
                    path: home.join(".harvester").join("state"),
                },
                None => {
                    self.errors.push(ConfigError::Missing(
                        "HARVEST_STATE_DIR (no home directory to default to)".to_string(),
                    ));
                    StoreSettings::Sled {
                        path: PathBuf::new(),
                    }
                }
            },
        }
    }

    /// Blank values count as unset.
    fn optional(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn required(&mut self, name: &str) -> String {
        match self.optional(name) {
            Some(value) => value,
            None => {
                self.errors.push(ConfigError::Missing(name.to_string()));
                String::new()
            }
        }
    }

    fn number<T>(&mut self, name: &str, default: T) -> T
    where
        T: FromStr + Copy,
    {
        let Some(raw) = self.optional(name) else {
            return default;
        };
        match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                self.invalid(name, &format!("'{raw}' is not a valid non-negative integer"));
                default
            }
        }
    }

    fn invalid(&mut self, name: &str, reason: &str) {
        self.errors.push(ConfigError::Invalid {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn log_validated_settings(config: &AppConfig) {
        let harvest = &config.harvest;
        info!(
            api_base_url = %config.provider.api_base_url,
            events_path = %config.provider.events_path,
            page_size = config.provider.page_size,
            "Provider settings validated"
        );
        info!(
            page_interval_ms = harvest.page_interval.as_millis() as u64,
            max_retries = harvest.rate_limit.max_retries,
            checkpoint_every = harvest.checkpoint_every,
            clamp_margin_secs = harvest.clamp_margin.as_secs(),
            max_window_days = harvest.max_window_span.as_secs() / 86_400,
            "Harvest settings validated"
        );
        match &config.store {
            StoreSettings::Sled { path } => info!(path = %path.display(), "Using embedded checkpoint store"),
            StoreSettings::Postgres { .. } => info!("Using PostgreSQL checkpoint store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("HARVEST_CLIENT_ID", "client"),
            ("HARVEST_CLIENT_SECRET", "secret"),
            ("HARVEST_REFRESH_TOKEN", "refresh"),
            ("HARVEST_TOKEN_URL", "https://auth.example.com/o2/token"),
            ("HARVEST_API_BASE_URL", "https://api.example.com"),
            ("HARVEST_STATE_DIR", "/tmp/harvester-state"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = AppConfig::from_vars(&base_vars()).unwrap();

        assert_eq!(config.harvest, HarvestSettings::default());
        assert_eq!(config.provider.events_path, DEFAULT_EVENTS_PATH);
        assert_eq!(config.provider.page_size, 100);
        assert_eq!(config.provider.request_timeout, Duration::from_secs(30));
        assert_eq!(
            config.store,
            StoreSettings::Sled {
                path: PathBuf::from("/tmp/harvester-state")
            }
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = base_vars();
        vars.insert("HARVEST_PAGE_INTERVAL_MS".into(), "0".into());
        vars.insert("HARVEST_MAX_RETRIES".into(), "2".into());
        vars.insert("HARVEST_CHECKPOINT_EVERY".into(), "1".into());
        vars.insert("HARVEST_MAX_WINDOW_DAYS".into(), "7".into());
        vars.insert("HARVEST_DATABASE_URL".into(), "postgres://u:p@localhost/db".into());

        let config = AppConfig::from_vars(&vars).unwrap();

        assert_eq!(config.harvest.page_interval, Duration::ZERO);
        assert_eq!(config.harvest.rate_limit.max_retries, 2);
        assert_eq!(config.harvest.checkpoint_every, 1);
        assert_eq!(
            config.harvest.max_window_span,
            Duration::from_secs(7 * 86_400)
        );
        assert!(matches!(config.store, StoreSettings::Postgres { .. }));
    }

    #[test]
    fn single_missing_variable_is_reported_by_name() {
        let mut vars = base_vars();
        vars.remove("HARVEST_REFRESH_TOKEN");

        match AppConfig::from_vars(&vars) {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "HARVEST_REFRESH_TOKEN"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_number_is_rejected() {
        let mut vars = base_vars();
        vars.insert("HARVEST_PAGE_SIZE".into(), "many".into());

        match AppConfig::from_vars(&vars) {
            Err(ConfigError::Invalid { name, .. }) => assert_eq!(name, "HARVEST_PAGE_SIZE"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn window_span_is_bounded() {
        for days in ["3661", "100000000", "18446744073709551615"] {
            let mut vars = base_vars();
            vars.insert("HARVEST_MAX_WINDOW_DAYS".into(), days.into());

            match AppConfig::from_vars(&vars) {
                Err(ConfigError::Invalid { name, .. }) => assert_eq!(name, "HARVEST_MAX_WINDOW_DAYS"),
                other => panic!("expected invalid window span for {days}, got {other:?}"),
            }
        }
    }

    #[test]
    fn all_problems_are_collected() {
        let mut vars = base_vars();
        vars.remove("HARVEST_CLIENT_ID");
        vars.insert("HARVEST_CHECKPOINT_EVERY".into(), "0".into());
        vars.insert("HARVEST_TOKEN_URL".into(), "ftp://nope".into());

        match AppConfig::from_vars(&vars) {
            Err(ConfigError::ValidationFailed(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
