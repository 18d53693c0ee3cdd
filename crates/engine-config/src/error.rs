use thiserror::Error;

/// Errors raised while turning environment variables into settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    /// Every problem found in one pass, so operators can fix them together.
    #[error("Configuration is invalid: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}
