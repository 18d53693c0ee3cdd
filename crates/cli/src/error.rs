use connectors::error::StoreError;
use engine_config::error::ConfigError;
use engine_core::error::HarvestError;
use model::errors::WindowError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load environment: {0}")]
    Config(String),

    #[error(transparent)]
    Settings(#[from] ConfigError),

    #[error("Harvest failed: {0}")]
    Harvest(#[from] HarvestError),

    #[error("Invalid window: {0}")]
    Window(#[from] WindowError),

    #[error("Checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
