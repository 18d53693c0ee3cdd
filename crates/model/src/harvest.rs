use crate::{
    checkpoint::CheckpointRecord,
    core::{scope::Scope, window::FetchWindow},
    errors::WindowError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inbound request from the surrounding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestRequest {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl HarvestRequest {
    pub fn new(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start,
            window_end,
            scope: None,
            max_pages: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn window(&self) -> Result<FetchWindow, WindowError> {
        FetchWindow::new(
            Scope::from(self.scope.clone()),
            self.window_start,
            self.window_end,
        )
    }
}

/// Answer returned to the caller once an invocation stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestReport {
    pub total_amount: Decimal,
    pub pages_processed: u64,
    pub completed: bool,
}

impl From<&CheckpointRecord> for HarvestReport {
    fn from(record: &CheckpointRecord) -> Self {
        Self {
            total_amount: record.accumulated_total,
            pages_processed: record.pages_processed,
            completed: record.is_completed(),
        }
    }
}
