use crate::{
    core::{scope::Scope, window::FetchWindow},
    pagination::cursor::Cursor,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Natural key of a checkpoint: one record per `(scope, start, end)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub scope: Scope,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&FetchWindow> for CheckpointKey {
    fn from(window: &FetchWindow) -> Self {
        Self {
            scope: window.scope.clone(),
            start: window.start,
            end: window.end,
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {})",
            self.scope,
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )
    }
}

/// Interrupted and failing runs stay `InProgress` so they can be resumed;
/// there is deliberately no error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointStatus {
    InProgress,
    Completed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::InProgress => "IN_PROGRESS",
            CheckpointStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(CheckpointStatus::InProgress),
            "COMPLETED" => Ok(CheckpointStatus::Completed),
            other => Err(format!("unknown checkpoint status: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointRecord {
    pub key: CheckpointKey,
    pub status: CheckpointStatus,
    /// `None` means either "not started yet" or "fully exhausted".
    pub cursor: Option<Cursor>,
    pub pages_processed: u64,
    pub accumulated_total: Decimal,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CheckpointRecord {
    /// Fresh record for a key that has never been attempted.
    pub fn new(key: CheckpointKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: CheckpointStatus::InProgress,
            cursor: None,
            pages_processed: 0,
            accumulated_total: Decimal::ZERO,
            last_error: None,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CheckpointStatus::Completed
    }

    /// A record is resumable when it is in progress and holds a cursor to continue from.
    pub fn is_resumable(&self) -> bool {
        self.status == CheckpointStatus::InProgress && self.cursor.is_some()
    }

    /// Marks the record exhausted. Completion always drops the cursor.
    pub fn complete(mut self, now: DateTime<Utc>) -> Self {
        self.status = CheckpointStatus::Completed;
        self.cursor = None;
        self.last_error = None;
        self.updated_at = now;
        self.completed_at = Some(now);
        self
    }
}
