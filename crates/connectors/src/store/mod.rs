use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    checkpoint::{CheckpointKey, CheckpointRecord},
    core::window::Period,
};
use rust_decimal::Decimal;

pub mod postgres;
pub mod sled_store;

/// Durable harvesting progress, one record per natural key.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>, StoreError>;

    /// Inserts or replaces the record stored under `record.key`.
    async fn upsert(&self, record: &CheckpointRecord) -> Result<(), StoreError>;

    /// Atomically stores the final total, clears the cursor and marks the key completed.
    async fn mark_complete(
        &self,
        key: &CheckpointKey,
        total: Decimal,
        pages_processed: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<CheckpointRecord, StoreError>;
}

/// Downstream per-period record that receives finished totals.
#[async_trait]
pub trait PeriodTotalStore: Send + Sync {
    /// Last write wins; any previous value for `(scope, period)` is replaced.
    async fn upsert_total(
        &self,
        scope: &str,
        period: Period,
        total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn load_total(&self, scope: &str, period: Period) -> Result<Option<Decimal>, StoreError>;
}
