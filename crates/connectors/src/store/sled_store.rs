use crate::{
    error::StoreError,
    store::{CheckpointStore, PeriodTotalStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    checkpoint::{CheckpointKey, CheckpointRecord},
    core::window::Period,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

const CHECKPOINT_TREE: &str = "checkpoints";
const PERIOD_TOTAL_TREE: &str = "period_totals";

/// Embedded store keeping checkpoints and period totals in two sled trees.
pub struct SledStore {
    db: sled::Db,
    checkpoints: sled::Tree,
    totals: sled::Tree,
}

#[derive(Serialize, Deserialize)]
struct StoredTotal {
    total: Decimal,
    updated_at: DateTime<Utc>,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let checkpoints = db.open_tree(CHECKPOINT_TREE)?;
        let totals = db.open_tree(PERIOD_TOTAL_TREE)?;
        Ok(Self {
            db,
            checkpoints,
            totals,
        })
    }

    /// The key is the bincode encoding of the natural key, so the `Scope` variant tag
    /// keeps the global scope apart from an empty scope key.
    #[inline]
    fn chk_key(key: &CheckpointKey) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serialize(key)?)
    }

    #[inline]
    fn total_key(scope: &str, period: Period) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serialize(&(scope, period))?)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SledStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>, StoreError> {
        match self.checkpoints.get(Self::chk_key(key)?)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        let key = Self::chk_key(&record.key)?;
        let value = bincode::serialize(record)?;
        self.checkpoints.insert(key, value)?;
        self.flush().await
    }

    async fn mark_complete(
        &self,
        key: &CheckpointKey,
        total: Decimal,
        pages_processed: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<CheckpointRecord, StoreError> {
        let raw_key = Self::chk_key(key)?;

        let result = self.checkpoints.transaction::<_, _, StoreError>(|tx| {
            let mut record = match tx.get(&raw_key)? {
                Some(bytes) => bincode::deserialize::<CheckpointRecord>(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?,
                None => CheckpointRecord::new(key.clone(), completed_at),
            };
            record.accumulated_total = total;
            record.pages_processed = pages_processed;
            let record = record.complete(completed_at);

            let bytes = bincode::serialize(&record)
                .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
            tx.insert(raw_key.as_slice(), bytes)?;
            Ok(record)
        });

        let record = match result {
            Ok(record) => record,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(StoreError::Sled(e)),
        };

        self.flush().await?;
        Ok(record)
    }
}

#[async_trait]
impl PeriodTotalStore for SledStore {
    async fn upsert_total(
        &self,
        scope: &str,
        period: Period,
        total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let value = bincode::serialize(&StoredTotal { total, updated_at })?;
        self.totals.insert(Self::total_key(scope, period)?, value)?;
        self.flush().await
    }

    async fn load_total(&self, scope: &str, period: Period) -> Result<Option<Decimal>, StoreError> {
        match self.totals.get(Self::total_key(scope, period)?)? {
            Some(bytes) => Ok(Some(bincode::deserialize::<StoredTotal>(&bytes)?.total)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use model::{checkpoint::CheckpointStatus, core::scope::Scope, pagination::cursor::Cursor};
    use tempfile::tempdir;

    fn key(scope: Scope) -> CheckpointKey {
        CheckpointKey {
            scope,
            start: Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 11, 30, 23, 59, 59).unwrap(),
        }
    }

    fn in_progress(scope: Scope, cursor: &str, pages: u64, total: i64) -> CheckpointRecord {
        let mut record = CheckpointRecord::new(key(scope), Utc::now());
        record.cursor = Some(Cursor::new(cursor));
        record.pages_processed = pages;
        record.accumulated_total = Decimal::new(total, 2);
        record
    }

    #[tokio::test]
    async fn upsert_replaces_single_record_per_key() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        store.upsert(&in_progress(Scope::key("A"), "c1", 1, 1000)).await.unwrap();
        store.upsert(&in_progress(Scope::key("A"), "c4", 4, 4000)).await.unwrap();
        // Replaying the same write leaves the same end state.
        store.upsert(&in_progress(Scope::key("A"), "c4", 4, 4000)).await.unwrap();

        let loaded = store.load(&key(Scope::key("A"))).await.unwrap().unwrap();
        assert_eq!(loaded.cursor, Some(Cursor::new("c4")));
        assert_eq!(loaded.pages_processed, 4);
        assert_eq!(store.checkpoints.len(), 1);
    }

    #[tokio::test]
    async fn global_scope_does_not_match_empty_key() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        store.upsert(&in_progress(Scope::key(""), "empty", 2, 500)).await.unwrap();
        assert!(store.load(&key(Scope::Global)).await.unwrap().is_none());

        store.upsert(&in_progress(Scope::Global, "global", 7, 900)).await.unwrap();
        let empty = store.load(&key(Scope::key(""))).await.unwrap().unwrap();
        let global = store.load(&key(Scope::Global)).await.unwrap().unwrap();
        assert_eq!(empty.cursor, Some(Cursor::new("empty")));
        assert_eq!(global.cursor, Some(Cursor::new("global")));
    }

    #[tokio::test]
    async fn mark_complete_clears_cursor_and_error() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let mut record = in_progress(Scope::key("SKU-123"), "c3", 2, 2000);
        record.last_error = Some("HTTP 500".into());
        store.upsert(&record).await.unwrap();

        let now = Utc::now();
        let done = store
            .mark_complete(&record.key, Decimal::new(3000, 2), 3, now)
            .await
            .unwrap();
        assert_eq!(done.status, CheckpointStatus::Completed);

        let loaded = store.load(&record.key).await.unwrap().unwrap();
        assert_eq!(loaded.status, CheckpointStatus::Completed);
        assert_eq!(loaded.cursor, None);
        assert_eq!(loaded.last_error, None);
        assert_eq!(loaded.pages_processed, 3);
        assert_eq!(loaded.accumulated_total, Decimal::new(3000, 2));
        assert_eq!(loaded.completed_at, Some(now));
    }

    #[tokio::test]
    async fn mark_complete_inserts_missing_record() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let k = key(Scope::Global);
        store.mark_complete(&k, Decimal::ZERO, 1, Utc::now()).await.unwrap();
        assert!(store.load(&k).await.unwrap().unwrap().is_completed());
    }

    #[tokio::test]
    async fn period_total_is_last_write_wins() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let period = Period { year: 2025, month: 11 };

        assert_eq!(store.load_total("SKU-123", period).await.unwrap(), None);
        store
            .upsert_total("SKU-123", period, Decimal::new(5000, 2), Utc::now())
            .await
            .unwrap();
        store
            .upsert_total("SKU-123", period, Decimal::new(3000, 2), Utc::now())
            .await
            .unwrap();

        assert_eq!(
            store.load_total("SKU-123", period).await.unwrap(),
            Some(Decimal::new(3000, 2))
        );
        assert_eq!(store.load_total("SKU-999", period).await.unwrap(), None);
    }
}
