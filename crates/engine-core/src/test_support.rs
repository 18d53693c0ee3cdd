//! In-memory collaborators for fetcher and harvester tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectors::{
    auth::{AccessToken, TokenProvider},
    error::{AuthError, SourceError, StoreError},
    source::{EventSource, PageQuery},
    store::{CheckpointStore, PeriodTotalStore},
};
use model::{
    checkpoint::{CheckpointKey, CheckpointRecord},
    core::window::Period,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// Page `index` of `count`, one Principal refund per amount, all for `sku`.
pub fn refund_page(index: usize, count: usize, sku: &str, amounts: &[&str]) -> Value {
    let charges: Vec<Value> = amounts
        .iter()
        .map(|amount| {
            json!({
                "ChargeType": "Principal",
                "ChargeAmount": { "CurrencyCode": "USD", "CurrencyAmount": amount }
            })
        })
        .collect();

    let mut payload = json!({
        "FinancialEvents": {
            "RefundEventList": [ {
                "ShipmentItemAdjustmentList": [ {
                    "SellerSKU": sku,
                    "ItemChargeAdjustmentList": charges
                } ]
            } ]
        }
    });
    if index + 1 < count {
        payload["NextToken"] = json!(format!("page-{}", index + 1));
    }
    json!({ "payload": payload })
}

/// `count` pages, each holding one `-10.00` refund for `sku`.
pub fn ten_per_page(count: usize, sku: &str) -> Vec<Value> {
    (0..count)
        .map(|i| refund_page(i, count, sku, &["-10.00"]))
        .collect()
}

/// Serves pages by cursor: no cursor is page 0, `page-N` is page N.
/// Failures can be scripted for specific calls (0-based).
#[derive(Default)]
pub struct ScriptedSource {
    pages: Vec<Value>,
    failures: Mutex<HashMap<usize, SourceError>>,
    overrides: Mutex<HashMap<usize, Value>>,
    queries: Mutex<Vec<PageQuery>>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<Value>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    /// The first calls fail with `failures`, in order.
    pub fn with_failures(self, failures: Vec<SourceError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .extend(failures.into_iter().enumerate());
        self
    }

    pub fn fail_call(self, call: usize, error: SourceError) -> Self {
        self.failures.lock().unwrap().insert(call, error);
        self
    }

    /// Replaces what page `index` returns.
    pub fn override_page(&self, index: usize, body: Value) {
        self.overrides.lock().unwrap().insert(index, body);
    }

    pub fn clear_override(&self, index: usize) {
        self.overrides.lock().unwrap().remove(&index);
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<PageQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn fetch_page(
        &self,
        _token: &AccessToken,
        query: &PageQuery,
    ) -> Result<Value, SourceError> {
        let call = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.clone());
            queries.len() - 1
        };
        if let Some(error) = self.failures.lock().unwrap().remove(&call) {
            return Err(error);
        }

        let index = match &query.cursor {
            None => 0,
            Some(cursor) => cursor
                .as_str()
                .trim_start_matches("page-")
                .parse()
                .expect("scripted cursor"),
        };
        if let Some(body) = self.overrides.lock().unwrap().get(&index) {
            return Ok(body.clone());
        }
        Ok(self.pages[index].clone())
    }
}

/// Checkpoints and period totals kept in memory. Writes can be made to fail.
#[derive(Default)]
pub struct MemoryStore {
    checkpoints: Mutex<HashMap<CheckpointKey, CheckpointRecord>>,
    totals: Mutex<HashMap<(String, Period), Decimal>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_loads: AtomicBool,
    fail_totals: AtomicBool,
}

impl MemoryStore {
    pub fn get(&self, key: &CheckpointKey) -> Option<CheckpointRecord> {
        self.checkpoints.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, record: CheckpointRecord) {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(record.key.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.checkpoints.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn total(&self, scope: &str, period: Period) -> Option<Decimal> {
        self.totals
            .lock()
            .unwrap()
            .get(&(scope.to_string(), period))
            .copied()
    }

    pub fn totals_len(&self) -> usize {
        self.totals.lock().unwrap().len()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_totals(&self, fail: bool) {
        self.fail_totals.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("write refused".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("load refused".into()));
        }
        Ok(self.get(key))
    }

    async fn upsert(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        self.check_write()?;
        self.put(record.clone());
        Ok(())
    }

    async fn mark_complete(
        &self,
        key: &CheckpointKey,
        total: Decimal,
        pages_processed: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<CheckpointRecord, StoreError> {
        self.check_write()?;
        let mut record = self
            .get(key)
            .unwrap_or_else(|| CheckpointRecord::new(key.clone(), completed_at));
        record.accumulated_total = total;
        record.pages_processed = pages_processed;
        let record = record.complete(completed_at);
        self.put(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl PeriodTotalStore for MemoryStore {
    async fn upsert_total(
        &self,
        scope: &str,
        period: Period,
        total: Decimal,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.fail_totals.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("downstream refused".into()));
        }
        self.totals
            .lock()
            .unwrap()
            .insert((scope.to_string(), period), total);
        Ok(())
    }

    async fn load_total(&self, scope: &str, period: Period) -> Result<Option<Decimal>, StoreError> {
        Ok(self.total(scope, period))
    }
}

/// Hands out a fixed token, or fails when `reject` is set.
#[derive(Default)]
pub struct StaticTokens {
    pub reject: bool,
    calls: AtomicUsize,
}

impl StaticTokens {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(AuthError::Rejected {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(AccessToken::new("test-token", None))
    }
}
