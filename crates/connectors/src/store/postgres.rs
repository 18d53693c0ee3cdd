use crate::{
    error::StoreError,
    store::{CheckpointStore, PeriodTotalStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    checkpoint::{CheckpointKey, CheckpointRecord, CheckpointStatus},
    core::{scope::Scope, window::Period},
    pagination::cursor::Cursor,
};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::Decimal;
use tokio_postgres::{Client, Config, NoTls, Row, config::SslMode};
use tracing::{error, info, warn};

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");
const CHECKPOINT_LOAD_SQL: &str = include_str!("sql/checkpoint_load.sql");
const CHECKPOINT_UPSERT_SQL: &str = include_str!("sql/checkpoint_upsert.sql");
const CHECKPOINT_COMPLETE_SQL: &str = include_str!("sql/checkpoint_complete.sql");
const PERIOD_TOTAL_UPSERT_SQL: &str = include_str!("sql/period_total_upsert.sql");
const PERIOD_TOTAL_LOAD_SQL: &str = include_str!("sql/period_total_load.sql");

/// Checkpoints and period totals kept in the application's PostgreSQL database.
///
/// The natural key relies on `UNIQUE NULLS NOT DISTINCT` (PostgreSQL 15+) so that a
/// NULL scope is a single, regular key value for the upsert conflict target.
pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = connect_client(url).await?;
        Ok(Self { client })
    }

    /// Creates the tables when they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.client.batch_execute(SCHEMA_SQL).await?;
        info!("Harvest tables are in place");
        Ok(())
    }
}

async fn connect_client(url: &str) -> Result<Client, StoreError> {
    let config = url
        .parse::<Config>()
        .map_err(|e| StoreError::InvalidUrl(e.to_string()))?;

    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config).await,
        SslMode::Prefer => match connect_with_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config).await,
    }
}

async fn connect_with_tls(config: Config) -> Result<Client, StoreError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config.connect(tls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

async fn connect_without_tls(config: Config) -> Result<Client, StoreError> {
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

fn to_db_count(pages: u64) -> Result<i64, StoreError> {
    i64::try_from(pages).map_err(|_| StoreError::Corrupt(format!("page count {pages} overflows BIGINT")))
}

fn record_from_row(row: &Row) -> Result<CheckpointRecord, StoreError> {
    let scope: Option<String> = row.try_get("scope_key")?;
    let status: String = row.try_get("status")?;
    let pages: i64 = row.try_get("pages_processed")?;

    Ok(CheckpointRecord {
        key: CheckpointKey {
            scope: Scope::from(scope),
            start: row.try_get("window_start")?,
            end: row.try_get("window_end")?,
        },
        status: status.parse::<CheckpointStatus>().map_err(StoreError::Corrupt)?,
        cursor: row.try_get::<_, Option<String>>("cursor")?.map(Cursor::from),
        pages_processed: u64::try_from(pages)
            .map_err(|_| StoreError::Corrupt(format!("negative page count {pages}")))?,
        accumulated_total: row.try_get("accumulated_total")?,
        last_error: row.try_get("last_error")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl CheckpointStore for PgStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<CheckpointRecord>, StoreError> {
        let row = self
            .client
            .query_opt(CHECKPOINT_LOAD_SQL, &[&key.scope.as_key(), &key.start, &key.end])
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        let pages = to_db_count(record.pages_processed)?;
        let cursor = record.cursor.as_ref().map(|c| c.as_str());
        self.client
            .execute(
                CHECKPOINT_UPSERT_SQL,
                &[
                    &record.key.scope.as_key(),
                    &record.key.start,
                    &record.key.end,
                    &record.status.as_str(),
                    &cursor,
                    &pages,
                    &record.accumulated_total,
                    &record.last_error,
                    &record.updated_at,
                    &record.completed_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn mark_complete(
        &self,
        key: &CheckpointKey,
        total: Decimal,
        pages_processed: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<CheckpointRecord, StoreError> {
        let pages = to_db_count(pages_processed)?;
        let row = self
            .client
            .query_one(
                CHECKPOINT_COMPLETE_SQL,
                &[
                    &key.scope.as_key(),
                    &key.start,
                    &key.end,
                    &pages,
                    &total,
                    &completed_at,
                ],
            )
            .await?;
        record_from_row(&row)
    }
}

#[async_trait]
impl PeriodTotalStore for PgStore {
    async fn upsert_total(
        &self,
        scope: &str,
        period: Period,
        total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.client
            .execute(
                PERIOD_TOTAL_UPSERT_SQL,
                &[&scope, &period.to_string(), &total, &updated_at],
            )
            .await?;
        Ok(())
    }

    async fn load_total(&self, scope: &str, period: Period) -> Result<Option<Decimal>, StoreError> {
        let row = self
            .client
            .query_opt(PERIOD_TOTAL_LOAD_SQL, &[&scope, &period.to_string()])
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("refund_total")?),
            None => None,
        })
    }
}
