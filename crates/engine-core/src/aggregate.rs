use crate::{
    error::HarvestError,
    fetcher::{FetchOutcome, StopReason},
};
use chrono::Utc;
use connectors::store::{CheckpointStore, PeriodTotalStore};
use model::{
    checkpoint::CheckpointRecord,
    core::window::FetchWindow,
    harvest::HarvestReport,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Finalizes fetch outcomes and hands finished totals downstream.
pub struct ResultAggregator<'a> {
    checkpoints: &'a dyn CheckpointStore,
    period_totals: Option<&'a dyn PeriodTotalStore>,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(
        checkpoints: &'a dyn CheckpointStore,
        period_totals: Option<&'a dyn PeriodTotalStore>,
    ) -> Self {
        Self {
            checkpoints,
            period_totals,
        }
    }

    /// Marks a genuinely exhausted window `COMPLETED`; anything else was already
    /// persisted `IN_PROGRESS` by the fetcher and is reported as incomplete.
    pub async fn finalize(&self, outcome: &FetchOutcome) -> HarvestReport {
        match outcome.stop {
            StopReason::Exhausted => self.complete(&outcome.record).await,
            StopReason::AlreadyCompleted => HarvestReport::from(&outcome.record),
            _ => HarvestReport {
                total_amount: outcome.record.accumulated_total,
                pages_processed: outcome.record.pages_processed,
                completed: false,
            },
        }
    }

    async fn complete(&self, record: &CheckpointRecord) -> HarvestReport {
        let now = Utc::now();
        match self
            .checkpoints
            .mark_complete(
                &record.key,
                record.accumulated_total,
                record.pages_processed,
                now,
            )
            .await
        {
            Ok(stored) => {
                info!(
                    key = %stored.key,
                    total = %stored.accumulated_total,
                    pages = stored.pages_processed,
                    "Window harvest completed"
                );
                HarvestReport::from(&stored)
            }
            Err(err) => {
                // The window was exhausted; a later run re-fetches from the last commit.
                warn!(key = %record.key, error = %err, "Failed to mark checkpoint completed");
                HarvestReport {
                    total_amount: record.accumulated_total,
                    pages_processed: record.pages_processed,
                    completed: true,
                }
            }
        }
    }

    /// Writes a finished total into the per-period record of the window's scope.
    ///
    /// Skipped for the global scope, for zero totals, for incomplete harvests
    /// and for windows spanning more than one month. Returns whether a write
    /// happened.
    pub async fn propagate(
        &self,
        window: &FetchWindow,
        report: &HarvestReport,
    ) -> Result<bool, HarvestError> {
        let Some(store) = self.period_totals else {
            return Ok(false);
        };
        let Some(key) = window.scope.as_key() else {
            return Ok(false);
        };
        if !report.completed || report.total_amount == Decimal::ZERO {
            return Ok(false);
        }
        let Some(period) = window.period() else {
            warn!(
                window = %window,
                total = %report.total_amount,
                "Window spans several months, period total not updated"
            );
            return Ok(false);
        };

        store
            .upsert_total(key, period, report.total_amount, Utc::now())
            .await
            .map_err(HarvestError::Downstream)?;
        info!(
            scope = %key,
            period = %period,
            total = %report.total_amount,
            "Period total updated"
        );
        Ok(true)
    }
}
