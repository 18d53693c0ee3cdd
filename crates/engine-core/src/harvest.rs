//! Entry points of one harvest invocation.

use crate::{
    aggregate::ResultAggregator,
    error::HarvestError,
    extract::CurrencyTracker,
    fetcher::{PaginatedFetcher, TokenCell},
    metrics::HarvestMetrics,
    pacing::Pacer,
    window::clamp_window,
};
use chrono::{TimeDelta, Utc};
use connectors::{
    auth::TokenProvider,
    source::EventSource,
    store::{CheckpointStore, PeriodTotalStore},
};
use engine_config::settings::HarvestSettings;
use model::{
    core::window::FetchWindow,
    harvest::{HarvestReport, HarvestRequest},
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators of one invocation, injected by the caller.
pub struct Harvester {
    tokens: Arc<dyn TokenProvider>,
    source: Arc<dyn EventSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    period_totals: Option<Arc<dyn PeriodTotalStore>>,
    settings: HarvestSettings,
    pacer: Pacer,
    metrics: HarvestMetrics,
}

impl Harvester {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        source: Arc<dyn EventSource>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            tokens,
            source,
            checkpoints,
            period_totals: None,
            pacer: Pacer::new(settings.page_interval),
            settings,
            metrics: HarvestMetrics::new(),
        }
    }

    pub fn with_period_totals(mut self, store: Arc<dyn PeriodTotalStore>) -> Self {
        self.period_totals = Some(store);
        self
    }

    pub fn metrics(&self) -> &HarvestMetrics {
        &self.metrics
    }

    /// Harvests a single window, by default at most 50 pages, and propagates
    /// its total when complete.
    pub async fn harvest_range(
        &self,
        request: &HarvestRequest,
    ) -> Result<HarvestReport, HarvestError> {
        let (window, max_pages) = self.validate(request, self.settings.range_page_limit)?;
        info!(window = %window, max_pages, "Harvesting range");

        let tokens = TokenCell::new(self.tokens.as_ref());
        let fetcher = self.fetcher(&tokens);
        let aggregator = self.aggregator();

        let outcome = fetcher
            .run(&window, max_pages, &mut CurrencyTracker::default())
            .await?;
        let report = aggregator.finalize(&outcome).await;
        aggregator
            .propagate(&outcome.window, &report)
            .await?;

        Ok(report)
    }

    /// Harvests a window of any length, by default at most 100 pages in total.
    ///
    /// The window is cut into consecutive sub-ranges of at most the configured
    /// span, each with its own checkpoint, harvested in order. The first
    /// incomplete sub-range ends the call. The combined total is propagated
    /// once, after every sub-range completed, and only when the window lies
    /// within a single month.
    pub async fn harvest(&self, request: &HarvestRequest) -> Result<HarvestReport, HarvestError> {
        let (window, max_pages) = self.validate(request, self.settings.harvest_page_limit)?;

        let effective = clamp_window(&window, Utc::now(), self.settings.clamp_margin)?;
        if let Some(requested) = effective.clamped_from {
            warn!(
                requested_end = %requested.to_rfc3339(),
                effective_end = %effective.window.end.to_rfc3339(),
                "Window end too close to now, clamped"
            );
        }
        let window = effective.window;

        let span = TimeDelta::from_std(self.settings.max_window_span).unwrap_or(TimeDelta::MAX);
        let parts = window.split(span)?;
        info!(window = %window, sub_ranges = parts.len(), max_pages, "Harvesting window");

        let tokens = TokenCell::new(self.tokens.as_ref());
        let fetcher = self.fetcher(&tokens);
        let aggregator = self.aggregator();
        let mut currency = CurrencyTracker::default();

        let mut total = Decimal::ZERO;
        let mut pages = 0u64;
        let mut used = 0u32;
        let mut completed = true;

        for part in &parts {
            let remaining = max_pages.saturating_sub(used);
            let outcome = fetcher.run(part, remaining, &mut currency).await?;
            let report = aggregator.finalize(&outcome).await;

            used += outcome.run_pages;
            total = total
                .checked_add(report.total_amount)
                .ok_or(HarvestError::TotalOverflow)?;
            pages += report.pages_processed;

            if !report.completed {
                info!(
                    window = %part,
                    pages_used = used,
                    "Sub-range incomplete, stopping"
                );
                completed = false;
                break;
            }
        }

        let report = HarvestReport {
            total_amount: total,
            pages_processed: pages,
            completed,
        };
        aggregator
            .propagate(&window, &report)
            .await?;

        info!(
            total = %report.total_amount,
            pages = report.pages_processed,
            completed = report.completed,
            "Harvest finished"
        );
        Ok(report)
    }

    /// Checks the request before any network or datastore call.
    fn validate(
        &self,
        request: &HarvestRequest,
        default_pages: u32,
    ) -> Result<(FetchWindow, u32), HarvestError> {
        let window = request.window()?;
        let max_pages = request.max_pages.unwrap_or(default_pages);
        if max_pages == 0 {
            return Err(HarvestError::InvalidRequest(
                "maxPages must be at least 1".to_string(),
            ));
        }
        Ok((window, max_pages))
    }

    fn fetcher<'a>(&'a self, tokens: &'a TokenCell<'a>) -> PaginatedFetcher<'a> {
        PaginatedFetcher::new(
            tokens,
            self.source.as_ref(),
            self.checkpoints.as_ref(),
            &self.settings,
            &self.pacer,
            self.metrics.clone(),
        )
    }

    fn aggregator(&self) -> ResultAggregator<'_> {
        ResultAggregator::new(self.checkpoints.as_ref(), self.period_totals.as_deref())
    }
}
