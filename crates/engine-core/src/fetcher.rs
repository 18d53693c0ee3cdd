//! Page-by-page retrieval of one window with backoff, pacing and checkpoints.

use crate::{
    error::{HarvestError, PageError},
    extract::{CurrencyTracker, ExtractedAmount, extract_page},
    metrics::HarvestMetrics,
    pacing::Pacer,
    retry::{RetryDisposition, RetryError, RetryPolicy},
    window::clamp_window,
};
use chrono::Utc;
use connectors::{
    auth::{AccessToken, TokenProvider},
    error::{AuthError, SourceError},
    source::{EventSource, PageQuery},
    store::CheckpointStore,
};
use engine_config::settings::HarvestSettings;
use model::{
    checkpoint::{CheckpointKey, CheckpointRecord},
    core::window::FetchWindow,
    errors::PayloadError,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Obtains the bearer token on first use and reuses it for the rest of an invocation.
pub struct TokenCell<'a> {
    provider: &'a dyn TokenProvider,
    token: OnceCell<AccessToken>,
}

impl<'a> TokenCell<'a> {
    pub fn new(provider: &'a dyn TokenProvider) -> Self {
        Self {
            provider,
            token: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&AccessToken, AuthError> {
        self.token
            .get_or_try_init(|| async {
                let token = self.provider.access_token().await?;
                debug!(expires_in = ?token.expires_in(), "Obtained access token");
                Ok::<_, AuthError>(token)
            })
            .await
    }
}

/// Why the page loop ended.
#[derive(Debug)]
pub enum StopReason {
    /// A stored `COMPLETED` record short-circuited the run.
    AlreadyCompleted,
    /// The provider returned no continuation cursor.
    Exhausted,
    /// The page budget of this invocation ran out.
    PageLimit,
    /// A page could not be fetched or decoded.
    Failed(PageError),
}

impl StopReason {
    /// Whether the window is (now) fully harvested.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, StopReason::AlreadyCompleted | StopReason::Exhausted)
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    /// Window actually requested, after clamping.
    pub window: FetchWindow,
    /// In-memory state at the stop. Holds everything persisted so far and the
    /// pages fetched since the last commit.
    pub record: CheckpointRecord,
    /// Pages fetched by this invocation.
    pub run_pages: u32,
    pub stop: StopReason,
}

enum FetchState {
    Init,
    Resuming(CheckpointRecord),
    Starting(Option<CheckpointRecord>),
    FetchPage,
    Extract(serde_json::Value),
    PersistCheckpoint,
    Done(StopReason),
}

pub struct PaginatedFetcher<'a> {
    tokens: &'a TokenCell<'a>,
    source: &'a dyn EventSource,
    store: &'a dyn CheckpointStore,
    settings: &'a HarvestSettings,
    retry: RetryPolicy,
    pacer: &'a Pacer,
    metrics: HarvestMetrics,
}

impl<'a> PaginatedFetcher<'a> {
    pub fn new(
        tokens: &'a TokenCell<'a>,
        source: &'a dyn EventSource,
        store: &'a dyn CheckpointStore,
        settings: &'a HarvestSettings,
        pacer: &'a Pacer,
        metrics: HarvestMetrics,
    ) -> Self {
        Self {
            tokens,
            source,
            store,
            settings,
            retry: RetryPolicy::from(&settings.rate_limit),
            pacer,
            metrics,
        }
    }

    /// Harvests `window` until exhaustion, a failure, or `max_pages` pages.
    ///
    /// Errors only for failures the caller has to see: an unreadable checkpoint
    /// store on the initial load, an unusable window, or authentication.
    pub async fn run(
        &self,
        window: &FetchWindow,
        max_pages: u32,
        currency: &mut CurrencyTracker,
    ) -> Result<FetchOutcome, HarvestError> {
        let effective = clamp_window(window, Utc::now(), self.settings.clamp_margin)?;
        if let Some(requested) = effective.clamped_from {
            warn!(
                requested_end = %requested.to_rfc3339(),
                effective_end = %effective.window.end.to_rfc3339(),
                "Window end too close to now, clamped"
            );
        }
        let window = effective.window;
        let key = CheckpointKey::from(&window);

        let mut record = CheckpointRecord::new(key.clone(), Utc::now());
        let mut run_pages = 0u32;
        let mut state = FetchState::Init;

        let stop = loop {
            state = match state {
                FetchState::Init => match self.store.load(&key).await? {
                    Some(stored) if stored.is_completed() => {
                        info!(
                            key = %key,
                            total = %stored.accumulated_total,
                            pages = stored.pages_processed,
                            "Window already harvested"
                        );
                        record = stored;
                        FetchState::Done(StopReason::AlreadyCompleted)
                    }
                    Some(stored) if stored.is_resumable() => FetchState::Resuming(stored),
                    other => FetchState::Starting(other),
                },

                FetchState::Resuming(stored) => {
                    self.tokens.get().await?;
                    info!(
                        key = %key,
                        cursor = ?stored.cursor.as_ref().map(ToString::to_string),
                        total = %stored.accumulated_total,
                        pages = stored.pages_processed,
                        "Resuming harvest from checkpoint"
                    );
                    record = stored;
                    FetchState::FetchPage
                }

                FetchState::Starting(stale) => {
                    self.tokens.get().await?;
                    if stale.is_some() {
                        info!(key = %key, "Checkpoint has no cursor, restarting window");
                    } else {
                        info!(key = %key, "Starting harvest");
                    }
                    FetchState::FetchPage
                }

                FetchState::FetchPage => {
                    if run_pages >= max_pages {
                        info!(key = %key, pages = run_pages, "Page budget reached, stopping");
                        self.commit(&mut record).await;
                        FetchState::Done(StopReason::PageLimit)
                    } else {
                        let token = self.tokens.get().await?;
                        match self.fetch(token, &window, &record).await {
                            Ok(body) => FetchState::Extract(body),
                            Err(err) => {
                                error!(key = %key, error = %err, "Page fetch failed, stopping");
                                record.last_error = Some(err.to_string());
                                self.commit(&mut record).await;
                                FetchState::Done(StopReason::Failed(err))
                            }
                        }
                    }
                }

                FetchState::Extract(body) => match extract_page(&body, &window.scope)
                    .and_then(|(page, amounts)| {
                        let page_total = sum_amounts(&amounts)?;
                        let total = record
                            .accumulated_total
                            .checked_add(page_total)
                            .ok_or(PayloadError::AmountOverflow)?;
                        Ok((page, amounts, page_total, total))
                    }) {
                    Err(err) => {
                        let err = PageError::from(err);
                        error!(key = %key, error = %err, "Page payload rejected, stopping");
                        record.last_error = Some(err.to_string());
                        self.commit(&mut record).await;
                        FetchState::Done(StopReason::Failed(err))
                    }
                    Ok((page, amounts, page_total, total)) => {
                        for amount in &amounts {
                            currency.observe(&amount.currency);
                        }

                        record.accumulated_total = total;
                        record.pages_processed += 1;
                        record.cursor = page.next_cursor();
                        record.last_error = None;
                        run_pages += 1;
                        self.metrics.increment_pages(1);
                        self.metrics.increment_amounts(amounts.len() as u64);

                        debug!(
                            key = %key,
                            page = record.pages_processed,
                            amounts = amounts.len(),
                            page_total = %page_total,
                            total = %record.accumulated_total,
                            "Page processed"
                        );

                        if record.cursor.is_none() {
                            FetchState::Done(StopReason::Exhausted)
                        } else if self.commit_due(run_pages) {
                            FetchState::PersistCheckpoint
                        } else {
                            FetchState::FetchPage
                        }
                    }
                },

                FetchState::PersistCheckpoint => {
                    self.commit(&mut record).await;
                    FetchState::FetchPage
                }

                FetchState::Done(stop) => break stop,
            };
        };

        Ok(FetchOutcome {
            window,
            record,
            run_pages,
            stop,
        })
    }

    /// After the first page of an invocation, then every `checkpoint_every` pages.
    fn commit_due(&self, run_pages: u32) -> bool {
        let every = self.settings.checkpoint_every.max(1);
        run_pages == 1 || (run_pages - 1) % every == 0
    }

    /// Persists progress. Failures are logged, never fatal: the next commit
    /// or a later invocation catches up from the last stored state.
    async fn commit(&self, record: &mut CheckpointRecord) {
        record.updated_at = Utc::now();
        match self.store.upsert(record).await {
            Ok(()) => {
                self.metrics.increment_checkpoint_writes(1);
                info!(
                    key = %record.key,
                    pages = record.pages_processed,
                    total = %record.accumulated_total,
                    cursor = ?record.cursor.as_ref().map(ToString::to_string),
                    "Checkpoint committed"
                );
            }
            Err(err) => {
                self.metrics.increment_checkpoint_failures(1);
                warn!(key = %record.key, error = %err, "Failed to persist checkpoint, continuing");
            }
        }
    }

    async fn fetch(
        &self,
        token: &AccessToken,
        window: &FetchWindow,
        record: &CheckpointRecord,
    ) -> Result<serde_json::Value, PageError> {
        let query = PageQuery {
            posted_after: window.start,
            posted_before: window.end,
            cursor: record.cursor.clone(),
        };

        let attempts = AtomicU32::new(0);
        let (attempts_ref, query_ref) = (&attempts, &query);
        let (source, pacer) = (self.source, self.pacer);
        let result = self
            .retry
            .run(
                move || {
                    attempts_ref.fetch_add(1, Ordering::Relaxed);
                    async move {
                        pacer.wait().await;
                        source.fetch_page(token, query_ref).await
                    }
                },
                |err: &SourceError| match err {
                    SourceError::RateLimited { retry_after } => RetryDisposition::Retry {
                        hint: *retry_after,
                    },
                    _ => RetryDisposition::Stop,
                },
            )
            .await;

        let retries = attempts.load(Ordering::Relaxed).saturating_sub(1);
        if retries > 0 {
            self.metrics.increment_retries(u64::from(retries));
        }

        result.map_err(|err| match err {
            RetryError::Fatal(SourceError::InvalidBody(reason)) => {
                PageError::MalformedPayload(PayloadError::Decode(reason))
            }
            RetryError::Fatal(err) => PageError::ProviderHttp(err),
            RetryError::AttemptsExceeded { retries, .. } => PageError::RateLimitExceeded { retries },
        })
    }
}

fn sum_amounts(amounts: &[ExtractedAmount]) -> Result<Decimal, PayloadError> {
    amounts.iter().try_fold(Decimal::ZERO, |sum, amount| {
        sum.checked_add(amount.amount).ok_or(PayloadError::AmountOverflow)
    })
}
