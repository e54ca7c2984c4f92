//! Retrying snapshot fetcher.
//!
//! Wraps a [`FundamentalDataSource`] and turns the six upstream requests a
//! snapshot needs into one unit of work that is retried with exponential
//! backoff. Exhaustion is a soft failure: the ticker is logged and `None`
//! is returned so the rest of the batch carries on.

use chrono::{Months, NaiveDate, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use compounder_common::FetchConfig;

use super::normalize::build_snapshot;
use super::provider::{Frequency, FundamentalDataSource, ProviderError, RawBundle, Statement};
use super::TickerSnapshot;

/// Retry and pacing settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Pre-request delay and backoff base (doubles with each retry).
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each backoff.
    pub jitter_max: Duration,
    /// Deadline for one attempt's whole request batch.
    pub request_timeout: Duration,
    /// Years of statements and daily history to request.
    pub history_years: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            history_years: config.history_years,
        }
    }
}

/// Fetches and normalizes snapshots, retrying failed attempts as a unit.
pub struct RetryingFetcher<S: ?Sized> {
    source: Arc<S>,
    config: RetryConfig,
}

impl<S: ?Sized> Clone for RetryingFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: self.config.clone(),
        }
    }
}

impl<S> RetryingFetcher<S>
where
    S: FundamentalDataSource + ?Sized,
{
    pub fn new(source: Arc<S>, config: RetryConfig) -> Self {
        Self { source, config }
    }

    /// Backoff after failed attempt `attempt` (0-based):
    /// `base * 2^attempt + random(0..=jitter_max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt));
        let jitter_cap = self.config.jitter_max.as_millis() as u64;
        let jitter_ms = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        Duration::from_millis(exp_ms.saturating_add(jitter_ms))
    }

    /// Fetch a normalized snapshot, or `None` once retries are exhausted.
    pub async fn fetch(&self, ticker: &str) -> Option<TickerSnapshot> {
        // Courtesy delay before each ticker's first batch
        if !self.config.base_delay.is_zero() {
            tokio::time::sleep(self.config.base_delay).await;
        }

        let total = self.config.max_retries + 1;
        for attempt in 0..total {
            match self.fetch_once(ticker).await {
                Ok(snapshot) => {
                    debug!(ticker, attempt = attempt + 1, source = self.source.name(), "Fetched snapshot");
                    return Some(snapshot);
                }
                Err(e) if attempt + 1 < total => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        ticker,
                        attempt = attempt + 1,
                        max_attempts = total,
                        recoverable = e.is_recoverable(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(ticker, attempts = total, error = %e, "Fetch failed, giving up");
                }
            }
        }
        None
    }

    /// One attempt: every request concurrently, all-or-nothing.
    async fn fetch_once(&self, ticker: &str) -> Result<TickerSnapshot, ProviderError> {
        let today = Utc::now().date_naive();
        let start = history_start(today, self.config.history_years);
        let src = &self.source;

        let batch = async {
            tokio::try_join!(
                src.quote_summary(ticker),
                src.fundamentals_time_series(ticker, start, Frequency::Annual, Statement::Financials),
                src.fundamentals_time_series(ticker, start, Frequency::Annual, Statement::BalanceSheet),
                src.fundamentals_time_series(ticker, start, Frequency::Annual, Statement::CashFlow),
                src.fundamentals_time_series(ticker, start, Frequency::Quarterly, Statement::BalanceSheet),
                src.daily_history(ticker, start, today),
            )
        };

        let (quote, financials, balance_sheet, cash_flow, quarterly_balance_sheet, history) =
            tokio::time::timeout(self.config.request_timeout, batch)
                .await
                .map_err(|_| {
                    ProviderError::Timeout(format!(
                        "{} batch exceeded {:?}",
                        ticker, self.config.request_timeout
                    ))
                })??;

        Ok(build_snapshot(
            ticker,
            RawBundle {
                quote,
                financials,
                balance_sheet,
                cash_flow,
                quarterly_balance_sheet,
                history,
            },
        ))
    }
}

fn history_start(today: NaiveDate, years: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}
