//! Screener engine.
//!
//! Drives one screening run: resolve the ticker list, fetch snapshots
//! through the cache on a bounded worker pool, derive and filter rows, then
//! rank the survivors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use compounder_common::error::ResultExt;
use compounder_common::{FilterConfig, Result, ScreenerConfig};

use crate::data::{FundamentalDataSource, RetryingFetcher, SnapshotCache, TickerUniverse};
use crate::pool::WorkerPool;
use crate::valuation::ValuationEngine;

use super::compounder::CompounderRow;
use super::quantitative::{CriterionCheck, FilterEvaluator, FilterOutcome};

// ============================================================================
// Screen Result
// ============================================================================

/// One evaluated row with its criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub row: CompounderRow,
    pub passed: bool,
    pub checks: Vec<CriterionCheck>,
}

/// Result of a screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenResult {
    /// Run ID (timestamp-based)
    pub id: String,
    /// Market selector, or "custom" for an explicit ticker list
    pub market: String,
    /// Tickers attempted
    pub scanned: usize,
    /// Tickers with a snapshot
    pub evaluated: usize,
    /// Rows passing every criterion, before the top-N cut
    pub qualified: usize,
    /// Thresholds in effect
    pub thresholds: FilterConfig,
    /// Every evaluated row, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Vec<Diagnostic>>,
    /// Passing rows by score descending, at most top-N
    pub top: Vec<CompounderRow>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScreenResult {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} tickers ({} evaluated) in {:.1}s: {} qualified, top {} returned",
            self.scanned,
            self.evaluated,
            self.duration_secs,
            self.qualified,
            self.top.len()
        )
    }
}

// ============================================================================
// Screener Engine
// ============================================================================

/// The screening orchestrator.
pub struct ScreenerEngine<S: ?Sized> {
    config: ScreenerConfig,
    cache: SnapshotCache,
    fetcher: RetryingFetcher<S>,
    universe: Arc<dyn TickerUniverse>,
    valuation: ValuationEngine,
    evaluator: FilterEvaluator,
}

impl<S> ScreenerEngine<S>
where
    S: FundamentalDataSource + ?Sized,
{
    pub fn new(
        config: ScreenerConfig,
        filters: FilterConfig,
        cache: SnapshotCache,
        fetcher: RetryingFetcher<S>,
        universe: Arc<dyn TickerUniverse>,
    ) -> Self {
        Self {
            config,
            cache,
            fetcher,
            universe,
            valuation: ValuationEngine::new(),
            evaluator: FilterEvaluator::new(filters),
        }
    }

    /// Explicit tickers when given, else the market universe; capped at
    /// `max_tickers`.
    pub async fn resolve_tickers(&self) -> Result<Vec<String>> {
        let mut tickers = match self.config.tickers.as_ref().filter(|t| !t.is_empty()) {
            Some(explicit) => explicit.clone(),
            None => self
                .universe
                .list_tickers(&self.config.market)
                .await
                .context(format!("Failed to resolve universe for market '{}'", self.config.market))?,
        };
        if let Some(max) = self.config.max_tickers {
            tickers.truncate(max);
        }
        Ok(tickers)
    }

    /// Run a full screen. Only universe resolution can fail the run.
    pub async fn run(&self) -> Result<ScreenResult> {
        let started_at = Utc::now();
        let id = format!("screen_{}", started_at.format("%Y%m%d_%H%M%S"));
        let market = if self.config.tickers.as_ref().is_some_and(|t| !t.is_empty()) {
            "custom".to_string()
        } else {
            self.config.market.clone()
        };

        let tickers = self.resolve_tickers().await?;
        let scanned = tickers.len();
        let pool = WorkerPool::new(self.config.concurrency);
        info!(
            id = %id,
            market = %market,
            tickers = scanned,
            workers = pool.workers(),
            cache = self.cache.store_name(),
            ttl_days = self.cache.ttl().num_days(),
            "Starting screen"
        );

        let evaluated: Vec<(CompounderRow, FilterOutcome)> = pool
            .run(tickers, |ticker, index| self.evaluate_ticker(ticker, index))
            .await
            .into_iter()
            .flatten()
            .collect();

        let mut passing: Vec<CompounderRow> = evaluated
            .iter()
            .filter(|(_, outcome)| outcome.passed)
            .map(|(row, _)| row.clone())
            .collect();
        let qualified = passing.len();
        // Stable: equal scores keep universe order
        passing.sort_by(|a, b| b.score.cmp(&a.score));
        passing.truncate(self.config.top_n);

        let diagnostics: Option<Vec<Diagnostic>> = self.config.include_diagnostics.then(|| {
            evaluated
                .iter()
                .map(|(row, outcome)| Diagnostic {
                    row: row.clone(),
                    passed: outcome.passed,
                    checks: outcome.checks.clone(),
                })
                .collect()
        });

        let completed_at = Utc::now();
        let result = ScreenResult {
            id,
            market,
            scanned,
            evaluated: evaluated.len(),
            qualified,
            thresholds: *self.evaluator.config(),
            diagnostics,
            top: passing,
            started_at,
            completed_at,
            duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        };

        info!("{}", result.summary());
        Ok(result)
    }

    /// Cache-through fetch, derive and filter one ticker. `None` skips it.
    async fn evaluate_ticker(&self, ticker: String, index: usize) -> Option<(CompounderRow, FilterOutcome)> {
        let Some(snapshot) = self.cache.get_or_fetch(&ticker, &self.fetcher).await else {
            debug!(ticker = %ticker, index, "No snapshot, skipping");
            return None;
        };

        let row = CompounderRow::from_snapshot(&snapshot, &self.valuation);
        let outcome = self.evaluator.evaluate(&row);
        debug!(
            ticker = %ticker,
            index,
            score = row.score,
            passed = outcome.passed,
            failures = outcome.failures().count(),
            "Evaluated ticker"
        );
        Some((row, outcome))
    }
}
