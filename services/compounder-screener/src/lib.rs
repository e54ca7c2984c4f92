//! Compounder Screener Library
//!
//! Screens equities for "quality compounder" traits: consistent revenue and
//! earnings growth, high return on invested capital, growing free cash flow,
//! shrinking share count and wide operating margins, with a DCF estimate of
//! intrinsic value alongside.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                   compounder-screener                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  Data           │  │  Valuation      │  │  Screener       │     │
//! │  │  (fetch/cache)  │─▶│  (growth, DCF)  │─▶│  (score/filter) │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod pool;
pub mod screener;
pub mod valuation;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use compounder_common::Config;

use crate::data::{
    FundamentalDataSource, RetryConfig, RetryingFetcher, SnapshotCache, SqliteSnapshotStore,
    StaticUniverse, YahooFinanceSource,
};
use crate::screener::{ScreenResult, ScreenerEngine};

/// Wires configuration into a runnable screen.
pub struct ScreenerService {
    config: Config,
}

impl ScreenerService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Engine over `source`, using the configured universes, thresholds
    /// and retry settings.
    pub fn engine<S>(&self, cache: SnapshotCache, source: Arc<S>) -> ScreenerEngine<S>
    where
        S: FundamentalDataSource + ?Sized,
    {
        let fetcher = RetryingFetcher::new(source, RetryConfig::from(&self.config.fetch));
        let universe = Arc::new(StaticUniverse::with_defaults(&self.config.universes));
        ScreenerEngine::new(
            self.config.screener.clone(),
            self.config.filters,
            cache,
            fetcher,
            universe,
        )
    }

    /// Run one screen against Yahoo Finance with the SQLite snapshot cache.
    pub async fn run(&self) -> Result<ScreenResult> {
        let store = SqliteSnapshotStore::open(&self.config.cache.path)
            .context("Failed to open snapshot cache")?;
        let cache = SnapshotCache::with_ttl_days(Arc::new(store), self.config.cache.ttl_days);

        let source = YahooFinanceSource::new(Duration::from_secs(self.config.fetch.request_timeout_secs))
            .context("Failed to create Yahoo Finance source")?;

        let engine = self.engine(cache.clone(), Arc::new(source));
        let result = engine.run().await;

        // Close even when the run failed
        cache.close().await;
        Ok(result?)
    }
}
