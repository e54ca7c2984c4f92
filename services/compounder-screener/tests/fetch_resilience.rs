//! Fetch resilience tests.
//!
//! Covers retry recovery through the snapshot cache, snapshot persistence in
//! SQLite across runs, and the worker pool's exactly-once guarantee.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use compounder_screener::data::{
    DateInput, Frequency, FundamentalDataSource, PriceBar, ProviderError, QuoteSummary, RawRow,
    RetryConfig, RetryingFetcher, SnapshotCache, SqliteSnapshotStore, Statement,
};
use compounder_screener::pool::WorkerPool;

// ============================================================================
// Mock Sources
// ============================================================================

/// Fails the first `failures` quote requests, then serves a minimal snapshot.
struct FlakeySource {
    failures: u32,
    calls: AtomicU32,
}

impl FlakeySource {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FundamentalDataSource for FlakeySource {
    fn name(&self) -> &'static str {
        "flakey"
    }

    async fn quote_summary(&self, _ticker: &str) -> Result<QuoteSummary, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(ProviderError::RateLimited { retry_after_secs: None });
        }
        Ok(QuoteSummary {
            operating_margin: Some(0.25),
            current_price: Some(50.0),
            ..Default::default()
        })
    }

    async fn fundamentals_time_series(
        &self,
        _ticker: &str,
        _period_start: NaiveDate,
        frequency: Frequency,
        statement: Statement,
    ) -> Result<Vec<RawRow>, ProviderError> {
        if frequency != Frequency::Annual || statement != Statement::Financials {
            return Ok(Vec::new());
        }
        Ok(vec![
            RawRow::new(DateInput::Text("2023-12-31".into())).with("totalRevenue", 90.0),
            RawRow::new(DateInput::Text("2024-12-31".into())).with("totalRevenue", 100.0),
        ])
    }

    async fn daily_history(
        &self,
        _ticker: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        Ok(Vec::new())
    }
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay: StdDuration::ZERO,
        jitter_max: StdDuration::ZERO,
        ..RetryConfig::default()
    }
}

// ============================================================================
// Retry Through Cache
// ============================================================================

#[tokio::test]
async fn test_retry_recovers_and_populates_cache() {
    let source = Arc::new(FlakeySource::new(2));
    let fetcher = RetryingFetcher::new(Arc::clone(&source), fast_retry(3));
    let cache = SnapshotCache::in_memory(Duration::days(7));

    let snapshot = cache.get_or_fetch("msft", &fetcher).await.unwrap();
    assert_eq!(snapshot.financials.len(), 2);
    assert_eq!(source.calls(), 3);

    // Served from cache under the normalized key
    let again = cache.get_or_fetch("MSFT", &fetcher).await.unwrap();
    assert_eq!(again, snapshot);
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_leave_cache_empty() {
    let source = Arc::new(FlakeySource::new(u32::MAX));
    let fetcher = RetryingFetcher::new(Arc::clone(&source), fast_retry(2));
    let cache = SnapshotCache::in_memory(Duration::days(7));

    assert!(cache.get_or_fetch("MSFT", &fetcher).await.is_none());
    assert_eq!(source.calls(), 3);
    assert!(cache.is_empty().await);
}

// ============================================================================
// SQLite Persistence
// ============================================================================

#[tokio::test]
async fn test_sqlite_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("snapshots.db");
    let source = Arc::new(FlakeySource::new(0));
    let fetcher = RetryingFetcher::new(Arc::clone(&source), fast_retry(0));

    {
        let store = SqliteSnapshotStore::open(&path).unwrap();
        let cache = SnapshotCache::with_ttl_days(Arc::new(store), 7);
        assert!(cache.get_or_fetch("AAPL", &fetcher).await.is_some());
        cache.close().await;
    }
    assert_eq!(source.calls(), 1);

    let store = SqliteSnapshotStore::open(&path).unwrap();
    let cache = SnapshotCache::with_ttl_days(Arc::new(store), 7);
    let snapshot = cache.get_or_fetch("AAPL", &fetcher).await.unwrap();
    assert_eq!(snapshot.ticker, "AAPL");
    assert_eq!(snapshot.operating_margin, Some(0.25));
    assert_eq!(source.calls(), 1);
    assert_eq!(cache.len().await, 1);
    cache.close().await;
}

// ============================================================================
// Worker Pool
// ============================================================================

#[tokio::test]
async fn test_pool_processes_each_item_exactly_once() {
    let counters: Vec<AtomicUsize> = (0..10).map(|_| AtomicUsize::new(0)).collect();
    let in_flight = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    let items: Vec<usize> = (0..10).collect();
    let (counters_ref, in_flight_ref, peak_ref) = (&counters, &in_flight, &peak);
    let results = WorkerPool::new(3)
        .run(items, |item, index| async move {
            let now = in_flight_ref.fetch_add(1, Ordering::SeqCst) + 1;
            peak_ref.fetch_max(now, Ordering::SeqCst);
            counters_ref[item].fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(StdDuration::from_millis((item as u64 * 7) % 5)).await;
            in_flight_ref.fetch_sub(1, Ordering::SeqCst);
            (item, index)
        })
        .await;

    assert_eq!(results.len(), 10);
    for (i, (item, index)) in results.iter().enumerate() {
        assert_eq!(*item, i);
        assert_eq!(*index, i);
    }
    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
    assert!(peak.load(Ordering::SeqCst) <= 3);
}
