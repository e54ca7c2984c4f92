//! Snapshot cache with TTL and schema-version staleness rules.
//!
//! The cache sits in front of a [`SnapshotStore`] (durable or in-memory) and
//! decides whether a stored snapshot may be reused. Store failures never
//! escape a lookup: they are logged and treated as misses.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::fetcher::RetryingFetcher;
use super::provider::FundamentalDataSource;
use super::TickerSnapshot;

// ============================================================================
// Store
// ============================================================================

/// A snapshot together with the time it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub snapshot: TickerSnapshot,
    pub fetched_at: DateTime<Utc>,
}

/// Backing key-value store for snapshots, keyed by ticker.
///
/// Implementations serialize writes; a `set` is durable when it returns.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store name for logging.
    fn name(&self) -> &'static str;

    /// Stored record for `ticker`, regardless of age or schema version.
    async fn get(&self, ticker: &str) -> Result<Option<StoredSnapshot>>;

    /// Upsert with an explicit fetch time.
    async fn set_at(
        &self,
        ticker: &str,
        snapshot: &TickerSnapshot,
        fetched_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Upsert stamped with the current time.
    async fn set(&self, ticker: &str, snapshot: &TickerSnapshot) -> Result<()> {
        self.set_at(ticker, snapshot, Utc::now()).await
    }

    /// Number of stored records.
    async fn len(&self) -> Result<usize>;

    /// Flush pending state and release resources.
    async fn close(&self) -> Result<()>;
}

/// In-memory store. Nothing survives the process.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: RwLock<HashMap<String, StoredSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, ticker: &str) -> Result<Option<StoredSnapshot>> {
        Ok(self.entries.read().await.get(ticker).cloned())
    }

    async fn set_at(
        &self,
        ticker: &str,
        snapshot: &TickerSnapshot,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        self.entries.write().await.insert(
            ticker.to_string(),
            StoredSnapshot {
                snapshot: snapshot.clone(),
                fetched_at,
            },
        );
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Cache
// ============================================================================

/// TTL-governed snapshot cache.
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn SnapshotStore>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn SnapshotStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create with a TTL in days. Out-of-range values saturate.
    pub fn with_ttl_days(store: Arc<dyn SnapshotStore>, ttl_days: i64) -> Self {
        let ttl = Duration::try_days(ttl_days).unwrap_or(if ttl_days < 0 {
            Duration::MIN
        } else {
            Duration::MAX
        });
        Self::new(store, ttl)
    }

    /// In-memory cache, mostly for tests.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemorySnapshotStore::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    fn key(ticker: &str) -> String {
        ticker.trim().to_uppercase()
    }

    /// Fresh snapshot for `ticker`, or `None` when absent, outdated or stale.
    pub async fn get(&self, ticker: &str) -> Option<TickerSnapshot> {
        self.get_at(ticker, Utc::now()).await
    }

    /// Same as [`get`](Self::get) evaluated at `now`.
    pub async fn get_at(&self, ticker: &str, now: DateTime<Utc>) -> Option<TickerSnapshot> {
        let key = Self::key(ticker);
        let stored = match self.store.get(&key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(ticker = %key, "Snapshot cache miss");
                return None;
            }
            Err(e) => {
                warn!(ticker = %key, store = self.store.name(), error = %e, "Snapshot cache read failed, treating as miss");
                return None;
            }
        };

        if !stored.snapshot.is_current_schema() {
            debug!(
                ticker = %key,
                schema_version = stored.snapshot.schema_version,
                "Snapshot schema outdated"
            );
            return None;
        }

        if now - stored.fetched_at > self.ttl {
            debug!(ticker = %key, fetched_at = %stored.fetched_at, "Snapshot stale");
            return None;
        }

        debug!(ticker = %key, "Snapshot cache hit");
        Some(stored.snapshot)
    }

    /// Store `snapshot` stamped with the current time.
    pub async fn set(&self, ticker: &str, snapshot: &TickerSnapshot) {
        self.set_at(ticker, snapshot, Utc::now()).await
    }

    /// Store `snapshot` with an explicit fetch time.
    pub async fn set_at(&self, ticker: &str, snapshot: &TickerSnapshot, fetched_at: DateTime<Utc>) {
        let key = Self::key(ticker);
        if let Err(e) = self.store.set_at(&key, snapshot, fetched_at).await {
            warn!(ticker = %key, store = self.store.name(), error = %e, "Snapshot cache write failed");
        }
    }

    /// Cached snapshot if fresh, otherwise fetch, store and return it.
    ///
    /// Returns `None` only when the fetch gave up.
    pub async fn get_or_fetch<S>(
        &self,
        ticker: &str,
        fetcher: &RetryingFetcher<S>,
    ) -> Option<TickerSnapshot>
    where
        S: FundamentalDataSource + ?Sized,
    {
        let key = Self::key(ticker);
        if let Some(snapshot) = self.get(&key).await {
            return Some(snapshot);
        }

        let snapshot = fetcher.fetch(&key).await?;
        self.set(&key, &snapshot).await;
        Some(snapshot)
    }

    /// Number of stored records; errors count as zero.
    pub async fn len(&self) -> usize {
        self.store.len().await.unwrap_or_else(|e| {
            warn!(store = self.store.name(), error = %e, "Snapshot store count failed");
            0
        })
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Flush and close the backing store.
    pub async fn close(&self) {
        if let Err(e) = self.store.close().await {
            warn!(store = self.store.name(), error = %e, "Snapshot store close failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
