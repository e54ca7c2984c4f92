//! Durable snapshot storage using SQLite.
//!
//! One row per ticker holding the JSON snapshot, its schema version and the
//! RFC 3339 fetch time. The connection sits behind an async mutex so writes
//! from concurrent workers are serialized.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::cache::{SnapshotStore, StoredSnapshot};
use super::TickerSnapshot;

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    ticker TEXT PRIMARY KEY,
    schema_version INTEGER NOT NULL,
    fetched_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
"#;

/// SQLite-backed [`SnapshotStore`].
pub struct SqliteSnapshotStore {
    /// `None` once closed.
    /// rusqlite::Connection is Send but not Sync, so it lives behind a Mutex.
    db: Mutex<Option<Connection>>,
    db_path: PathBuf,
}

impl SqliteSnapshotStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path).context("Failed to open snapshot database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        let store = Self::with_connection(conn, path.to_path_buf())?;
        info!(db_path = %path.display(), "Initialized snapshot store");
        Ok(store)
    }

    /// Non-durable database, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;
        Ok(Self {
            db: Mutex::new(Some(conn)),
            db_path,
        })
    }
}

fn closed() -> anyhow::Error {
    compounder_common::Error::Storage("snapshot store is closed".into()).into()
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, ticker: &str) -> Result<Option<StoredSnapshot>> {
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or_else(closed)?;

        let row: Option<(String, String)> = db
            .query_row(
                "SELECT fetched_at, payload FROM snapshots WHERE ticker = ?1",
                params![ticker],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((fetched_at, payload)) = row else {
            return Ok(None);
        };

        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .with_context(|| format!("Invalid fetch time for {}", ticker))?
            .with_timezone(&Utc);
        let snapshot: TickerSnapshot = serde_json::from_str(&payload)
            .with_context(|| format!("Corrupt snapshot payload for {}", ticker))?;

        Ok(Some(StoredSnapshot {
            snapshot,
            fetched_at,
        }))
    }

    async fn set_at(
        &self,
        ticker: &str,
        snapshot: &TickerSnapshot,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or_else(closed)?;

        db.execute(
            r#"
            INSERT OR REPLACE INTO snapshots
            (ticker, schema_version, fetched_at, payload)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![ticker, snapshot.schema_version, fetched_at.to_rfc3339(), payload],
        )?;

        debug!(ticker, "Saved snapshot");
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or_else(closed)?;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.db.lock().await;
        let Some(conn) = guard.take() else {
            return Ok(());
        };

        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .context("Failed to checkpoint WAL")?;
        conn.close()
            .map_err(|(_, e)| e)
            .context("Failed to close snapshot database")?;

        info!(db_path = %self.db_path.display(), "Closed snapshot store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::SnapshotCache;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn create_test_store() -> (TempDir, SqliteSnapshotStore) {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::open(dir.path().join("cache/snapshots.db")).unwrap();
        (dir, store)
    }

    fn snapshot(ticker: &str, margin: f64) -> TickerSnapshot {
        let mut s = TickerSnapshot::empty(ticker);
        s.operating_margin = Some(margin);
        s
    }

    #[tokio::test]
    async fn test_save_and_retrieve() {
        let (_dir, store) = create_test_store();
        let fetched = Utc::now();

        store.set_at("AAPL", &snapshot("AAPL", 0.3), fetched).await.unwrap();
        let stored = store.get("AAPL").await.unwrap().unwrap();

        assert_eq!(stored.snapshot.operating_margin, Some(0.3));
        assert_eq!(stored.fetched_at.timestamp(), fetched.timestamp());
        assert!(store.get("MSFT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let (_dir, store) = create_test_store();
        store.set("KO", &snapshot("KO", 0.2)).await.unwrap();
        store.set("KO", &snapshot("KO", 0.25)).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let stored = store.get("KO").await.unwrap().unwrap();
        assert_eq!(stored.snapshot.operating_margin, Some(0.25));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshots.db");

        let store = SqliteSnapshotStore::open(&path).unwrap();
        store.set("PEP", &snapshot("PEP", 0.15)).await.unwrap();
        store.close().await.unwrap();

        let reopened = SqliteSnapshotStore::open(&path).unwrap();
        let stored = reopened.get("PEP").await.unwrap().unwrap();
        assert_eq!(stored.snapshot.ticker, "PEP");
    }

    #[tokio::test]
    async fn test_closed_store_errors() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        store.close().await.unwrap();
        // Second close is a no-op
        store.close().await.unwrap();

        let err = store.get("AAPL").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<compounder_common::Error>(),
            Some(compounder_common::Error::Storage(_))
        ));
        assert!(store.set("AAPL", &snapshot("AAPL", 0.1)).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_cache_miss() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        {
            let guard = store.db.lock().await;
            guard
                .as_ref()
                .unwrap()
                .execute(
                    "INSERT INTO snapshots (ticker, schema_version, fetched_at, payload) VALUES (?1, ?2, ?3, ?4)",
                    params!["BAD", 2, Utc::now().to_rfc3339(), "{not json"],
                )
                .unwrap();
        }
        assert!(store.get("BAD").await.is_err());

        let cache = SnapshotCache::new(Arc::new(store), Duration::days(7));
        assert!(cache.get("BAD").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let (_dir, store) = create_test_store();
        let cache = SnapshotCache::new(Arc::new(store), Duration::days(7));

        let writes = (0..16).map(|i| {
            let cache = cache.clone();
            async move {
                let ticker = format!("T{i}");
                cache.set(&ticker, &snapshot(&ticker, 0.1)).await;
            }
        });
        futures::future::join_all(writes).await;

        assert_eq!(cache.len().await, 16);
        assert!(cache.get("T7").await.is_some());
    }
}
