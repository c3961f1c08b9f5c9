use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::StoreError;

pub struct Database {
    pub conn: Connection,
}

/// Async database wrapper around `tokio_rusqlite::Connection`.
///
/// Runs all SQLite operations on a dedicated background thread via
/// `tokio_rusqlite`, keeping the Tokio runtime cooperative. Clone is
/// cheap (shared mpsc sender to the background thread), so one handle can
/// serve every concurrent request.
#[derive(Clone)]
pub struct AsyncDb {
    conn: tokio_rusqlite::Connection,
}

impl AsyncDb {
    /// Open a database at `path` read-write, then set PRAGMAs (WAL, busy_timeout)
    /// and run migrations on the background thread.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        ensure_parent_dir(path)?;
        let conn = tokio_rusqlite::Connection::open(path).await?;

        // The scraper and an admin sqlite3 session can hold the write lock
        // while we migrate. Retry with backoff instead of failing the run.
        // Short busy_timeout per attempt so the backoff happens here.
        let mut backoff = Duration::from_secs(1);
        let max_backoff = Duration::from_secs(30);
        let max_total_wait = Duration::from_secs(5 * 60);
        let start = Instant::now();

        loop {
            let res = conn
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.busy_timeout(Duration::from_secs(1))?;
                    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
                    conn.execute_batch(SCHEMA)?;
                    conn.busy_timeout(Duration::from_secs(30))?;
                    Ok(())
                })
                .await;

            match res {
                Ok(()) => break,
                Err(err) => {
                    let err = StoreError::from(err);
                    if !err.is_unavailable() || start.elapsed() >= max_total_wait {
                        return Err(err);
                    }
                    tracing::warn!(
                        wait_for = ?backoff,
                        error = %err,
                        "AsyncDb::open: database is locked; retrying migrations"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }

        Ok(Self { conn })
    }

    /// Open an existing database without write access. Fails with
    /// [`StoreError::Unavailable`] when the file does not exist.
    pub async fn open_readonly(path: &str) -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .await?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(Duration::from_secs(5))?;
            // Opening is lazy about the file header; force a read.
            conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |_| Ok(()))?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// In-memory database with migrations applied (tests and dry runs).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        conn.call(|conn| conn.execute_batch(SCHEMA)).await?;
        Ok(Self { conn })
    }

    /// Close the connection and stop the background thread. Calls through any
    /// remaining clone fail with [`StoreError::Unavailable`].
    pub async fn close(self) -> Result<(), StoreError> {
        Ok(self.conn.close().await?)
    }

    /// Run a closure on the background SQLite thread and return the result.
    pub async fn call<F, R>(&self, function: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        Ok(self.conn.call(function).await?)
    }

    /// Like [`Self::call`], but records Prometheus metrics for latency and errors.
    ///
    /// This measures the full wall-clock time of the operation, including queueing
    /// on the dedicated SQLite thread.
    pub async fn call_named<F, R>(&self, op: &'static str, function: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let start = Instant::now();
        let res = self.call(function).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;

        match &res {
            Ok(_) => {
                metrics::histogram!(
                    "smart_money_store_query_latency_ms",
                    "op" => op,
                    "status" => "ok"
                )
                .record(ms);
            }
            Err(_) => {
                metrics::histogram!(
                    "smart_money_store_query_latency_ms",
                    "op" => op,
                    "status" => "err"
                )
                .record(ms);
                metrics::counter!("smart_money_store_query_errors_total", "op" => op).increment(1);
            }
        }

        res
    }
}

impl Database {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        ensure_parent_dir(path)?;
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    pub fn open_readonly(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

fn ensure_parent_dir(path: &str) -> Result<(), StoreError> {
    if path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!(
                    "failed to create DB directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    Ok(())
}

const SCHEMA: &str = r"
-- One row per wallet per UTC day. A later scrape on the same day replaces the row.
CREATE TABLE IF NOT EXISTS wallet_snapshots (
    address TEXT NOT NULL,
    snapshot_day TEXT NOT NULL,        -- YYYY-MM-DD of collected_at (UTC)
    tag TEXT,
    winrate REAL NOT NULL,
    realized_profit REAL NOT NULL,
    pnl REAL,
    buy_count INTEGER NOT NULL DEFAULT 0,
    sell_count INTEGER NOT NULL DEFAULT 0,
    last_active TEXT,
    timeframe TEXT NOT NULL,           -- 1d, 7d, 30d
    collected_at TEXT NOT NULL,        -- RFC 3339, microsecond precision, UTC
    raw_json TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (address, snapshot_day)
);

CREATE INDEX IF NOT EXISTS idx_wallet_snapshots_collected_at ON wallet_snapshots(collected_at);
CREATE INDEX IF NOT EXISTS idx_wallet_snapshots_winrate ON wallet_snapshots(winrate);
CREATE INDEX IF NOT EXISTS idx_wallet_snapshots_address_collected_at
    ON wallet_snapshots(address, collected_at);
";
