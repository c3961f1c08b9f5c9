//! Snapshot persistence. The sync functions take a plain `rusqlite::Connection`
//! (CLI and tests); [`WalletStore`] runs the same functions on the async handle.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::AsyncDb;
use crate::error::StoreError;
use crate::types::{SnapshotQuery, SnapshotStats, Timeframe, UpsertOutcome, WalletSnapshot};

const SNAPSHOT_COLUMNS: &str = "address, tag, winrate, realized_profit, pnl, buy_count, sell_count,
     last_active, timeframe, collected_at, raw_json";

/// Fixed-width RFC 3339 so that string comparison in SQL is chronological.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<WalletSnapshot> {
    let timeframe: String = row.get(8)?;
    let timeframe = timeframe.parse::<Timeframe>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let last_active: Option<String> = row.get(7)?;
    let collected_at: String = row.get(9)?;
    let raw_json: String = row.get(10)?;
    let raw = serde_json::from_str(&raw_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(WalletSnapshot {
        address: row.get(0)?,
        tag: row.get(1)?,
        winrate: row.get(2)?,
        realized_profit: row.get(3)?,
        pnl: row.get(4)?,
        buy_count: row.get::<_, i64>(5)?.max(0) as u64,
        sell_count: row.get::<_, i64>(6)?.max(0) as u64,
        last_active: last_active.as_deref().map(|s| parse_ts(7, s)).transpose()?,
        timeframe,
        collected_at: parse_ts(9, &collected_at)?,
        raw,
    })
}

/// Insert or replace the snapshot for `(address, day(collected_at))` in one transaction.
pub fn upsert_snapshot(
    conn: &mut Connection,
    snap: &WalletSnapshot,
) -> rusqlite::Result<UpsertOutcome> {
    let day = snap.snapshot_day().format("%Y-%m-%d").to_string();
    let raw_json = serde_json::to_string(&snap.raw)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    let tx = conn.transaction()?;
    let existed = tx
        .query_row(
            "SELECT 1 FROM wallet_snapshots WHERE address = ?1 AND snapshot_day = ?2",
            params![snap.address, day],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    tx.execute(
        "INSERT INTO wallet_snapshots
            (address, snapshot_day, tag, winrate, realized_profit, pnl, buy_count, sell_count,
             last_active, timeframe, collected_at, raw_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(address, snapshot_day) DO UPDATE SET
            tag = excluded.tag,
            winrate = excluded.winrate,
            realized_profit = excluded.realized_profit,
            pnl = excluded.pnl,
            buy_count = excluded.buy_count,
            sell_count = excluded.sell_count,
            last_active = excluded.last_active,
            timeframe = excluded.timeframe,
            collected_at = excluded.collected_at,
            raw_json = excluded.raw_json",
        params![
            snap.address,
            day,
            snap.tag,
            snap.winrate,
            snap.realized_profit,
            snap.pnl,
            i64::try_from(snap.buy_count).unwrap_or(i64::MAX),
            i64::try_from(snap.sell_count).unwrap_or(i64::MAX),
            snap.last_active.as_ref().map(format_ts),
            snap.timeframe.as_str(),
            format_ts(&snap.collected_at),
            raw_json,
        ],
    )?;
    tx.commit()?;

    Ok(if existed {
        UpsertOutcome::Replaced
    } else {
        UpsertOutcome::Inserted
    })
}

pub fn query_snapshots(
    conn: &Connection,
    query: &SnapshotQuery,
) -> rusqlite::Result<Vec<WalletSnapshot>> {
    let mut sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM wallet_snapshots WHERE 1=1");
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(min) = query.min_winrate {
        sql.push_str(&format!(" AND winrate >= ?{}", params.len() + 1));
        params.push(Box::new(min));
    }
    if let Some(start) = &query.start {
        sql.push_str(&format!(" AND collected_at >= ?{}", params.len() + 1));
        params.push(Box::new(format_ts(start)));
    }
    if let Some(end) = &query.end {
        sql.push_str(&format!(" AND collected_at <= ?{}", params.len() + 1));
        params.push(Box::new(format_ts(end)));
    }
    sql.push_str(&format!(
        " ORDER BY collected_at DESC, address ASC LIMIT ?{}",
        params.len() + 1
    ));
    params.push(Box::new(i64::from(query.effective_limit())));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), snapshot_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn latest_for_address(
    conn: &Connection,
    address: &str,
) -> rusqlite::Result<Option<WalletSnapshot>> {
    conn.query_row(
        &format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM wallet_snapshots
             WHERE address = ?1
             ORDER BY collected_at DESC
             LIMIT 1"
        ),
        params![address],
        snapshot_from_row,
    )
    .optional()
}

pub fn history_for_address(
    conn: &Connection,
    address: &str,
    limit: u32,
) -> rusqlite::Result<Vec<WalletSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM wallet_snapshots
         WHERE address = ?1
         ORDER BY collected_at DESC
         LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![address, i64::from(limit)], snapshot_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// The most recent snapshot of every address, ordered by address.
pub fn latest_per_address(conn: &Connection) -> rusqlite::Result<Vec<WalletSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM wallet_snapshots AS s
         WHERE s.snapshot_day = (
             SELECT MAX(snapshot_day) FROM wallet_snapshots WHERE address = s.address
         )
         ORDER BY s.address ASC"
    ))?;
    let rows = stmt
        .query_map([], snapshot_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn snapshot_stats(conn: &Connection) -> rusqlite::Result<SnapshotStats> {
    let (total, distinct, avg, latest): (i64, i64, Option<f64>, Option<String>) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT address), AVG(winrate), MAX(collected_at)
         FROM wallet_snapshots",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    Ok(SnapshotStats {
        total_records: total.max(0) as u64,
        distinct_addresses: distinct.max(0) as u64,
        average_winrate: avg.map_or(0.0, |a| (a * 1000.0).round() / 1000.0),
        latest_collected_at: latest.as_deref().map(|s| parse_ts(3, s)).transpose()?,
    })
}

/// Async store over a shared [`AsyncDb`] handle.
#[derive(Clone)]
pub struct WalletStore {
    db: AsyncDb,
}

impl WalletStore {
    pub fn new(db: AsyncDb) -> Self {
        Self { db }
    }

    /// Read-write store with migrations applied (scraper side).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self::new(AsyncDb::open(path).await?))
    }

    /// Read-only store over an existing database (query service side).
    pub async fn open_readonly(path: &str) -> Result<Self, StoreError> {
        Ok(Self::new(AsyncDb::open_readonly(path).await?))
    }

    pub async fn upsert(&self, snap: WalletSnapshot) -> Result<UpsertOutcome, StoreError> {
        self.db
            .call_named("snapshots.upsert", move |conn| upsert_snapshot(conn, &snap))
            .await
    }

    pub async fn query(&self, query: SnapshotQuery) -> Result<Vec<WalletSnapshot>, StoreError> {
        self.db
            .call_named("snapshots.query", move |conn| query_snapshots(conn, &query))
            .await
    }

    pub async fn get_by_address(&self, address: &str) -> Result<WalletSnapshot, StoreError> {
        let owned = address.to_string();
        self.db
            .call_named("snapshots.get_by_address", move |conn| {
                latest_for_address(conn, &owned)
            })
            .await?
            .ok_or_else(|| StoreError::NotFound(address.to_string()))
    }

    pub async fn stats(&self) -> Result<SnapshotStats, StoreError> {
        self.db
            .call_named("snapshots.stats", |conn| snapshot_stats(conn))
            .await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .call_named("ping", |conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
    }

    pub async fn close(self) -> Result<(), StoreError> {
        self.db.close().await
    }
}
