//! Record store for crontab snapshots.
//!
//! Every submitted entry is written in its own transaction on its own connection,
//! so one rejected row never affects the next.

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::db::{migrate, Db};
use crate::error::{CronscanError, Result};
use crate::ingest::TaskEntry;

/// Durable, one-record-at-a-time sink for task entries.
pub trait RecordStore {
    /// Persist one entry inside its own transaction and return the assigned id.
    ///
    /// On error the transaction has been rolled back and nothing was written.
    fn upsert(&self, entry: &TaskEntry) -> impl Future<Output = Result<i64>> + Send;
}

/// SQLite-backed [`RecordStore`] with an explicit open/shutdown lifecycle
#[derive(Debug)]
pub struct SqliteTaskStore {
    db: Db,
    closed: AtomicBool,
}

impl SqliteTaskStore {
    /// Open the store at `db_path`, creating it if needed, and bring its schema up to date.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db = Db::new(db_path);
        let version = db.with_connection(migrate::run_migrations).await?;

        log::info!("Record store opened at {} (schema v{})", db.path().display(), version);
        Ok(Self {
            db,
            closed: AtomicBool::new(false),
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the store once; later calls are no-ops returning `false`.
    ///
    /// Waits `drain` so sessions still finishing can complete, checkpoints the WAL
    /// into the main database file, then waits `settle`.
    pub async fn shutdown(&self, drain: Duration, settle: Duration) -> Result<bool> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        tokio::time::sleep(drain).await;
        self.db
            .with_connection(|conn| {
                let (busy, log_frames, checkpointed): (i64, i64, i64) = conn.query_row(
                    "PRAGMA wal_checkpoint(TRUNCATE)",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                log::debug!(
                    "WAL checkpoint: busy={}, log={}, checkpointed={}",
                    busy,
                    log_frames,
                    checkpointed
                );
                Ok(())
            })
            .await?;
        tokio::time::sleep(settle).await;

        log::info!("Record store shut down");
        Ok(true)
    }
}

impl RecordStore for SqliteTaskStore {
    async fn upsert(&self, entry: &TaskEntry) -> Result<i64> {
        if self.is_closed() {
            return Err(CronscanError::StoreClosed);
        }
        let entry = entry.clone();
        self.db.with_connection(move |conn| insert_entry(conn, &entry)).await
    }
}

/// Insert one entry in a transaction of its own.
///
/// Any supplied `id` is ignored; the row id is always assigned by SQLite. The
/// transaction rolls back when dropped uncommitted.
pub fn insert_entry(conn: &mut Connection, entry: &TaskEntry) -> Result<i64> {
    let tx = conn.transaction()?;
    tx.execute(
        r#"
        INSERT INTO task_entries (
            host_name, user_name, ingested_on,
            minute, hour, day_of_month, month, day_of_week, command
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            entry.host_name,
            entry.user_name,
            entry.ingested_on.to_string(),
            entry.minute,
            entry.hour,
            entry.day_of_month,
            entry.month,
            entry.day_of_week,
            entry.command,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

/// Filters for reading stored entries back
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub host_name: Option<String>,
    pub user_name: Option<String>,
    pub ingested_on: Option<NaiveDate>,
    pub limit: Option<usize>,
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<TaskEntry> {
    let date_text: String = row.get(3)?;
    let ingested_on = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(TaskEntry {
        id: Some(row.get(0)?),
        host_name: row.get(1)?,
        user_name: row.get(2)?,
        ingested_on,
        minute: row.get(4)?,
        hour: row.get(5)?,
        day_of_month: row.get(6)?,
        month: row.get(7)?,
        day_of_week: row.get(8)?,
        command: row.get(9)?,
    })
}

/// List stored entries matching `filter`, oldest first
pub async fn list_entries(db: &Db, filter: &EntryFilter) -> Result<Vec<TaskEntry>> {
    let filter = filter.clone();
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, host_name, user_name, ingested_on,
                   minute, hour, day_of_month, month, day_of_week, command
            FROM task_entries
            WHERE (?1 IS NULL OR host_name = ?1)
              AND (?2 IS NULL OR user_name = ?2)
              AND (?3 IS NULL OR ingested_on = ?3)
            ORDER BY id
            LIMIT ?4
            "#,
        )?;

        // SQLite treats a negative LIMIT as no limit
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(
            params![
                filter.host_name,
                filter.user_name,
                filter.ingested_on.map(|d| d.to_string()),
                limit,
            ],
            row_to_entry,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok::<Vec<TaskEntry>, CronscanError>(entries)
    })
    .await
}

/// Count all stored entries
pub async fn count_entries(db: &Db) -> Result<i64> {
    db.with_connection(|conn| {
        let count = conn.query_row("SELECT COUNT(*) FROM task_entries", [], |row| row.get(0))?;
        Ok(count)
    })
    .await
}
