//! Schema setup. Migrations are compiled in and the database's `user_version`
//! records how many of them have been applied.

use rusqlite::Connection;
use crate::error::{Result, CronscanError};

/// Schema steps in order; step `n` brings the database to version `n + 1`.
const MIGRATIONS: &[&str] = &[include_str!("../../migrations/001_task_entries.sql")];

/// Schema version this build writes
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Schema version stored in the database (0 for a fresh file)
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Bring the schema up to [`latest_version`], returning the resulting version
pub fn run_migrations(conn: &mut Connection) -> Result<u32> {
    apply(conn, MIGRATIONS)
}

/// Apply each step past the stored version in its own transaction, bumping
/// `user_version` in the same transaction.
fn apply(conn: &mut Connection, steps: &[&str]) -> Result<u32> {
    let current = schema_version(conn)?;
    let target = steps.len() as u32;

    if current > target {
        return Err(CronscanError::Config(format!(
            "database schema version {} is newer than this build supports ({})",
            current, target
        )));
    }

    for (version, sql) in (current + 1..=target).zip(&steps[current as usize..]) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        log::info!("Database schema upgraded to version {}", version);
    }

    Ok(target)
}
