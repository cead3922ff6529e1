use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tokio::task;
use crate::error::{Result, CronscanError};

/// How long a session waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Handle on a database file that must already exist, for tools that only read it
    pub fn existing<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if !path.is_file() {
            return Err(CronscanError::Config(format!(
                "database not found: {}",
                path.display()
            )));
        }
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute a closure with its own database connection in a blocking task.
    ///
    /// The connection is dropped when the closure returns, whether it succeeded or not,
    /// so each call is one scoped session.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = open_at(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| CronscanError::Join(e.to_string()))?
    }
}

fn open_at(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(CronscanError::Database)?;

    // WAL lets the report binary read while an ingestion run writes
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA foreign_keys = ON; \
         PRAGMA temp_store = MEMORY;"
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    Ok(conn)
}

pub mod migrate;
pub mod store;

pub use store::{RecordStore, SqliteTaskStore, EntryFilter, list_entries, count_entries};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db.with_connection(|conn| {
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                .map_err(CronscanError::Database)?;
            Ok(())
        }).await;

        assert!(result.is_ok());
        assert!(db_path.exists());
        assert_eq!(db.path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));

        db.with_connection(|conn| {
            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");

            let busy: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?;
            assert_eq!(busy, 5000);

            Ok::<(), CronscanError>(())
        }).await.unwrap();
    }

    #[test]
    fn test_existing_requires_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("missing.db");

        let result = Db::existing(&db_path);
        assert!(matches!(result, Err(CronscanError::Config(_))));
        assert!(!db_path.exists());

        std::fs::write(&db_path, b"").unwrap();
        assert_eq!(Db::existing(&db_path).unwrap().path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_closure_error_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));

        let result: Result<()> = db
            .with_connection(|conn| {
                conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CronscanError::Database(_))));
    }
}
