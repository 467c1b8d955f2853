//! Shared SQLite handle.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so every store shares one
//! connection behind a mutex. The mutex is the single-writer serialization the
//! storage layer relies on; stores do not add any locking of their own.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tollgate_core::{StorageError, TollgateResult};

/// One SQLite connection shared by every record store.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::OpenFailed` if SQLite cannot open the file.
    pub fn open<P: AsRef<Path>>(path: P) -> TollgateResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| StorageError::OpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "Opened record database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> TollgateResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::OpenFailed {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> TollgateResult<T>,
    ) -> TollgateResult<T> {
        let mut guard = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut guard)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Map a rusqlite failure on `table` into a storage error.
pub(crate) fn sql_error(table: &str) -> impl Fn(rusqlite::Error) -> StorageError + '_ {
    move |e| StorageError::Sqlite {
        table: table.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_file_database() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let path = dir.path().join("cache.db");
        let db = Database::open(&path).expect("open should succeed");
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_open_in_memory_has_no_path() {
        let db = Database::open_in_memory().expect("open should succeed");
        assert!(db.path().is_none());
        let one: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get(0))
                    .map_err(|e| sql_error("none")(e).into())
            })
            .expect("query should succeed");
        assert_eq!(one, 1);
    }
}
