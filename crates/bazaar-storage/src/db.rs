//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use bazaar_core::error::BazaarError;

use crate::migrations;

/// Thread-safe SQLite database handle.
///
/// Opened once at startup and shared by `Arc` between the repositories. The
/// connection is wrapped in a Mutex since rusqlite Connection is not Sync.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, and runs
    /// all pending migrations.
    pub fn new(path: &Path) -> Result<Self, BazaarError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| BazaarError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -32768;",
        )
        .map_err(|e| BazaarError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, BazaarError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BazaarError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| BazaarError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure, which makes a
    /// closure's statements atomic with respect to other callers.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, BazaarError>
    where
        F: FnOnce(&Connection) -> Result<T, BazaarError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BazaarError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Close the connection, flushing the WAL.
    ///
    /// Consumes the handle; callers holding an `Arc<Database>` must unwrap it
    /// first, which guarantees no repository is still using it.
    pub fn close(self) -> Result<(), BazaarError> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| BazaarError::Storage(format!("Database lock poisoned: {}", e)))?;
        conn.close()
            .map_err(|(_, e)| BazaarError::Storage(format!("Failed to close database: {}", e)))?;
        info!("Database closed");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Map a rusqlite error into the storage variant.
pub(crate) fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> BazaarError + '_ {
    move |e| BazaarError::Storage(format!("{}: {}", context, e))
}
