//! SQLite backend shared by both store traits

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::ffi::{SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE};
use rusqlite::Connection;

use super::error::{StoreError, StoreResult};

/// SQLite implementation of [`ResourceStore`](super::ResourceStore) and
/// [`ObjectStore`](super::ObjectStore)
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    pub(super) fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS identities (
                    name TEXT PRIMARY KEY,
                    secret TEXT NOT NULL,
                    provider TEXT NOT NULL DEFAULT 'ptc',
                    used INTEGER NOT NULL DEFAULT 0,
                    banned INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_identities_free
                    ON identities(used, banned);

                CREATE TABLE IF NOT EXISTS egress (
                    id INTEGER PRIMARY KEY,
                    in_use INTEGER NOT NULL DEFAULT 0,
                    dead INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_egress_free
                    ON egress(in_use, dead);

                CREATE TABLE IF NOT EXISTS objects (
                    id TEXT NOT NULL,
                    kind INTEGER NOT NULL,
                    lat REAL NOT NULL,
                    lng REAL NOT NULL,
                    expiry INTEGER NOT NULL DEFAULT 0,
                    species INTEGER,
                    team INTEGER,
                    lured INTEGER
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_objects_id
                    ON objects(id);

                CREATE INDEX IF NOT EXISTS idx_objects_location
                    ON objects(kind, lat, lng);

                CREATE INDEX IF NOT EXISTS idx_objects_expiry
                    ON objects(kind, expiry);
                "#,
        )?;

        Ok(())
    }
}

/// Map a uniqueness violation to [`StoreError::Duplicate`]
///
/// Other constraint failures (`NOT NULL`, `CHECK`) stay SQLite errors.
pub(super) fn map_duplicate(err: rusqlite::Error, kind: &'static str, id: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Duplicate {
                kind,
                id: id.to_string(),
            }
        }
        _ => StoreError::Sqlite(err),
    }
}

/// Comma separated `?` placeholders
pub(super) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}
