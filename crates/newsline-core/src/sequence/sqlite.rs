//! SQLite-backed key-value table.
//!
//! Runtime pragmas match a shared, frequently-read state database:
//! - `journal_mode = WAL` so readers do not block the writer
//! - `busy_timeout` so concurrent writers wait instead of failing
//!
//! Schema evolves through `PRAGMA user_version` migrations.

use super::KvStore;
use crate::error::StoreError;
use crate::lock::CycleLock;
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATION_V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
";

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL)];

/// Key-value table in a SQLite database file.
#[derive(Debug)]
pub struct SqliteKv {
    conn: Connection,
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl SqliteKv {
    /// Open (or create) the database at `path`, apply pragmas, and migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, configured, or migrated.
    pub fn open(path: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut conn = Connection::open(&path)?;
        configure_connection(&conn, lock_timeout)?;
        migrate(&mut conn)?;

        let lock_path = path.with_extension("lock");
        Ok(Self {
            conn,
            path,
            lock_path,
            lock_timeout,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Read `PRAGMA user_version` as a `u32`.
///
/// # Errors
///
/// Returns an error if the query fails or the value is out of range.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply pending migrations in ascending order.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![key, value],
        )?;
        Ok(())
    }

    fn lock_cycle(&self) -> Result<Option<CycleLock>, StoreError> {
        CycleLock::acquire(&self.lock_path, self.lock_timeout).map(Some)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
