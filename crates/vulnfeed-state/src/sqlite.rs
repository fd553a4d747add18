//! `SQLite`-backed implementation of [`CheckpointStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use vulnfeed_types::state::{Checkpoint, FeedId};

use crate::backend::CheckpointStore;
use crate::error::{self, StateError};

/// Idempotent DDL for the checkpoint table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS feed_checkpoints (
    feed TEXT PRIMARY KEY NOT NULL,
    since INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// `SQLite`-backed checkpoint storage.
///
/// Create with [`SqliteCheckpointStore::open`] for file-backed persistence
/// or [`SqliteCheckpointStore::in_memory`] for tests.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create a `SQLite` checkpoint database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Context`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(StateError::context("open state database"))?;
        Self::init(conn)
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Context`] if the in-memory database can't be
    /// initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(StateError::context("open in-memory state database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::context("create checkpoint table"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    #[cfg(test)]
    fn updated_at(&self, feed: &FeedId) -> error::Result<Option<String>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT updated_at FROM feed_checkpoints WHERE feed = ?1",
            [feed.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(StateError::from)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, feed: &FeedId) -> error::Result<Option<Checkpoint>> {
        let conn = self.lock_conn()?;
        let since: Option<i64> = conn
            .query_row(
                "SELECT since FROM feed_checkpoints WHERE feed = ?1",
                [feed.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StateError::context("load checkpoint"))?;
        Ok(since.map(Checkpoint::from_unix_secs))
    }

    fn save(&self, feed: &FeedId, checkpoint: Checkpoint) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        conn.execute(
            "INSERT INTO feed_checkpoints (feed, since, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(feed) DO UPDATE SET since = ?2, updated_at = ?3",
            rusqlite::params![feed.as_str(), checkpoint.as_unix_secs(), updated_at],
        )
        .map_err(StateError::context("save checkpoint"))?;
        Ok(())
    }
}
