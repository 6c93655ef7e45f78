//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] behind a
//! [`parking_lot::Mutex`] and guarantees the schema exists before any
//! other operation. The lock makes one handle shareable across the
//! engine's async tasks; every helper acquires it for the duration of a
//! single statement, so no await point ever holds it.

use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Schema for the send queue and read markers.
///
/// `send_queue` is keyed by `temp_id`; the `(kind, conversation_id,
/// channel)` index keeps per-conversation loads cheap and independent.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS send_queue (
    temp_id         TEXT PRIMARY KEY,
    kind            TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    channel         TEXT NOT NULL,
    payload         BLOB NOT NULL,
    created_at      TEXT NOT NULL,
    status          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_send_queue_conversation
    ON send_queue (kind, conversation_id, channel);
CREATE TABLE IF NOT EXISTS read_markers (
    kind            TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    channel         TEXT NOT NULL,
    message_id      TEXT NOT NULL,
    PRIMARY KEY (kind, conversation_id, channel)
);
";

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform data directory, e.g.
    /// `~/.local/share/clubchat/clubchat.db` on Linux.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoDataDir`] if no data directory can be
    /// determined, or a SQLite/I-O error from opening the file.
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or(StoreError::NoDataDir)?
            .join("clubchat");
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("clubchat.db");
        tracing::info!(path = %db_path.display(), "opening database");
        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// Useful for tests and for embedding the store inside custom
    /// directory layouts.
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the file cannot be opened or the schema
    /// cannot be created.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (testing only; nothing persists).
    ///
    /// # Errors
    ///
    /// Returns a SQLite error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection for a single statement.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Return the filesystem path of the open database (if any).
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.conn().path().map(PathBuf::from)
    }
}
