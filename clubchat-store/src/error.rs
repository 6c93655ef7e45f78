use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("record not found")]
    NotFound,

    /// Payload blob encoding/decoding failure.
    #[error("payload codec error: {0}")]
    Codec(String),

    /// Stored kind/channel/status label no longer parses.
    #[error("corrupt label in storage: {0}")]
    Label(#[from] clubchat_proto::message::UnknownLabel),

    /// Timestamp parsing error.
    #[error("timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
