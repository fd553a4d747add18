//! Checkpoint store error types.

/// Errors produced by [`CheckpointStore`](crate::CheckpointStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `SQLite` failure with the operation that triggered it.
    #[error("{op}: {source}")]
    Context {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the state directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint document could not be encoded.
    #[error("can't encode checkpoint file: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data is unreadable.
    #[error("corrupt checkpoint store {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("checkpoint store lock poisoned")]
    LockPoisoned,
}

impl StateError {
    /// Wrap a `SQLite` error with the operation name.
    pub(crate) fn context(op: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Context { op, source }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
