//! Checkpoint model types.
//!
//! Pure data types used by `CheckpointStore` implementations. Kept in the
//! types crate so the engine, the state crate and adapters can share them
//! without circular dependencies.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifies one (vendor, deployment) pair. Each feed owns one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    /// Create a new feed identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for FeedId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Boundary of already-ingested records, as Unix seconds.
///
/// A feed that has never completed a run sits at [`Checkpoint::EPOCH`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Checkpoint(i64);

impl Checkpoint {
    /// The zero checkpoint: fetch everything.
    pub const EPOCH: Self = Self(0);

    #[must_use]
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Current wall-clock time truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    #[must_use]
    pub const fn as_unix_secs(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_epoch(self) -> bool {
        self.0 == 0
    }

    /// UTC datetime for this checkpoint, or `None` if out of chrono's range.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }

    /// RFC 3339 rendering (`2024-01-15T10:00:00Z`), falling back to the raw
    /// seconds when the value is out of range.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        self.to_datetime().map_or_else(
            || self.0.to_string(),
            |dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Checkpoint {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp())
    }
}
