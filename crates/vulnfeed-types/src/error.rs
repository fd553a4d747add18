//! Error model shared by capabilities and the pipeline.
//!
//! Each capability reports its own error type; [`ErrorCategory`] gives
//! operators a stable classification across all of them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad classification of a pipeline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing credential, malformed URL, invalid configuration.
    Setup,
    /// Network or HTTP failure while fetching.
    Transport,
    /// Malformed snapshot or response body.
    Decode,
    /// A vendor record could not be converted.
    Data,
    /// Output could not be written.
    Sink,
    /// Checkpoint store failure.
    State,
    /// The run was cancelled.
    Cancelled,
    /// Task panics and other host-side failures.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::Data => "data",
            Self::Sink => "sink",
            Self::State => "state",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Errors produced by a `Fetcher`.
///
/// `Setup` is returned before any I/O; every other variant arrives as the
/// terminal item of a record stream.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("setup error: {0}")]
    Setup(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status {
        status: u16,
        url: String,
        /// Server-provided `Retry-After`, in seconds.
        retry_after_secs: Option<u64>,
    },

    #[error("malformed response: {0}")]
    Response(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether a retry of the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Setup(_) | Self::Response(_) | Self::Cancelled => false,
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Setup(_) => ErrorCategory::Setup,
            Self::Transport(_) | Self::Status { .. } => ErrorCategory::Transport,
            Self::Response(_) => ErrorCategory::Decode,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Structural failure decoding a snapshot document.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("can't decode snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("can't read snapshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure converting one vendor record into a canonical record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid {field} '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl ConvertError {
    #[must_use]
    pub fn invalid(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Failure writing canonical records to an output.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("can't serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink already finished")]
    Finished,
}
