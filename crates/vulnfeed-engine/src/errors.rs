//! Pipeline error model.

use vulnfeed_state::StateError;
use vulnfeed_types::error::{ConvertError, DecodeError, ErrorCategory, FetchError, SinkError};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Terminal error of a pipeline run.
///
/// Every variant is fatal. Per-record conversion failures only surface here
/// under the `fail` policy; under `skip` they are counted instead.
#[derive(Debug)]
pub enum PipelineError {
    /// Missing credential, malformed URL, invalid adapter configuration.
    Setup(FetchError),
    /// Transport or response error delivered by the record stream.
    Fetch(FetchError),
    /// Snapshot could not be decoded.
    Decode(DecodeError),
    /// A record failed conversion under the `fail` policy.
    Convert {
        record_id: Option<String>,
        source: ConvertError,
    },
    /// Sink write or flush failed.
    Sink(SinkError),
    CheckpointLoad(StateError),
    /// Output was delivered but the new checkpoint was not stored.
    CheckpointSave(StateError),
    Cancelled,
    /// Task panics, closed channels and other host-side failures.
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(e) | Self::Fetch(e) => write!(f, "{e}"),
            Self::Decode(e) => write!(f, "{e}"),
            Self::Convert {
                record_id: Some(id),
                source,
            } => write!(f, "can't convert record {id}: {source}"),
            Self::Convert {
                record_id: None,
                source,
            } => write!(f, "can't convert record: {source}"),
            Self::Sink(e) => write!(f, "can't write output: {e}"),
            Self::CheckpointLoad(e) => write!(f, "can't load checkpoint: {e}"),
            Self::CheckpointSave(e) => write!(f, "can't save checkpoint: {e}"),
            Self::Cancelled => f.write_str("run cancelled"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Setup(e) | Self::Fetch(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Convert { source, .. } => Some(source),
            Self::Sink(e) => Some(e),
            Self::CheckpointLoad(e) | Self::CheckpointSave(e) => Some(e),
            Self::Cancelled | Self::Infrastructure(_) => None,
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<SinkError> for PipelineError {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

impl PipelineError {
    /// Map a stream item error, keeping cancellation distinct.
    pub(crate) fn from_stream(e: FetchError) -> Self {
        match e {
            FetchError::Cancelled => Self::Cancelled,
            FetchError::Setup(_) => Self::Setup(e),
            other => Self::Fetch(other),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Setup(_) => ErrorCategory::Setup,
            Self::Fetch(e) => e.category(),
            Self::Decode(_) => ErrorCategory::Decode,
            Self::Convert { .. } => ErrorCategory::Data,
            Self::Sink(_) => ErrorCategory::Sink,
            Self::CheckpointLoad(_) | Self::CheckpointSave(_) => ErrorCategory::State,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Infrastructure(_) => ErrorCategory::Internal,
        }
    }

    /// Whether records were already delivered when the error occurred.
    #[must_use]
    pub fn output_delivered(&self) -> bool {
        matches!(self, Self::CheckpointSave(_))
    }
}
