//! Convenience re-exports for adapter authors.
//!
//! ```ignore
//! use vulnfeed_sdk::prelude::*;
//! ```

// Capabilities
pub use crate::capability::{Convertible, Decoder, Fetcher, VendorStream};

// Codecs
pub use crate::decode::JsonMapDecoder;
pub use crate::snapshot::SnapshotWriter;

// Transport
pub use crate::http::{HttpClient, HttpConfig};
pub use crate::stream::receiver_stream;

// Shared model
pub use vulnfeed_types::error::{ConvertError, DecodeError, FetchError};
pub use vulnfeed_types::nvd::CveItem;
pub use vulnfeed_types::state::Checkpoint;

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
