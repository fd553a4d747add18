//! Capability traits consumed by the vulnfeed runner.
//!
//! An adapter provides a vendor record type implementing [`Convertible`],
//! plus at least one ingestion path: [`Fetcher`] for incremental pulls or
//! [`Decoder`] for whole-document snapshots.

use std::io::Read;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use vulnfeed_types::error::{ConvertError, DecodeError, FetchError};
use vulnfeed_types::nvd::CveItem;
use vulnfeed_types::state::Checkpoint;

/// Lazy stream of vendor records. An `Err` item is terminal.
pub type VendorStream<R> = BoxStream<'static, Result<R, FetchError>>;

/// Maps one vendor record to a canonical NVD item.
///
/// Conversion is pure: the same record always yields the same item or the
/// same error.
pub trait Convertible {
    /// Build the canonical record.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] when a required field is missing or a value
    /// cannot be interpreted. The runner treats this as a per-record failure.
    fn convert(&self) -> Result<CveItem, ConvertError>;

    /// Vendor identifier used in logs and snapshot keys.
    fn record_id(&self) -> Option<String> {
        None
    }
}

/// Incremental source of vendor records changed since a checkpoint.
#[async_trait]
pub trait Fetcher: Send + Sync {
    type Record: Convertible + Send + 'static;

    /// Open a record stream covering everything modified at or after `since`.
    ///
    /// Implementations must stop yielding records once `cancel` fires and
    /// must abandon in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Setup`] for failures detected before any I/O,
    /// such as a missing credential or malformed base URL. Transport errors
    /// are delivered through the stream instead.
    async fn fetch_since(
        &self,
        cancel: CancellationToken,
        since: Checkpoint,
    ) -> Result<VendorStream<Self::Record>, FetchError>;
}

/// Whole-input decoder for vendor snapshots.
pub trait Decoder: Send + Sync {
    type Record: Convertible + Send + 'static;

    /// Decode every record in `reader`. No partial result is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the input is structurally invalid or
    /// cannot be read.
    fn decode(&self, reader: &mut dyn Read) -> Result<Vec<Self::Record>, DecodeError>;
}
