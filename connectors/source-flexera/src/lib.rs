//! Flexera (Secunia) advisory adapter.
//!
//! Provides [`FlexeraFetcher`] for incremental pulls from the advisory API,
//! [`decoder`] for `{ id: advisory }` snapshots, and the [`Advisory`] to
//! NVD conversion.

pub mod client;
pub mod config;
mod convert;
pub mod schema;
pub mod source;

use vulnfeed_sdk::prelude::JsonMapDecoder;

pub use client::{HttpTransport, PageTransport};
pub use config::Config;
pub use schema::{Advisory, AdvisoryPage};
pub use source::FlexeraFetcher;

/// Adapter name used in pipeline `source.use`.
pub const ADAPTER_NAME: &str = "flexera";

pub type FlexeraDecoder = JsonMapDecoder<Advisory>;

/// Snapshot decoder for Flexera advisory dumps.
#[must_use]
pub fn decoder() -> FlexeraDecoder {
    JsonMapDecoder::new()
}
