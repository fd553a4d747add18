//! Adapter-facing SDK for vulnfeed.
//!
//! Vendor adapters implement the capability traits in [`capability`] and
//! reuse the JSON snapshot codec and retrying HTTP client provided here.

pub mod capability;
pub mod decode;
pub mod http;
pub mod prelude;
pub mod snapshot;
pub mod stream;
