//! Shared vulnfeed model types.
//!
//! Checkpoint state, the capability error model, and the canonical NVD
//! record shape. This crate has no runtime dependencies so both the engine
//! and vendor adapters can share it.

pub mod error;
pub mod nvd;
pub mod state;
