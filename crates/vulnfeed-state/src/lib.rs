//! Checkpoint persistence for vulnfeed.
//!
//! Provides the [`CheckpointStore`] trait with a [`SqliteCheckpointStore`]
//! and an atomically rewritten JSON [`FileCheckpointStore`].

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod file;
pub mod sqlite;

pub use backend::CheckpointStore;
pub use error::StateError;
pub use file::FileCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
