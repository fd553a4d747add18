//! Checkpoint store trait definition.

use vulnfeed_types::state::{Checkpoint, FeedId};

use crate::error;

/// Storage contract for per-feed checkpoints.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn CheckpointStore>`. Callers serialize runs per feed, so a store
/// only needs to make individual operations atomic.
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint for `feed`.
    ///
    /// Returns `Ok(None)` when no checkpoint has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn load(&self, feed: &FeedId) -> error::Result<Option<Checkpoint>>;

    /// Upsert the checkpoint for `feed`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn save(&self, feed: &FeedId, checkpoint: Checkpoint) -> error::Result<()>;
}
