//! Checkpoint load and advancement logic.

use std::sync::Arc;

use vulnfeed_state::CheckpointStore;
use vulnfeed_types::state::{Checkpoint, FeedId};

use crate::errors::PipelineError;

/// Checkpoint to persist after a successful run that started at
/// `started_at` from `previous`. Never moves backwards, even if the clock
/// did.
#[must_use]
pub fn next_checkpoint(previous: Checkpoint, started_at: Checkpoint) -> Checkpoint {
    previous.max(started_at)
}

/// Load the stored checkpoint for `feed` off the async runtime.
/// A feed with no stored checkpoint starts from the epoch.
pub(crate) async fn load_checkpoint(
    store: Arc<dyn CheckpointStore>,
    feed: FeedId,
) -> Result<Checkpoint, PipelineError> {
    tokio::task::spawn_blocking(move || store.load(&feed))
        .await
        .map_err(|e| {
            PipelineError::Infrastructure(anyhow::anyhow!("checkpoint load task panicked: {e}"))
        })?
        .map(Option::unwrap_or_default)
        .map_err(PipelineError::CheckpointLoad)
}

/// Persist `checkpoint` once the sink has confirmed delivery.
pub(crate) async fn persist_checkpoint(
    store: Arc<dyn CheckpointStore>,
    feed: FeedId,
    checkpoint: Checkpoint,
) -> Result<(), PipelineError> {
    let feed_name = feed.clone();
    tokio::task::spawn_blocking(move || store.save(&feed, checkpoint))
        .await
        .map_err(|e| {
            PipelineError::Infrastructure(anyhow::anyhow!("checkpoint save task panicked: {e}"))
        })?
        .map_err(PipelineError::CheckpointSave)?;
    tracing::info!(
        feed = feed_name.as_str(),
        checkpoint = %checkpoint,
        "Checkpoint advanced: sink confirmed delivery"
    );
    Ok(())
}
