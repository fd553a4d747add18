//! Runtime options for a pipeline run.

use vulnfeed_types::state::Checkpoint;

use crate::config::types::{ConvertErrorPolicy, EmitMode, ResourceConfig};

/// Runtime execution options, resolved from the pipeline's `resources`
/// block plus command-line overrides.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Start from this checkpoint instead of the stored one.
    pub since_override: Option<Checkpoint>,
    pub emit_mode: EmitMode,
    /// Bound of the vendor record queue in `queued` mode.
    pub queue_capacity: usize,
    pub on_convert_error: ConvertErrorPolicy,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::from_resources(&ResourceConfig::default())
    }
}

impl ExecutionOptions {
    #[must_use]
    pub fn from_resources(resources: &ResourceConfig) -> Self {
        Self {
            since_override: None,
            emit_mode: resources.emit_mode,
            queue_capacity: resources.queue_capacity.max(1),
            on_convert_error: resources.on_convert_error,
        }
    }

    #[must_use]
    pub fn with_since(mut self, since: Option<Checkpoint>) -> Self {
        self.since_override = since;
        self
    }
}
