//! Semantic validation for parsed pipeline configuration values.

use anyhow::{bail, Result};

use crate::config::types::{IngestMode, OutputKind, PipelineConfig};

const SUPPORTED_VERSION: &str = "1.0";

/// Check cross-field rules serde can't express. Every problem is collected
/// so a single run reports them all.
///
/// Adapter-owned settings under `source.config` are checked by the adapter.
///
/// # Errors
///
/// Returns one error listing each failed rule on its own line.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut problems = Vec::new();
    check_header(config, &mut problems);
    check_source(config, &mut problems);
    check_output_and_limits(config, &mut problems);

    if problems.is_empty() {
        return Ok(());
    }
    bail!("Pipeline validation failed:\n  - {}", problems.join("\n  - "))
}

fn check_header(config: &PipelineConfig, problems: &mut Vec<String>) {
    if config.version != SUPPORTED_VERSION {
        problems.push(format!(
            "Unsupported pipeline version '{}', expected '{SUPPORTED_VERSION}'",
            config.version
        ));
    }
    let feed = config.feed.trim();
    if feed.is_empty() {
        problems.push("Feed name must not be empty".to_string());
    } else if !feed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        problems.push(format!(
            "Feed name '{feed}' may only contain ASCII letters, digits, '_', '-' and '.'"
        ));
    }
}

fn check_source(config: &PipelineConfig, problems: &mut Vec<String>) {
    let source = &config.source;
    if source.use_ref.trim().is_empty() {
        problems.push("Source adapter reference (use) must not be empty".to_string());
    }
    // An empty `config:` key means adapter defaults.
    if !(source.config.is_object() || source.config.is_null()) {
        problems.push("source.config must be a mapping".to_string());
    }
    if source.mode == IngestMode::Incremental && source.snapshot_path.is_some() {
        problems.push("source.snapshot_path is only valid with mode 'snapshot'".to_string());
    }
}

fn check_output_and_limits(config: &PipelineConfig, problems: &mut Vec<String>) {
    if config.output.kind == OutputKind::File && config.output.path.is_none() {
        problems.push("Output kind 'file' requires a path".to_string());
    }
    let limits = &config.resources;
    if limits.queue_capacity == 0 {
        problems.push("queue_capacity must be at least 1".to_string());
    }
    if limits.request_timeout_secs == 0 {
        problems.push("request_timeout_secs must be > 0".to_string());
    }
}
