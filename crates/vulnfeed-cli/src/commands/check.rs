use std::path::Path;

use anyhow::Result;
use vulnfeed_engine::config::types::{CheckpointBackend, IngestMode};

use super::Overrides;
use crate::adapter::FlexeraAdapter;

/// Execute the `check` command: validate the pipeline, the adapter config,
/// the credential, and the checkpoint store.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let overrides = Overrides::default();
    let config = super::load_pipeline(pipeline_path, &overrides)?;
    println!("Pipeline structure: OK");

    let adapter = FlexeraAdapter::from_pipeline(&config, None)?;
    println!("Adapter config:     OK");

    let needs_token = config.source.mode == IngestMode::Incremental;
    let token_ok = adapter.has_token() || !needs_token;
    if adapter.has_token() {
        println!("Credential:         OK");
    } else if needs_token {
        println!("Credential:         FAILED");
        println!("  please set {} in environment", adapter.token_env());
    } else {
        println!("Credential:         not needed for snapshot mode");
    }

    let state_ok = match check_state(&config, &overrides).await {
        Ok(line) => {
            println!("Checkpoint store:   OK");
            println!("  {line}");
            true
        }
        Err(e) => {
            println!("Checkpoint store:   FAILED");
            println!("  {e:#}");
            false
        }
    };

    if token_ok && state_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}

async fn check_state(
    config: &vulnfeed_engine::config::types::PipelineConfig,
    overrides: &Overrides,
) -> Result<String> {
    if config.checkpoint.backend == CheckpointBackend::Disabled {
        return Ok("backend 'none': every run starts from the epoch".to_string());
    }
    let runner = super::build_runner(config, overrides, false)?;
    let since = runner.resolve_since().await?;
    Ok(if since.is_epoch() {
        "no checkpoint stored yet".to_string()
    } else {
        format!("current checkpoint: {since}")
    })
}
