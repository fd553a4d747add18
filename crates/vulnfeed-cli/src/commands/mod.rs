pub mod check;
pub mod convert;
pub mod download;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use vulnfeed_engine::config::parser;
use vulnfeed_engine::config::types::{OutputFormat, OutputKind, PipelineConfig};
use vulnfeed_engine::config::validator;
use vulnfeed_engine::resolve;
use vulnfeed_engine::{ExecutionOptions, RunResult, Runner};
use vulnfeed_types::state::{Checkpoint, FeedId};

/// Command-line settings that take precedence over the pipeline file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub since: Option<i64>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub base_url: Option<String>,
}

impl Overrides {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.output {
            config.output.kind = OutputKind::File;
            config.output.path = Some(path.clone());
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
    }

    fn since(&self) -> Option<Checkpoint> {
        self.since.map(Checkpoint::from_unix_secs)
    }
}

/// Parse, apply overrides, and validate a pipeline file.
pub(crate) fn load_pipeline(path: &Path, overrides: &Overrides) -> Result<PipelineConfig> {
    let mut config = parser::parse_pipeline(path)
        .with_context(|| format!("Failed to parse pipeline: {}", path.display()))?;
    overrides.apply(&mut config);
    validator::validate_pipeline(&config)?;

    tracing::info!(
        feed = config.feed,
        source = config.source.use_ref,
        mode = config.source.mode.as_str(),
        "Pipeline validated"
    );
    Ok(config)
}

/// Runner for the pipeline's feed, with its checkpoint store attached unless
/// `stateless`.
pub(crate) fn build_runner(
    config: &PipelineConfig,
    overrides: &Overrides,
    stateless: bool,
) -> Result<Runner> {
    let options =
        ExecutionOptions::from_resources(&config.resources).with_since(overrides.since());
    let runner = Runner::new(FeedId::new(config.feed.as_str()), options);
    if stateless {
        return Ok(runner);
    }
    Ok(match resolve::create_checkpoint_store(&config.checkpoint)? {
        Some(store) => runner.with_store(store),
        None => runner,
    })
}

/// Token cancelled on the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            token.cancel();
        }
    });
    cancel
}

/// Human summary plus one machine-readable JSON line, both on stderr.
pub(crate) fn print_summary(result: &RunResult) {
    if result.is_success() {
        eprintln!("Feed '{}' completed successfully.", result.feed);
    } else {
        eprintln!("Feed '{}' failed.", result.feed);
    }
    eprintln!("  Since:           {}", result.since);
    eprintln!("  Records fetched: {}", result.counts.fetched);
    eprintln!("  Converted:       {}", result.counts.converted);
    eprintln!("  Skipped:         {}", result.counts.skipped);
    eprintln!("  Emitted:         {}", result.counts.emitted);
    match result.checkpoint {
        Some(cp) => eprintln!("  Checkpoint:      {cp}"),
        None => eprintln!("  Checkpoint:      unchanged"),
    }
    eprintln!("  Duration:        {:.2}s", result.duration_secs);
    if let Some(err) = &result.error {
        eprintln!("  Error:           {err}");
        if err.output_delivered() {
            eprintln!("  Output was written; the next run will reprocess these records.");
        }
    }
    eprintln!("{}", result.summary_json());
}
