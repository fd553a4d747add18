use std::path::Path;

use anyhow::Result;
use vulnfeed_engine::resolve;

use super::Overrides;
use crate::adapter::FlexeraAdapter;

/// Execute the `run` command: parse, validate, run the pipeline, and
/// advance the checkpoint on success.
pub async fn execute(pipeline_path: &Path, overrides: &Overrides) -> Result<()> {
    let config = super::load_pipeline(pipeline_path, overrides)?;
    let adapter = FlexeraAdapter::from_pipeline(&config, overrides.base_url.as_deref())?;
    let runner = super::build_runner(&config, overrides, false)?;

    let ingest = adapter.ingest(&config, None)?;
    let sink = resolve::open_sink(&config.output)?;
    let cancel = super::cancel_on_ctrl_c();

    let result = runner.run(ingest, sink, cancel).await;
    super::print_summary(&result);
    result.into_result()?;
    Ok(())
}
