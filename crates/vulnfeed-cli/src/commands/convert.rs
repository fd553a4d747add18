use std::path::Path;

use anyhow::Result;
use vulnfeed_engine::resolve;

use super::Overrides;
use crate::adapter::FlexeraAdapter;

/// Execute the `convert` command: decode a vendor snapshot and emit its
/// canonical records. No checkpoint is read or written.
pub async fn execute(pipeline_path: &Path, input: &Path, overrides: &Overrides) -> Result<()> {
    let config = super::load_pipeline(pipeline_path, overrides)?;
    let adapter = FlexeraAdapter::from_pipeline(&config, None)?;
    let runner = super::build_runner(&config, overrides, true)?;

    let ingest = adapter.ingest(&config, Some(input))?;
    let sink = resolve::open_sink(&config.output)?;
    let cancel = super::cancel_on_ctrl_c();

    let result = runner.run(ingest, sink, cancel).await;
    super::print_summary(&result);
    result.into_result()?;
    Ok(())
}
