use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use source_flexera::Advisory;
use vulnfeed_engine::resolve;
use vulnfeed_sdk::capability::Fetcher;

use super::Overrides;
use crate::adapter::FlexeraAdapter;

/// Execute the `download` command: write raw advisories changed since the
/// checkpoint as a `{ id: advisory }` snapshot. The checkpoint is left as is.
pub async fn execute(pipeline_path: &Path, output: Option<&Path>, overrides: &Overrides) -> Result<()> {
    let config = super::load_pipeline(pipeline_path, overrides)?;
    let adapter = FlexeraAdapter::from_pipeline(&config, overrides.base_url.as_deref())?;
    let runner = super::build_runner(&config, overrides, false)?;

    let out: Box<dyn Write + Send> = match output {
        Some(path) if path != Path::new("-") => {
            Box::new(BufWriter::new(resolve::create_output_file(path)?))
        }
        _ => Box::new(BufWriter::new(std::io::stdout())),
    };
    let cancel = super::cancel_on_ctrl_c();

    let fetcher: Arc<dyn Fetcher<Record = Advisory>> = adapter.fetcher()?;
    let summary = match runner.download(fetcher, out, cancel).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(path) = output.filter(|p| *p != Path::new("-")) {
                eprintln!(
                    "Download stopped early; {} holds a partial snapshot.",
                    path.display()
                );
            }
            return Err(e.into());
        }
    };
    eprintln!("Feed '{}' downloaded.", runner.feed());
    eprintln!("  Since:    {}", summary.since);
    eprintln!("  Records:  {}", summary.records);
    eprintln!("  Duration: {:.2}s", summary.duration_secs);
    Ok(())
}
