//! Resolves the pipeline's `source.use` to a vendor adapter.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use source_flexera::{Advisory, Config, FlexeraFetcher, ADAPTER_NAME};
use vulnfeed_engine::config::types::{IngestMode, PipelineConfig};
use vulnfeed_engine::resolve;
use vulnfeed_engine::Ingest;
use vulnfeed_sdk::http::HttpConfig;

/// Flexera adapter wired from pipeline configuration. The API token is read
/// here, from the configured environment variable, and handed to the
/// fetcher explicitly.
pub struct FlexeraAdapter {
    config: Config,
    token: Option<String>,
    http: HttpConfig,
}

impl FlexeraAdapter {
    pub fn from_pipeline(pipeline: &PipelineConfig, base_url: Option<&str>) -> Result<Self> {
        if pipeline.source.use_ref != ADAPTER_NAME {
            bail!(
                "Unknown source adapter '{}' (available: {ADAPTER_NAME})",
                pipeline.source.use_ref
            );
        }
        let mut config = Config::from_value(&pipeline.source.config)?;
        if let Some(url) = base_url {
            config.base_url = url.to_string();
        }
        config
            .validate()
            .context("Invalid source.config for adapter 'flexera'")?;

        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        let http = config.http_config(
            Duration::from_secs(pipeline.resources.request_timeout_secs),
            pipeline.resources.max_retries,
        );
        Ok(Self {
            config,
            token,
            http,
        })
    }

    pub fn token_env(&self) -> &str {
        &self.config.token_env
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn fetcher(&self) -> Result<Arc<FlexeraFetcher>> {
        let fetcher = FlexeraFetcher::new(self.config.clone(), self.token.clone(), &self.http)?;
        Ok(Arc::new(fetcher))
    }

    /// Ingestion path for the configured mode. `snapshot` overrides the
    /// configured snapshot path.
    pub fn ingest(
        &self,
        pipeline: &PipelineConfig,
        snapshot: Option<&std::path::Path>,
    ) -> Result<Ingest<Advisory>> {
        let mode = if snapshot.is_some() {
            IngestMode::Snapshot
        } else {
            pipeline.source.mode
        };
        match mode {
            IngestMode::Incremental => Ok(Ingest::Incremental(self.fetcher()?)),
            IngestMode::Snapshot => {
                let path = snapshot.or(pipeline.source.snapshot_path.as_deref());
                Ok(Ingest::Snapshot {
                    decoder: Arc::new(source_flexera::decoder()),
                    input: resolve::open_snapshot_input(path)?,
                })
            }
        }
    }
}
