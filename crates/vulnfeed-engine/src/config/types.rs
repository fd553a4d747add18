//! Serde model of the pipeline YAML file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    /// Checkpoint key for this (vendor, deployment) pair.
    pub feed: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Adapter name, e.g. `flexera`.
    #[serde(rename = "use")]
    pub use_ref: String,
    #[serde(default)]
    pub mode: IngestMode,
    /// Adapter-owned settings, deserialized by the adapter itself.
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
    /// Snapshot input; absent or `-` reads stdin.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    #[default]
    Incremental,
    Snapshot,
}

impl IngestMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Snapshot => "snapshot",
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: OutputKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Stdout,
    File,
}

/// Serialization of canonical records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One NVD feed document with a `CVE_Items` array.
    #[default]
    Feed,
    /// One CVE item per line.
    Ndjson,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed" => Ok(Self::Feed),
            "ndjson" => Ok(Self::Ndjson),
            other => Err(format!("unknown output format '{other}' (expected feed|ndjson)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,
    /// Backend location; defaults under `~/.vulnfeed/`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    #[default]
    Sqlite,
    File,
    /// Always start from the epoch and persist nothing.
    #[serde(rename = "none")]
    Disabled,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub emit_mode: EmitMode,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub on_convert_error: ConvertErrorPolicy,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_queue_capacity() -> usize {
    64
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            emit_mode: EmitMode::default(),
            queue_capacity: default_queue_capacity(),
            on_convert_error: ConvertErrorPolicy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// How converted records reach the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitMode {
    /// Bounded queue feeding a dedicated emission stage.
    #[default]
    Queued,
    /// Convert and write on the ingestion task.
    Inline,
}

/// What a per-record conversion failure does to the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertErrorPolicy {
    #[default]
    Skip,
    Fail,
}
