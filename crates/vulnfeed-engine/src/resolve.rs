//! Builds runtime objects (checkpoint store, sink, snapshot input) from
//! pipeline configuration.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use vulnfeed_state::{CheckpointStore, FileCheckpointStore, SqliteCheckpointStore};

use crate::config::types::{CheckpointBackend, CheckpointConfig, OutputConfig, OutputKind};
use crate::sink::{JsonSink, Sink};

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
}

/// `~/.vulnfeed`, or `/tmp/.vulnfeed` when `HOME` is unset.
fn default_state_dir() -> PathBuf {
    home_dir().join(".vulnfeed")
}

/// Replace a leading `~` component with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Open the configured checkpoint store. Backend `none` yields `None`.
///
/// # Errors
///
/// Returns an error if the store's directory or database can't be opened.
pub fn create_checkpoint_store(
    config: &CheckpointConfig,
) -> Result<Option<Arc<dyn CheckpointStore>>> {
    match config.backend {
        CheckpointBackend::Sqlite => {
            let path = config
                .path
                .as_deref()
                .map_or_else(|| default_state_dir().join("state.db"), expand_home);
            let store = SqliteCheckpointStore::open(&path)
                .with_context(|| format!("Failed to open checkpoint DB {}", path.display()))?;
            Ok(Some(Arc::new(store) as Arc<dyn CheckpointStore>))
        }
        CheckpointBackend::File => {
            let path = config
                .path
                .as_deref()
                .map_or_else(|| default_state_dir().join("checkpoints.json"), expand_home);
            let store = FileCheckpointStore::open(&path)
                .with_context(|| format!("Failed to open checkpoint file {}", path.display()))?;
            Ok(Some(Arc::new(store) as Arc<dyn CheckpointStore>))
        }
        CheckpointBackend::Disabled => Ok(None),
    }
}

/// Open the configured output. File outputs create their parent directory
/// and truncate any existing file.
///
/// # Errors
///
/// Returns an error if a file output has no path or can't be created.
pub fn open_sink(config: &OutputConfig) -> Result<Box<dyn Sink>> {
    match config.kind {
        OutputKind::Stdout => Ok(Box::new(JsonSink::new(
            BufWriter::new(std::io::stdout()),
            config.format,
        ))),
        OutputKind::File => {
            let path = config
                .path
                .as_deref()
                .context("Output kind 'file' requires a path")?;
            let file = create_output_file(path)?;
            Ok(Box::new(JsonSink::new(BufWriter::new(file), config.format)))
        }
    }
}

/// Create (truncating) an output file, making its parent directory.
///
/// # Errors
///
/// Returns an error if the directory or file can't be created.
pub fn create_output_file(path: &Path) -> Result<File> {
    let path = expand_home(path);
    let path = path.as_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    File::create(path).with_context(|| format!("Failed to create output {}", path.display()))
}

/// Open a vendor snapshot. `None` or `-` reads stdin.
///
/// # Errors
///
/// Returns an error if the file can't be opened.
pub fn open_snapshot_input(path: Option<&Path>) -> Result<Box<dyn Read + Send>> {
    match path {
        None => Ok(Box::new(std::io::stdin())),
        Some(p) if p == Path::new("-") => Ok(Box::new(std::io::stdin())),
        Some(p) => {
            let p = expand_home(p);
            let file = File::open(&p)
                .with_context(|| format!("Failed to open snapshot {}", p.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}
