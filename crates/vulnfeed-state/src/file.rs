//! JSON-file implementation of [`CheckpointStore`].
//!
//! The whole document is rewritten on every save: a temp file is written in
//! the target directory and atomically renamed over the original, so a crash
//! never leaves a half-written checkpoint behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use vulnfeed_types::state::{Checkpoint, FeedId};

use crate::backend::CheckpointStore;
use crate::error::{self, StateError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    since: i64,
    updated_at: String,
}

type Document = BTreeMap<String, Entry>;

/// File-backed checkpoint storage. A missing file is an empty store.
pub struct FileCheckpointStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// Use `path` as the checkpoint document, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn read_document(&self) -> error::Result<Document> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Document::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn write_document(&self, doc: &Document) -> error::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StateError::Io(e.error))?;
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, feed: &FeedId) -> error::Result<Option<Checkpoint>> {
        let _guard = self.lock()?;
        let doc = self.read_document()?;
        Ok(doc
            .get(feed.as_str())
            .map(|entry| Checkpoint::from_unix_secs(entry.since)))
    }

    fn save(&self, feed: &FeedId, checkpoint: Checkpoint) -> error::Result<()> {
        let _guard = self.lock()?;
        let mut doc = self.read_document()?;
        doc.insert(
            feed.as_str().to_string(),
            Entry {
                since: checkpoint.as_unix_secs(),
                updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        );
        self.write_document(&doc)
    }
}
