//! Output sinks for canonical records.
//!
//! A sink owns every record handed to it. [`Sink::finish`] is the delivery
//! confirmation the runner waits for before advancing the checkpoint.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use vulnfeed_types::error::SinkError;
use vulnfeed_types::nvd::{CveItem, CVE_DATA_FORMAT, CVE_DATA_TYPE, CVE_DATA_VERSION, NVD_TIME_FORMAT};

use crate::config::types::OutputFormat;

/// Destination for canonical records. Writes are blocking.
pub trait Sink: Send {
    /// # Errors
    ///
    /// Returns [`SinkError`] if the record can't be serialized or written.
    fn write(&mut self, item: CveItem) -> Result<(), SinkError>;

    /// Flush and close the output. Called exactly once per run, including
    /// failed runs, so documents are always well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the final flush fails.
    fn finish(&mut self) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// JsonSink
// ---------------------------------------------------------------------------

/// Streams records as an NVD feed document or newline-delimited JSON.
pub struct JsonSink<W: Write + Send> {
    out: W,
    format: OutputFormat,
    written: u64,
    finished: bool,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            written: 0,
            finished: false,
        }
    }

    fn write_feed_header(&mut self) -> Result<(), SinkError> {
        let header = serde_json::json!({
            "CVE_data_type": CVE_DATA_TYPE,
            "CVE_data_format": CVE_DATA_FORMAT,
            "CVE_data_version": CVE_DATA_VERSION,
            "CVE_data_timestamp": Utc::now().format(NVD_TIME_FORMAT).to_string(),
        });
        // Reopen the header object so items can be streamed into it.
        let mut header = serde_json::to_string(&header)?;
        header.pop();
        self.out.write_all(header.as_bytes())?;
        self.out.write_all(b",\"CVE_Items\":[")?;
        Ok(())
    }
}

impl<W: Write + Send> Sink for JsonSink<W> {
    fn write(&mut self, item: CveItem) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Finished);
        }
        match self.format {
            OutputFormat::Feed => {
                if self.written == 0 {
                    self.write_feed_header()?;
                } else {
                    self.out.write_all(b",")?;
                }
                self.out.write_all(b"\n")?;
                serde_json::to_writer(&mut self.out, &item)?;
            }
            OutputFormat::Ndjson => {
                serde_json::to_writer(&mut self.out, &item)?;
                self.out.write_all(b"\n")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if self.finished {
            return Ok(());
        }
        if self.format == OutputFormat::Feed {
            if self.written == 0 {
                self.write_feed_header()?;
            }
            self.out.write_all(b"\n]}\n")?;
        }
        self.out.flush()?;
        self.finished = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VecSink
// ---------------------------------------------------------------------------

/// Collects records in memory. Clones share the same buffer, so a caller can
/// keep one handle while the runner consumes another.
#[derive(Clone, Default)]
pub struct VecSink {
    items: Arc<Mutex<Vec<CveItem>>>,
    finished: Arc<Mutex<bool>>,
}

impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records written so far.
    #[must_use]
    pub fn items(&self) -> Vec<CveItem> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.lock().map(|f| *f).unwrap_or(false)
    }
}

impl Sink for VecSink {
    fn write(&mut self, item: CveItem) -> Result<(), SinkError> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "sink lock poisoned"))?;
        items.push(item);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        let mut finished = self
            .finished
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "sink lock poisoned"))?;
        *finished = true;
        Ok(())
    }
}
