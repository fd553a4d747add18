//! Streaming writer for raw vendor snapshots.
//!
//! Produces the same `{ "<id>": record, ... }` document that
//! [`JsonMapDecoder`](crate::decode::JsonMapDecoder) reads, one entry at a
//! time so large downloads never sit in memory.

use std::io::Write;

use serde::Serialize;

pub struct SnapshotWriter<W: Write> {
    out: W,
    written: u64,
    finished: bool,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            written: 0,
            finished: false,
        }
    }

    /// Append one keyed record.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on write failure or after [`finish`](Self::finish).
    pub fn write<R: Serialize>(&mut self, id: &str, record: &R) -> std::io::Result<()> {
        if self.finished {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "snapshot already finished",
            ));
        }
        self.out
            .write_all(if self.written == 0 { b"{\n" } else { b",\n" })?;
        serde_json::to_writer(&mut self.out, id)?;
        self.out.write_all(b": ")?;
        serde_json::to_writer(&mut self.out, record)?;
        self.written += 1;
        Ok(())
    }

    /// Close the document and flush. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on write or flush failure.
    pub fn finish(&mut self) -> std::io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.out
            .write_all(if self.written == 0 { b"{}\n" } else { b"\n}\n" })?;
        self.out.flush()?;
        self.finished = true;
        Ok(())
    }

    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }
}
