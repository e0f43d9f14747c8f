//! Writing discovered heads to stdout as JSON lines.

use std::io::{self, Write};

use discovery::{Head, HeadObserver, Revision};
use serde::Serialize;

#[derive(Serialize)]
struct Record<'a> {
    head: &'a Head,
    revision: &'a Revision,
    /// Why a merge revision must not be built, if it must not.
    #[serde(skip_serializing_if = "Option::is_none")]
    merge_problem: Option<String>,
}

/// Writes one JSON object per observed head.
///
/// A write failure stops the scan; [`JsonLines::finish`] reports it.
pub struct JsonLines<W> {
    writer: W,
    written: usize,
    error: Option<io::Error>,
}

impl<W: Write + Send> JsonLines<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            error: None,
        }
    }

    /// Writes a free-standing JSON value, e.g. repository metadata.
    pub fn write_value<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")
    }

    /// Flushes the writer and returns the number of heads written.
    pub fn finish(mut self) -> io::Result<usize> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        self.writer.flush()?;
        Ok(self.written)
    }

    fn write(&mut self, head: &Head, revision: &Revision) -> io::Result<()> {
        let record = Record {
            head,
            revision,
            merge_problem: revision.validate_merge_hash().err().map(|e| e.to_string()),
        };
        self.write_value(&record)
    }
}

impl<W: Write + Send> HeadObserver for JsonLines<W> {
    fn observe(&mut self, head: Head, revision: Revision) {
        if self.error.is_some() {
            return;
        }
        match self.write(&head, &revision) {
            Ok(()) => self.written += 1,
            Err(error) => self.error = Some(error),
        }
    }

    fn is_observing(&self) -> bool {
        self.error.is_none()
    }
}
