use std::collections::HashSet;
use std::io::Write;

use serde_json::Value;

use crate::canonical::{content_digest, to_canonical_string, ContentDigest};
use crate::error::Result;

/// Serializes records to canonical form followed by the separator line,
/// dropping duplicates when deduplication is enabled. Flush and close belong
/// to whoever owns the underlying stream.
pub struct RecordWriter<W: Write> {
    out: W,
    separator_blob: String,
    indent: usize,
    seen: Option<HashSet<ContentDigest>>,
    records_written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, separator: &str, indent: usize, unique: bool) -> Self {
        Self {
            out,
            separator_blob: format!("\n{separator}\n"),
            indent,
            seen: unique.then(HashSet::new),
            records_written: 0,
        }
    }

    /// Writes one record. Returns `false` without touching the stream when
    /// the record is a duplicate of one already written here.
    pub fn write(&mut self, record: &Value) -> Result<bool> {
        let text = to_canonical_string(record, self.indent)?;

        if let Some(seen) = self.seen.as_mut() {
            if !seen.insert(content_digest(record)) {
                return Ok(false);
            }
        }

        self.out.write_all(text.as_bytes())?;
        self.out.write_all(self.separator_blob.as_bytes())?;
        self.records_written += 1;
        Ok(true)
    }

    /// Writes each record in order; returns the count actually written,
    /// duplicates excluded.
    pub fn write_many<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut written = 0;
        for record in records {
            if self.write(&record)? {
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
