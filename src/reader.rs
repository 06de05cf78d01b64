use std::collections::HashSet;
use std::io::BufRead;

use serde_json::Value;

use crate::canonical::{content_digest, ContentDigest};
use crate::error::{Result, StoreError};
use crate::framer::RecordFramer;

/// Turns framed blocks into parsed records, skipping duplicates in-stream
/// when deduplication is enabled. The dedup set is owned by this instance;
/// nothing is shared across readers.
pub struct RecordReader<R: BufRead> {
    frames: RecordFramer<R>,
    seen: Option<HashSet<ContentDigest>>,
    records_read: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R, separator: &str, unique: bool) -> Self {
        Self {
            frames: RecordFramer::new(input, separator),
            seen: unique.then(HashSet::new),
            records_read: 0,
        }
    }

    /// Parses and returns the next novel record. Duplicate records are pulled
    /// and dropped silently until a novel one is found or the stream ends.
    pub fn next_record(&mut self) -> Result<Value> {
        let block = self.frames.next_block()?.ok_or(StoreError::EndOfStream)?;
        let mut record: Value = serde_json::from_str(&block)?;

        if let Some(seen) = self.seen.as_mut() {
            let mut digest = content_digest(&record);
            while seen.contains(&digest) {
                let block = self.frames.next_block()?.ok_or(StoreError::EndOfStream)?;
                record = serde_json::from_str(&block)?;
                digest = content_digest(&record);
            }
            seen.insert(digest);
        }

        self.records_read += 1;
        Ok(record)
    }

    /// Reads up to `limit` records, or all remaining records when `limit` is
    /// negative. Stops without error at end of stream.
    pub fn read(&mut self, limit: isize) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        while limit < 0 || records.len() < limit as usize {
            match self.next_record() {
                Ok(record) => records.push(record),
                Err(StoreError::EndOfStream) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// Advances past up to `limit` raw blocks (all of them when `limit` is
    /// negative) without parsing or dedup bookkeeping, returning the count
    /// actually skipped. This keeps counting free of JSON-parsing cost.
    pub fn skip(&mut self, limit: isize) -> Result<usize> {
        let mut skipped = 0;
        while limit < 0 || skipped < limit as usize {
            match self.frames.next_block()? {
                Some(_) => skipped += 1,
                None => break,
            }
        }
        Ok(skipped)
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    pub fn unterminated_tail(&self) -> bool {
        self.frames.unterminated_tail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn reader_over(input: &str, unique: bool) -> RecordReader<Cursor<String>> {
        RecordReader::new(Cursor::new(input.to_string()), "--", unique)
    }

    const THREE: &str = "{\"a\": 1}\n--\n{\"b\": 2}\n--\n{\"c\": 3}\n--\n";

    #[test]
    fn test_reads_in_order() {
        let mut reader = reader_over(THREE, true);
        assert_eq!(reader.next_record().unwrap(), json!({"a": 1}));
        assert_eq!(reader.next_record().unwrap(), json!({"b": 2}));
        assert_eq!(reader.next_record().unwrap(), json!({"c": 3}));
        assert!(matches!(reader.next_record(), Err(StoreError::EndOfStream)));
        assert_eq!(reader.records_read(), 3);
    }

    #[test]
    fn test_read_bounded_and_unbounded() {
        let mut reader = reader_over(THREE, true);
        assert_eq!(reader.read(2).unwrap().len(), 2);
        assert_eq!(reader.read(-1).unwrap().len(), 1);
        assert!(reader.read(5).unwrap().is_empty());
    }

    #[test]
    fn test_dedup_skips_repeats() {
        let input = "{\"a\": 1}\n--\n{\"a\": 1}\n--\n{\"b\": 2}\n--\n";
        let mut reader = reader_over(input, true);
        let records = reader.read(-1).unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_dedup_ignores_key_order_and_formatting() {
        let input = "{\"a\": 1, \"b\": 2}\n--\n{\n    \"b\": 2,\n    \"a\": 1\n}\n--\n";
        let mut reader = reader_over(input, true);
        assert_eq!(reader.read(-1).unwrap().len(), 1);
    }

    #[test]
    fn test_dedup_disabled_keeps_repeats() {
        let input = "{\"a\": 1}\n--\n{\"a\": 1}\n--\n";
        let mut reader = reader_over(input, false);
        assert_eq!(reader.read(-1).unwrap().len(), 2);
    }

    #[test]
    fn test_trailing_duplicates_end_stream_cleanly() {
        let input = "{\"a\": 1}\n--\n{\"a\": 1}\n--\n{\"a\": 1}\n--\n";
        let mut reader = reader_over(input, true);
        assert_eq!(reader.read(-1).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_block_is_parse_error() {
        let mut reader = reader_over("not json\n--\n", true);
        assert!(matches!(reader.next_record(), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_skip_counts_blocks_without_parsing() {
        // Malformed blocks do not bother skip.
        let input = "{\"a\": 1}\n--\nnot json at all\n--\n{\"b\": 2}\n--\n";
        let mut reader = reader_over(input, true);
        assert_eq!(reader.skip(-1).unwrap(), 3);
        assert_eq!(reader.skip(-1).unwrap(), 0);
    }

    #[test]
    fn test_skip_bounded() {
        let mut reader = reader_over(THREE, true);
        assert_eq!(reader.skip(2).unwrap(), 2);
        assert_eq!(reader.next_record().unwrap(), json!({"c": 3}));
    }

    #[test]
    fn test_skip_does_not_record_dedup_state() {
        let input = "{\"a\": 1}\n--\n{\"a\": 1}\n--\n";
        let mut reader = reader_over(input, true);
        assert_eq!(reader.skip(1).unwrap(), 1);
        // The skipped block was never hashed, so the second copy still reads.
        assert_eq!(reader.next_record().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_unterminated_tail_record_is_yielded() {
        let mut reader = reader_over("{\"a\": 1}\n--\n{\"b\": 2}\n", true);
        let records = reader.read(-1).unwrap();
        assert_eq!(records.len(), 2);
        assert!(reader.unterminated_tail());
    }
}
