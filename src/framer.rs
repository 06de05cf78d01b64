use std::io::BufRead;

use tracing::warn;

use crate::error::Result;

/// Splits a line-oriented stream into raw record blocks on a separator line.
///
/// Pull-based and non-restartable: once `next_block` returns `Ok(None)` the
/// framer stays exhausted. A stream that ends with buffered non-blank content
/// is missing its final separator; the trailing block is still yielded and
/// the condition is reported through a warning and the sticky
/// `unterminated_tail` flag.
pub struct RecordFramer<R: BufRead> {
    input: R,
    separator: String,
    finished: bool,
    unterminated_tail: bool,
}

impl<R: BufRead> RecordFramer<R> {
    pub fn new(input: R, separator: &str) -> Self {
        Self {
            input,
            separator: separator.to_string(),
            finished: false,
            unterminated_tail: false,
        }
    }

    /// Returns the next raw block (all lines since the previous separator,
    /// exclusive of the separator line), or `None` once the stream ends on a
    /// separator as a well-formed store does.
    pub fn next_block(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }

        let mut block = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.input.read_line(&mut line)?;
            if n == 0 {
                self.finished = true;
                if block.trim().is_empty() {
                    return Ok(None);
                }
                self.unterminated_tail = true;
                warn!(
                    "store ended without a terminating {:?} separator; yielding trailing block",
                    self.separator
                );
                return Ok(Some(block));
            }

            if line.trim_end_matches(['\r', '\n']) == self.separator {
                return Ok(Some(block));
            }
            block.push_str(&line);
        }
    }

    /// True once the stream ended with a non-blank block missing its
    /// terminating separator. Strict callers can treat this as fatal.
    pub fn unterminated_tail(&self) -> bool {
        self.unterminated_tail
    }
}
