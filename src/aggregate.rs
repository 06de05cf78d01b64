use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::canonical::{content_digest, ContentDigest};
use crate::error::{Result, StoreError};
use crate::paths::resolve_patterns;
use crate::session::{OpenMode, StoreOptions, StoreSession};
use crate::utils::format_bytes;

/// Lazily yields records from every store matching `patterns`, in path order.
///
/// Per-session dedup is disabled; one outer dedup set spans the whole call so
/// a record repeated across two files is yielded once. Zero matched paths is
/// a diagnostic, not a failure: the sequence is just empty.
pub fn load(patterns: &[String], unique: bool, verbose: bool) -> Result<Load> {
    let paths = resolve_patterns(patterns)?;
    if paths.is_empty() {
        warn!("zero files found matching {:?}", patterns);
    }
    Ok(Load {
        total: paths.len(),
        paths: paths.into_iter(),
        index: 0,
        current: None,
        seen: unique.then(HashSet::new),
        verbose,
    })
}

pub struct Load {
    paths: std::vec::IntoIter<PathBuf>,
    total: usize,
    index: usize,
    current: Option<StoreSession>,
    seen: Option<HashSet<ContentDigest>>,
    verbose: bool,
}

impl Iterator for Load {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(session) = self.current.as_mut() {
                match session.next_record() {
                    Ok(record) => {
                        if let Some(seen) = self.seen.as_mut() {
                            if !seen.insert(content_digest(&record)) {
                                continue;
                            }
                        }
                        return Some(Ok(record));
                    }
                    Err(StoreError::EndOfStream) => {
                        if let Some(mut finished) = self.current.take() {
                            if let Err(e) = finished.close() {
                                return Some(Err(e));
                            }
                        }
                        continue;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            let path = self.paths.next()?;
            self.index += 1;
            if self.verbose {
                let size = fs::metadata(&path).map(|m| m.len() as i64).unwrap_or(0);
                info!(
                    "[{}/{}] ({}) {}",
                    self.index,
                    self.total,
                    format_bytes(size),
                    path.display()
                );
            }
            let options = StoreOptions {
                unique: false,
                ..StoreOptions::default()
            };
            match StoreSession::open_read(&path, &options) {
                Ok(session) => self.current = Some(session),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Writes a record sequence to one or more targets, each committed through
/// the session's atomic-replace path. With multiple targets this is a
/// broadcast: every record is offered to every target, each with its own
/// dedup set, so all final write counts must agree.
///
/// With `overwrite` false, any pre-existing target makes the whole call a
/// warned no-op returning 0; a target that appears mid-write is still caught
/// as `RaceCondition` at commit. Returns the per-target written count.
pub fn dump<I>(records: I, paths: &[PathBuf], overwrite: bool, unique: bool) -> Result<usize>
where
    I: IntoIterator<Item = Result<Value>>,
{
    if paths.is_empty() {
        warn!("no dump targets given; nothing written");
        return Ok(0);
    }
    if !overwrite {
        for path in paths {
            if path.exists() {
                warn!(
                    "target {} exists and overwrite is off; nothing written",
                    path.display()
                );
                return Ok(0);
            }
        }
    }

    let mode = if overwrite {
        OpenMode::Write
    } else {
        OpenMode::ExclusiveCreate
    };
    let options = StoreOptions {
        unique,
        ..StoreOptions::default()
    };

    let mut sessions = Vec::with_capacity(paths.len());
    for path in paths {
        // On failure the sessions opened so far are dropped, which discards
        // their temporary files.
        sessions.push(StoreSession::open(path, mode, &options)?);
    }

    for record in records {
        let record = record?;
        for session in &mut sessions {
            session.write(&record)?;
        }
    }

    let mut counts = Vec::with_capacity(sessions.len());
    let mut first_failure = None;
    for session in &mut sessions {
        let written = session.writer().map(|w| w.records_written()).unwrap_or(0);
        match session.close() {
            Ok(()) => counts.push(written),
            Err(e) => {
                error!("failed to commit {}: {}", session.path().display(), e);
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
    }
    if let Some(e) = first_failure {
        return Err(e);
    }

    // Every target saw the same input, so diverging counts can only mean an
    // implementation bug.
    assert!(
        counts.windows(2).all(|pair| pair[0] == pair[1]),
        "broadcast targets disagree on write count: {:?}",
        counts
    );
    Ok(counts.first().copied().unwrap_or(0))
}

/// Sums record counts across every store matching `patterns` without parsing
/// a single record.
pub fn count(patterns: &[String]) -> Result<usize> {
    let paths = resolve_patterns(patterns)?;
    if paths.is_empty() {
        warn!("zero files found matching {:?}", patterns);
        return Ok(0);
    }

    let options = StoreOptions {
        unique: false,
        ..StoreOptions::default()
    };
    let mut total = 0;
    for path in paths {
        let mut session = StoreSession::open_read(&path, &options)?;
        total += session.skip(-1)?;
        session.close()?;
    }
    Ok(total)
}
