use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use serde_json::Value;
use tracing::warn;

use crate::constants::{
    DEFAULT_INDENT, DEFAULT_IO_BUFFER_SIZE, DEFAULT_SEPARATOR, GZIP_MAGIC, GZ_SUFFIX, TEMP_SUFFIX,
};
use crate::error::{Result, StoreError};
use crate::reader::RecordReader;
use crate::writer::RecordWriter;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub separator: String,
    pub indent: usize,
    pub unique: bool,
    /// `None` means auto: sniff the gzip magic bytes on read/append, infer
    /// from a gz-suffixed filename on write.
    pub gz: Option<bool>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            indent: DEFAULT_INDENT,
            unique: true,
            gz: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Append,
    Write,
    ExclusiveCreate,
}

impl FromStr for OpenMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Self::Read),
            "a" => Ok(Self::Append),
            "w" => Ok(Self::Write),
            "x" => Ok(Self::ExclusiveCreate),
            other => Err(StoreError::InvalidMode(format!(
                "mode not supported: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Append => "append",
            Self::Write => "write",
            Self::ExclusiveCreate => "exclusive-create",
        };
        f.write_str(name)
    }
}

/// The write side of the transparent-compression seam: one of two byte
/// sinks, selected once at open. The session is agnostic to which one it
/// holds until close, where the gzip trailer has to be finished.
pub enum StoreOutput {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Write for StoreOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(out) => out.write(buf),
            Self::Gzip(out) => out.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(out) => out.flush(),
            Self::Gzip(out) => out.flush(),
        }
    }
}

impl StoreOutput {
    fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut out) => out.flush(),
            Self::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

enum SessionIo {
    Reader(RecordReader<Box<dyn BufRead>>),
    Writer(RecordWriter<StoreOutput>),
}

/// One open/close lifecycle against one store path.
///
/// Read and append sessions operate on the target in place. Write and
/// exclusive-create sessions buffer everything in a `.partial` sibling and
/// commit by a single atomic rename at close, so no partially-written target
/// is ever observable. Dropping an uncommitted write session discards the
/// temporary file.
pub struct StoreSession {
    path: PathBuf,
    mode: OpenMode,
    temp_path: Option<PathBuf>,
    io: Option<SessionIo>,
}

impl StoreSession {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, options: &StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match mode {
            OpenMode::Read => Self::open_reading(path, options),
            OpenMode::Append => Self::open_appending(path, options),
            OpenMode::Write | OpenMode::ExclusiveCreate => Self::open_creating(path, mode, options),
        }
    }

    pub fn open_read(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        Self::open(path, OpenMode::Read, options)
    }

    pub fn open_append(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        Self::open(path, OpenMode::Append, options)
    }

    pub fn open_write(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        Self::open(path, OpenMode::Write, options)
    }

    pub fn open_exclusive(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        Self::open(path, OpenMode::ExclusiveCreate, options)
    }

    fn open_reading(path: PathBuf, options: &StoreOptions) -> Result<Self> {
        let use_gz = match options.gz {
            Some(explicit) => explicit,
            None => sniff_gzip(&path)?,
        };
        let file = File::open(&path)?;
        let input: Box<dyn BufRead> = if use_gz {
            Box::new(BufReader::with_capacity(
                DEFAULT_IO_BUFFER_SIZE,
                MultiGzDecoder::new(BufReader::new(file)),
            ))
        } else {
            Box::new(BufReader::with_capacity(DEFAULT_IO_BUFFER_SIZE, file))
        };
        Ok(Self {
            path,
            mode: OpenMode::Read,
            temp_path: None,
            io: Some(SessionIo::Reader(RecordReader::new(
                input,
                &options.separator,
                options.unique,
            ))),
        })
    }

    fn open_appending(path: PathBuf, options: &StoreOptions) -> Result<Self> {
        let (embedded_name, inferred_gz) = split_gz_name(&basename(&path));
        let use_gz = match options.gz {
            Some(explicit) => explicit,
            None if path.exists() => sniff_gzip(&path)?,
            None => inferred_gz,
        };
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let buf = BufWriter::with_capacity(DEFAULT_IO_BUFFER_SIZE, file);
        let out = if use_gz {
            // Appending starts a new gzip member; MultiGzDecoder reads
            // multi-member streams back as one.
            StoreOutput::Gzip(GzBuilder::new().filename(embedded_name).write(buf, Compression::default()))
        } else {
            StoreOutput::Plain(buf)
        };
        // Existing content is not re-scanned: the dedup set starts empty.
        Ok(Self {
            path,
            mode: OpenMode::Append,
            temp_path: None,
            io: Some(SessionIo::Writer(RecordWriter::new(
                out,
                &options.separator,
                options.indent,
                options.unique,
            ))),
        })
    }

    fn open_creating(path: PathBuf, mode: OpenMode, options: &StoreOptions) -> Result<Self> {
        if mode == OpenMode::ExclusiveCreate && path.exists() {
            return Err(StoreError::AlreadyExists(path));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut temp_os = path.clone().into_os_string();
        temp_os.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp_os);

        let (embedded_name, inferred_gz) = split_gz_name(&basename(&path));
        let use_gz = options.gz.unwrap_or(inferred_gz);

        let file = File::create(&temp_path)?;
        let buf = BufWriter::with_capacity(DEFAULT_IO_BUFFER_SIZE, file);
        let out = if use_gz {
            // The embedded filename names the final target, never the temp path.
            StoreOutput::Gzip(GzBuilder::new().filename(embedded_name).write(buf, Compression::default()))
        } else {
            StoreOutput::Plain(buf)
        };
        Ok(Self {
            path,
            mode,
            temp_path: Some(temp_path),
            io: Some(SessionIo::Writer(RecordWriter::new(
                out,
                &options.separator,
                options.indent,
                options.unique,
            ))),
        })
    }

    pub fn reader(&mut self) -> Result<&mut RecordReader<Box<dyn BufRead>>> {
        match self.io.as_mut() {
            Some(SessionIo::Reader(reader)) => Ok(reader),
            Some(SessionIo::Writer(_)) => Err(StoreError::InvalidMode(format!(
                "session on {} is open for writing, not reading",
                self.path.display()
            ))),
            None => Err(StoreError::InvalidMode(format!(
                "session on {} is closed",
                self.path.display()
            ))),
        }
    }

    pub fn writer(&mut self) -> Result<&mut RecordWriter<StoreOutput>> {
        match self.io.as_mut() {
            Some(SessionIo::Writer(writer)) => Ok(writer),
            Some(SessionIo::Reader(_)) => Err(StoreError::InvalidMode(format!(
                "session on {} is open for reading, not writing",
                self.path.display()
            ))),
            None => Err(StoreError::InvalidMode(format!(
                "session on {} is closed",
                self.path.display()
            ))),
        }
    }

    pub fn next_record(&mut self) -> Result<Value> {
        self.reader()?.next_record()
    }

    pub fn read(&mut self, limit: isize) -> Result<Vec<Value>> {
        self.reader()?.read(limit)
    }

    pub fn skip(&mut self, limit: isize) -> Result<usize> {
        self.reader()?.skip(limit)
    }

    pub fn write(&mut self, record: &Value) -> Result<bool> {
        self.writer()?.write(record)
    }

    pub fn write_many<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = Value>,
    {
        self.writer()?.write_many(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Flushes, finishes compression, and for write modes commits the
    /// temporary file onto the target. This is the commit point: the
    /// exclusive-create race check happens here and only here, so a target
    /// that appeared mid-session fails with `RaceCondition` while one that
    /// pre-existed fails `AlreadyExists` at open.
    pub fn close(&mut self) -> Result<()> {
        let Some(io) = self.io.take() else {
            warn!(
                "close called on an already-closed session for {}",
                self.path.display()
            );
            return Ok(());
        };

        if let SessionIo::Writer(writer) = io {
            writer.into_inner().finish()?;
            if let Some(temp_path) = self.temp_path.clone() {
                if self.mode == OpenMode::ExclusiveCreate && self.path.exists() {
                    // The race winner keeps the target; our work is discarded.
                    let _ = fs::remove_file(&temp_path);
                    self.temp_path = None;
                    return Err(StoreError::RaceCondition(self.path.clone()));
                }
                fs::rename(&temp_path, &self.path)?;
                self.temp_path = None;
            }
        }
        Ok(())
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            warn!(
                "session for {} dropped without committing; discarding {}",
                self.path.display(),
                temp_path.display()
            );
            // Release the handle before unlinking.
            self.io = None;
            let _ = fs::remove_file(&temp_path);
        }
    }
}

fn sniff_gzip(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Splits a `.gz` suffix off for the embedded gzip filename and decides
/// whether the name itself calls for compression (any gz-suffixed name does).
fn split_gz_name(file_name: &str) -> (String, bool) {
    match file_name.strip_suffix(GZ_SUFFIX) {
        Some(stripped) => (stripped.to_string(), true),
        None => (file_name.to_string(), file_name.ends_with("gz")),
    }
}
