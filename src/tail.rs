//! Following a growing log file.

use crate::source::SourceLines;
use log::{debug, warn};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Outcome of [`LogTail::wait_for_growth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The file is longer than the offset; carries the new length.
    NewData(u64),
    Timeout,
}

/// Complete lines read from `[start, end)`, each without its `\n`.
///
/// A `\r` before the newline is kept so that `line.len() + 1` is exactly the
/// line's size on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailBatch {
    pub lines: Vec<String>,
    pub start: u64,
    pub end: u64,
}

/// Reads what was appended to a file since the last poll.
///
/// Pair it with [`Importer::import_lines`](crate::Importer::import_lines),
/// starting from [`Importer::next_offset`](crate::Importer::next_offset).
#[derive(Debug, Clone)]
pub struct LogTail {
    path: PathBuf,
    offset: u64,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        LogTail {
            path: path.into(),
            offset,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the first byte not yet returned.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Return the complete lines appended since the last call, or `None` if
    /// there are none. A partial last line is left for the next poll.
    pub fn poll(&mut self) -> io::Result<Option<TailBatch>> {
        let len = fs::metadata(&self.path)?.len();
        if len < self.offset {
            warn!(
                "{} shrank from {} to {len} bytes, tailing from the start",
                self.path.display(),
                self.offset
            );
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(None);
        }

        let (mut lines, _) = SourceLines::open_at(&self.path, self.offset)?;
        let mut batch = Vec::new();
        for line in lines.by_ref() {
            let line = line?;
            let body = line.bytes.strip_suffix(b"\n").unwrap_or(&line.bytes[..]);
            batch.push(String::from_utf8_lossy(body).into_owned());
        }
        if batch.is_empty() {
            return Ok(None);
        }
        let start = self.offset;
        self.offset = lines.position();
        Ok(Some(TailBatch {
            lines: batch,
            start,
            end: self.offset,
        }))
    }

    /// Block until the file grows past the current offset or `timeout`
    /// elapses. Returns immediately if data is already there.
    pub fn wait_for_growth(&self, timeout: Duration) -> io::Result<WaitResult> {
        if let Some(len) = self.grown()? {
            return Ok(WaitResult::NewData(len));
        }

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx).map_err(io::Error::other)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(io::Error::other)?;

        // an append may have landed before the watch was registered
        if let Some(len) = self.grown()? {
            return Ok(WaitResult::NewData(len));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(WaitResult::Timeout);
            }
            match rx.recv_timeout(remaining) {
                Ok(Ok(event)) if self.is_relevant(&event) => {
                    if let Some(len) = self.grown()? {
                        return Ok(WaitResult::NewData(len));
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("watch error on {}: {e}", dir.display()),
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(WaitResult::Timeout),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::other("file watcher stopped"));
                }
            }
        }
    }

    fn grown(&self) -> io::Result<Option<u64>> {
        let len = fs::metadata(&self.path)?.len();
        Ok((len > self.offset).then_some(len))
    }

    fn is_relevant(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }
}
