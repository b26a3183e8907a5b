//! Byte-exact line reading over append-only files.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Compute xxh64 hash of raw line bytes (without trailing newline), hex-encoded.
pub fn line_hash(line: &[u8]) -> String {
    let hash = xxhash_rust::xxh64::xxh64(line, 0);
    format!("{:016x}", hash)
}

/// One complete line and its byte extent `[start, end)`. `bytes` includes
/// the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub bytes: Vec<u8>,
    pub start: u64,
    pub end: u64,
}

impl RawLine {
    /// Line content without `\n` or `\r\n`, lossily decoded.
    pub fn text(&self) -> Cow<'_, str> {
        let mut body = &self.bytes[..];
        if let Some(rest) = body.strip_suffix(b"\n") {
            body = rest;
        }
        if let Some(rest) = body.strip_suffix(b"\r") {
            body = rest;
        }
        String::from_utf8_lossy(body)
    }
}

/// Iterator over complete lines of a reader starting at byte `pos`.
///
/// A final line without a trailing newline is still being written (or was
/// torn by a crash) and is not yielded; [`SourceLines::position`] stays at its
/// start so the next read picks it up whole.
pub struct SourceLines<R> {
    reader: R,
    pos: u64,
    done: bool,
}

impl<R: BufRead> SourceLines<R> {
    pub fn new(reader: R, pos: u64) -> Self {
        SourceLines {
            reader,
            pos,
            done: false,
        }
    }

    /// Offset just past the last yielded line.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl SourceLines<BufReader<File>> {
    /// Open `path` positioned at `offset`. Returns the iterator and the file
    /// length at open time.
    pub fn open_at(path: &Path, offset: u64) -> io::Result<(Self, u64)> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        file.seek(SeekFrom::Start(offset))?;
        Ok((SourceLines::new(BufReader::new(file), offset), len))
    }
}

impl<R: BufRead> Iterator for SourceLines<R> {
    type Item = io::Result<RawLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut bytes = Vec::new();
        match self.reader.read_until(b'\n', &mut bytes) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) if !bytes.ends_with(b"\n") => {
                // partial line at EOF
                self.done = true;
                None
            }
            Ok(n) => {
                let start = self.pos;
                self.pos += n as u64;
                Some(Ok(RawLine {
                    bytes,
                    start,
                    end: self.pos,
                }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Hash of the line that ends exactly at `offset`, with any `\r` removed.
///
/// Used to check that a stored offset still refers to the same file content.
/// Returns `None` at offset 0, past EOF, or when the byte before `offset` is
/// not a newline.
pub fn read_line_hash_before(path: &Path, offset: u64) -> io::Result<Option<String>> {
    const CHUNK: u64 = 4096;

    if offset == 0 {
        return Ok(None);
    }
    let mut file = File::open(path)?;
    if offset > file.metadata()?.len() {
        return Ok(None);
    }

    let mut tail = [0u8; 1];
    file.seek(SeekFrom::Start(offset - 1))?;
    file.read_exact(&mut tail)?;
    if tail[0] != b'\n' {
        return Ok(None);
    }

    // walk backwards until the previous newline or the start of the file
    let body_end = offset - 1;
    let mut line: Vec<u8> = Vec::new();
    let mut cursor = body_end;
    while cursor > 0 {
        let from = cursor.saturating_sub(CHUNK);
        let mut chunk = vec![0u8; (cursor - from) as usize];
        file.seek(SeekFrom::Start(from))?;
        file.read_exact(&mut chunk)?;
        match chunk.iter().rposition(|&b| b == b'\n') {
            Some(pos) => {
                chunk.drain(..=pos);
                chunk.extend_from_slice(&line);
                line = chunk;
                break;
            }
            None => {
                chunk.extend_from_slice(&line);
                line = chunk;
                cursor = from;
            }
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line_hash(&line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn yields_exact_extents_and_holds_partial_tail() {
        let data = b"one\r\ntwo\nthree";
        let mut lines = SourceLines::new(Cursor::new(&data[..]), 0);
        let first = lines.next().unwrap().unwrap();
        assert_eq!((first.start, first.end), (0, 5));
        assert_eq!(first.text(), "one");
        let second = lines.next().unwrap().unwrap();
        assert_eq!((second.start, second.end), (5, 9));
        assert!(lines.next().is_none());
        assert_eq!(lines.position(), 9);
    }

    #[test]
    fn offsets_continue_from_start_position() {
        let mut lines = SourceLines::new(Cursor::new(&b"x\n"[..]), 100);
        let line = lines.next().unwrap().unwrap();
        assert_eq!((line.start, line.end), (100, 102));
    }
}
