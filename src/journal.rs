//! Durable hand store backed by a write-ahead JSONL journal.
//!
//! Layout of a store directory:
//!
//! ```text
//! store/
//!   journal.jsonl         active journal, one entry per line
//!   journal.archive.zst   rotated entries, concatenated zstd frames
//!   journal.lock          held exclusively by the open store
//! ```
//!
//! Every write is a single line appended and synced before the in-memory
//! index changes, so a batch of hands plus its cursor is all-or-nothing: a
//! crash mid-write leaves a torn last line, which is ignored and cut off on
//! the next open. Replay is deterministic and idempotent, so entries that
//! appear in both the archive and the active journal (a crash between
//! archiving and truncating) replay harmlessly.

use crate::action::Seat;
use crate::error::StoreError;
use crate::hand::{Hand, HandRecord, HandUid};
use crate::source::SourceLines;
use crate::store::{
    HandFilter, HandStore, ImportCursor, StoreCapabilities, StoreIndex, UpsertSummary,
};
use chrono::NaiveDateTime;
use fs2::FileExt;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const JOURNAL_FILE: &str = "journal.jsonl";
const ARCHIVE_FILE: &str = "journal.archive.zst";
const LOCK_FILE: &str = "journal.lock";
const ARCHIVE_LEVEL: i32 = 3;

/// Controls whether the store takes an exclusive lock on its directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    /// Exclusive advisory lock; a second open fails.
    #[default]
    Flock,
    /// No locking. The caller guarantees a single writer.
    None,
}

// Externally tagged: `{"batch":{...}}`. Hand player maps have integer keys,
// which only deserialize when serde_json drives the map directly.
#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum EntryRef<'a> {
    Upsert {
        records: &'a [HandRecord],
    },
    Cursor {
        cursor: &'a ImportCursor,
    },
    Batch {
        records: &'a [HandRecord],
        cursor: &'a ImportCursor,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Entry {
    Upsert {
        records: Vec<HandRecord>,
    },
    Cursor {
        cursor: ImportCursor,
    },
    Batch {
        records: Vec<HandRecord>,
        cursor: ImportCursor,
    },
}

impl Entry {
    fn apply(self, index: &mut StoreIndex) {
        match self {
            Entry::Upsert { records } => {
                index.upsert(&records);
            }
            Entry::Cursor { cursor } => index.save_cursor(&cursor),
            Entry::Batch { records, cursor } => {
                index.upsert(&records);
                index.save_cursor(&cursor);
            }
        }
    }
}

/// Builder for [`JournalStore`].
#[derive(Debug, Clone)]
pub struct JournalStoreBuilder {
    dir: PathBuf,
    lock_mode: LockMode,
    rotate_after: Option<u64>,
}

impl JournalStoreBuilder {
    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Rotate the active journal into the archive once it grows past
    /// `bytes`. Off by default.
    pub fn rotate_after(mut self, bytes: u64) -> Self {
        self.rotate_after = Some(bytes);
        self
    }

    /// Open or create the store, replaying archive and journal.
    pub fn open(self) -> Result<JournalStore, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let journal_path = self.dir.join(JOURNAL_FILE);
        let archive_path = self.dir.join(ARCHIVE_FILE);

        let lock = match self.lock_mode {
            LockMode::Flock => Some(acquire_lock(&self.dir.join(LOCK_FILE))?),
            LockMode::None => None,
        };

        let mut index = StoreIndex::default();
        let mut replayed = 0u64;
        if let Some(reader) = open_archive(&archive_path)? {
            replayed += replay(reader, &archive_path, &mut index)?.0;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&journal_path)?;
        let len = file.metadata()?.len();
        let (count, valid_end) = replay(
            BufReader::new(File::open(&journal_path)?),
            &journal_path,
            &mut index,
        )?;
        replayed += count;
        if valid_end < len {
            warn!(
                "journal {}: dropping {} bytes of torn trailing entry",
                journal_path.display(),
                len - valid_end
            );
            file.set_len(valid_end)?;
            file.sync_data()?;
        }
        info!(
            "opened hand store {} ({replayed} entries, {} hands)",
            self.dir.display(),
            index.hand_count()
        );

        Ok(JournalStore {
            dir: self.dir,
            journal_path,
            archive_path,
            rotate_after: self.rotate_after,
            writer: Mutex::new(Writer { file, _lock: lock }),
            index: RwLock::new(index),
        })
    }
}

struct Writer {
    file: File,
    _lock: Option<File>,
}

/// Durable [`HandStore`]. Survives restarts; one writer per directory.
pub struct JournalStore {
    dir: PathBuf,
    journal_path: PathBuf,
    archive_path: PathBuf,
    rotate_after: Option<u64>,
    writer: Mutex<Writer>,
    index: RwLock<StoreIndex>,
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("dir", &self.dir)
            .field("rotate_after", &self.rotate_after)
            .finish()
    }
}

impl JournalStore {
    /// Open with default settings: exclusive lock, no automatic rotation.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        JournalStore::builder(dir).open()
    }

    pub fn builder(dir: impl AsRef<Path>) -> JournalStoreBuilder {
        JournalStoreBuilder {
            dir: dir.as_ref().to_path_buf(),
            lock_mode: LockMode::default(),
            rotate_after: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Current size in bytes of the active journal.
    pub fn journal_size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.journal_path)?.len())
    }

    /// Move the active journal into the compressed archive and truncate it.
    pub fn rotate(&self) -> Result<(), StoreError> {
        let writer = self.writer.lock();
        self.rotate_locked(&writer)
    }

    fn rotate_locked(&self, writer: &Writer) -> Result<(), StoreError> {
        let data = fs::read(&self.journal_path)?;
        if data.is_empty() {
            return Ok(());
        }
        let compressed = append_frame(&self.archive_path, &data)?;
        writer.file.set_len(0)?;
        writer.file.sync_data()?;
        info!(
            "rotated {} journal bytes into {} ({compressed} compressed)",
            data.len(),
            self.archive_path.display()
        );
        Ok(())
    }

    /// Append one entry, then apply it to the index under the same lock.
    fn write<T>(
        &self,
        entry: &EntryRef<'_>,
        apply: impl FnOnce(&mut StoreIndex) -> T,
    ) -> Result<T, StoreError> {
        let mut writer = self.writer.lock();
        let line = serde_json::to_string(entry)?;
        append_line(&mut writer.file, &line)?;
        let out = apply(&mut self.index.write());

        if let Some(limit) = self.rotate_after {
            if writer.file.metadata()?.len() > limit {
                self.rotate_locked(&writer)?;
            }
        }
        Ok(out)
    }
}

impl HandStore for JournalStore {
    fn upsert_hands(&self, batch: &[HandRecord]) -> Result<UpsertSummary, StoreError> {
        self.write(&EntryRef::Upsert { records: batch }, |index| {
            index.upsert(batch)
        })
    }

    fn list_hands(&self, filter: &HandFilter) -> Result<Vec<Hand>, StoreError> {
        Ok(self.index.read().list(filter))
    }

    fn count_hands(&self, filter: &HandFilter) -> Result<usize, StoreError> {
        Ok(self.index.read().count(filter))
    }

    fn list_hands_after(
        &self,
        watermark: Option<NaiveDateTime>,
        local_seat: Option<Seat>,
    ) -> Result<Vec<Hand>, StoreError> {
        Ok(self.index.read().after(watermark, local_seat))
    }

    fn get_hand(&self, uid: &HandUid) -> Result<Option<Hand>, StoreError> {
        Ok(self.index.read().get(uid))
    }

    fn get_cursor(&self, path: &Path) -> Result<Option<ImportCursor>, StoreError> {
        Ok(self.index.read().cursor(path))
    }

    fn save_cursor(&self, cursor: &ImportCursor) -> Result<(), StoreError> {
        self.write(&EntryRef::Cursor { cursor }, |index| {
            index.save_cursor(cursor)
        })
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            supports_atomic_batch: true,
        }
    }

    fn save_import_batch(
        &self,
        batch: &[HandRecord],
        cursor: &ImportCursor,
    ) -> Result<UpsertSummary, StoreError> {
        self.write(
            &EntryRef::Batch {
                records: batch,
                cursor,
            },
            |index| {
                let summary = index.upsert(batch);
                index.save_cursor(cursor);
                summary
            },
        )
    }
}

/// The file operations an append needs, so a failing disk can be stood in
/// for in tests.
trait JournalFile: Write {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&self) -> io::Result<()>;
}

impl JournalFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append `line` and a newline, then sync. If either step fails the file is
/// cut back to its previous length, so a later append never lands on the
/// tail of a half-written entry.
fn append_line<F: JournalFile>(file: &mut F, line: &str) -> io::Result<()> {
    let before = file.len()?;
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');

    let written = file.write_all(&buf).and_then(|()| file.sync());
    if let Err(e) = written {
        if let Err(cut) = file.truncate(before).and_then(|()| file.sync()) {
            warn!("could not cut failed journal append back to {before} bytes: {cut}");
        }
        return Err(e);
    }
    Ok(())
}

fn acquire_lock(path: &Path) -> Result<File, StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    if let Err(e) = file.try_lock_exclusive() {
        return Err(StoreError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "another writer holds the lock on {}: {e}",
                path.display()
            ),
        )));
    }
    Ok(file)
}

/// Apply every complete entry from `reader`. Returns the entry count and the
/// byte offset just past the last complete line.
fn replay<R: BufRead>(
    reader: R,
    path: &Path,
    index: &mut StoreIndex,
) -> Result<(u64, u64), StoreError> {
    let mut lines = SourceLines::new(reader, 0);
    let mut count = 0u64;
    let mut line_no = 0u64;
    for line in lines.by_ref() {
        let line = line?;
        line_no += 1;
        let text = line.text();
        if text.trim().is_empty() {
            continue;
        }
        let entry: Entry = serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: line_no,
            source,
        })?;
        entry.apply(index);
        count += 1;
    }
    Ok((count, lines.position()))
}

/// Compress `data` into a new zstd frame at the end of the archive. Returns
/// the compressed size.
fn append_frame(archive_path: &Path, data: &[u8]) -> io::Result<u64> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(archive_path)?;
    let before = file.metadata()?.len();
    let mut encoder = zstd::Encoder::new(file, ARCHIVE_LEVEL)?;
    encoder.write_all(data)?;
    let file = encoder.finish()?;
    file.sync_data()?;
    Ok(file.metadata()?.len() - before)
}

/// Decompressed view over all archive frames, or `None` if nothing has been
/// archived.
fn open_archive(archive_path: &Path) -> io::Result<Option<BufReader<zstd::Decoder<'static, BufReader<File>>>>> {
    if !archive_path.exists() {
        return Ok(None);
    }
    let decoder = zstd::Decoder::new(File::open(archive_path)?)?;
    Ok(Some(BufReader::new(decoder)))
}
