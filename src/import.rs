//! Import orchestration.
//!
//! The [`Importer`] walks every known log file oldest first. Files other than
//! the newest are historical: they are parsed in parallel, written serially,
//! and marked fully imported so the next start skips them. The newest file
//! is active: its parser stays live, tailed lines are appended through
//! [`Importer::import_lines`], and queries read its state.

use crate::action::Seat;
use crate::aggregator::StatsAggregator;
use crate::context::WorldContext;
use crate::error::{ImportError, StoreError};
use crate::hand::{Hand, HandRecord, HandSourceRef, HandSummary, HandUid};
use crate::parser::{HandParser, ParsedHand, ParserConfig};
use crate::source::{read_line_hash_before, SourceLines};
use crate::stats::HandStats;
use crate::store::{HandFilter, HandStore, ImportCursor, UpsertSummary};
use chrono::NaiveDateTime;
use log::{debug, info, trace, warn};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Returns known log files, newest first.
pub type Locator = Box<dyn Fn() -> io::Result<Vec<PathBuf>> + Send + Sync>;

const DEFAULT_MAX_WORKERS: usize = 4;

/// Cooperative cancellation, checked between lines and between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), ImportError> {
        if self.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Historical,
    Active,
}

/// Reported once per file after its hands are written. Skipped files are
/// never reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    pub path: PathBuf,
    pub stage: ImportStage,
    pub hands: usize,
    pub summary: UpsertSummary,
    /// 1-based position among the files this run imports.
    pub file_index: usize,
    pub file_count: usize,
}

/// Time bounds for [`Importer::stats`]. No bounds means all time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsFilter {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl StatsFilter {
    pub fn is_all_time(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Read-only view of the live import state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSnapshot {
    pub active_path: Option<PathBuf>,
    pub hand_count: usize,
    pub local_seat: Option<Seat>,
    pub world: WorldContext,
    pub next_byte_offset: u64,
    pub next_line: u64,
    pub last_event_at: Option<NaiveDateTime>,
    pub has_open_hand: bool,
    pub malformed_lines: u64,
    pub discarded_hands: u64,
}

/// The active session: which file is live and the parser that owns it.
#[derive(Debug, Clone)]
struct ImportState {
    active_path: Option<PathBuf>,
    parser: HandParser,
    local_seat: Option<Seat>,
    /// Bumped on every publish so a stale clone is never swapped in.
    generation: u64,
}

/// Builder for [`Importer`].
pub struct ImporterBuilder {
    store: Arc<dyn HandStore>,
    locator: Option<Locator>,
    max_workers: usize,
    parser: ParserConfig,
    stats_snapshot: Option<PathBuf>,
}

impl ImporterBuilder {
    pub fn locator<F>(mut self, locator: F) -> Self
    where
        F: Fn() -> io::Result<Vec<PathBuf>> + Send + Sync + 'static,
    {
        self.locator = Some(Box::new(locator));
        self
    }

    /// Upper bound on historical parse workers. Clamped to at least 1.
    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }

    pub fn parser(mut self, config: ParserConfig) -> Self {
        self.parser = config;
        self
    }

    /// Persist the all-time statistics at `path` between runs.
    pub fn stats_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_snapshot = Some(path.into());
        self
    }

    pub fn build(self) -> Importer {
        let aggregator = match self.stats_snapshot {
            Some(path) => StatsAggregator::with_snapshot(path),
            None => StatsAggregator::new(),
        };
        Importer {
            state: RwLock::new(ImportState {
                active_path: None,
                parser: HandParser::new(self.parser.clone()),
                local_seat: None,
                generation: 0,
            }),
            store: self.store,
            locator: self.locator,
            max_workers: self.max_workers,
            config: self.parser,
            aggregator,
        }
    }
}

/// Drives the parser over log files and persists what it finds.
pub struct Importer {
    state: RwLock<ImportState>,
    store: Arc<dyn HandStore>,
    locator: Option<Locator>,
    max_workers: usize,
    config: ParserConfig,
    aggregator: StatsAggregator,
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("active_path", &self.state.read().active_path)
            .field("max_workers", &self.max_workers)
            .field("config", &self.config)
            .finish()
    }
}

impl Importer {
    pub fn builder(store: Arc<dyn HandStore>) -> ImporterBuilder {
        ImporterBuilder {
            store,
            locator: None,
            max_workers: DEFAULT_MAX_WORKERS,
            parser: ParserConfig::default(),
            stats_snapshot: None,
        }
    }

    /// The store hands and cursors are written to.
    pub fn store(&self) -> &Arc<dyn HandStore> {
        &self.store
    }

    /// The file currently receiving tailed lines, if any.
    pub fn active_path(&self) -> Option<PathBuf> {
        self.state.read().active_path.clone()
    }

    /// Import every file the locator knows about and activate the newest.
    /// Returns the newest path, or `None` when there are no files.
    pub fn bootstrap(
        &self,
        progress: &mut dyn FnMut(&ImportProgress),
        cancel: &CancelToken,
    ) -> Result<Option<PathBuf>, ImportError> {
        let Some(locator) = &self.locator else {
            debug!("no locator configured, nothing to bootstrap");
            return Ok(None);
        };
        let mut files = locator().map_err(ImportError::Locate)?;
        files.reverse();
        let Some(active) = files.pop() else {
            info!("no log files found");
            return Ok(None);
        };

        let mut pending = Vec::new();
        for path in files {
            match self.store.get_cursor(&path)? {
                Some(cursor) if cursor.is_fully_imported => {
                    debug!("skipping fully imported {}", path.display());
                }
                _ => pending.push(path),
            }
        }
        let file_count = pending.len() + 1;

        let parsed = self.parse_historical(&pending, cancel)?;
        for (i, (path, result)) in parsed.into_iter().enumerate() {
            cancel.check()?;
            let parser = result?;
            let mut cursor = cursor_for(&path, &parser)?;
            cursor.is_fully_imported = true;
            let summary = self.persist(&path, parser.hands(), &cursor)?;
            info!(
                "imported {}: {} hands ({} new)",
                path.display(),
                parser.hand_count(),
                summary.inserted
            );
            progress(&ImportProgress {
                path,
                stage: ImportStage::Historical,
                hands: parser.hand_count(),
                summary,
                file_index: i + 1,
                file_count,
            });
        }

        cancel.check()?;
        let (hands, summary) = self.activate(&active, true, cancel)?;
        progress(&ImportProgress {
            path: active.clone(),
            stage: ImportStage::Active,
            hands,
            summary,
            file_index: file_count,
            file_count,
        });
        Ok(Some(active))
    }

    /// Re-import `path` from byte 0 and make it the active file.
    pub fn change_log_file(&self, path: &Path, cancel: &CancelToken) -> Result<(), ImportError> {
        self.activate(path, false, cancel)?;
        Ok(())
    }

    /// Import `path` in the background without touching the active file.
    pub fn import_file(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<UpsertSummary, ImportError> {
        let mut parser = HandParser::new(self.config.clone());
        parse_file(path, &mut parser, cancel)?;
        parser.flush();
        let cursor = cursor_for(path, &parser)?;
        Ok(self.persist(path, parser.hands(), &cursor)?)
    }

    /// Append tailed lines of the active file.
    ///
    /// `lines` are the complete lines read from `[start, end)`, without their
    /// `\n`. Calls for any other path are ignored. The batch is parsed on a
    /// copy of the live parser and published only once it is persisted.
    pub fn import_lines(
        &self,
        path: &Path,
        lines: &[String],
        start: u64,
        end: u64,
        cancel: &CancelToken,
    ) -> Result<(), ImportError> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        let (mut parser, generation) = {
            let state = self.state.read();
            if state.active_path.as_deref() != Some(path) {
                trace!("ignoring tail of inactive {}", path.display());
                return Ok(());
            }
            (state.parser.clone(), state.generation)
        };
        if end <= parser.next_offset().byte {
            return Ok(());
        }

        let before = parser.hand_count();
        let mut offset = start;
        for line in lines {
            cancel.check()?;
            let line_end = offset + line.len() as u64 + 1;
            let next = parser.next_offset().byte;
            if line_end <= next {
                // already consumed
            } else if offset < next {
                parser.skip_to(line_end);
            } else {
                parser.skip_to(offset);
                if let Err(e) = parser.parse_line(line) {
                    trace!("{}:{}: {e}", path.display(), parser.next_offset().line - 1);
                }
            }
            offset = line_end;
        }
        if parser.next_offset().byte != end {
            debug!(
                "tail of {} ended at byte {}, expected {end}",
                path.display(),
                parser.next_offset().byte
            );
            parser.skip_to(end);
        }

        cancel.check()?;
        let cursor = cursor_for(path, &parser)?;
        let fresh = &parser.hands()[before..];
        self.persist(path, fresh, &cursor)?;

        let mut state = self.state.write();
        if state.generation != generation || state.active_path.as_deref() != Some(path) {
            debug!("tail batch for {} superseded", path.display());
            return Ok(());
        }
        state.local_seat = observed_seat(&parser).or(state.local_seat);
        state.parser = parser;
        state.generation += 1;
        Ok(())
    }

    /// Byte offset a tailer should read from next.
    pub fn next_offset(&self, path: &Path) -> Result<u64, ImportError> {
        {
            let state = self.state.read();
            if state.active_path.as_deref() == Some(path) {
                return Ok(state.parser.next_offset().byte);
            }
        }
        Ok(self
            .store
            .get_cursor(path)?
            .map_or(0, |cursor| cursor.next_byte_offset))
    }

    /// Record that `path` will never grow again. Failures are logged only.
    pub fn mark_log_fully_imported(&self, path: &Path) {
        let result = self.store.get_cursor(path).and_then(|cursor| match cursor {
            Some(mut cursor) => {
                cursor.is_fully_imported = true;
                self.store.save_cursor(&cursor)
            }
            None => {
                debug!("{} has no cursor to mark", path.display());
                Ok(())
            }
        });
        if let Err(e) = result {
            warn!("failed to mark {} fully imported: {e}", path.display());
        }
    }

    pub fn snapshot(&self) -> ImportSnapshot {
        let state = self.state.read();
        let next = state.parser.next_offset();
        ImportSnapshot {
            active_path: state.active_path.clone(),
            hand_count: state.parser.hand_count(),
            local_seat: state.local_seat,
            world: state.parser.world_context().clone(),
            next_byte_offset: next.byte,
            next_line: next.line,
            last_event_at: state.parser.last_event_at(),
            has_open_hand: state.parser.has_open_hand(),
            malformed_lines: state.parser.malformed_count(),
            discarded_hands: state.parser.discarded_count(),
        }
    }

    /// Statistics for the local player of the active file.
    pub fn stats(&self, filter: StatsFilter) -> Result<HandStats, ImportError> {
        let seat = self.state.read().local_seat;
        let store = self.store.as_ref();
        let stats = if filter.is_all_time() {
            self.aggregator.all_time(store, seat)?
        } else {
            self.aggregator.period(store, filter.from, filter.to, seat)?
        };
        Ok(stats)
    }

    /// The aggregator behind [`Importer::stats`].
    pub fn aggregator(&self) -> &StatsAggregator {
        &self.aggregator
    }

    pub fn list_hand_summaries(
        &self,
        filter: &HandFilter,
    ) -> Result<Vec<HandSummary>, ImportError> {
        let hands = self.store.list_hands(filter)?;
        Ok(hands.iter().map(Hand::summary).collect())
    }

    pub fn get_hand_by_uid(&self, uid: &HandUid) -> Result<Option<Hand>, ImportError> {
        Ok(self.store.get_hand(uid)?)
    }

    fn parse_historical(
        &self,
        paths: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<Vec<(PathBuf, Result<HandParser, ImportError>)>, ImportError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let workers = available.min(self.max_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("handfold-parse-{i}"))
            .build()
            .map_err(|e| ImportError::Pool(e.to_string()))?;
        debug!("parsing {} historical files on {workers} workers", paths.len());

        let config = &self.config;
        Ok(pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let mut parser = HandParser::new(config.clone());
                    let result = parse_file(path, &mut parser, cancel).map(|()| {
                        parser.flush();
                        parser
                    });
                    (path.clone(), result)
                })
                .collect()
        }))
    }

    /// Parse `path` and publish it as the active file. With `resume`, a
    /// valid stored cursor lets the parse start where the last run stopped.
    fn activate(
        &self,
        path: &Path,
        resume: bool,
        cancel: &CancelToken,
    ) -> Result<(usize, UpsertSummary), ImportError> {
        let mut parser = HandParser::new(self.config.clone());
        if resume {
            if let Some(cursor) = self.store.get_cursor(path)? {
                resume_from(&mut parser, path, &cursor)?;
            }
        }
        parse_file(path, &mut parser, cancel)?;
        cancel.check()?;

        let cursor = cursor_for(path, &parser)?;
        let summary = self.persist(path, parser.hands(), &cursor)?;
        info!(
            "active log {}: {} hands ({} new)",
            path.display(),
            parser.hand_count(),
            summary.inserted
        );
        let hands = parser.hand_count();

        let mut state = self.state.write();
        state.active_path = Some(path.to_path_buf());
        state.local_seat = observed_seat(&parser);
        state.parser = parser;
        state.generation += 1;
        Ok((hands, summary))
    }

    fn persist(
        &self,
        path: &Path,
        hands: &[ParsedHand],
        cursor: &ImportCursor,
    ) -> Result<UpsertSummary, StoreError> {
        let records: Vec<HandRecord> = hands
            .iter()
            .map(|parsed| HandRecord {
                hand: Some(parsed.hand.clone()),
                source: HandSourceRef {
                    path: path.to_path_buf(),
                    span: parsed.span,
                },
            })
            .collect();
        if self.store.capabilities().supports_atomic_batch {
            self.store.save_import_batch(&records, cursor)
        } else {
            let summary = self.store.upsert_hands(&records)?;
            self.store.save_cursor(cursor)?;
            Ok(summary)
        }
    }
}

/// The seat to build statistics for: the current one, else the last one a
/// hand recorded.
fn observed_seat(parser: &HandParser) -> Option<Seat> {
    parser
        .local_seat()
        .or_else(|| parser.hands().iter().rev().find_map(|p| p.hand.local_seat))
}

/// Read every complete line of `path` from the parser's position.
fn parse_file(path: &Path, parser: &mut HandParser, cancel: &CancelToken) -> Result<(), ImportError> {
    let start = parser.next_offset().byte;
    let (lines, _) = SourceLines::open_at(path, start).map_err(|source| ImportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    for line in lines {
        cancel.check()?;
        let line = line.map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(e) = parser.parse_bytes(&line.bytes) {
            trace!("{}:{}: {e}", path.display(), parser.next_offset().line - 1);
        }
    }
    Ok(())
}

/// Position `parser` at the stored cursor if it still matches the file.
fn resume_from(
    parser: &mut HandParser,
    path: &Path,
    cursor: &ImportCursor,
) -> Result<(), ImportError> {
    let offset = cursor.next_byte_offset;
    if offset == 0 {
        return Ok(());
    }
    let read_err = |source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    };
    let len = std::fs::metadata(path).map_err(read_err)?.len();
    if offset > len {
        warn!(
            "{} is shorter than its cursor ({len} < {offset}), re-reading from the start",
            path.display()
        );
        return Ok(());
    }
    let actual = read_line_hash_before(path, offset).map_err(read_err)?;
    if actual.is_none() || actual != cursor.line_hash {
        warn!(
            "{} changed before byte {offset}, re-reading from the start",
            path.display()
        );
        return Ok(());
    }
    debug!("resuming {} at byte {offset} line {}", path.display(), cursor.next_line);
    parser.resume(offset, cursor.next_line, cursor.world_context().unwrap_or_default());
    Ok(())
}

/// Cursor for the parser's resume point in `path`.
fn cursor_for(path: &Path, parser: &HandParser) -> Result<ImportCursor, ImportError> {
    let resume = parser.resume_point();
    let line_hash = read_line_hash_before(path, resume.byte).map_err(|source| {
        ImportError::Read {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let world = resume.world.to_snapshot().map_err(StoreError::from)?;
    Ok(ImportCursor {
        source_path: path.to_path_buf(),
        next_byte_offset: resume.byte,
        next_line: resume.line,
        last_event_at: parser.last_event_at(),
        last_hand_uid: parser.hands().last().map(|p| p.hand.uid.clone()),
        world,
        line_hash,
        is_fully_imported: false,
    })
}
