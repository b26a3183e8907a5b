//! Persistence contract for hands and import cursors.
//!
//! Two implementations share one in-memory index: [`MemoryStore`] keeps
//! nothing on disk, [`JournalStore`] replays a write-ahead journal into the
//! same index on open.
//!
//! [`MemoryStore`]: crate::MemoryStore
//! [`JournalStore`]: crate::JournalStore

use crate::action::Seat;
use crate::context::WorldContext;
use crate::error::StoreError;
use crate::hand::{Hand, HandRecord, HandSourceRef, HandUid};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

/// Per-file resumption record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCursor {
    pub source_path: PathBuf,
    pub next_byte_offset: u64,
    pub next_line: u64,
    #[serde(default)]
    pub last_event_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_hand_uid: Option<HandUid>,
    /// Encoded [`WorldContext`] valid at `next_byte_offset`.
    pub world: String,
    /// Hash of the line ending at `next_byte_offset`, checked before resuming
    /// so a replaced or truncated file is re-read from the start.
    #[serde(default)]
    pub line_hash: Option<String>,
    pub is_fully_imported: bool,
}

impl ImportCursor {
    /// A cursor at the start of `path` with a fresh context.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ImportCursor {
            source_path: path.into(),
            next_byte_offset: 0,
            next_line: 1,
            last_event_at: None,
            last_hand_uid: None,
            world: String::new(),
            line_hash: None,
            is_fully_imported: false,
        }
    }

    /// Decode the stored context. An empty or unreadable snapshot yields
    /// `None` and the caller starts from a fresh context.
    pub fn world_context(&self) -> Option<WorldContext> {
        if self.world.is_empty() {
            return None;
        }
        WorldContext::from_snapshot(&self.world).ok()
    }
}

/// Counts returned by an upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl AddAssign for UpsertSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
    }
}

/// Which hands a filter accepts by local-player seat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SeatFilter {
    #[default]
    Any,
    /// The local player was seated.
    Participating,
    /// The local seat equals this value, `None` included.
    Is(Option<Seat>),
}

impl SeatFilter {
    fn accepts(self, hand: &Hand) -> bool {
        match self {
            SeatFilter::Any => true,
            SeatFilter::Participating => hand.local_seat.is_some(),
            SeatFilter::Is(seat) => hand.local_seat == seat,
        }
    }
}

/// Hand query. Time bounds are inclusive and apply to the start time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandFilter {
    pub complete: Option<bool>,
    pub eligible: Option<bool>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    pub local_seat: SeatFilter,
    pub limit: Option<usize>,
}

impl HandFilter {
    pub fn matches(&self, hand: &Hand) -> bool {
        self.complete.is_none_or(|c| hand.is_complete == c)
            && self.eligible.is_none_or(|e| hand.stats_eligible == e)
            && self.from.is_none_or(|from| hand.started_at >= from)
            && self.to.is_none_or(|to| hand.started_at <= to)
            && self.local_seat.accepts(hand)
    }

    /// Complete, stats-eligible hands for one local seat.
    pub fn eligible_for(local_seat: Option<Seat>) -> Self {
        HandFilter {
            complete: Some(true),
            eligible: Some(true),
            local_seat: SeatFilter::Is(local_seat),
            ..HandFilter::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// `save_import_batch` writes hands and cursor as one unit.
    pub supports_atomic_batch: bool,
}

/// Storage for hands and import cursors.
///
/// Upserts are idempotent per source span: once a span has an identity, any
/// later hand from that span is stored under the same identity, even if its
/// own content hash differs. A hand whose content hash already belongs to
/// another span is stored under a span-derived identity instead, so two
/// identical hands stay two rows.
pub trait HandStore: Send + Sync {
    fn upsert_hands(&self, batch: &[HandRecord]) -> Result<UpsertSummary, StoreError>;

    /// Matching hands ordered by start time.
    fn list_hands(&self, filter: &HandFilter) -> Result<Vec<Hand>, StoreError>;

    fn count_hands(&self, filter: &HandFilter) -> Result<usize, StoreError>;

    /// Complete, stats-eligible hands for `local_seat` that started strictly
    /// after `watermark`, oldest first.
    fn list_hands_after(
        &self,
        watermark: Option<NaiveDateTime>,
        local_seat: Option<Seat>,
    ) -> Result<Vec<Hand>, StoreError>;

    fn get_hand(&self, uid: &HandUid) -> Result<Option<Hand>, StoreError>;

    fn get_cursor(&self, path: &Path) -> Result<Option<ImportCursor>, StoreError>;

    fn save_cursor(&self, cursor: &ImportCursor) -> Result<(), StoreError>;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }

    /// Upsert `batch` and save `cursor`. The default runs the two writes in
    /// sequence; stores that advertise `supports_atomic_batch` make them a
    /// single unit.
    fn save_import_batch(
        &self,
        batch: &[HandRecord],
        cursor: &ImportCursor,
    ) -> Result<UpsertSummary, StoreError> {
        let summary = self.upsert_hands(batch)?;
        self.save_cursor(cursor)?;
        Ok(summary)
    }
}

/// Shared in-memory state behind both store implementations.
#[derive(Debug, Default)]
pub(crate) struct StoreIndex {
    hands: HashMap<HandUid, Hand>,
    spans: HashMap<HandSourceRef, HandUid>,
    owners: HashMap<HandUid, HandSourceRef>,
    cursors: HashMap<PathBuf, ImportCursor>,
}

impl StoreIndex {
    pub(crate) fn upsert(&mut self, batch: &[HandRecord]) -> UpsertSummary {
        let mut summary = UpsertSummary::default();
        for record in batch {
            let Some(hand) = &record.hand else {
                summary.skipped += 1;
                continue;
            };
            let uid = match self.spans.get(&record.source) {
                Some(existing) => existing.clone(),
                None => self.unclaimed_uid(&hand.uid, &record.source),
            };
            let mut hand = hand.clone();
            hand.uid = uid.clone();
            if self.hands.insert(uid.clone(), hand).is_some() {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
            self.spans.insert(record.source.clone(), uid.clone());
            self.owners.insert(uid, record.source.clone());
        }
        summary
    }

    /// `uid`, unless a hand from another span already holds it. Identical
    /// hands played twice are distinct rows.
    fn unclaimed_uid(&self, uid: &HandUid, source: &HandSourceRef) -> HandUid {
        let mut uid = uid.clone();
        while self.owners.get(&uid).is_some_and(|owner| owner != source) {
            uid = uid.for_source(source);
        }
        uid
    }

    /// The fully-imported flag never reverts once set.
    pub(crate) fn save_cursor(&mut self, cursor: &ImportCursor) {
        let mut cursor = cursor.clone();
        if let Some(existing) = self.cursors.get(&cursor.source_path) {
            cursor.is_fully_imported |= existing.is_fully_imported;
        }
        self.cursors.insert(cursor.source_path.clone(), cursor);
    }

    pub(crate) fn list(&self, filter: &HandFilter) -> Vec<Hand> {
        let mut hands: Vec<&Hand> = self.hands.values().filter(|h| filter.matches(h)).collect();
        hands.sort_by(|a, b| (a.started_at, &a.uid).cmp(&(b.started_at, &b.uid)));
        let limit = filter.limit.unwrap_or(usize::MAX);
        hands.into_iter().take(limit).cloned().collect()
    }

    pub(crate) fn count(&self, filter: &HandFilter) -> usize {
        let n = self.hands.values().filter(|h| filter.matches(h)).count();
        filter.limit.map_or(n, |limit| n.min(limit))
    }

    pub(crate) fn after(
        &self,
        watermark: Option<NaiveDateTime>,
        local_seat: Option<Seat>,
    ) -> Vec<Hand> {
        let filter = HandFilter {
            from: watermark,
            ..HandFilter::eligible_for(local_seat)
        };
        let mut hands = self.list(&filter);
        if let Some(mark) = watermark {
            hands.retain(|h| h.started_at > mark);
        }
        hands
    }

    pub(crate) fn get(&self, uid: &HandUid) -> Option<Hand> {
        self.hands.get(uid).cloned()
    }

    pub(crate) fn cursor(&self, path: &Path) -> Option<ImportCursor> {
        self.cursors.get(path).cloned()
    }

    pub(crate) fn hand_count(&self) -> usize {
        self.hands.len()
    }
}
