//! In-process [`HandStore`](crate::HandStore).

use crate::action::Seat;
use crate::error::StoreError;
use crate::hand::{Hand, HandRecord, HandUid};
use crate::store::{HandFilter, HandStore, ImportCursor, StoreIndex, UpsertSummary};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::path::Path;

/// Ephemeral store. Everything is lost when it is dropped.
///
/// Hands and cursors are written in two steps, so it advertises no atomic
/// batch support.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<StoreIndex>,
}

impl MemoryStore {
    /// An empty store.
    ///
    /// # Examples
    ///
    /// ```
    /// use handfold::{HandStore, MemoryStore};
    ///
    /// let store = MemoryStore::new();
    /// assert!(store.is_empty());
    /// assert!(!store.capabilities().supports_atomic_batch);
    /// ```
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of stored hands.
    pub fn len(&self) -> usize {
        self.index.read().hand_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HandStore for MemoryStore {
    fn upsert_hands(&self, batch: &[HandRecord]) -> Result<UpsertSummary, StoreError> {
        Ok(self.index.write().upsert(batch))
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
        self.index.write().save_cursor(cursor);
        Ok(())
    }
}
