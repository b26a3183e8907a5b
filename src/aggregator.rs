//! Incremental statistics over the hand store.
//!
//! The all-time view folds only hands newer than its watermark and may be
//! checkpointed to disk. Period views are recomputed on demand and memoised
//! while the number of matching hands stays the same.

use crate::action::Seat;
use crate::error::StoreError;
use crate::snapshot::{self, AggregateSnapshot};
use crate::stats::HandStats;
use crate::store::{HandFilter, HandStore};
use chrono::NaiveDateTime;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Period results kept before the cache is flushed.
pub const PERIOD_CACHE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PeriodKey {
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
    local_seat: Option<Seat>,
    /// A different count means the period's content changed.
    matching: usize,
}

#[derive(Debug, Default)]
struct Running {
    stats: Option<HandStats>,
    watermark: Option<NaiveDateTime>,
    loaded: bool,
}

/// Incremental statistics over a [`HandStore`].
///
/// The all-time view folds only hands newer than its watermark on each
/// query. Period views are recomputed per `(from, to, seat, matching count)`
/// and memoised in a small cache.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    snapshot_path: Option<PathBuf>,
    running: Mutex<Running>,
    periods: Mutex<HashMap<PeriodKey, HandStats>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        StatsAggregator::default()
    }

    /// Persist the all-time aggregate at `path` so a restart resumes from
    /// its watermark.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        StatsAggregator {
            snapshot_path: Some(path.into()),
            ..StatsAggregator::default()
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Start time of the newest hand folded into the all-time view.
    pub fn watermark(&self) -> Option<NaiveDateTime> {
        self.running.lock().watermark
    }

    /// All-time statistics for `local_seat`.
    ///
    /// On first use, a persisted snapshot is loaded and checked against the
    /// store; a snapshot that disagrees is discarded. A change of local seat
    /// discards the aggregate and rebuilds from scratch.
    pub fn all_time(
        &self,
        store: &dyn HandStore,
        local_seat: Option<Seat>,
    ) -> Result<HandStats, StoreError> {
        let mut running = self.running.lock();

        if !running.loaded {
            running.loaded = true;
            if let Some(snap) = self.load_verified(store, local_seat)? {
                running.stats = Some(snap.stats);
                running.watermark = snap.watermark;
            }
        }

        let stale = running
            .stats
            .as_ref()
            .is_none_or(|s| s.local_seat != local_seat);
        if stale {
            if running.stats.is_some() {
                debug!("local seat changed to {local_seat:?}, rebuilding aggregate");
            }
            running.stats = Some(HandStats::new(local_seat));
            running.watermark = None;
        }

        let fresh = store.list_hands_after(running.watermark, local_seat)?;
        let mut stats = running.stats.take().unwrap_or_else(|| HandStats::new(local_seat));
        let mut watermark = running.watermark;
        for hand in &fresh {
            stats = stats.fold(hand);
            watermark = watermark.max(Some(hand.started_at));
        }
        running.stats = Some(stats.clone());
        running.watermark = watermark;

        if !fresh.is_empty() {
            debug!("folded {} new hands, watermark {watermark:?}", fresh.len());
            self.persist(&stats, watermark);
        }
        Ok(stats)
    }

    /// Statistics for hands started within `[from, to]`.
    pub fn period(
        &self,
        store: &dyn HandStore,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
        local_seat: Option<Seat>,
    ) -> Result<HandStats, StoreError> {
        let filter = HandFilter {
            from,
            to,
            ..HandFilter::eligible_for(local_seat)
        };
        let key = PeriodKey {
            from,
            to,
            local_seat,
            matching: store.count_hands(&filter)?,
        };
        if let Some(hit) = self.periods.lock().get(&key) {
            return Ok(hit.clone());
        }

        let stats = store
            .list_hands(&filter)?
            .iter()
            .fold(HandStats::new(local_seat), HandStats::fold);

        let mut periods = self.periods.lock();
        if periods.len() >= PERIOD_CACHE_CAPACITY {
            periods.clear();
        }
        periods.insert(key, stats.clone());
        Ok(stats)
    }

    /// Number of memoised period results.
    pub fn cached_periods(&self) -> usize {
        self.periods.lock().len()
    }

    /// Drop every in-memory and persisted aggregate.
    pub fn reset(&self) {
        let mut running = self.running.lock();
        running.stats = None;
        running.watermark = None;
        running.loaded = true;
        self.periods.lock().clear();
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = snapshot::delete(path) {
                warn!("failed to delete stats snapshot {}: {e}", path.display());
            }
        }
    }

    /// Refold everything for `local_seat`.
    pub fn rebuild(
        &self,
        store: &dyn HandStore,
        local_seat: Option<Seat>,
    ) -> Result<HandStats, StoreError> {
        self.reset();
        self.all_time(store, local_seat)
    }

    fn load_verified(
        &self,
        store: &dyn HandStore,
        local_seat: Option<Seat>,
    ) -> Result<Option<AggregateSnapshot>, StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(None);
        };
        let Some(snap) = snapshot::load(path)? else {
            return Ok(None);
        };
        if snap.stats.local_seat != local_seat {
            return Ok(None);
        }
        let folded = match snap.watermark {
            Some(mark) => store.count_hands(&HandFilter {
                to: Some(mark),
                ..HandFilter::eligible_for(local_seat)
            })?,
            None => 0,
        };
        if folded as u64 != snap.stats.hands {
            warn!(
                "stats snapshot {} covers {} hands but the store has {folded}, rebuilding",
                path.display(),
                snap.stats.hands
            );
            return Ok(None);
        }
        Ok(Some(snap))
    }

    fn persist(&self, stats: &HandStats, watermark: Option<NaiveDateTime>) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let snap = AggregateSnapshot {
            stats: stats.clone(),
            watermark,
        };
        if let Err(e) = snapshot::save(path, &snap) {
            warn!("failed to save stats snapshot {}: {e}", path.display());
        }
    }
}
