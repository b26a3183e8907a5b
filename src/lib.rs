//! Incremental hand-history import for VR poker logs.
//!
//! [`HandParser`] turns log lines into [`Hand`] records one line at a time.
//! [`Importer`] drives it over historical and live files, persists hands and
//! resume cursors through a [`HandStore`], and serves statistics folded
//! incrementally by a [`StatsAggregator`].

mod action;
mod aggregator;
mod card;
mod classify;
mod context;
mod error;
mod hand;
mod import;
mod journal;
mod line;
mod locate;
mod memory;
mod parser;
pub mod snapshot;
mod source;
mod stats;
mod store;
mod tail;

pub use action::{Action, ActionKind, Position, Seat, Street, MAX_SEATS};
pub use aggregator::{StatsAggregator, PERIOD_CACHE_CAPACITY};
pub use card::{Card, Rank, Suit};
pub use classify::{classify, made_hand, pocket_category, MadeHand, PocketCategory};
pub use context::{InstanceInfo, InstanceKind, WorldContext};
pub use error::{ImportError, StoreError};
pub use hand::{
    Anomaly, AnomalyCode, Hand, HandRecord, HandSourceRef, HandSummary, HandUid, PlayerHandInfo,
    Severity, SourceSpan, WinType,
};
pub use import::{
    CancelToken, ImportProgress, ImportSnapshot, ImportStage, Importer, ImporterBuilder, Locator,
    StatsFilter,
};
pub use journal::{JournalStore, JournalStoreBuilder, LockMode};
pub use line::{LineError, LogLine, Message, NEW_HAND_MARKER};
pub use locate::{discover_logs, is_log_file_name};
pub use memory::MemoryStore;
pub use parser::{HandParser, Offset, ParsedHand, ParserConfig, ResumePoint};
pub use snapshot::AggregateSnapshot;
pub use source::{line_hash, read_line_hash_before, RawLine, SourceLines};
pub use stats::{CategoryTally, HandStats, PlayerStats};
pub use store::{
    HandFilter, HandStore, ImportCursor, SeatFilter, StoreCapabilities, UpsertSummary,
};
pub use tail::{LogTail, TailBatch, WaitResult};
