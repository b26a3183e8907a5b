//! The hand record and everything stored alongside it.
//!
//! A [`Hand`] carries a content-derived [`HandUid`]; where it physically came
//! from is a [`HandSourceRef`], which the store uses as the stable key.

use crate::action::{Action, Position, Seat};
use crate::card::Card;
use crate::classify::{MadeHand, PocketCategory};
use crate::context::InstanceInfo;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::path::PathBuf;

/// Content-derived hand identity: hex-encoded xxh64 of the hand's canonical
/// encoding.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandUid(String);

impl HandUid {
    /// Compute the identity of a hand from its content. The `uid` field of
    /// the hand itself is not part of the input.
    pub fn of(hand: &Hand) -> Self {
        let mut canon = String::new();
        let _ = write!(canon, "{}|", hand.started_at.format("%Y-%m-%dT%H:%M:%S"));
        let _ = write!(canon, "{}|", hand.world_id.as_deref().unwrap_or(""));
        let _ = write!(
            canon,
            "{}|",
            hand.instance.as_ref().map(|i| i.id.as_str()).unwrap_or("")
        );
        for a in &hand.actions {
            let _ = write!(canon, "{}:{}:{:?}:{};", a.seat, a.street, a.kind, a.amount);
        }
        canon.push('|');
        for c in &hand.board {
            let _ = write!(canon, "{c}");
        }
        let _ = write!(
            canon,
            "|{}|{}",
            hand.winner_seat.map(|s| s.to_string()).unwrap_or_default(),
            hand.total_pot
        );
        let hash = xxhash_rust::xxh64::xxh64(canon.as_bytes(), 0);
        HandUid(format!("{hash:016x}"))
    }

    /// Identity for a hand whose content hash is already held by a hand
    /// from another span: the content hash rehashed with the span.
    pub fn for_source(&self, source: &HandSourceRef) -> Self {
        let canon = format!(
            "{}|{}|{}|{}",
            self.0,
            source.path.display(),
            source.span.start_byte,
            source.span.end_byte
        );
        let hash = xxhash_rust::xxh64::xxh64(canon.as_bytes(), 0);
        HandUid(format!("{hash:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HandUid {
    fn from(s: &str) -> Self {
        HandUid(s.to_string())
    }
}

impl fmt::Display for HandUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinType {
    Fold,
    Showdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recorded for audit; does not affect stats eligibility.
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCode {
    MissingSmallBlind,
    MissingBigBlind,
    MissingHoleCards,
    AmountExceedsStack,
    PotMismatch,
    UnresolvedPredecessor,
}

impl AnomalyCode {
    pub fn severity(self) -> Severity {
        match self {
            AnomalyCode::UnresolvedPredecessor => Severity::Info,
            AnomalyCode::AmountExceedsStack => Severity::Error,
            AnomalyCode::MissingSmallBlind
            | AnomalyCode::MissingBigBlind
            | AnomalyCode::MissingHoleCards
            | AnomalyCode::PotMismatch => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub code: AnomalyCode,
    pub severity: Severity,
    pub detail: String,
}

impl Anomaly {
    pub fn new(code: AnomalyCode, detail: impl Into<String>) -> Self {
        Anomaly {
            code,
            severity: code.severity(),
            detail: detail.into(),
        }
    }
}

/// One seat's participation in a hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerHandInfo {
    pub seat: Seat,
    pub position: Position,
    /// Chips at hand start, when the table announced them.
    #[serde(default)]
    pub stack: Option<u64>,
    /// Zero or two cards.
    #[serde(default)]
    pub hole_cards: Vec<Card>,
    pub actions: Vec<Action>,
    pub showdown: bool,
    pub won: bool,
    pub chips_won: u64,

    pub vpip: bool,
    pub pfr: bool,
    pub three_bet: bool,
    #[serde(default)]
    pub three_bet_opportunity: bool,
    pub fold_to_three_bet: bool,
    #[serde(default)]
    pub faced_three_bet: bool,
    pub folded_preflop: bool,
    #[serde(default)]
    pub pocket: Option<PocketCategory>,
    #[serde(default)]
    pub made_hand: Option<MadeHand>,
}

impl PlayerHandInfo {
    pub fn new(seat: Seat) -> Self {
        PlayerHandInfo {
            seat,
            position: Position::Unknown,
            stack: None,
            hole_cards: Vec::new(),
            actions: Vec::new(),
            showdown: false,
            won: false,
            chips_won: 0,
            vpip: false,
            pfr: false,
            three_bet: false,
            three_bet_opportunity: false,
            fold_to_three_bet: false,
            faced_three_bet: false,
            folded_preflop: false,
            pocket: None,
            made_hand: None,
        }
    }

    /// Chips this seat put in the pot.
    pub fn contributed(&self) -> u64 {
        self.actions.iter().map(|a| a.amount).sum()
    }
}

/// One poker hand reconstructed from a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    pub uid: HandUid,
    pub started_at: NaiveDateTime,
    #[serde(default)]
    pub ended_at: Option<NaiveDateTime>,
    pub is_complete: bool,
    pub stats_eligible: bool,
    #[serde(default)]
    pub local_seat: Option<Seat>,
    #[serde(default)]
    pub world_id: Option<String>,
    #[serde(default)]
    pub world_name: Option<String>,
    #[serde(default)]
    pub instance: Option<InstanceInfo>,
    #[serde(default)]
    pub sb_seat: Option<Seat>,
    #[serde(default)]
    pub bb_seat: Option<Seat>,
    pub player_count: usize,
    pub total_pot: u64,
    #[serde(default)]
    pub winner_seat: Option<Seat>,
    #[serde(default)]
    pub win_type: Option<WinType>,
    pub board: Vec<Card>,
    /// Every action in the order the log presented it.
    pub actions: Vec<Action>,
    pub players: BTreeMap<Seat, PlayerHandInfo>,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
}

impl Hand {
    /// An open hand starting at `started_at`. Everything else is filled in
    /// as lines arrive.
    pub fn new(started_at: NaiveDateTime) -> Self {
        Hand {
            uid: HandUid(String::new()),
            started_at,
            ended_at: None,
            is_complete: false,
            stats_eligible: false,
            local_seat: None,
            world_id: None,
            world_name: None,
            instance: None,
            sb_seat: None,
            bb_seat: None,
            player_count: 0,
            total_pot: 0,
            winner_seat: None,
            win_type: None,
            board: Vec::new(),
            actions: Vec::new(),
            players: BTreeMap::new(),
            anomalies: Vec::new(),
        }
    }

    pub fn player(&self, seat: Seat) -> Option<&PlayerHandInfo> {
        self.players.get(&seat)
    }

    pub fn local_player(&self) -> Option<&PlayerHandInfo> {
        self.local_seat.and_then(|s| self.players.get(&s))
    }

    pub fn has_anomaly(&self, code: AnomalyCode) -> bool {
        self.anomalies.iter().any(|a| a.code == code)
    }

    /// No anomaly at warning level or above.
    pub fn is_clean(&self) -> bool {
        self.anomalies.iter().all(|a| a.severity < Severity::Warning)
    }

    pub fn summary(&self) -> HandSummary {
        let hero = self.local_player();
        HandSummary {
            uid: self.uid.clone(),
            started_at: self.started_at,
            world_name: self.world_name.clone(),
            local_seat: self.local_seat,
            hole_cards: hero.map(|p| p.hole_cards.clone()).unwrap_or_default(),
            position: hero.map(|p| p.position),
            player_count: self.player_count,
            total_pot: self.total_pot,
            winner_seat: self.winner_seat,
            win_type: self.win_type,
            local_net: hero.map(|p| p.chips_won as i64 - p.contributed() as i64),
            stats_eligible: self.stats_eligible,
            anomaly_count: self.anomalies.len(),
        }
    }
}

/// Compact listing row for history views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandSummary {
    pub uid: HandUid,
    pub started_at: NaiveDateTime,
    pub world_name: Option<String>,
    pub local_seat: Option<Seat>,
    pub hole_cards: Vec<Card>,
    pub position: Option<Position>,
    pub player_count: usize,
    pub total_pot: u64,
    pub winner_seat: Option<Seat>,
    pub win_type: Option<WinType>,
    /// Chips won minus chips put in, for the local player.
    pub local_net: Option<i64>,
    pub stats_eligible: bool,
    pub anomaly_count: usize,
}

/// Byte and line extent of a hand within its source file. Bytes are
/// half-open `[start_byte, end_byte)`, lines are inclusive.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_byte: u64,
    pub end_byte: u64,
    pub start_line: u64,
    pub end_line: u64,
}

/// Where a hand physically came from.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandSourceRef {
    pub path: PathBuf,
    pub span: SourceSpan,
}

/// One item of a persistence batch. A `None` hand is counted as skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandRecord {
    pub hand: Option<Hand>,
    pub source: HandSourceRef,
}
