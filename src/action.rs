//! Seats, positions, streets and betting actions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seat index at the table, `0..MAX_SEATS`.
pub type Seat = u8;

pub const MAX_SEATS: Seat = 10;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    /// Community cards visible once this street is dealt.
    pub const fn n_observed(&self) -> usize {
        match self {
            Street::Preflop => 0,
            Street::Flop => 3,
            Street::Turn => 4,
            Street::River => 5,
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Street::Preflop => "preflop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SmallBlind,
    BigBlind,
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
}

impl ActionKind {
    pub fn is_blind(self) -> bool {
        matches!(self, ActionKind::SmallBlind | ActionKind::BigBlind)
    }

    /// Puts chips in the pot by choice.
    pub fn is_voluntary(self) -> bool {
        matches!(
            self,
            ActionKind::Call | ActionKind::Bet | ActionKind::Raise | ActionKind::AllIn
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ActionKind::SmallBlind => "post SB",
            ActionKind::BigBlind => "post BB",
            ActionKind::Fold => "fold",
            ActionKind::Check => "check",
            ActionKind::Call => "call",
            ActionKind::Bet => "bet",
            ActionKind::Raise => "raise",
            ActionKind::AllIn => "all in",
        };
        write!(f, "{s}")
    }
}

/// One observed action. `amount` is the chips this action added to the pot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub at: NaiveDateTime,
    pub seat: Seat,
    pub street: Street,
    pub kind: ActionKind,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    Sb,
    Bb,
    Utg,
    Utg1,
    Mp,
    Hj,
    Co,
    Btn,
    Unknown,
}

impl Position {
    /// Positions for a table of `n` players, in seat order starting at the
    /// small blind. Heads-up the small blind is also the button; tables
    /// larger than eight repeat MP.
    pub fn layout(n: usize) -> Vec<Position> {
        use Position::*;
        let base: &[Position] = match n {
            0 => &[],
            1 => &[Sb],
            2 => &[Sb, Bb],
            3 => &[Sb, Bb, Btn],
            4 => &[Sb, Bb, Utg, Btn],
            5 => &[Sb, Bb, Utg, Co, Btn],
            6 => &[Sb, Bb, Utg, Hj, Co, Btn],
            7 => &[Sb, Bb, Utg, Mp, Hj, Co, Btn],
            _ => &[Sb, Bb, Utg, Utg1, Mp, Hj, Co, Btn],
        };
        let mut out = base.to_vec();
        for _ in base.len()..n {
            out.insert(4, Mp);
        }
        out
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Position::Sb => "SB",
            Position::Bb => "BB",
            Position::Utg => "UTG",
            Position::Utg1 => "UTG+1",
            Position::Mp => "MP",
            Position::Hj => "HJ",
            Position::Co => "CO",
            Position::Btn => "BTN",
            Position::Unknown => "?",
        };
        write!(f, "{s}")
    }
}
