//! Aggregate statistics values.
//!
//! [`HandStats`] is a plain value folded one hand at a time; the aggregator
//! decides which hands to fold.

use crate::action::Seat;
use crate::classify::{MadeHand, PocketCategory};
use crate::hand::{Hand, WinType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tally for one starting-hand category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTally {
    pub dealt: u64,
    pub played: u64,
    pub won: u64,
}

/// Local-player statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub hands: u64,
    pub vpip: u64,
    pub pfr: u64,
    pub three_bet: u64,
    pub three_bet_opportunities: u64,
    pub fold_to_three_bet: u64,
    pub faced_three_bet: u64,
    pub folded_preflop: u64,
    pub won: u64,
    pub chips_won: u64,
    pub chips_put_in: u64,
    pub showdowns: u64,
    pub showdowns_won: u64,
    pub pockets: BTreeMap<PocketCategory, CategoryTally>,
    pub made_hands: BTreeMap<MadeHand, u64>,
}

fn pct(n: u64, d: u64) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 * 100.0 / d as f64
    }
}

impl PlayerStats {
    pub fn vpip_pct(&self) -> f64 {
        pct(self.vpip, self.hands)
    }

    pub fn pfr_pct(&self) -> f64 {
        pct(self.pfr, self.hands)
    }

    pub fn three_bet_pct(&self) -> f64 {
        pct(self.three_bet, self.three_bet_opportunities)
    }

    pub fn fold_to_three_bet_pct(&self) -> f64 {
        pct(self.fold_to_three_bet, self.faced_three_bet)
    }

    pub fn win_pct(&self) -> f64 {
        pct(self.won, self.hands)
    }

    /// Chips won minus chips put in.
    pub fn net(&self) -> i64 {
        self.chips_won as i64 - self.chips_put_in as i64
    }
}

/// Aggregate over a set of hands, seen from one local seat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandStats {
    pub local_seat: Option<Seat>,
    pub hands: u64,
    pub total_pot: u64,
    pub won_without_showdown: u64,
    pub won_at_showdown: u64,
    pub hero: PlayerStats,
}

impl HandStats {
    pub fn new(local_seat: Option<Seat>) -> Self {
        HandStats {
            local_seat,
            ..HandStats::default()
        }
    }

    /// Fold one hand in. The local player's numbers come from the seat the
    /// hand itself records.
    pub fn fold(mut self, hand: &Hand) -> Self {
        self.hands += 1;
        self.total_pot += hand.total_pot;
        match hand.win_type {
            Some(WinType::Fold) => self.won_without_showdown += 1,
            Some(WinType::Showdown) => self.won_at_showdown += 1,
            None => {}
        }

        let Some(p) = hand.local_player() else {
            return self;
        };
        let h = &mut self.hero;
        h.hands += 1;
        h.vpip += p.vpip as u64;
        h.pfr += p.pfr as u64;
        h.three_bet += p.three_bet as u64;
        h.three_bet_opportunities += p.three_bet_opportunity as u64;
        h.fold_to_three_bet += p.fold_to_three_bet as u64;
        h.faced_three_bet += p.faced_three_bet as u64;
        h.folded_preflop += p.folded_preflop as u64;
        h.won += p.won as u64;
        h.chips_won += p.chips_won;
        h.chips_put_in += p.contributed();
        if p.showdown {
            h.showdowns += 1;
            h.showdowns_won += p.won as u64;
        }
        let tally = h
            .pockets
            .entry(p.pocket.unwrap_or(PocketCategory::Unclassified))
            .or_default();
        tally.dealt += 1;
        tally.played += p.vpip as u64;
        tally.won += p.won as u64;
        if let Some(made) = p.made_hand {
            *h.made_hands.entry(made).or_default() += 1;
        }
        self
    }
}
