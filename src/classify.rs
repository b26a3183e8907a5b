//! Statistical flags and hand-range categories for completed hands.
//!
//! [`classify`] is a pure fold over a finished [`Hand`]: it takes the hand by
//! value and returns it with every player's preflop flags and card
//! categories filled in. Missing data never errors; it leaves the category
//! unclassified.

use crate::action::{ActionKind, Seat, Street};
use crate::card::{Card, Rank};
use crate::hand::Hand;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Starting-hand category. Variants are declared in priority order: when a
/// holding fits several categories the earliest one wins.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PocketCategory {
    PremiumPair,
    SecondTierPremium,
    Pair,
    SuitedConnector,
    SuitedOneGapper,
    Suited,
    BroadwayOffsuit,
    Connector,
    AceX,
    KingX,
    Other,
    Unclassified,
}

/// Best five-card holding from two hole cards and five community cards.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MadeHand {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

const PREMIUM_PAIRS: [Rank; 3] = [Rank::Ace, Rank::King, Rank::Queen];
const SECOND_TIER_PAIRS: [Rank; 2] = [Rank::Jack, Rank::Ten];
/// Unpaired second-tier holdings as (high, low, needs suited).
const SECOND_TIER_UNPAIRED: [(Rank, Rank, bool); 2] = [
    (Rank::Ace, Rank::King, false),
    (Rank::Ace, Rank::Queen, true),
];

/// Five-bit rank windows that make a straight, best first. The last entry is
/// the wheel (A-2-3-4-5).
const STRAIGHT_MASKS: [u16; 10] = [
    0b1_1111_0000_0000,
    0b0_1111_1000_0000,
    0b0_0111_1100_0000,
    0b0_0011_1110_0000,
    0b0_0001_1111_0000,
    0b0_0000_1111_1000,
    0b0_0000_0111_1100,
    0b0_0000_0011_1110,
    0b0_0000_0001_1111,
    0b1_0000_0000_1111,
];

pub fn pocket_category(hole: &[Card]) -> PocketCategory {
    let [a, b] = hole else {
        return PocketCategory::Unclassified;
    };
    let (hi, lo) = if a.rank() >= b.rank() { (a, b) } else { (b, a) };
    let suited = hi.suit() == lo.suit();
    let gap = gap(hi.rank(), lo.rank());

    if hi.rank() == lo.rank() {
        return if PREMIUM_PAIRS.contains(&hi.rank()) {
            PocketCategory::PremiumPair
        } else if SECOND_TIER_PAIRS.contains(&hi.rank()) {
            PocketCategory::SecondTierPremium
        } else {
            PocketCategory::Pair
        };
    }
    if SECOND_TIER_UNPAIRED
        .iter()
        .any(|&(h, l, s)| hi.rank() == h && lo.rank() == l && (suited || !s))
    {
        return PocketCategory::SecondTierPremium;
    }
    match (suited, gap) {
        (true, 1) => PocketCategory::SuitedConnector,
        (true, 2) => PocketCategory::SuitedOneGapper,
        (true, _) => PocketCategory::Suited,
        (false, _) if hi.rank().is_broadway() && lo.rank().is_broadway() => {
            PocketCategory::BroadwayOffsuit
        }
        (false, 1) => PocketCategory::Connector,
        _ if hi.rank() == Rank::Ace => PocketCategory::AceX,
        _ if hi.rank() == Rank::King => PocketCategory::KingX,
        _ => PocketCategory::Other,
    }
}

/// Rank distance, with the ace also playing low against a deuce.
fn gap(hi: Rank, lo: Rank) -> u8 {
    let d = u8::from(hi) - u8::from(lo);
    if hi == Rank::Ace {
        d.min(u8::from(lo) + 1)
    } else {
        d
    }
}

/// Evaluate seven cards. Anything other than exactly two hole cards and five
/// community cards is unclassified.
///
/// # Examples
///
/// ```
/// use handfold::{made_hand, pocket_category, Card, MadeHand, PocketCategory};
///
/// let hole = Card::parse_many("As Ac").unwrap();
/// let board = Card::parse_many("Ah Kd 7c 2s 9h").unwrap();
/// assert_eq!(pocket_category(&hole), PocketCategory::PremiumPair);
/// assert_eq!(made_hand(&hole, &board), Some(MadeHand::ThreeOfAKind));
/// assert_eq!(made_hand(&hole, &board[..3]), None);
/// ```
pub fn made_hand(hole: &[Card], board: &[Card]) -> Option<MadeHand> {
    if hole.len() != 2 || board.len() != 5 {
        return None;
    }
    let cards: Vec<Card> = hole.iter().chain(board).copied().collect();

    let mut rank_counts = [0u8; 13];
    let mut suit_masks = [0u16; 4];
    for c in &cards {
        rank_counts[u8::from(c.rank()) as usize] += 1;
        suit_masks[u8::from(c.suit()) as usize] |= 1 << u8::from(c.rank());
    }
    let rank_mask = rank_counts
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 0)
        .fold(0u16, |m, (i, _)| m | 1 << i);

    let flush = suit_masks.iter().find(|m| m.count_ones() >= 5);
    if let Some(&suited) = flush {
        if has_straight(suited) {
            return Some(MadeHand::StraightFlush);
        }
    }
    let quads = rank_counts.iter().filter(|&&n| n == 4).count();
    let trips = rank_counts.iter().filter(|&&n| n == 3).count();
    let pairs = rank_counts.iter().filter(|&&n| n == 2).count();
    if quads > 0 {
        return Some(MadeHand::FourOfAKind);
    }
    if trips >= 2 || (trips == 1 && pairs >= 1) {
        return Some(MadeHand::FullHouse);
    }
    if flush.is_some() {
        return Some(MadeHand::Flush);
    }
    if has_straight(rank_mask) {
        return Some(MadeHand::Straight);
    }
    Some(match (trips, pairs) {
        (1, _) => MadeHand::ThreeOfAKind,
        (_, p) if p >= 2 => MadeHand::TwoPair,
        (_, 1) => MadeHand::OnePair,
        _ => MadeHand::HighCard,
    })
}

fn has_straight(mask: u16) -> bool {
    STRAIGHT_MASKS.iter().any(|&s| mask & s == s)
}

/// Fill in per-player flags and categories on a completed hand.
pub fn classify(mut hand: Hand) -> Hand {
    let flags = preflop_flags(&hand);
    let board = hand.board.clone();
    for (seat, player) in hand.players.iter_mut() {
        let f = flags.get(seat).copied().unwrap_or_default();
        player.vpip = f.vpip;
        player.pfr = f.pfr;
        player.three_bet = f.three_bet;
        player.three_bet_opportunity = f.three_bet_opportunity;
        player.fold_to_three_bet = f.fold_to_three_bet;
        player.faced_three_bet = f.faced_three_bet;
        player.folded_preflop = f.folded;
        player.pocket = Some(pocket_category(&player.hole_cards));
        player.made_hand = made_hand(&player.hole_cards, &board);
    }
    hand
}

#[derive(Debug, Default, Clone, Copy)]
struct PreflopFlags {
    vpip: bool,
    pfr: bool,
    three_bet: bool,
    three_bet_opportunity: bool,
    fold_to_three_bet: bool,
    faced_three_bet: bool,
    folded: bool,
}

/// Walk the preflop actions in log order. A raise is any action that lifts a
/// seat's commitment above the highest commitment so far; all-ins count
/// when they do. The first raiser is the opener, the second raise is the
/// 3-bet, and the opener's next action after it decides fold-to-3-bet.
fn preflop_flags(hand: &Hand) -> HashMap<Seat, PreflopFlags> {
    let mut flags: HashMap<Seat, PreflopFlags> = HashMap::new();
    let mut committed: HashMap<Seat, u64> = HashMap::new();
    let mut high = 0u64;
    let mut raises = 0u32;
    let mut opener: Option<Seat> = None;
    let mut opener_pending = false;

    for action in hand.actions.iter().filter(|a| a.street == Street::Preflop) {
        let seat = action.seat;
        let total = committed.entry(seat).or_default();
        *total += action.amount;
        let total = *total;
        let entry = flags.entry(seat).or_default();

        if action.kind.is_blind() {
            high = high.max(total);
            continue;
        }

        if opener_pending && Some(seat) == opener {
            opener_pending = false;
            entry.faced_three_bet = true;
            entry.fold_to_three_bet = action.kind == ActionKind::Fold;
        }
        if raises == 1 && Some(seat) != opener {
            entry.three_bet_opportunity = true;
        }

        let is_raise = matches!(
            action.kind,
            ActionKind::Raise | ActionKind::Bet | ActionKind::AllIn
        ) && total > high;

        if action.kind.is_voluntary() {
            entry.vpip = true;
        }
        if action.kind == ActionKind::Fold {
            entry.folded = true;
        }
        if is_raise {
            raises += 1;
            entry.pfr = true;
            match raises {
                1 => opener = Some(seat),
                2 => {
                    entry.three_bet = true;
                    opener_pending = opener.is_some();
                }
                _ => {}
            }
        }
        high = high.max(total);
    }
    flags
}
