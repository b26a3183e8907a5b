//! Streaming hand reconstruction.
//!
//! [`HandParser`] consumes one line at a time and keeps three pieces of
//! state: the [`WorldContext`] (which world and instance the lines belong
//! to), at most one open hand, and the list of hands it has emitted. A hand
//! opens on the new-hand marker and is emitted, complete and classified,
//! once its pot is awarded. A hand that never resolves is never emitted.
//!
//! A pot may be split over several consecutive award lines. The hand closes
//! as soon as the awards cover every chip put in; otherwise it keeps
//! collecting awards until the next other line, or until [`HandParser::flush`]
//! marks the end of the input.
//!
//! The parser also counts bytes and lines so every emitted hand knows its
//! exact [`SourceSpan`], and so it can report a [`ResumePoint`] from which a
//! later parse continues without losing an in-progress hand.

use crate::action::{Action, ActionKind, Position, Seat, Street};
use crate::card::Card;
use crate::classify::classify;
use crate::context::WorldContext;
use crate::hand::{Anomaly, AnomalyCode, Hand, HandUid, PlayerHandInfo, SourceSpan, WinType};
use crate::line::{LineError, LogLine, Message};
use chrono::NaiveDateTime;
use log::{debug, trace};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserConfig {
    /// World ids that host the poker table. Empty means every world.
    pub target_worlds: Vec<String>,
}

/// Byte offset and 1-based number of the next line to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub byte: u64,
    pub line: u64,
}

impl Default for Offset {
    fn default() -> Self {
        Offset { byte: 0, line: 1 }
    }
}

/// A completed hand and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHand {
    pub hand: Hand,
    pub span: SourceSpan,
}

/// Where a later parse should pick up, with the context valid at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub byte: u64,
    pub line: u64,
    pub world: WorldContext,
}

#[derive(Debug, Clone)]
struct OpenHand {
    hand: Hand,
    start: Offset,
    world_at_open: WorldContext,
    street: Street,
    showdown: bool,
    local_hole: Option<Vec<Card>>,
    awards: Vec<(Seat, u64)>,
    resolution: Option<Resolution>,
}

/// The last award line seen for a hand.
#[derive(Debug, Clone, Copy)]
struct Resolution {
    at: NaiveDateTime,
    line: u64,
    /// Byte just past the award line.
    end: u64,
}

/// Line-at-a-time hand parser.
///
/// Cloning produces a fully independent parser, which is how speculative
/// work on tailed lines stays away from the authoritative instance.
#[derive(Debug, Clone)]
pub struct HandParser {
    config: ParserConfig,
    world: WorldContext,
    open: Option<OpenHand>,
    hands: Vec<ParsedHand>,
    next: Offset,
    last_event_at: Option<NaiveDateTime>,
    malformed: u64,
    discarded: u64,
}

impl Default for HandParser {
    fn default() -> Self {
        HandParser::new(ParserConfig::default())
    }
}

impl HandParser {
    pub fn new(config: ParserConfig) -> Self {
        HandParser {
            config,
            world: WorldContext::default(),
            open: None,
            hands: Vec::new(),
            next: Offset::default(),
            last_event_at: None,
            malformed: 0,
            discarded: 0,
        }
    }

    /// Position the parser at `byte`/`line` of a file with a restored
    /// context. Any open hand is dropped.
    pub fn resume(&mut self, byte: u64, line: u64, world: WorldContext) {
        self.open = None;
        self.next = Offset { byte, line };
        self.world = world;
    }

    /// Jump forward to `byte` without reading the skipped bytes. An open
    /// hand cannot survive the gap and is dropped.
    pub fn skip_to(&mut self, byte: u64) {
        if byte == self.next.byte {
            return;
        }
        self.close_resolving();
        if self.open.take().is_some() {
            self.discarded += 1;
        }
        debug!("parser skipping from byte {} to {}", self.next.byte, byte);
        self.next.byte = byte;
    }

    /// Parse one line given without its `\n` terminator.
    ///
    /// Malformed lines return an error and leave the parser consistent;
    /// callers log and carry on.
    ///
    /// # Examples
    ///
    /// ```
    /// use handfold::HandParser;
    ///
    /// let mut parser = HandParser::default();
    /// for line in [
    ///     "2024.05.01 21:00:00 Log        -  Preparing for New Game",
    ///     "2024.05.01 21:00:01 Log        -  [Table] Player 0 Post SB 10",
    ///     "2024.05.01 21:00:02 Log        -  [Table] Player 1 Post BB 20",
    ///     "2024.05.01 21:00:03 Log        -  [Table] Player 0 Fold",
    ///     "2024.05.01 21:00:04 Log        -  [Table] Player 1 Won 30",
    /// ] {
    ///     parser.parse_line(line).unwrap();
    /// }
    /// assert_eq!(parser.hand_count(), 1);
    /// assert_eq!(parser.hands()[0].hand.total_pot, 30);
    /// assert!(parser.parse_line("not a log line").is_err());
    /// ```
    pub fn parse_line(&mut self, line: &str) -> Result<(), LineError> {
        self.consume(line, line.len() as u64 + 1)
    }

    /// Parse one raw line including its terminator, as read from disk.
    /// Offsets advance by exactly `raw.len()`.
    pub fn parse_bytes(&mut self, raw: &[u8]) -> Result<(), LineError> {
        let text = String::from_utf8_lossy(raw);
        self.consume(&text, raw.len() as u64)
    }

    fn consume(&mut self, line: &str, len: u64) -> Result<(), LineError> {
        let start = self.next;
        self.next = Offset {
            byte: start.byte + len,
            line: start.line + 1,
        };

        let message = LogLine::parse(line).and_then(|entry| {
            Message::classify(entry.message).map(|message| (entry.at, message))
        });
        match message {
            Ok((at, message)) => {
                self.last_event_at = Some(at);
                self.apply(at, message, start);
                Ok(())
            }
            Err(e) => {
                self.malformed += 1;
                Err(e)
            }
        }
    }

    fn apply(&mut self, at: NaiveDateTime, message: Message<'_>, start: Offset) {
        if !matches!(message, Message::Won { .. }) {
            self.close_resolving();
        }
        match message {
            Message::NewHand => self.open_hand(at, start),
            Message::JoinWorld { world_id, instance } => {
                self.drop_open("world join");
                self.world
                    .join(world_id, instance, &self.config.target_worlds);
            }
            Message::RoomName(name) => self.world.set_world_name(name),
            Message::UserJoined { name, user_id } => self.world.user_joined(name, user_id),
            Message::UserLeft { name, user_id } => self.world.user_left(name, user_id),
            Message::LeftRoom => {
                self.drop_open("left room");
                self.world.leave();
            }
            Message::LocalSeat(seat) => {
                self.world.local_seat = Some(seat);
                if let Some(open) = self.open.as_mut() {
                    open.hand.local_seat = Some(seat);
                }
            }
            Message::Won { seat, amount } => match self.open.as_mut() {
                Some(open) => {
                    open.awards.push((seat, amount));
                    open.resolution = Some(Resolution {
                        at,
                        line: start.line,
                        end: self.next.byte,
                    });
                    if open.awards_cover_pot() {
                        self.close_resolving();
                    }
                }
                None => trace!("pot award at line {} with no open hand", start.line),
            },
            Message::Other => {}
            event => match self.open.as_mut() {
                Some(open) => open.observe(at, event),
                None => trace!("table event at line {} outside a hand", start.line),
            },
        }
    }

    fn open_hand(&mut self, at: NaiveDateTime, start: Offset) {
        if !self.world.in_poker_world {
            trace!("new-hand marker at line {} outside the poker world", start.line);
            return;
        }
        let mut hand = Hand::new(at);
        if let Some(prev) = self.open.take() {
            self.discarded += 1;
            debug!(
                "hand opened at line {} replaced at line {} before resolving",
                prev.start.line, start.line
            );
            hand.anomalies.push(Anomaly::new(
                AnomalyCode::UnresolvedPredecessor,
                format!(
                    "hand opened at line {} had no pot resolution",
                    prev.start.line
                ),
            ));
        }
        hand.world_id = self.world.world_id.clone();
        hand.world_name = self.world.world_name.clone();
        hand.instance = self.world.instance.clone();
        hand.local_seat = self.world.local_seat;
        self.open = Some(OpenHand {
            hand,
            start,
            world_at_open: self.world.clone(),
            street: Street::Preflop,
            showdown: false,
            local_hole: None,
            awards: Vec::new(),
            resolution: None,
        });
    }

    /// Emit the open hand if at least one award line has been seen for it.
    fn close_resolving(&mut self) {
        let Some(open) = self.open.take_if(|open| open.resolution.is_some()) else {
            return;
        };
        if let Some(parsed) = open.finish() {
            debug!(
                "hand {} closed at line {}: pot {} to seat {:?}",
                parsed.hand.uid, parsed.span.end_line, parsed.hand.total_pot, parsed.hand.winner_seat
            );
            self.hands.push(parsed);
        }
    }

    /// Mark the end of the input: a hand whose awards fell short of the
    /// chips put in is emitted as it stands. A hand with no award stays open.
    pub fn flush(&mut self) {
        self.close_resolving();
    }

    fn drop_open(&mut self, why: &str) {
        if let Some(open) = self.open.take() {
            self.discarded += 1;
            debug!("dropping hand opened at line {}: {why}", open.start.line);
        }
    }

    /// Number of hands emitted so far.
    pub fn hand_count(&self) -> usize {
        self.hands.len()
    }

    /// All emitted hands in emission order.
    pub fn hands(&self) -> &[ParsedHand] {
        &self.hands
    }

    /// Consume the parser, keeping only the emitted hands.
    pub fn into_hands(self) -> Vec<ParsedHand> {
        self.hands
    }

    pub fn world_context(&self) -> &WorldContext {
        &self.world
    }

    pub fn restore_world_context(&mut self, world: WorldContext) {
        self.world = world;
    }

    pub fn local_seat(&self) -> Option<Seat> {
        self.world.local_seat
    }

    pub fn next_offset(&self) -> Offset {
        self.next
    }

    pub fn last_event_at(&self) -> Option<NaiveDateTime> {
        self.last_event_at
    }

    pub fn has_open_hand(&self) -> bool {
        self.open.is_some()
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Hands opened but never emitted.
    pub fn discarded_count(&self) -> u64 {
        self.discarded
    }

    /// The earliest point a resumed parse must start from: the open hand's
    /// marker line if a hand is in progress, otherwise the next unread line.
    pub fn resume_point(&self) -> ResumePoint {
        match &self.open {
            Some(open) => ResumePoint {
                byte: open.start.byte,
                line: open.start.line,
                world: open.world_at_open.clone(),
            },
            None => ResumePoint {
                byte: self.next.byte,
                line: self.next.line,
                world: self.world.clone(),
            },
        }
    }
}

impl OpenHand {
    fn player(&mut self, seat: Seat) -> &mut PlayerHandInfo {
        self.hand
            .players
            .entry(seat)
            .or_insert_with(|| PlayerHandInfo::new(seat))
    }

    fn observe(&mut self, at: NaiveDateTime, event: Message<'_>) {
        match event {
            Message::Stack { seat, chips } => self.player(seat).stack = Some(chips),
            Message::Act { seat, kind, amount } => {
                let street = if kind.is_blind() {
                    Street::Preflop
                } else {
                    self.street
                };
                match kind {
                    ActionKind::SmallBlind if self.hand.sb_seat.is_none() => {
                        self.hand.sb_seat = Some(seat)
                    }
                    ActionKind::BigBlind if self.hand.bb_seat.is_none() => {
                        self.hand.bb_seat = Some(seat)
                    }
                    _ => {}
                }
                let action = Action {
                    at,
                    seat,
                    street,
                    kind,
                    amount,
                };
                self.player(seat).actions.push(action.clone());
                self.hand.actions.push(action);
            }
            Message::Board { street, cards } => {
                self.street = street;
                if cards.len() == street.n_observed() {
                    self.hand.board = cards;
                } else {
                    self.hand.board.extend(cards);
                }
            }
            Message::HoleCards(cards) => self.local_hole = Some(cards),
            Message::Show { seat, cards } => {
                self.showdown = true;
                let player = self.player(seat);
                player.showdown = true;
                if cards.len() == 2 {
                    player.hole_cards = cards;
                }
            }
            _ => {}
        }
    }

    fn awards_cover_pot(&self) -> bool {
        let awarded: u64 = self.awards.iter().map(|&(_, amount)| amount).sum();
        let put_in: u64 = self.hand.actions.iter().map(|a| a.amount).sum();
        awarded >= put_in
    }

    /// The finished hand and its span, or `None` before any award.
    fn finish(mut self) -> Option<ParsedHand> {
        let resolution = self.resolution?;
        if let (Some(seat), Some(cards)) = (self.hand.local_seat, self.local_hole.take()) {
            self.player(seat).hole_cards = cards;
        }
        let mut total_pot = 0;
        for (seat, amount) in std::mem::take(&mut self.awards) {
            let player = self.player(seat);
            player.won = true;
            player.chips_won += amount;
            total_pot += amount;
        }
        // largest share, lowest seat on a tie
        let winner = self
            .hand
            .players
            .values()
            .filter(|p| p.won)
            .max_by(|a, b| a.chips_won.cmp(&b.chips_won).then(b.seat.cmp(&a.seat)))
            .map(|p| p.seat);
        let span = SourceSpan {
            start_byte: self.start.byte,
            end_byte: resolution.end,
            start_line: self.start.line,
            end_line: resolution.line,
        };

        let mut hand = self.hand;
        hand.ended_at = Some(resolution.at);
        hand.winner_seat = winner;
        hand.total_pot = total_pot;
        hand.win_type = Some(if self.showdown {
            WinType::Showdown
        } else {
            WinType::Fold
        });
        hand.player_count = hand.players.len();
        assign_positions(&mut hand);
        hand.anomalies.extend(validate(&hand));
        hand.is_complete = true;
        hand.stats_eligible = hand.is_clean();
        hand.uid = HandUid::of(&hand);
        Some(ParsedHand {
            hand: classify(hand),
            span,
        })
    }
}

/// Positions follow seat order starting at the small blind. Without any
/// blind the positions stay unknown.
fn assign_positions(hand: &mut Hand) {
    let seats: Vec<Seat> = hand.players.keys().copied().collect();
    let start = match (hand.sb_seat, hand.bb_seat) {
        (Some(sb), _) => seats.iter().position(|&s| s == sb),
        (None, Some(bb)) => seats
            .iter()
            .position(|&s| s == bb)
            .map(|i| (i + seats.len() - 1) % seats.len()),
        (None, None) => None,
    };
    let Some(start) = start else {
        return;
    };
    let layout = Position::layout(seats.len());
    for (i, position) in layout.into_iter().enumerate() {
        let seat = seats[(start + i) % seats.len()];
        if let Some(player) = hand.players.get_mut(&seat) {
            player.position = position;
        }
    }
}

fn validate(hand: &Hand) -> Vec<Anomaly> {
    let mut found = Vec::new();
    if hand.sb_seat.is_none() {
        found.push(Anomaly::new(
            AnomalyCode::MissingSmallBlind,
            "no small blind posting",
        ));
    }
    if hand.bb_seat.is_none() {
        found.push(Anomaly::new(
            AnomalyCode::MissingBigBlind,
            "no big blind posting",
        ));
    }
    if let Some(hero) = hand.local_player() {
        if hero.hole_cards.len() != 2 {
            found.push(Anomaly::new(
                AnomalyCode::MissingHoleCards,
                format!("local seat {} has no hole cards", hero.seat),
            ));
        }
    }
    for player in hand.players.values() {
        if let Some(stack) = player.stack {
            let put_in = player.contributed();
            if put_in > stack {
                found.push(Anomaly::new(
                    AnomalyCode::AmountExceedsStack,
                    format!("seat {} put in {put_in} with a stack of {stack}", player.seat),
                ));
            }
        }
    }
    let contributed: u64 = hand.actions.iter().map(|a| a.amount).sum();
    if contributed != hand.total_pot {
        found.push(Anomaly::new(
            AnomalyCode::PotMismatch,
            format!(
                "actions put in {contributed} but the pot awarded {}",
                hand.total_pot
            ),
        ));
    }
    found
}
