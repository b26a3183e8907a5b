//! Line classification.
//!
//! A log line is `YYYY.MM.DD HH:MM:SS <Level> - <message>`. Only the timestamp
//! and the message are structural; everything the parser reacts to is found
//! by substring inside the message, so unrelated chatter interleaved by the
//! application falls through as [`Message::Other`].

use crate::action::{ActionKind, MAX_SEATS, Seat, Street};
use crate::card::Card;
use crate::context::InstanceInfo;
use chrono::NaiveDateTime;
use thiserror::Error;

pub const NEW_HAND_MARKER: &str = "Preparing for New Game";

const TIMESTAMP_LEN: usize = 19;
const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

const JOINING_WORLD: &str = "[Behaviour] Joining wrld_";
const JOINING_ROOM: &str = "[Behaviour] Joining or Creating Room: ";
const ENTERING_ROOM: &str = "[Behaviour] Entering Room: ";
const PLAYER_JOINED: &str = "[Behaviour] OnPlayerJoined ";
const PLAYER_LEFT: &str = "[Behaviour] OnPlayerLeft ";
const LEFT_ROOM: &str = "[Behaviour] OnLeftRoom";
const TABLE: &str = "[Table] ";

/// A line that could not be understood. Always recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("line has no timestamp header")]
    Unstructured,
    #[error("bad seat {0:?}")]
    BadSeat(String),
    #[error("bad amount {0:?}")]
    BadAmount(String),
    #[error("bad cards {0:?}: {1}")]
    BadCards(String, String),
    #[error("incomplete table event {0:?}")]
    Truncated(String),
}

/// Timestamp and message of one structured line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLine<'a> {
    pub at: NaiveDateTime,
    pub message: &'a str,
}

impl<'a> LogLine<'a> {
    pub fn parse(line: &'a str) -> Result<Self, LineError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let stamp = line.get(..TIMESTAMP_LEN).ok_or(LineError::Unstructured)?;
        let at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map_err(|_| LineError::Unstructured)?;
        let rest = &line[TIMESTAMP_LEN..];
        let message = match rest.find(" - ") {
            Some(idx) => rest[idx + 3..].trim(),
            None => rest.trim(),
        };
        Ok(LogLine { at, message })
    }
}

/// What a message means to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    NewHand,
    JoinWorld { world_id: &'a str, instance: InstanceInfo },
    RoomName(&'a str),
    UserJoined { name: &'a str, user_id: Option<&'a str> },
    UserLeft { name: &'a str, user_id: Option<&'a str> },
    LeftRoom,
    LocalSeat(Seat),
    Stack { seat: Seat, chips: u64 },
    Act { seat: Seat, kind: ActionKind, amount: u64 },
    Board { street: Street, cards: Vec<Card> },
    HoleCards(Vec<Card>),
    Show { seat: Seat, cards: Vec<Card> },
    Won { seat: Seat, amount: u64 },
    Other,
}

impl<'a> Message<'a> {
    pub fn classify(message: &'a str) -> Result<Self, LineError> {
        if message.contains(NEW_HAND_MARKER) {
            return Ok(Message::NewHand);
        }
        if let Some(rest) = after(message, TABLE) {
            return table_event(rest);
        }
        if let Some(rest) = after(message, JOINING_WORLD) {
            let (world, instance) = rest.split_once(':').unwrap_or((rest, ""));
            // the id keeps its `wrld_` prefix
            let start = message.len() - rest.len() - "wrld_".len();
            let world_id = &message[start..start + "wrld_".len() + world.len()];
            return Ok(Message::JoinWorld {
                world_id,
                instance: InstanceInfo::parse(instance.trim()),
            });
        }
        if let Some(name) = after(message, JOINING_ROOM).or_else(|| after(message, ENTERING_ROOM)) {
            return Ok(Message::RoomName(name.trim()));
        }
        if let Some(rest) = after(message, PLAYER_JOINED) {
            let (name, user_id) = split_user(rest);
            return Ok(Message::UserJoined { name, user_id });
        }
        if let Some(rest) = after(message, PLAYER_LEFT) {
            let (name, user_id) = split_user(rest);
            return Ok(Message::UserLeft { name, user_id });
        }
        if message.contains(LEFT_ROOM) {
            return Ok(Message::LeftRoom);
        }
        Ok(Message::Other)
    }
}

fn after<'a>(message: &'a str, needle: &str) -> Option<&'a str> {
    message.find(needle).map(|i| &message[i + needle.len()..])
}

/// `Name (usr_id)` or just `Name`.
fn split_user(rest: &str) -> (&str, Option<&str>) {
    let rest = rest.trim();
    if let Some(open) = rest.rfind(" (") {
        if let Some(id) = rest[open + 2..].strip_suffix(')') {
            return (rest[..open].trim(), Some(id));
        }
    }
    (rest, None)
}

fn table_event(rest: &str) -> Result<Message<'_>, LineError> {
    let rest = rest.trim();
    if let Some(seat) = rest.strip_prefix("Local Player Seated at ") {
        return Ok(Message::LocalSeat(parse_seat(seat)?));
    }
    if let Some(cards) = rest.strip_prefix("Your Cards:") {
        return Ok(Message::HoleCards(parse_cards(cards)?));
    }
    for (prefix, street) in [
        ("Flop:", Street::Flop),
        ("Turn:", Street::Turn),
        ("River:", Street::River),
    ] {
        if let Some(cards) = rest.strip_prefix(prefix) {
            return Ok(Message::Board {
                street,
                cards: parse_cards(cards)?,
            });
        }
    }
    let Some(rest) = rest.strip_prefix("Player ") else {
        return Ok(Message::Other);
    };
    let (seat, verb) = rest
        .split_once(' ')
        .ok_or_else(|| LineError::Truncated(rest.to_string()))?;
    let seat = parse_seat(seat)?;
    let verb = verb.trim();

    if let Some(chips) = verb.strip_prefix("Sits with ") {
        return Ok(Message::Stack {
            seat,
            chips: parse_amount(chips)?,
        });
    }
    if let Some(cards) = verb.strip_prefix("Show") {
        return Ok(Message::Show {
            seat,
            cards: parse_cards(cards)?,
        });
    }
    if let Some(amount) = verb.strip_prefix("Won ") {
        return Ok(Message::Won {
            seat,
            amount: parse_amount(amount)?,
        });
    }
    let (kind, amount) = match verb {
        "Fold" => (ActionKind::Fold, None),
        "Check" => (ActionKind::Check, None),
        _ => {
            let table: [(&str, ActionKind); 6] = [
                ("Post SB ", ActionKind::SmallBlind),
                ("Post BB ", ActionKind::BigBlind),
                ("Call ", ActionKind::Call),
                ("Bet ", ActionKind::Bet),
                ("Raise ", ActionKind::Raise),
                ("All In ", ActionKind::AllIn),
            ];
            match table
                .iter()
                .find_map(|(p, k)| verb.strip_prefix(*p).map(|a| (*k, a)))
            {
                Some((kind, amount)) => (kind, Some(parse_amount(amount)?)),
                None => return Ok(Message::Other),
            }
        }
    };
    Ok(Message::Act {
        seat,
        kind,
        amount: amount.unwrap_or(0),
    })
}

fn parse_seat(s: &str) -> Result<Seat, LineError> {
    let s = s.trim();
    match s.parse::<Seat>() {
        Ok(seat) if seat < MAX_SEATS => Ok(seat),
        _ => Err(LineError::BadSeat(s.to_string())),
    }
}

fn parse_amount(s: &str) -> Result<u64, LineError> {
    let s = s.trim();
    s.replace(',', "")
        .parse::<u64>()
        .map_err(|_| LineError::BadAmount(s.to_string()))
}

fn parse_cards(s: &str) -> Result<Vec<Card>, LineError> {
    let s = s.trim();
    Card::parse_many(s).map_err(|e| LineError::BadCards(s.to_string(), e))
}
