#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use handfold::{HandParser, HandRecord, HandSourceRef, ParsedHand};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

pub const POKER_WORLD: &str = "wrld_4a65c5c4-poker";

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(21, 0, 0)
        .unwrap()
}

/// Builds synthetic client logs, one second per line.
#[derive(Debug, Clone)]
pub struct LogBuilder {
    at: NaiveDateTime,
    lines: Vec<String>,
}

impl Default for LogBuilder {
    fn default() -> Self {
        LogBuilder::starting_at(t0())
    }
}

impl LogBuilder {
    pub fn new() -> Self {
        LogBuilder::default()
    }

    pub fn starting_at(at: NaiveDateTime) -> Self {
        LogBuilder {
            at,
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, message: &str) -> Self {
        let stamp = self.at.format("%Y.%m.%d %H:%M:%S");
        self.lines.push(format!("{stamp} Log        -  {message}"));
        self.at += Duration::seconds(1);
        self
    }

    pub fn raw(mut self, text: &str) -> Self {
        self.lines.push(text.to_string());
        self
    }

    pub fn table(self, event: &str) -> Self {
        self.line(&format!("[Table] {event}"))
    }

    pub fn marker(self) -> Self {
        self.line("Preparing for New Game")
    }

    pub fn join(self, world_id: &str) -> Self {
        self.line(&format!(
            "[Behaviour] Joining {world_id}:12345~private(usr_owner)~region(eu)"
        ))
        .line("[Behaviour] Entering Room: Poker Night")
    }

    pub fn seated(self, seat: u8) -> Self {
        self.table(&format!("Local Player Seated at {seat}"))
    }

    /// Blinds 10/20 and one fold; the other blind takes the 30 pot.
    pub fn fold_hand(self, sb: u8, bb: u8, winner: u8) -> Self {
        let loser = if winner == sb { bb } else { sb };
        self.marker()
            .table(&format!("Player {sb} Sits with 1000"))
            .table(&format!("Player {bb} Sits with 1000"))
            .table(&format!("Player {sb} Post SB 10"))
            .table(&format!("Player {bb} Post BB 20"))
            .table(&format!("Player {loser} Fold"))
            .table(&format!("Player {winner} Won 30"))
    }

    /// Like [`LogBuilder::fold_hand`] with the local player's hole cards.
    pub fn hero_hand(self, sb: u8, bb: u8, winner: u8, cards: &str) -> Self {
        let loser = if winner == sb { bb } else { sb };
        self.marker()
            .table(&format!("Player {sb} Sits with 1000"))
            .table(&format!("Player {bb} Sits with 1000"))
            .table(&format!("Player {sb} Post SB 10"))
            .table(&format!("Player {bb} Post BB 20"))
            .table(&format!("Your Cards: {cards}"))
            .table(&format!("Player {loser} Fold"))
            .table(&format!("Player {winner} Won 30"))
    }

    /// A hand that opens and posts blinds but never resolves.
    pub fn open_hand(self, sb: u8, bb: u8) -> Self {
        self.marker()
            .table(&format!("Player {sb} Post SB 10"))
            .table(&format!("Player {bb} Post BB 20"))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.iter().map(|l| format!("{l}\n")).collect()
    }

    pub fn write_to(&self, path: &Path) {
        fs::write(path, self.text()).unwrap();
    }

    pub fn append_to(&self, path: &Path) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(self.text().as_bytes()).unwrap();
        file.sync_data().unwrap();
    }

    pub fn parse(&self) -> HandParser {
        let mut parser = HandParser::default();
        for line in &self.lines {
            let _ = parser.parse_line(line);
        }
        parser
    }
}

/// `n` resolved hands without a local player.
pub fn sample_hands(n: usize) -> Vec<ParsedHand> {
    let mut log = LogBuilder::new();
    for i in 0..n {
        log = log.fold_hand(0, 1, (i % 2) as u8);
    }
    log.parse().into_hands()
}

pub fn records(path: &Path, hands: &[ParsedHand]) -> Vec<HandRecord> {
    hands
        .iter()
        .map(|p| HandRecord {
            hand: Some(p.hand.clone()),
            source: HandSourceRef {
                path: path.to_path_buf(),
                span: p.span,
            },
        })
        .collect()
}
