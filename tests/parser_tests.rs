mod common;

use common::{LogBuilder, POKER_WORLD};
use handfold::{
    ActionKind, AnomalyCode, HandParser, MadeHand, ParserConfig, PocketCategory, Position,
    Severity, Street, WinType,
};

fn byte_offsets(log: &LogBuilder) -> Vec<u64> {
    let mut offsets = vec![0u64];
    for line in log.lines() {
        let last = *offsets.last().unwrap();
        offsets.push(last + line.len() as u64 + 1);
    }
    offsets
}

#[test]
fn test_five_line_fold_hand() {
    let log = LogBuilder::new()
        .marker()
        .table("Player 0 Post SB 10")
        .table("Player 1 Post BB 20")
        .table("Player 0 Won 30")
        .marker();
    let parser = log.parse();

    assert_eq!(parser.hand_count(), 1);
    let hand = &parser.hands()[0].hand;
    assert_eq!(hand.total_pot, 30);
    assert_eq!(hand.winner_seat, Some(0));
    assert_eq!(hand.win_type, Some(WinType::Fold));
    assert!(hand.is_complete);
    assert!(hand.stats_eligible, "anomalies: {:?}", hand.anomalies);
    assert_eq!(hand.sb_seat, Some(0));
    assert_eq!(hand.bb_seat, Some(1));
    assert_eq!(hand.player_count, 2);
    assert!(parser.has_open_hand(), "the trailing marker opens a new hand");
}

#[test]
fn test_unresolved_hand_is_never_emitted() {
    let parser = LogBuilder::new().fold_hand(0, 1, 1).open_hand(1, 2).parse();
    assert_eq!(parser.hand_count(), 1);
    assert!(parser.has_open_hand());
}

#[test]
fn test_span_covers_marker_through_resolution() {
    let log = LogBuilder::new()
        .line("[Behaviour] unrelated chatter")
        .fold_hand(0, 1, 0)
        .fold_hand(1, 2, 2);
    let offsets = byte_offsets(&log);
    let parser = log.parse();

    let spans: Vec<_> = parser.hands().iter().map(|p| p.span).collect();
    assert_eq!(spans.len(), 2);
    // first hand: lines 2..=8, second: 9..=15
    assert_eq!(spans[0].start_byte, offsets[1]);
    assert_eq!(spans[0].end_byte, offsets[8]);
    assert_eq!((spans[0].start_line, spans[0].end_line), (2, 8));
    assert_eq!(spans[1].start_byte, offsets[8]);
    assert_eq!(spans[1].end_byte, offsets[15]);
    assert_eq!((spans[1].start_line, spans[1].end_line), (9, 15));
    assert_eq!(parser.next_offset().byte, *offsets.last().unwrap());
}

#[test]
fn test_parse_bytes_counts_crlf_exactly() {
    let log = LogBuilder::new().fold_hand(0, 1, 0);
    let mut parser = HandParser::default();
    let mut total = 0u64;
    for line in log.lines() {
        let raw = format!("{line}\r\n");
        total += raw.len() as u64;
        parser.parse_bytes(raw.as_bytes()).unwrap();
    }
    assert_eq!(parser.hand_count(), 1);
    assert_eq!(parser.hands()[0].span.end_byte, total);
    assert_eq!(parser.next_offset().byte, total);
}

#[test]
fn test_duplicate_marker_discards_first_and_flags_second() {
    let parser = LogBuilder::new()
        .open_hand(0, 1)
        .fold_hand(0, 1, 1)
        .parse();

    assert_eq!(parser.hand_count(), 1);
    assert_eq!(parser.discarded_count(), 1);
    let hand = &parser.hands()[0].hand;
    assert!(hand.has_anomaly(AnomalyCode::UnresolvedPredecessor));
    let anomaly = &hand.anomalies[0];
    assert_eq!(anomaly.severity, Severity::Info);
    assert!(hand.stats_eligible, "an info anomaly does not bias stats");
    // the emitted hand only carries its own actions
    assert_eq!(hand.actions.len(), 3);
    assert_eq!(parser.hands()[0].span.start_line, 4);
}

#[test]
fn test_malformed_lines_are_tolerated() {
    let log = LogBuilder::new()
        .marker()
        .raw("garbage without a timestamp")
        .table("Player 0 Post SB 10")
        .table("Player 42 Fold")
        .table("Player 1 Post BB lots")
        .table("Player 1 Post BB 20")
        .table("Player 0 Fold")
        .table("Player 1 Won 30");
    let mut parser = HandParser::default();
    let mut errors = 0;
    for line in log.lines() {
        if parser.parse_line(line).is_err() {
            errors += 1;
        }
    }
    assert_eq!(errors, 3);
    assert_eq!(parser.malformed_count(), 3);
    assert_eq!(parser.hand_count(), 1);
    assert!(parser.hands()[0].hand.stats_eligible);
}

#[test]
fn test_missing_blind_is_kept_but_ineligible() {
    let parser = LogBuilder::new()
        .marker()
        .table("Player 1 Post BB 20")
        .table("Player 0 Fold")
        .table("Player 1 Won 20")
        .parse();

    let hand = &parser.hands()[0].hand;
    assert!(hand.is_complete);
    assert!(hand.has_anomaly(AnomalyCode::MissingSmallBlind));
    assert!(!hand.stats_eligible);
}

#[test]
fn test_amount_beyond_stack_is_an_error_anomaly() {
    let parser = LogBuilder::new()
        .marker()
        .table("Player 0 Sits with 15")
        .table("Player 0 Post SB 10")
        .table("Player 1 Post BB 20")
        .table("Player 0 Call 10")
        .table("Player 1 Check")
        .table("Player 1 Won 40")
        .parse();

    let hand = &parser.hands()[0].hand;
    let anomaly = hand
        .anomalies
        .iter()
        .find(|a| a.code == AnomalyCode::AmountExceedsStack)
        .expect("stack anomaly");
    assert_eq!(anomaly.severity, Severity::Error);
    assert!(!hand.stats_eligible);
}

#[test]
fn test_pot_mismatch_flagged() {
    let log = LogBuilder::new()
        .marker()
        .table("Player 0 Post SB 10")
        .table("Player 1 Post BB 20")
        .table("Player 0 Fold")
        .table("Player 1 Won 25");
    // a short award may still be followed by another share
    let mut parser = log.parse();
    assert_eq!(parser.hand_count(), 0);
    assert!(parser.has_open_hand());

    parser.flush();
    assert_eq!(parser.hand_count(), 1);
    let hand = &parser.hands()[0].hand;
    assert_eq!(hand.total_pot, 25);
    assert!(hand.has_anomaly(AnomalyCode::PotMismatch));
    assert!(!hand.stats_eligible);
}

#[test]
fn test_over_award_closes_immediately() {
    let parser = LogBuilder::new()
        .marker()
        .table("Player 0 Post SB 10")
        .table("Player 1 Post BB 20")
        .table("Player 0 Fold")
        .table("Player 1 Won 35")
        .parse();
    assert_eq!(parser.hand_count(), 1);
    assert!(parser.hands()[0].hand.has_anomaly(AnomalyCode::PotMismatch));
}

fn split_pot_log() -> LogBuilder {
    LogBuilder::new()
        .marker()
        .table("Player 0 Sits with 1000")
        .table("Player 1 Sits with 1000")
        .table("Player 0 Post SB 10")
        .table("Player 1 Post BB 20")
        .table("Player 0 Call 10")
        .table("Player 1 Check")
        .table("Flop: Ah Kd 7c")
        .table("Turn: 2s")
        .table("River: 9h")
        .table("Player 0 Show Qs Jd")
        .table("Player 1 Show Qc Jh")
        .table("Player 0 Won 20")
        .table("Player 1 Won 20")
}

#[test]
fn test_split_pot_collects_every_award() {
    let log = split_pot_log();
    let offsets = byte_offsets(&log);
    let parser = log.parse();

    assert_eq!(parser.hand_count(), 1);
    let parsed = &parser.hands()[0];
    let hand = &parsed.hand;
    assert_eq!(hand.total_pot, 40);
    assert!(hand.stats_eligible, "anomalies: {:?}", hand.anomalies);
    assert_eq!(hand.win_type, Some(WinType::Showdown));
    assert_eq!(hand.winner_seat, Some(0));
    for seat in [0, 1] {
        let player = hand.player(seat).unwrap();
        assert!(player.won, "seat {seat}");
        assert_eq!(player.chips_won, 20);
    }
    // the span ends after the second award
    assert_eq!(parsed.span.end_line, 14);
    assert_eq!(parsed.span.end_byte, offsets[14]);
}

#[test]
fn test_partial_awards_close_on_next_line() {
    let log = split_pot_log();
    let lines = log.lines();
    let mut parser = HandParser::default();
    for line in &lines[..13] {
        parser.parse_line(line).unwrap();
    }
    assert_eq!(parser.hand_count(), 0, "one share of two is not the whole pot");

    // a following marker closes the short hand, then opens the next one
    let next = LogBuilder::new().marker();
    parser.parse_line(&next.lines()[0]).unwrap();
    assert_eq!(parser.hand_count(), 1);
    let hand = &parser.hands()[0].hand;
    assert_eq!(hand.total_pot, 20);
    assert!(!hand.has_anomaly(AnomalyCode::UnresolvedPredecessor));
    assert!(parser.has_open_hand());
    assert_eq!(parser.discarded_count(), 0);
}

#[test]
fn test_local_player_without_hole_cards_is_ineligible() {
    let parser = LogBuilder::new().seated(0).fold_hand(0, 1, 0).parse();
    let hand = &parser.hands()[0].hand;
    assert_eq!(hand.local_seat, Some(0));
    assert!(hand.has_anomaly(AnomalyCode::MissingHoleCards));
    assert!(!hand.stats_eligible);
}

#[test]
fn test_showdown_hand_is_fully_classified() {
    let parser = LogBuilder::new()
        .join(POKER_WORLD)
        .seated(2)
        .marker()
        .table("Player 0 Sits with 1000")
        .table("Player 1 Sits with 1000")
        .table("Player 2 Sits with 1000")
        .table("Player 0 Post SB 10")
        .table("Player 1 Post BB 20")
        .table("Your Cards: As Ac")
        .table("Player 2 Raise 60")
        .table("Player 0 Fold")
        .table("Player 1 Call 40")
        .table("Flop: Ah Kd 7c")
        .table("Player 1 Check")
        .table("Player 2 Bet 100")
        .table("Player 1 Call 100")
        .table("Turn: 2s")
        .table("River: 9h")
        .table("Player 1 Check")
        .table("Player 2 Check")
        .table("Player 1 Show Qs Qd")
        .table("Player 2 Show As Ac")
        .table("Player 2 Won 330")
        .parse();

    assert_eq!(parser.hand_count(), 1);
    let hand = &parser.hands()[0].hand;
    assert!(hand.stats_eligible, "anomalies: {:?}", hand.anomalies);
    assert_eq!(hand.win_type, Some(WinType::Showdown));
    assert_eq!(hand.world_id.as_deref(), Some(POKER_WORLD));
    assert_eq!(hand.world_name.as_deref(), Some("Poker Night"));
    assert_eq!(hand.board.len(), 5);
    assert_eq!(hand.player_count, 3);

    let positions: Vec<_> = hand.players.values().map(|p| p.position).collect();
    assert_eq!(positions, vec![Position::Sb, Position::Bb, Position::Btn]);

    let hero = hand.local_player().unwrap();
    assert_eq!(hero.hole_cards.len(), 2);
    assert!(hero.vpip && hero.pfr && hero.won && hero.showdown);
    assert_eq!(hero.chips_won, 330);
    assert_eq!(hero.pocket, Some(PocketCategory::PremiumPair));
    assert_eq!(hero.made_hand, Some(MadeHand::ThreeOfAKind));

    let villain = hand.player(1).unwrap();
    assert!(villain.vpip && !villain.pfr && !villain.won);
    assert_eq!(villain.made_hand, Some(MadeHand::OnePair));
    assert!(hand.player(0).unwrap().folded_preflop);

    // log order is preserved, blinds are preflop
    let streets: Vec<_> = hand.actions.iter().map(|a| a.street).collect();
    assert_eq!(streets[0], Street::Preflop);
    assert_eq!(hand.actions[0].kind, ActionKind::SmallBlind);
    assert_eq!(streets.last(), Some(&Street::River));
}

#[test]
fn test_three_bet_and_fold_to_three_bet() {
    let parser = LogBuilder::new()
        .marker()
        .table("Player 0 Post SB 10")
        .table("Player 1 Post BB 20")
        .table("Player 2 Raise 60")
        .table("Player 0 Raise 170")
        .table("Player 1 Fold")
        .table("Player 2 Fold")
        .table("Player 0 Won 260")
        .parse();

    let hand = &parser.hands()[0].hand;
    let opener = hand.player(2).unwrap();
    assert!(opener.pfr && !opener.three_bet);
    assert!(opener.faced_three_bet && opener.fold_to_three_bet);
    let squeezer = hand.player(0).unwrap();
    assert!(squeezer.three_bet && squeezer.three_bet_opportunity);
    // the big blind only acted after the 3-bet
    assert!(!hand.player(1).unwrap().three_bet_opportunity);
    assert!(hand.stats_eligible);
}

#[test]
fn test_markers_outside_poker_world_are_ignored() {
    let config = ParserConfig {
        target_worlds: vec![POKER_WORLD.to_string()],
    };
    let log = LogBuilder::new()
        .join("wrld_0000-lobby")
        .fold_hand(0, 1, 0)
        .join(POKER_WORLD)
        .fold_hand(0, 1, 1);
    let mut parser = HandParser::new(config);
    for line in log.lines() {
        parser.parse_line(line).unwrap();
    }
    assert_eq!(parser.hand_count(), 1);
    assert_eq!(parser.hands()[0].hand.winner_seat, Some(1));
    assert!(parser.world_context().in_poker_world);
}

#[test]
fn test_leaving_room_drops_open_hand() {
    let parser = LogBuilder::new()
        .open_hand(0, 1)
        .line("[Behaviour] OnLeftRoom")
        .table("Player 1 Won 30")
        .parse();
    assert_eq!(parser.hand_count(), 0);
    assert_eq!(parser.discarded_count(), 1);
    assert!(!parser.world_context().in_poker_world);
}

#[test]
fn test_world_context_tracks_users() {
    let parser = LogBuilder::new()
        .join(POKER_WORLD)
        .line("[Behaviour] OnPlayerJoined Alice (usr_a)")
        .line("[Behaviour] OnPlayerJoined Bob (usr_b)")
        .line("[Behaviour] OnPlayerLeft Alice (usr_a)")
        .seated(3)
        .parse();
    let world = parser.world_context();
    assert_eq!(world.users.len(), 1);
    assert_eq!(world.users.get("usr_b").map(String::as_str), Some("Bob"));
    let instance = world.instance.as_ref().unwrap();
    assert_eq!(instance.region.as_deref(), Some("eu"));
    assert_eq!(parser.local_seat(), Some(3));
}

#[test]
fn test_clone_is_independent() {
    let log = LogBuilder::new().open_hand(0, 1);
    let original = log.parse();
    let mut copy = original.clone();
    copy.parse_line(&LogBuilder::new().table("Player 0 Won 30").lines()[0])
        .unwrap();

    assert_eq!(copy.hand_count(), 1);
    assert_eq!(original.hand_count(), 0);
    assert!(original.has_open_hand());
}

#[test]
fn test_resume_point_replays_open_hand() {
    let head = LogBuilder::new().join(POKER_WORLD).fold_hand(0, 1, 0).open_hand(1, 2);
    let full = head.clone().table("Player 2 Fold").table("Player 1 Won 30");
    let offsets = byte_offsets(&full);

    let first = head.parse();
    let resume = first.resume_point();
    // the open hand's marker is line 10
    assert_eq!(resume.line, 10);
    assert_eq!(resume.byte, offsets[9]);
    assert_eq!(resume.world.world_id.as_deref(), Some(POKER_WORLD));

    let mut resumed = HandParser::default();
    resumed.resume(resume.byte, resume.line, resume.world.clone());
    for line in &full.lines()[9..] {
        resumed.parse_line(line).unwrap();
    }

    let whole = full.parse();
    assert_eq!(resumed.hand_count(), 1);
    assert_eq!(resumed.hands()[0], whole.hands()[1]);
}

#[test]
fn test_restore_world_context() {
    let source = LogBuilder::new().join(POKER_WORLD).seated(4).parse();
    let snapshot = source.world_context().to_snapshot().unwrap();

    let mut parser = HandParser::default();
    parser.restore_world_context(handfold::WorldContext::from_snapshot(&snapshot).unwrap());
    assert_eq!(parser.world_context(), source.world_context());
    assert_eq!(parser.local_seat(), Some(4));
}
