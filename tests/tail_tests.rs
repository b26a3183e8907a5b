mod common;

use common::LogBuilder;
use handfold::{LogTail, WaitResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::time::{Duration, Instant};
use tempfile::tempdir;

#[test]
fn test_poll_returns_complete_lines_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("output_log_x.txt");
    std::fs::write(&path, "first\r\nsecond\npartial").unwrap();

    let mut tail = LogTail::new(&path, 0);
    let batch = tail.poll().unwrap().unwrap();
    assert_eq!(batch.lines, vec!["first\r".to_string(), "second".to_string()]);
    assert_eq!((batch.start, batch.end), (0, 14));
    assert_eq!(tail.offset(), 14);
    assert!(tail.poll().unwrap().is_none());

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b" line\n").unwrap();
    let batch = tail.poll().unwrap().unwrap();
    assert_eq!(batch.lines, vec!["partial line".to_string()]);
    assert_eq!(batch.start, 14);
}

#[test]
fn test_line_lengths_match_byte_range() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("output_log_x.txt");
    LogBuilder::new().fold_hand(0, 1, 0).write_to(&path);

    let mut tail = LogTail::new(&path, 0);
    let batch = tail.poll().unwrap().unwrap();
    let total: u64 = batch.lines.iter().map(|l| l.len() as u64 + 1).sum();
    assert_eq!(total, batch.end - batch.start);
}

#[test]
fn test_shrunk_file_restarts_from_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("output_log_x.txt");
    std::fs::write(&path, "a\n").unwrap();

    let mut tail = LogTail::new(&path, 100);
    let batch = tail.poll().unwrap().unwrap();
    assert_eq!(batch.start, 0);
    assert_eq!(batch.lines, vec!["a".to_string()]);
}

#[test]
fn test_wait_returns_immediately_with_existing_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("output_log_x.txt");
    std::fs::write(&path, "ready\n").unwrap();

    let start = Instant::now();
    let result = LogTail::new(&path, 0)
        .wait_for_growth(Duration::from_secs(1))
        .unwrap();
    assert_eq!(result, WaitResult::NewData(6));
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_wait_timeout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("output_log_x.txt");
    std::fs::write(&path, "ready\n").unwrap();

    let start = Instant::now();
    let result = LogTail::new(&path, 6)
        .wait_for_growth(Duration::from_millis(200))
        .unwrap();
    assert_eq!(result, WaitResult::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_wait_detects_append() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("output_log_x.txt");
    std::fs::write(&path, "ready\n").unwrap();

    let writer_path = path.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        let mut file = OpenOptions::new().append(true).open(writer_path).unwrap();
        file.write_all(b"more\n").unwrap();
        file.sync_data().unwrap();
    });

    let start = Instant::now();
    let result = LogTail::new(&path, 6)
        .wait_for_growth(Duration::from_secs(5))
        .unwrap();
    handle.join().unwrap();

    assert_eq!(result, WaitResult::NewData(11));
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "should wake well before the timeout, took {:?}",
        start.elapsed()
    );
}

#[test]
fn test_wait_on_missing_file_errors() {
    let dir = tempdir().unwrap();
    let result = LogTail::new(dir.path().join("gone.txt"), 0).wait_for_growth(Duration::from_millis(10));
    assert!(result.is_err());
}
