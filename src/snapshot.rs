//! On-disk checkpoint of the all-time aggregate.

use crate::stats::HandStats;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// The aggregate and the watermark it was folded up to.
///
/// Written atomically (`.tmp` + rename) after each query that folded new
/// hands, so a restart resumes from the watermark instead of refolding the
/// whole store:
///
/// ```text
/// $ cat stats.snapshot.json | jq '{watermark, hands: .stats.hands}'
/// { "watermark": "2024-05-01T21:14:03", "hands": 1284 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub stats: HandStats,
    pub watermark: Option<NaiveDateTime>,
}

/// Save atomically. If the process dies mid-write the previous snapshot
/// survives intact.
pub fn save(path: &Path, snapshot: &AggregateSnapshot) -> io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, path)
}

/// Load a snapshot. A missing or undecodable file is `Ok(None)`; the caller
/// rebuilds from the store.
pub fn load(path: &Path) -> io::Result<Option<AggregateSnapshot>> {
    let contents = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(serde_json::from_slice(&contents).ok())
}

/// Remove the snapshot and any leftover `.tmp`. Missing files are fine.
pub fn delete(path: &Path) -> io::Result<()> {
    for p in [path.to_path_buf(), path.with_extension("json.tmp")] {
        match fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
