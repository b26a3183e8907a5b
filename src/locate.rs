//! Finding session logs on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const LOG_PREFIX: &str = "output_log_";
const LOG_SUFFIX: &str = ".txt";

/// True for file names the client writes its session logs under.
///
/// # Examples
///
/// ```
/// use handfold::is_log_file_name;
///
/// assert!(is_log_file_name("output_log_2024-05-01_21-00-00.txt"));
/// assert!(is_log_file_name("Output_Log_x.TXT"));
/// assert!(!is_log_file_name("output_log_x.txt.bak"));
/// ```
pub fn is_log_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with(LOG_PREFIX) && lower.ends_with(LOG_SUFFIX)
}

/// Session logs in `dir`, newest first.
///
/// Ordered by modification time, then by name since the client embeds the
/// session start time in it. A missing directory yields no files.
pub fn discover_logs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_log_file_name(name) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, path));
    }
    found.sort_by(|a, b| b.cmp(a));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_session_log_names() {
        assert!(is_log_file_name("output_log_2024-05-01_21-00-00.txt"));
        assert!(is_log_file_name("Output_Log_x.TXT"));
        assert!(!is_log_file_name("output_log_x.txt.bak"));
        assert!(!is_log_file_name("player.log"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let files = discover_logs(Path::new("/definitely/not/here")).unwrap();
        assert!(files.is_empty());
    }
}
