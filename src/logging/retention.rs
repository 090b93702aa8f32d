//! Log file retention
//!
//! Each command writes its own log file, so besides an age limit the number
//! of files is capped too. The newest files always win.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;

use super::file_writer::LOG_FILE_PREFIX;

/// Default retention period in days
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Default cap on the number of log files kept
pub const DEFAULT_MAX_LOG_FILES: usize = 100;

fn is_log_file_name(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
}

/// Log files in `logs_dir`, newest first (name breaks mtime ties)
fn log_files_newest_first(logs_dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_log_file_name)
        {
            continue;
        }
        // Files whose age cannot be read are left alone
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            files.push((path, modified));
        }
    }
    files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    Ok(files)
}

/// Delete log files older than `retention_days`, and any beyond the newest
/// `max_files` (0 means no cap)
///
/// Returns the number of files deleted.
pub fn cleanup_old_logs(logs_dir: &Path, retention_days: u64, max_files: usize) -> Result<usize> {
    if !logs_dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60));
    let cutoff = SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut deleted = 0;
    for (index, (path, modified)) in log_files_newest_first(logs_dir)?.into_iter().enumerate() {
        let over_cap = max_files > 0 && index >= max_files;
        if (over_cap || modified < cutoff) && fs::remove_file(&path).is_ok() {
            tracing::debug!("Removed old log file {}", path.display());
            deleted += 1;
        }
    }

    Ok(deleted)
}
