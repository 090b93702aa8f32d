//! Configuration management for Tabbie

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that relocates the data directory
pub const DATA_DIR_ENV: &str = "TABBIE_DIR";

const CONFIG_FILE: &str = "config.toml";
const TIMER_STATE_FILE: &str = "timer_state.json";
const USER_DATA_FILE: &str = "user_data.json";
const LOGS_DIR: &str = "logs";

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "Disk full - timer state will not survive a restart",
            DiskErrorKind::PermissionDenied => "Permission denied writing to the tabbie directory",
            DiskErrorKind::NotFound => "File or directory not found",
            DiskErrorKind::Other => "Failed to save data",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::StorageFull => DiskErrorKind::DiskFull,
        // On some systems, disk full might appear as WriteZero
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 (Linux) / 69 (macOS)
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Create a user-friendly error message from an IO error
pub fn friendly_io_error_message(e: &std::io::Error, context: &str) -> String {
    let kind = categorize_io_error(e);
    match kind {
        DiskErrorKind::DiskFull | DiskErrorKind::PermissionDenied => {
            format!("{}: {}", context, kind.user_message())
        }
        DiskErrorKind::NotFound => format!("{}: file or directory not found", context),
        DiskErrorKind::Other => format!("{}: {}", context, e),
    }
}

/// How the timer reacts to sessions that run past their nominal length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OvertimePolicy {
    /// Overtime after which a running session is paused automatically (0 disables)
    #[serde(default = "default_auto_pause_after_secs")]
    pub auto_pause_after_secs: u64,

    /// Minutes between overtime reminders (0 disables)
    #[serde(default = "default_reminder_interval_minutes")]
    pub reminder_interval_minutes: u64,

    /// A restored session whose overtime exceeds this multiple of its duration is dropped
    #[serde(default = "default_stale_session_factor")]
    pub stale_session_factor: f64,
}

fn default_auto_pause_after_secs() -> u64 {
    900 // 15 minutes
}

fn default_reminder_interval_minutes() -> u64 {
    5
}

fn default_stale_session_factor() -> f64 {
    2.0
}

impl Default for OvertimePolicy {
    fn default() -> Self {
        Self {
            auto_pause_after_secs: default_auto_pause_after_secs(),
            reminder_interval_minutes: default_reminder_interval_minutes(),
            stale_session_factor: default_stale_session_factor(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracing filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Log retention in days (default: 7)
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,

    /// Most log files kept, newest first; 0 keeps any number (default: 100)
    #[serde(default = "default_log_max_files")]
    pub log_max_files: usize,

    /// Overtime handling
    #[serde(default)]
    pub overtime: OvertimePolicy,
}

fn default_log_filter() -> String {
    "tabbie=info".to_string()
}

fn default_log_retention_days() -> u64 {
    crate::logging::DEFAULT_RETENTION_DAYS
}

fn default_log_max_files() -> usize {
    crate::logging::DEFAULT_MAX_LOG_FILES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_retention_days: default_log_retention_days(),
            log_max_files: default_log_max_files(),
            overtime: OvertimePolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file, or return default if not found
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }
}

/// Locations of everything Tabbie keeps on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Use an explicit root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the data directory: explicit override, then `TABBIE_DIR`, then `~/.tabbie`
    pub fn resolve(override_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = override_dir {
            return Self::new(dir);
        }
        match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(config_dir()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Persisted timer snapshot
    pub fn timer_state_file(&self) -> PathBuf {
        self.root.join(TIMER_STATE_FILE)
    }

    /// Tasks, session history and pomodoro settings
    pub fn user_data_file(&self) -> PathBuf {
        self.root.join(USER_DATA_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).context("Failed to create data directory")?;
        std::fs::create_dir_all(self.logs_dir()).context("Failed to create logs directory")?;
        Ok(())
    }
}

/// Get the default base directory (~/.tabbie)
/// Falls back to ./.tabbie if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for data");
        PathBuf::from(".tabbie")
    })
}

/// Try to get the base directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".tabbie"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_filter, "tabbie=info");
        assert_eq!(config.log_retention_days, 7);
        assert_eq!(config.log_max_files, 100);
        assert_eq!(config.overtime.auto_pause_after_secs, 900);
        assert_eq!(config.overtime.reminder_interval_minutes, 5);
        assert_eq!(config.overtime.stale_session_factor, 2.0);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.overtime.auto_pause_after_secs = 0;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.overtime.auto_pause_after_secs, 0);
        assert_eq!(parsed.log_filter, config.log_filter);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[overtime]\nreminder_interval_minutes = 10\n").unwrap();
        assert_eq!(parsed.overtime.reminder_interval_minutes, 10);
        assert_eq!(parsed.overtime.auto_pause_after_secs, 900);
        assert_eq!(parsed.log_retention_days, 7);
    }

    #[test]
    fn test_load_missing_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config.log_retention_days, 7);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let mut config = Config::default();
        config.log_retention_days = 3;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.log_retention_days, 3);
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "log_retention_days = \"many\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_data_dir_layout() {
        let dir = DataDir::new("/tmp/tabbie-test");
        assert_eq!(dir.root(), Path::new("/tmp/tabbie-test"));
        assert!(dir.timer_state_file().ends_with("timer_state.json"));
        assert!(dir.user_data_file().ends_with("user_data.json"));
        assert!(dir.logs_dir().ends_with("logs"));
    }

    #[test]
    fn test_data_dir_override_wins() {
        let dir = DataDir::resolve(Some(PathBuf::from("/tmp/explicit")));
        assert_eq!(dir.root(), Path::new("/tmp/explicit"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let dir = DataDir::new(temp_dir.path().join("nested"));
        dir.ensure_directories().unwrap();
        assert!(dir.logs_dir().is_dir());
    }

    #[test]
    fn test_try_config_dir() {
        if let Some(path) = try_config_dir() {
            assert!(path.ends_with(".tabbie"));
        }
    }

    #[test]
    fn test_categorize_io_error() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(categorize_io_error(&denied), DiskErrorKind::PermissionDenied);

        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(categorize_io_error(&missing), DiskErrorKind::NotFound);

        let zero = std::io::Error::from(std::io::ErrorKind::WriteZero);
        assert_eq!(categorize_io_error(&zero), DiskErrorKind::DiskFull);
    }
}
