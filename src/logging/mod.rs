//! Logging for tabbie
//!
//! File-based logging with retention. Every invocation writes its own
//! timestamped log file; `-v` also echoes to stderr.

mod file_writer;
mod retention;

pub use file_writer::{init_file_logging, LogFileInfo, LoggingGuard};
pub use retention::{cleanup_old_logs, DEFAULT_MAX_LOG_FILES, DEFAULT_RETENTION_DAYS};
