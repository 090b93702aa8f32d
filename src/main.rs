use anyhow::{Context as _, Result};
use clap::Parser;

use tabbie::cli::{self, Cli, Context};
use tabbie::config::{Config, DataDir};
use tabbie::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure data directory exists (creates logs dir too)
    let data_dir = DataDir::resolve(cli.data_dir.clone());
    data_dir.ensure_directories()?;

    let config = Config::load_from(&data_dir.config_file())
        .with_context(|| format!("Invalid config at {}", data_dir.config_file().display()))?;

    // Initialize file logging BEFORE any tracing calls
    let (log_file_info, _guard) =
        logging::init_file_logging(data_dir.logs_dir(), &config.log_filter, cli.verbose)?;

    if let Ok(count) = logging::cleanup_old_logs(
        &data_dir.logs_dir(),
        config.log_retention_days,
        config.log_max_files,
    ) {
        if count > 0 {
            tracing::info!("Cleaned up {} old log files", count);
        }
    }

    tracing::debug!("Logging to: {}", log_file_info.path.display());

    cli::run(cli, Context { data_dir, config }).await
}
