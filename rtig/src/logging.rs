//! Log file setup

use std::fs;
use std::path::PathBuf;

use eyre::{Context, Result, eyre};
use tracing::{Level, info};

use crate::config::LoggingConfig;

/// Map a configured level name to a tracing level
pub fn parse_level(level: &str) -> Result<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(eyre!("Unknown log level '{}'", other)),
    }
}

/// Directory the log file goes to
pub fn log_dir(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rtig")
            .join("logs")
    })
}

/// Install the global subscriber writing to `<log dir>/rtig.log`
///
/// `RUST_LOG` directives are honored on top of the configured level.
/// Returns the path of the log file.
pub fn init_logging(config: &LoggingConfig) -> Result<PathBuf> {
    let level = parse_level(&config.level)?;
    let log_dir = log_dir(config);

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let log_path = log_dir.join("rtig.log");
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre!("Failed to install subscriber: {}", e))?;

    info!("Logging initialized (level: {})", level);
    Ok(log_path)
}
