//! Logging setup.
//!
//! Wires the `log` macros used across the crate into a fern dispatch: a
//! timestamped file under the user data dir when logging is enabled, plus
//! stderr for warnings and errors so sync problems are visible even with
//! file logging off.

use anyhow::{Context, Result};
use log::LevelFilter;

use crate::config::LoggingConfig;

fn parse_level(level: &str) -> LevelFilter {
    match level {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Initialize the global logger from config. Call once at startup.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(fern::Dispatch::new().level(LevelFilter::Warn).chain(std::io::stderr()));

    if config.enabled {
        let log_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join("taskmirror");
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
        let log_file = fern::log_file(log_dir.join("taskmirror.log")).context("Failed to open log file")?;
        dispatch = dispatch.chain(fern::Dispatch::new().level(parse_level(&config.level)).chain(log_file));
    }

    dispatch.apply().context("Failed to initialize logger")?;
    Ok(())
}
