//! Logging setup: terminal logger plus an optional log file, both through simplelog.
use crate::Utils::config::ConfigError;
use chrono::Local;
use simplelog::*;
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Parses "debug", "info", "warn", "error" or "off" (any case).
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.to_lowercase().as_str() {
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" => Ok(LevelFilter::Warn),
        "error" => Ok(LevelFilter::Error),
        "off" => Ok(LevelFilter::Off),
        other => Err(ConfigError::Invalid(format!(
            "loglevel must be debug, info, warn, error or off, got '{}'",
            other
        ))),
    }
}

/// log_<date>_<time>.txt in the current directory
pub fn default_log_file_name() -> PathBuf {
    let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
    PathBuf::from(format!("log_{}.txt", date_and_time))
}

/// Installs the global logger. A logger installed earlier stays in place; that is
/// not treated as an error.
pub fn init_logging(level: LevelFilter, file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = file {
        loggers.push(WriteLogger::new(level, Config::default(), File::create(path)?));
    }
    let _ = CombinedLogger::init(loggers);
    Ok(())
}
