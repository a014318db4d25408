//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.mcp-testbed/config.json`
//!    - **Windows:** `%USERPROFILE%\.mcp-testbed\config.json`
//!
//! Every setting has a default, so a missing file at the default location
//! simply yields the default configuration. A path given explicitly must
//! exist.

mod settings;

pub use settings::{ClientConfig, Config, LoggingConfig, SchedulerConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mcp-testbed/`
/// - **Windows:** `%USERPROFILE%\.mcp-testbed\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-testbed"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to the built-in defaults when no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given file cannot be read
/// - The JSON is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            // No file at the default location: run with defaults
            _ => {
                let config = Config::default();
                config.validate()?;
                return Ok(config);
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}
