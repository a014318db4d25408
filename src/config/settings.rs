//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Notification scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Test-client settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.resource_update_interval_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "scheduler.resource_update_interval_secs must be at least 1".to_string(),
            });
        }
        if self.scheduler.logging_interval_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "scheduler.logging_interval_secs must be at least 1".to_string(),
            });
        }
        if self.client.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "client.connect_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Notification scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds between resource-updated notification sweeps.
    #[serde(default = "default_resource_update_interval")]
    pub resource_update_interval_secs: u64,

    /// Seconds between periodic logging-level notifications.
    #[serde(default = "default_logging_interval")]
    pub logging_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resource_update_interval_secs: default_resource_update_interval(),
            logging_interval_secs: default_logging_interval(),
        }
    }
}

const fn default_resource_update_interval() -> u64 {
    10
}

const fn default_logging_interval() -> u64 {
    15
}

/// Test-client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Client name reported during initialisation.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Client version reported during initialisation.
    #[serde(default = "default_client_version")]
    pub version: String,

    /// Server command the client spawns.
    #[serde(default = "default_server_command")]
    pub command: String,

    /// Arguments passed to the server command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Seconds the client waits for initialisation before giving up.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
            command: default_server_command(),
            args: Vec::new(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_client_name() -> String {
    "mcp-testbed-client".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_server_command() -> String {
    "mcp-testbed".to_string()
}

const fn default_connect_timeout() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "scheduler": {
                "resource_update_interval_secs": 5,
                "logging_interval_secs": 30
            },
            "client": {
                "name": "integration-client",
                "version": "0.1.0",
                "command": "target/debug/mcp-testbed",
                "args": ["--verbose"],
                "connect_timeout_secs": 20
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.resource_update_interval_secs, 5);
        assert_eq!(config.scheduler.logging_interval_secs, 30);
        assert_eq!(config.client.name, "integration-client");
        assert_eq!(config.client.args, vec!["--verbose".to_string()]);
        assert_eq!(config.client.connect_timeout_secs, 20);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.resource_update_interval_secs, 10);
        assert_eq!(config.logging_interval_secs, 15);
    }

    #[test]
    fn client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.name, "mcp-testbed-client");
        assert_eq!(config.command, "mcp-testbed");
        assert!(config.args.is_empty());
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_zero_scheduler_interval() {
        let json = r#"{
            "scheduler": {
                "resource_update_interval_secs": 0
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
