// Configuration module
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub changefeed: ChangefeedSettings,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Backend kind: "rocksdb" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Per-target level overrides, e.g. `testdeck_core = "trace"`
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

/// Change-feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangefeedSettings {
    /// Upper bound a client may request for pad_lt + pad_gt.
    #[serde(default = "default_max_pad")]
    pub max_pad: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_path: default_logs_path(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
        }
    }
}

impl Default for ChangefeedSettings {
    fn default() -> Self {
        Self {
            max_pad: default_max_pad(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
            changefeed: ChangefeedSettings::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backend() -> String {
    "rocksdb".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_logs_path() -> String {
    "./logs".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_pad() -> usize {
    500
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config: ServerConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TESTDECK_HOST: Override server.host
    /// - TESTDECK_PORT: Override server.port
    /// - TESTDECK_DATA_DIR: Override storage.data_dir
    /// - TESTDECK_STORAGE_BACKEND: Override storage.backend
    /// - TESTDECK_LOG_LEVEL: Override logging.level
    /// - TESTDECK_LOG_TO_CONSOLE: Override logging.log_to_console
    ///
    /// Environment variables take precedence over file values.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        use std::env;

        if let Ok(host) = env::var("TESTDECK_HOST") {
            self.server.host = host;
        }

        if let Ok(port_str) = env::var("TESTDECK_PORT") {
            self.server.port = port_str
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid TESTDECK_PORT value: {}", port_str))?;
        }

        if let Ok(path) = env::var("TESTDECK_DATA_DIR") {
            self.storage.data_dir = path;
        }

        if let Ok(backend) = env::var("TESTDECK_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(level) = env::var("TESTDECK_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(val) = env::var("TESTDECK_LOG_TO_CONSOLE") {
            let val = val.to_lowercase();
            self.logging.log_to_console = val == "true" || val == "1" || val == "yes";
        }

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let valid_backends = ["rocksdb", "memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid storage backend '{}'. Must be one of: {}",
                self.storage.backend,
                valid_backends.join(", ")
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if self.changefeed.max_pad == 0 {
            return Err(anyhow::anyhow!("changefeed.max_pad cannot be 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.storage.backend, "rocksdb");
        assert_eq!(config.changefeed.max_pad, 500);
    }

    #[test]
    fn test_parse_partial_toml_fills_defaults() {
        let toml = r#"
            [server]
            port = 9090

            [storage]
            backend = "memory"
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = ServerConfig::default();
        config.storage.backend = "postgres".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = ServerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = ServerConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_port() {
        std::env::set_var("TESTDECK_PORT", "7777");
        let mut config = ServerConfig::default();
        config.apply_env_overrides().unwrap();
        std::env::remove_var("TESTDECK_PORT");
        assert_eq!(config.server.port, 7777);
    }

    #[test]
    fn test_env_override_invalid_port_fails() {
        std::env::set_var("TESTDECK_PORT", "not-a-port");
        let mut config = ServerConfig::default();
        let result = config.apply_env_overrides();
        std::env::remove_var("TESTDECK_PORT");
        assert!(result.is_err());
    }
}
