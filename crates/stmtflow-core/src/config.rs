//! Configuration schema (stmtflow.toml)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::dump::TextDumpOptions;
use crate::history::DigestOptions;

/// Default diff command used for `--diff`
pub const DEFAULT_DIFF_CMD: &str = "diff -u -N --color";

/// Default per-test execution timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn: Option<String>,

    /// Execution timeout for one test run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// External diff command; empty means the built-in unified diff
    #[serde(default = "default_diff_cmd")]
    pub diff_cmd: String,

    /// Fields compared by history assertions
    #[serde(default)]
    pub digest: DigestOptions,

    /// Text dump options for `play`
    #[serde(default)]
    pub dump: TextDumpOptions,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_diff_cmd() -> String {
    DEFAULT_DIFF_CMD.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dsn: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            diff_cmd: default_diff_cmd(),
            digest: DigestOptions::default(),
            dump: TextDumpOptions::default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.diff_cmd, "diff -u -N --color");
        assert!(config.digest.payload);
        assert!(config.dump.verbose);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            dsn = "mysql://root@127.0.0.1:4000/test"
            timeout_secs = 5

            [digest]
            payload = false
            "#,
        )
        .unwrap();

        assert_eq!(config.dsn.as_deref(), Some("mysql://root@127.0.0.1:4000/test"));
        assert_eq!(config.timeout_secs, 5);
        assert!(!config.digest.payload);
        assert!(config.digest.session);
        assert_eq!(config.diff_cmd, DEFAULT_DIFF_CMD);
    }

    #[test]
    fn invalid_toml() {
        let err = Config::from_toml("timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut config = Config::default();
        config.dsn = Some("mysql://localhost:4000".to_string());
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }
}
