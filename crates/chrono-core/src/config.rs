//! Runtime configuration (C9, ambient).
//!
//! Mirrors the teacher's `AppConfig`/`LoadOptions`/`ConfigOverrides` shape:
//! an optional TOML file merged with `CHRONO_*` environment variable
//! overrides, falling back to in-code defaults when no file is required.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output format for `tracing_subscriber`, same three variants the teacher
/// offers its embedding binaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::default() }
    }
}

/// Default values for `SimpleProcessor`'s configuration table, overridable
/// once at the embedding-program level instead of per-registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessorDefaults {
    pub claim_interval_ms: u64,
    pub idle_interval_ms: u64,
    pub task_handler_timeout_ms: u64,
    pub claim_stale_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for ProcessorDefaults {
    fn default() -> Self {
        Self {
            claim_interval_ms: 1000,
            idle_interval_ms: 5000,
            task_handler_timeout_ms: 30_000,
            claim_stale_timeout_ms: 60_000,
            max_retries: 10,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub defaults: ProcessorDefaults,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub env: HashMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    ParseFile { path: PathBuf, #[source] source: toml::de::Error },
    #[error("config file {0} was required but does not exist")]
    MissingConfigFile(PathBuf),
    #[error("invalid override for {key}: {value}")]
    InvalidOverride { key: String, value: String },
}

impl RuntimeConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = match &options.config_path {
            Some(path) => Self::read_file(path, options.require_file)?,
            None => RuntimeConfig::default(),
        };

        config.apply_overrides(&options.overrides)?;
        Ok(config)
    }

    fn read_file(path: &Path, require_file: bool) -> Result<Self, ConfigError> {
        if !path.exists() {
            if require_file {
                return Err(ConfigError::MissingConfigFile(path.to_path_buf()));
            }
            return Ok(RuntimeConfig::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(level) = overrides.env.get("CHRONO_LOG_LEVEL") {
            self.logging.level = level.clone();
        }

        if let Some(format) = overrides.env.get("CHRONO_LOG_FORMAT") {
            self.logging.format = match format.as_str() {
                "compact" => LogFormat::Compact,
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::InvalidOverride {
                        key: "CHRONO_LOG_FORMAT".to_string(),
                        value: other.to_string(),
                    })
                }
            };
        }

        if let Some(value) = overrides.env.get("CHRONO_MAX_RETRIES") {
            self.defaults.max_retries = value.parse().map_err(|_| ConfigError::InvalidOverride {
                key: "CHRONO_MAX_RETRIES".to_string(),
                value: value.clone(),
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_processor_defaults_table() {
        let config = RuntimeConfig::default();
        assert_eq!(config.defaults.claim_interval_ms, 1000);
        assert_eq!(config.defaults.idle_interval_ms, 5000);
        assert_eq!(config.defaults.max_retries, 10);
    }

    #[test]
    fn missing_optional_file_falls_back_to_defaults() {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/chrono.toml")),
            require_file: false,
            overrides: ConfigOverrides::default(),
        };

        let config = RuntimeConfig::load(options).expect("falls back without erroring");
        assert_eq!(config.defaults.max_retries, 10);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/chrono.toml")),
            require_file: true,
            overrides: ConfigOverrides::default(),
        };

        assert!(matches!(RuntimeConfig::load(options), Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn env_override_changes_log_level() {
        let mut overrides = ConfigOverrides::default();
        overrides.env.insert("CHRONO_LOG_LEVEL".to_string(), "debug".to_string());

        let options = LoadOptions { config_path: None, require_file: false, overrides };
        let config = RuntimeConfig::load(options).expect("valid overrides apply");

        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn invalid_log_format_override_is_rejected() {
        let mut overrides = ConfigOverrides::default();
        overrides.env.insert("CHRONO_LOG_FORMAT".to_string(), "xml".to_string());

        let options = LoadOptions { config_path: None, require_file: false, overrides };
        assert!(matches!(RuntimeConfig::load(options), Err(ConfigError::InvalidOverride { .. })));
    }
}
