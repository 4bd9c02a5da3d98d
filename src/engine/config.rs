//! Taskgate Configuration Module
//! Handles loading and validating taskgate.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::database::DEFAULT_POOL_SIZE;
use crate::engine::session::DEFAULT_TOKEN_TTL_SECS;

pub const CONFIG_FILE: &str = "taskgate.config.json";

/// Longest accepted token lifetime: one year.
pub const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub project: ProjectConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
    /// Role assigned to newly registered users, if it exists
    #[serde(default)]
    pub default_role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_port() -> u16 {
    54330
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_token_ttl() -> i64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_log_filter() -> String {
    "taskgate=info,tower_http=info".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            default_role: None,
        }
    }
}

impl AuthConfig {
    /// Token lifetime, clamped into `1..=MAX_TOKEN_TTL_SECS`.
    pub fn token_ttl(&self) -> chrono::Duration {
        let secs = self.token_ttl_secs.clamp(1, MAX_TOKEN_TTL_SECS);
        chrono::Duration::try_seconds(secs)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project(name: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            project: ProjectConfig {
                name: name.to_string(),
                id: format!("taskgate-{}", name),
            },
            database: DatabaseConfig {
                path: PathBuf::from("./data/taskgate.db"),
                pool_size: default_pool_size(),
            },
            api: ApiConfig {
                port: default_port(),
                host: default_host(),
                request_timeout_secs: default_request_timeout(),
            },
            auth: AuthConfig {
                token_ttl_secs: default_token_ttl(),
                default_role: Some("user".to_string()),
            },
            log: LogConfig::default(),
        }
    }

    /// Database path resolved against the project directory.
    pub fn database_path(&self, project_dir: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            project_dir.join(&self.database.path)
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        self.auth.token_ttl()
    }

    /// Overrides from `TASKGATE_TOKEN_TTL_SECS` and `TASKGATE_API_PORT`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("TASKGATE_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = parse_value("TASKGATE_TOKEN_TTL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("TASKGATE_API_PORT") {
            self.api.port = parse_value("TASKGATE_API_PORT", &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.auth.token_ttl_secs) {
            return Err(ConfigError::InvalidValue {
                key: "auth.token_ttl_secs".to_string(),
                value: self.auth.token_ttl_secs.to_string(),
            });
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.pool_size".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config = Config::default_for_project("demo");
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.project.name, "demo");
        assert_eq!(loaded.auth.default_role.as_deref(), Some("user"));
        assert_eq!(loaded.database_path(dir.path()), dir.path().join("./data/taskgate.db"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"version":"0.1.0","project":{"name":"p","id":"p"},"database":{"path":"db.sqlite"},"api":{}}"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.auth.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(config.database.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert!(config.auth.default_role.is_none());
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default_for_project("demo");
        config
            .apply_env(|key| match key {
                "TASKGATE_TOKEN_TTL_SECS" => Some("5".to_string()),
                "TASKGATE_API_PORT" => Some("8080".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.auth.token_ttl_secs, 5);
        assert_eq!(config.api.port, 8080);

        let err = config
            .apply_env(|key| (key == "TASKGATE_API_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_non_positive_ttl() {
        let mut config = Config::default_for_project("demo");
        config.auth.token_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_ttl_is_rejected() {
        let mut config = Config::default_for_project("demo");
        config
            .apply_env(|key| (key == "TASKGATE_TOKEN_TTL_SECS").then(|| i64::MAX.to_string()))
            .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
        // Never panics, even when validation was skipped
        assert_eq!(config.token_ttl(), chrono::Duration::seconds(MAX_TOKEN_TTL_SECS));

        config.auth.token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());
        config.auth.token_ttl_secs = MAX_TOKEN_TTL_SECS + 1;
        assert!(config.validate().is_err());
    }
}
