//! Configuration loading for the accord engine.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `ACCORD_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Application configuration derived from `ACCORD_*` environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub profile: String,
    pub log_level: String,
    pub log_format: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_ms: u64,
    /// Base URL of the remote store's data API.
    pub remote_base_url: String,
    pub remote_username: String,
    #[serde(skip_serializing)]
    pub remote_password: String,
    /// Connection pool size for the remote store client; bounds how many
    /// concurrent requests a run issues against the remote store.
    pub remote_pool_size: usize,
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/accord".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: 10,
            db_acquire_timeout_ms: 5_000,
            remote_base_url: "http://localhost:9000".to_string(),
            remote_username: String::new(),
            remote_password: String::new(),
            remote_pool_size: 5,
        }
    }
}

impl AppConfig {
    /// Validate configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "DB_MAX_CONNECTIONS".to_string(),
                value: self.db_max_connections.to_string(),
            });
        }
        if self.remote_pool_size == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "REMOTE_POOL_SIZE".to_string(),
                value: self.remote_pool_size.to_string(),
            });
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }
        Url::parse(&self.remote_base_url).map_err(|source| ConfigError::InvalidRemoteUrl {
            value: self.remote_base_url.clone(),
            source,
        })?;
        Ok(())
    }

    /// Serialized configuration with secrets omitted, for startup logging.
    pub fn redacted_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for ACCORD_{key}")]
    InvalidNumber { key: String, value: String },
    #[error("database URL cannot be empty")]
    EmptyDatabaseUrl,
    #[error("invalid log format '{value}', expected 'json' or 'text'")]
    InvalidLogFormat { value: String },
    #[error("invalid remote base URL '{value}': {source}")]
    InvalidRemoteUrl {
        value: String,
        source: url::ParseError,
    },
}

/// Loads configuration from layered `.env` files and process environment.
///
/// Layering order, later wins: `.env`, `.env.<profile>`, process env.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at an explicit directory.
    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut layered: BTreeMap<String, String> = BTreeMap::new();

        self.merge_env_file(&mut layered, ".env")?;

        let profile = env::var("ACCORD_PROFILE")
            .ok()
            .or_else(|| layered.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);
        self.merge_env_file(&mut layered, &format!(".env.{profile}"))?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("ACCORD_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let defaults = AppConfig::default();
        let config = AppConfig {
            profile,
            log_level: take(&layered, "LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: take(&layered, "LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: take(&layered, "DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: parse(&layered, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_acquire_timeout_ms: parse(
                &layered,
                "DB_ACQUIRE_TIMEOUT_MS",
                defaults.db_acquire_timeout_ms,
            )?,
            remote_base_url: take(&layered, "REMOTE_BASE_URL").unwrap_or(defaults.remote_base_url),
            remote_username: take(&layered, "REMOTE_USERNAME").unwrap_or_default(),
            remote_password: take(&layered, "REMOTE_PASSWORD").unwrap_or_default(),
            remote_pool_size: parse(&layered, "REMOTE_POOL_SIZE", defaults.remote_pool_size)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn merge_env_file(
        &self,
        layered: &mut BTreeMap<String, String>,
        name: &str,
    ) -> Result<(), ConfigError> {
        let path = self.base_dir.join(name);
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("ACCORD_") {
                        layered.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take(layered: &BTreeMap<String, String>, key: &str) -> Option<String> {
    layered.get(key).map(|value| value.trim().to_string())
}

fn parse<T: std::str::FromStr>(
    layered: &BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match take(layered, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_database_url() {
        let config = AppConfig {
            database_url: "  ".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDatabaseUrl)
        ));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let config = AppConfig {
            log_format: "yaml".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogFormat { .. })
        ));
    }

    #[test]
    fn rejects_zero_pool_sizes() {
        let config = AppConfig {
            remote_pool_size: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            db_max_connections: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unparseable_remote_url() {
        let config = AppConfig {
            remote_base_url: "not a url".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRemoteUrl { .. })
        ));
    }

    #[test]
    fn redacted_json_omits_password() {
        let config = AppConfig {
            remote_password: "s3cret".to_string(),
            ..AppConfig::default()
        };
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("remote_base_url"));
    }
}
