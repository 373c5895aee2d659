//! Runtime configuration for layout core hosts.
//!
//! # Responsibility
//! - Describe logging, storage and service tunables in one place.
//! - Load them from JSON and `LAYOUT_CORE_*` environment overrides.
//!
//! # Invariants
//! - Missing fields fall back to the same defaults the library uses.
//! - Invalid overrides are rejected, never silently ignored.

use crate::db::{DbOptions, DEFAULT_BUSY_TIMEOUT};
use crate::logging::default_log_level;
use crate::repo::layout_store::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::service::default_coordinator::DEFAULT_MAX_SWAP_ATTEMPTS;
use crate::service::layout_service::ServiceSettings;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "LAYOUT_CORE_";

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    InvalidOverride { key: String, value: String },
    InvalidValue(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidOverride { key, value } => {
                write!(f, "invalid value `{value}` for `{key}`")
            }
            Self::InvalidValue(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub log_level: String,
    /// Absolute directory for rolling logs; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    pub max_default_swap_attempts: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            db_path: None,
            busy_timeout_ms: u64::try_from(DEFAULT_BUSY_TIMEOUT.as_millis()).unwrap_or(5_000),
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
            max_default_swap_attempts: DEFAULT_MAX_SWAP_ATTEMPTS,
        }
    }
}

impl CoreConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `LAYOUT_CORE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(std::env::vars())
    }

    /// Applies `LAYOUT_CORE_*` overrides from `vars`; other keys are ignored.
    pub fn with_overrides<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "LOG_LEVEL" => self.log_level = value,
                "LOG_DIR" => self.log_dir = non_empty_path(&value),
                "DB_PATH" => self.db_path = non_empty_path(&value),
                "BUSY_TIMEOUT_MS" => self.busy_timeout_ms = parse_override(&key, &value)?,
                "DEFAULT_PAGE_LIMIT" => self.default_page_limit = parse_override(&key, &value)?,
                "MAX_PAGE_LIMIT" => self.max_page_limit = parse_override(&key, &value)?,
                "MAX_DEFAULT_SWAP_ATTEMPTS" => {
                    self.max_default_swap_attempts = parse_override(&key, &value)?
                }
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_limit == 0 {
            return Err(ConfigError::InvalidValue("max_page_limit must be positive"));
        }
        if self.default_page_limit == 0 || self.default_page_limit > self.max_page_limit {
            return Err(ConfigError::InvalidValue(
                "default_page_limit must be within 1..=max_page_limit",
            ));
        }
        if self.max_default_swap_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_default_swap_attempts must be positive",
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("busy_timeout_ms must be positive"));
        }
        Ok(())
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            default_page_limit: self.default_page_limit,
            max_page_limit: self.max_page_limit,
            max_default_swap_attempts: self.max_default_swap_attempts,
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_json_yields_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.db_options().busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn json_fields_override_defaults() {
        let config = CoreConfig::from_json_str(
            r#"{"db_path": "/tmp/layouts.db", "default_page_limit": 20, "max_page_limit": 50}"#,
        )
        .unwrap();
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/layouts.db")));
        assert_eq!(config.service_settings().default_page_limit, 20);
        assert_eq!(config.service_settings().max_page_limit, 50);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = CoreConfig::from_json_str(r#"{"page_size": 3}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let vars = vec![
            ("LAYOUT_CORE_BUSY_TIMEOUT_MS".to_string(), "250".to_string()),
            ("LAYOUT_CORE_LOG_LEVEL".to_string(), "warn".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let config = CoreConfig::default().with_overrides(vars).unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.log_level, "warn");

        let bad = vec![("LAYOUT_CORE_MAX_PAGE_LIMIT".to_string(), "lots".to_string())];
        let err = CoreConfig::default().with_overrides(bad).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn default_limit_above_max_is_invalid() {
        let err =
            CoreConfig::from_json_str(r#"{"default_page_limit": 80, "max_page_limit": 40}"#)
                .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
