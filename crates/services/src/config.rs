//! Process configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `EXAM_*` environment variables. The result is validated once at startup and
//! handed to [`ExamServices`](crate::ExamServices) by value.
//!
//! ```toml
//! database_url = "sqlite://exam.sqlite3"
//! question_count = 60
//! allowed_choices = "ABCDE"
//!
//! [pool]
//! max_connections = 5
//! acquire_timeout_secs = 5
//! ```

use std::path::Path;

use exam_core::model::{BatchRules, ChoiceAlphabet, DEFAULT_QUESTION_COUNT};
use serde::Deserialize;
use storage::sqlite::PoolSettings;

use crate::error::ConfigError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExamConfig {
    pub database_url: String,
    pub pool: PoolSettings,
    /// Exact number of answers a submission must carry.
    pub question_count: usize,
    /// When set, choices outside these characters are rejected.
    /// Unset means any single character is stored as sent.
    pub allowed_choices: Option<String>,
    /// Default filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://exam.sqlite3".to_string(),
            pool: PoolSettings::default(),
            question_count: DEFAULT_QUESTION_COUNT,
            allowed_choices: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ExamConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or mistyped values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Defaults, overlaid by `path` (if any), overlaid by the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, an
    /// environment value is malformed, or the result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `EXAM_*` variables using `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` for values that do not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, raw })
        }

        if let Some(url) = lookup("EXAM_DB_URL") {
            self.database_url = url;
        }
        if let Some(raw) = lookup("EXAM_MAX_CONNECTIONS") {
            self.pool.max_connections = parse("EXAM_MAX_CONNECTIONS", raw)?;
        }
        if let Some(raw) = lookup("EXAM_ACQUIRE_TIMEOUT_SECS") {
            self.pool.acquire_timeout_secs = parse("EXAM_ACQUIRE_TIMEOUT_SECS", raw)?;
        }
        if let Some(raw) = lookup("EXAM_QUESTION_COUNT") {
            self.question_count = parse("EXAM_QUESTION_COUNT", raw)?;
        }
        if let Some(raw) = lookup("EXAM_ALLOWED_CHOICES") {
            self.allowed_choices = Some(raw).filter(|s| !s.trim().is_empty());
        }
        if let Some(level) = lookup("EXAM_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(raw) = lookup("EXAM_LOG_FORMAT") {
            self.log_format = match raw.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "EXAM_LOG_FORMAT",
                        raw,
                    });
                }
            };
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an empty database URL or zero
    /// connections, and `ConfigError::Rules` for a zero question count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".into()));
        }
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_connections must be positive".into(),
            ));
        }
        self.batch_rules()?;
        Ok(())
    }

    /// Submission rules derived from `question_count` and `allowed_choices`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Rules` when `question_count` is zero.
    pub fn batch_rules(&self) -> Result<BatchRules, ConfigError> {
        let alphabet = self.allowed_choices.as_deref().map(ChoiceAlphabet::new);
        Ok(BatchRules::new(self.question_count, alphabet)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ExamConfig::default();
        config.validate().unwrap();
        assert_eq!(config.question_count, 60);
        assert!(config.batch_rules().unwrap().alphabet().is_none());
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let config = ExamConfig::from_toml_str(
            r#"
            database_url = "sqlite::memory:"
            allowed_choices = "ABCDE"

            [pool]
            max_connections = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.pool.max_connections, 2);
        assert_eq!(config.pool.acquire_timeout_secs, 5);
        assert_eq!(config.question_count, 60);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.batch_rules().unwrap().alphabet().is_some());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("EXAM_DB_URL", "sqlite://other.db"),
            ("EXAM_QUESTION_COUNT", " 40 "),
            ("EXAM_LOG_FORMAT", "JSON"),
            ("EXAM_ALLOWED_CHOICES", ""),
        ]
        .into_iter()
        .collect();

        let mut config = ExamConfig {
            allowed_choices: Some("AB".into()),
            ..ExamConfig::default()
        };
        config
            .apply_env(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.database_url, "sqlite://other.db");
        assert_eq!(config.question_count, 40);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.allowed_choices, None);
    }

    #[test]
    fn malformed_env_is_reported_with_its_key() {
        let mut config = ExamConfig::default();
        let err = config
            .apply_env(|key| (key == "EXAM_QUESTION_COUNT").then(|| "sixty".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                key: "EXAM_QUESTION_COUNT",
                ..
            }
        ));
    }

    #[test]
    fn zero_question_count_fails_validation() {
        let config = ExamConfig {
            question_count: 0,
            ..ExamConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Rules(_))));
    }
}
