use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{BASICS_DATASET_URL, RATINGS_DATASET_URL, TMDB_API_BASE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Datasets
    pub dataset_dir: PathBuf,
    pub ratings_url: String,
    pub basics_url: String,
    pub min_votes: i64,

    // TMDB
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub tmdb_image_size: String,

    // Job queue
    pub poll_interval: Duration,
    pub max_attempts: i32,
    pub retry_base_delay_ms: u64,
    pub completed_retention: i64,
    pub failed_retention: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/catalog.sqlite")),

            // Datasets
            dataset_dir: PathBuf::from(env_or_default("DATASET_DIR", "./data/datasets")),
            ratings_url: env_or_default("RATINGS_DATASET_URL", RATINGS_DATASET_URL),
            basics_url: env_or_default("BASICS_DATASET_URL", BASICS_DATASET_URL),
            min_votes: parse_env_i64("TOP_LIST_MIN_VOTES", 25_000)?,

            // TMDB
            tmdb_api_key: required_env("TMDB_API_KEY")?,
            tmdb_base_url: env_or_default("TMDB_BASE_URL", TMDB_API_BASE),
            tmdb_image_size: env_or_default("TMDB_IMAGE_SIZE", "w500"),

            // Job queue
            poll_interval: Duration::from_secs(parse_env_u64("QUEUE_POLL_INTERVAL_SECS", 5)?),
            max_attempts: parse_env_i32("JOB_MAX_ATTEMPTS", 5)?,
            retry_base_delay_ms: parse_env_u64("JOB_RETRY_BASE_DELAY_MS", 1000)?,
            completed_retention: parse_env_i64("JOB_COMPLETED_RETENTION", 100)?,
            failed_retention: parse_env_i64("JOB_FAILED_RETENTION", 200)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tmdb_api_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "TMDB_API_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.min_votes < 1 {
            return Err(ConfigError::InvalidValue {
                name: "TOP_LIST_MIN_VOTES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidValue {
                name: "JOB_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Construct a configuration suitable for tests.
    ///
    /// Points at throwaway paths and uses a zero retry delay so queue tests
    /// don't have to wait out real backoff windows.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            dataset_dir: PathBuf::from("./data/datasets"),
            ratings_url: RATINGS_DATASET_URL.to_string(),
            basics_url: BASICS_DATASET_URL.to_string(),
            min_votes: 25_000,
            tmdb_api_key: "test-api-key".to_string(),
            tmdb_base_url: TMDB_API_BASE.to_string(),
            tmdb_image_size: "w500".to_string(),
            poll_interval: Duration::from_millis(10),
            max_attempts: 5,
            retry_base_delay_ms: 0,
            completed_retention: 100,
            failed_retention: 200,
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_i32(name: &str, default: i32) -> Result<i32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_i64_default() {
        assert_eq!(parse_env_i64("NONEXISTENT_VAR", 25_000).unwrap(), 25_000);
    }

    #[test]
    fn test_for_testing_validates() {
        let config = Config::for_testing();
        config.validate().unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_overrides() {
        std::env::set_var("TMDB_API_KEY", "test-key");
        std::env::set_var("TOP_LIST_MIN_VOTES", "1000");

        let config = Config::from_env().unwrap();
        assert_eq!(config.tmdb_api_key, "test-key");
        assert_eq!(config.min_votes, 1000);

        std::env::remove_var("TMDB_API_KEY");
        std::env::remove_var("TOP_LIST_MIN_VOTES");
    }

    #[test]
    fn test_validate_rejects_zero_min_votes() {
        let config = Config {
            min_votes: 0,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }
}
