//! Configuration for a persistent memory instance

use crate::error::Result;
use crate::key::KeyEncoding;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `PMEM_DATABASE_PATH`, `PMEM_RETRY__MAX_RETRIES`.
pub const ENV_PREFIX: &str = "PMEM";

/// Default database file, relative to the working directory
pub const DEFAULT_DATABASE_FILE: &str = "persistent_memory.db";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub database_path: PathBuf,
    pub key_encoding: KeyEncoding,
    pub busy_timeout_ms: u64,
    /// Create the database file's parent directory on open
    pub create_dirs: bool,
    pub retry: RetryConfig,
}

/// Backoff for failed background writes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            key_encoding: KeyEncoding::default(),
            busy_timeout_ms: 5000,
            create_dirs: true,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl MemoryConfig {
    /// Defaults, pointed at `database_path`
    pub fn at(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Load from an optional config file, then `PMEM_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn with_key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.retry = RetryConfig {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
        };
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PmemError;

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.database_path, PathBuf::from("persistent_memory.db"));
        assert_eq!(config.key_encoding, KeyEncoding::Sha512);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(100));
        assert!(config.create_dirs);
    }

    #[test]
    fn test_builder_helpers() {
        let config = MemoryConfig::at("/tmp/x.db")
            .with_key_encoding(KeyEncoding::Plain)
            .with_retry(1, Duration::from_millis(5));
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.key_encoding, KeyEncoding::Plain);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay_ms, 5);
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pmem.toml");
        std::fs::write(
            &path,
            "database_path = \"data/app.db\"\nkey_encoding = \"plain\"\n\n[retry]\nmax_retries = 7\n",
        )
        .unwrap();

        let config = MemoryConfig::load_with_prefix(Some(&path), "PMEM_TEST_FILE").unwrap();
        assert_eq!(config.database_path, PathBuf::from("data/app.db"));
        assert_eq!(config.key_encoding, KeyEncoding::Plain);
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("PMEM_TEST_ENV_BUSY_TIMEOUT_MS", "250");
        std::env::set_var("PMEM_TEST_ENV_RETRY__BASE_DELAY_MS", "9");

        let config = MemoryConfig::load_with_prefix(None, "PMEM_TEST_ENV").unwrap();
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.retry.base_delay_ms, 9);

        std::env::remove_var("PMEM_TEST_ENV_BUSY_TIMEOUT_MS");
        std::env::remove_var("PMEM_TEST_ENV_RETRY__BASE_DELAY_MS");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = MemoryConfig::load_with_prefix(
            Some(Path::new("/nonexistent/pmem.toml")),
            "PMEM_TEST_MISSING",
        )
        .unwrap_err();
        assert!(matches!(err, PmemError::Config(_)));
    }
}
