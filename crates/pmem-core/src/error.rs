//! Error types for pmem

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PmemError>;

#[derive(Error, Debug)]
pub enum PmemError {
    /// Operation invoked outside the OPEN state, or with an invalid key.
    #[error("Usage error: {0}")]
    Usage(String),

    /// Dict-style read of a key that is not in the cache. Never falls back to
    /// the store.
    #[error("Key not found in cache: {0}")]
    KeyNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    /// Close gave up before the write queue drained.
    #[error("Shutdown incomplete, {} key(s) not written: {}", .keys.len(), .keys.join(", "))]
    ShutdownIncomplete { keys: Vec<String> },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for PmemError {
    fn from(e: sqlx::Error) -> Self {
        PmemError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for PmemError {
    fn from(e: serde_json::Error) -> Self {
        PmemError::Codec(e.to_string())
    }
}

impl From<config::ConfigError> for PmemError {
    fn from(e: config::ConfigError) -> Self {
        PmemError::Config(e.to_string())
    }
}
