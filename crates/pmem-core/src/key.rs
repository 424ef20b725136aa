//! Mapping from caller keys to row keys

use crate::error::{PmemError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// How a caller key is turned into the store's primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    /// Hex SHA-512 digest of the key
    #[default]
    Sha512,
    /// Key stored verbatim
    Plain,
}

impl KeyEncoding {
    pub fn storage_key(&self, key: &str) -> String {
        match self {
            KeyEncoding::Sha512 => hex::encode(Sha512::digest(key.as_bytes())),
            KeyEncoding::Plain => key.to_string(),
        }
    }
}

impl std::fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyEncoding::Sha512 => write!(f, "sha512"),
            KeyEncoding::Plain => write!(f, "plain"),
        }
    }
}

pub(crate) fn validate(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(PmemError::Usage("key must not be empty".to_string()));
    }
    Ok(())
}
