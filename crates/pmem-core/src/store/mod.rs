//! Backing store layer
//!
//! A store only knows row keys and encoded values. Hashing, caching and
//! write ordering all happen above it.

pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::Result;
use async_trait::async_trait;

/// Durable key-value backend
///
/// Every operation is atomic for its single row. There are no cross-key
/// transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Create the key-value table if it is missing. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace the row for `key`.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the row for `key`; absent keys are a no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Release the underlying connection.
    async fn close(&self) {}
}
