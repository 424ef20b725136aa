//! pmem - persistent memory
//!
//! A key-value facade over an embedded SQLite store. Saves update an
//! in-memory cache and return at once; a background worker writes them
//! through in order. Loads are served from the cache and fall back to the
//! store on a miss.
//!
//! ```no_run
//! use pmem_core::{MemoryConfig, PersistentMemory};
//!
//! # async fn demo() -> pmem_core::Result<()> {
//! PersistentMemory::with_memory(MemoryConfig::at("my_custom_database.db"), |mem| async move {
//!     mem.save("test_key", "test_value").await?;
//!     let counter: i64 = mem.load("counter", 0).await?;
//!     mem.save("counter", &(counter + 1)).await?;
//!     Ok(())
//! })
//! .await
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod memory;
pub mod queue;
pub mod retry;
pub mod store;
pub mod tracker;

pub use config::{MemoryConfig, RetryConfig};
pub use error::{PmemError, Result};
pub use key::KeyEncoding;
pub use memory::{MemoryStats, PersistentMemory};
pub use queue::{IntentKind, WriteFailure};
pub use store::{InMemoryStore, KvStore, SqliteStore};
