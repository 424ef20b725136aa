//! In-process store using DashMap
//!
//! Clones share the same rows, so a clone handed to a second
//! `PersistentMemory` behaves like reopening the same database file.

use super::KvStore;
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    rows: Arc<DashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.rows.get(key).map(|row| row.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.rows.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.rows.remove(key);
        Ok(())
    }
}
