//! In-memory cache using DashMap
//!
//! Holds the last value this process saw for each key. It is never refreshed
//! from the store, so writes made by other processes are not visible here.

use dashmap::DashMap;
use serde_json::Value;

#[derive(Default)]
pub struct MemoryCache {
    data: DashMap<String, Value>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` is a miss; a cached JSON null is `Some(Value::Null)`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: String, value: Value) {
        self.data.insert(key, value);
    }

    /// Returns whether the key was present.
    pub fn delete(&self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}
