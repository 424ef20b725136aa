//! Bookkeeping for queued intents: pending counts, dirty keys and totals

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared between the facade (enqueue side) and the write worker.
#[derive(Default)]
pub struct IntentTracker {
    pending: DashMap<String, usize>,
    dirty: DashSet<String>,
    applied: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the write pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub pending: usize,
    pub dirty: usize,
    pub applied: u64,
    pub failed: u64,
}

impl IntentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self, key: &str) {
        *self.pending.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Undo `begin` for an intent that never reached the queue.
    pub(crate) fn abandon(&self, key: &str) {
        self.release(key);
    }

    pub(crate) fn applied(&self, key: &str) {
        self.release(key);
        self.dirty.remove(key);
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self, key: &str) {
        self.release(key);
        self.dirty.insert(key.to_string());
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_dirty(&self, keys: &[String]) {
        for key in keys {
            self.dirty.insert(key.clone());
        }
    }

    fn release(&self, key: &str) {
        if let Some(mut count) = self.pending.get_mut(key) {
            *count = count.saturating_sub(1);
        }
        self.pending.remove_if(key, |_, count| *count == 0);
    }

    /// Whether any intent for `key` is still waiting to be applied.
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.dirty.contains(key)
    }

    /// Number of queued intents across all keys
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| *entry.value()).sum()
    }

    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Keys whose cached value is not confirmed durable.
    pub fn dirty_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.dirty.iter().map(|k| k.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            pending: self.pending_count(),
            dirty: self.dirty.len(),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
