//! Fault-injecting stores for tests

use super::{InMemoryStore, KvStore};
use crate::{PmemError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every applied write in order; `None` marks a delete.
#[derive(Default)]
pub(crate) struct RecordingStore {
    pub(crate) inner: InMemoryStore,
    log: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingStore {
    pub(crate) fn log(&self) -> Vec<(String, Option<String>)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl KvStore for RecordingStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((key.to_string(), Some(value.to_string())));
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.log.lock().unwrap().push((key.to_string(), None));
        self.inner.delete(key).await
    }
}

/// Fails the next `failures` writes, then behaves. Reads always succeed.
pub(crate) struct FlakyStore {
    pub(crate) inner: InMemoryStore,
    failures: AtomicU32,
}

impl FlakyStore {
    pub(crate) fn new(failures: u32) -> Self {
        Self::wrapping(InMemoryStore::new(), failures)
    }

    pub(crate) fn wrapping(inner: InMemoryStore, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }

    pub(crate) fn heal(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        let tripped = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(PmemError::Storage("database is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }
}

/// Each write waits `delay`, before landing or, with `landing_first`, after
/// it. Schema setup waits too.
pub(crate) struct SlowStore {
    pub(crate) inner: InMemoryStore,
    delay: Duration,
    land_first: bool,
}

impl SlowStore {
    pub(crate) fn new(inner: InMemoryStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            land_first: false,
        }
    }

    /// The write commits at once but is acknowledged only after `delay`.
    pub(crate) fn landing_first(inner: InMemoryStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            land_first: true,
        }
    }

    async fn write<F>(&self, apply: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        if self.land_first {
            apply.await?;
            tokio::time::sleep(self.delay).await;
            Ok(())
        } else {
            tokio::time::sleep(self.delay).await;
            apply.await
        }
    }
}

#[async_trait]
impl KvStore for SlowStore {
    async fn init_schema(&self) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.write(self.inner.put(key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.write(self.inner.delete(key)).await
    }
}

/// Writes behave; every read fails.
#[derive(Default)]
pub(crate) struct BrokenReadStore {
    pub(crate) inner: InMemoryStore,
}

#[async_trait]
impl KvStore for BrokenReadStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(PmemError::Storage("disk I/O error".to_string()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}
