//! PersistentMemory: an in-memory cache in front of a write-behind store
//!
//! Lifecycle is `closed -> open -> closed`, and the final close is terminal.
//! Every data operation requires the open state and fails with
//! [`PmemError::Usage`] otherwise.
//!
//! Writes update the cache and enqueue an intent; they never wait on storage.
//! Reads consult the cache first and fall back to a direct store read on a
//! miss. The cache is always ahead of, or equal to, the store.
//!
//! The dict-style methods ([`PersistentMemory::set`], [`PersistentMemory::get`],
//! [`PersistentMemory::remove`]) are synchronous. `get` only looks at the
//! cache and returns [`PmemError::KeyNotFound`] on a miss even if the store
//! has the key; use [`PersistentMemory::load`] to reach the store.

use crate::cache::MemoryCache;
use crate::codec;
use crate::config::MemoryConfig;
use crate::error::{PmemError, Result};
use crate::key;
use crate::queue::{FailureHook, WriteFailure, WriteQueue};
use crate::retry::RetryPolicy;
use crate::store::{KvStore, SqliteStore};
use crate::tracker::IntentTracker;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

enum Lifecycle {
    /// Not opened yet. Holds the injected store, if any.
    Ready(Option<Arc<dyn KvStore>>),
    Opening,
    Open(OpenState),
    Closed,
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Ready(_) => "not open",
            Lifecycle::Opening => "opening",
            Lifecycle::Open(_) => "open",
            Lifecycle::Closed => "closed",
        }
    }
}

struct OpenState {
    store: Arc<dyn KvStore>,
    queue: WriteQueue,
}

/// Returns the handle to `Ready` if `open` fails or its future is dropped
/// before the store is connected.
struct OpenGuard<'a> {
    state: &'a RwLock<Lifecycle>,
    injected: Option<Option<Arc<dyn KvStore>>>,
}

impl OpenGuard<'_> {
    fn disarm(mut self) {
        self.injected = None;
    }
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        if let Some(store) = self.injected.take() {
            *self.state.write().unwrap_or_else(|e| e.into_inner()) = Lifecycle::Ready(store);
        }
    }
}

/// Diagnostics for a memory instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub cached: usize,
    pub pending: usize,
    pub dirty: usize,
    pub applied: u64,
    pub failed: u64,
}

pub struct PersistentMemory {
    config: MemoryConfig,
    cache: MemoryCache,
    tracker: Arc<IntentTracker>,
    on_failure: Option<FailureHook>,
    state: RwLock<Lifecycle>,
    /// Serializes cache mutation with enqueueing; counts writes so a slow
    /// store read can tell whether it raced with one.
    writes: Mutex<u64>,
}

impl PersistentMemory {
    /// A closed handle backed by SQLite at `config.database_path`.
    pub fn new(config: MemoryConfig) -> Self {
        Self::build(config, None)
    }

    /// A closed handle backed by `store` instead of SQLite.
    pub fn with_store(config: MemoryConfig, store: Arc<dyn KvStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: MemoryConfig, store: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            config,
            cache: MemoryCache::new(),
            tracker: Arc::new(IntentTracker::new()),
            on_failure: None,
            state: RwLock::new(Lifecycle::Ready(store)),
            writes: Mutex::new(0),
        }
    }

    /// Called from the write worker when a write exhausts its retries.
    pub fn on_write_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WriteFailure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    /// Open a SQLite-backed memory at `path` with default settings.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let memory = Self::new(MemoryConfig::at(path.as_ref()));
        memory.open().await?;
        Ok(memory)
    }

    /// Open, run `f`, and close on every exit path. An error from `f` takes
    /// precedence over an error from closing.
    pub async fn with_memory<F, Fut, T>(config: MemoryConfig, f: F) -> Result<T>
    where
        F: FnOnce(Arc<PersistentMemory>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        Self::new(config).scoped(f).await
    }

    /// Like [`PersistentMemory::with_memory`] for an already built handle.
    pub async fn scoped<F, Fut, T>(self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<PersistentMemory>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let memory = Arc::new(self);
        memory.open().await?;

        let result = f(memory.clone()).await;
        let closed = memory.close().await;

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Close after failed scope also failed: {}", close_err);
                Err(e)
            }
        }
    }

    /// Initialize the schema and start the write worker. Opening an open
    /// memory is a no-op; opening a closed one is a usage error.
    pub async fn open(&self) -> Result<()> {
        let injected = {
            let mut state = self.write_state();
            match std::mem::replace(&mut *state, Lifecycle::Opening) {
                Lifecycle::Ready(store) => store,
                other => {
                    let already_open = matches!(other, Lifecycle::Open(_));
                    let name = other.name();
                    *state = other;
                    if already_open {
                        return Ok(());
                    }
                    return Err(PmemError::Usage(format!("cannot open memory that is {}", name)));
                }
            }
        };

        let guard = OpenGuard {
            state: &self.state,
            injected: Some(injected.clone()),
        };
        let store = self.connect(injected).await?;
        let queue = WriteQueue::start(
            store.clone(),
            RetryPolicy::from(&self.config.retry),
            self.tracker.clone(),
            self.on_failure.clone(),
        );
        *self.write_state() = Lifecycle::Open(OpenState { store, queue });
        guard.disarm();

        info!(
            "Persistent memory open (keys: {})",
            self.config.key_encoding
        );
        Ok(())
    }

    async fn connect(&self, injected: Option<Arc<dyn KvStore>>) -> Result<Arc<dyn KvStore>> {
        let store: Arc<dyn KvStore> = match injected {
            Some(store) => store,
            None => Arc::new(SqliteStore::connect(&self.config).await?),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.read_state(), Lifecycle::Open(_))
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Cache the value and queue it for the store. Returns without waiting
    /// for durability.
    pub async fn save<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.set(key, value)
    }

    /// The cached value, else the stored one, else `default`. A default is
    /// never cached, so the next miss reads the store again.
    pub async fn load<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: DeserializeOwned,
    {
        Ok(self.try_load(key).await?.unwrap_or(default))
    }

    /// Like [`PersistentMemory::load`] with `None` for an absent key.
    pub async fn try_load<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        key::validate(key)?;
        let store = self.with_open("load", |open| Ok(open.store.clone()))?;
        let writes_before = *self.lock_writes();

        if let Some(value) = self.cache.get(key) {
            debug!("Loaded {} from memory", key);
            return codec::from_value(value).map(Some);
        }

        // A miss with a queued or failed intent means the newest intent is a
        // delete; the store row, if any, is older than it.
        if self.tracker.is_pending(key) || self.tracker.is_dirty(key) {
            debug!("{} has an unapplied delete", key);
            return Ok(None);
        }

        let storage_key = self.config.key_encoding.storage_key(key);
        let Some(column) = store.get(&storage_key).await? else {
            debug!("{} not found in store", key);
            return Ok(None);
        };
        let value = codec::decode(&column)?;

        let writes = self.lock_writes();
        if *writes != writes_before {
            // A write landed in the cache during the read and is newer.
            drop(writes);
            let newest = self.cache.get(key).unwrap_or(value);
            return codec::from_value(newest).map(Some);
        }
        self.cache.set(key.to_string(), value.clone());
        drop(writes);

        debug!("Loaded {} from store", key);
        codec::from_value(value).map(Some)
    }

    /// Drop the key from the cache and queue a delete for the store.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.remove(key)
    }

    /// Wait until everything queued so far has reached the store, or has
    /// exhausted its retries.
    pub async fn flush(&self) -> Result<()> {
        let waiter = self.with_open("flush", |open| open.queue.request_flush())?;
        waiter.wait().await
    }

    /// Dict-style assignment: same effect as [`PersistentMemory::save`].
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        key::validate(key)?;
        let value = codec::to_value(value)?;
        let encoded = codec::encode(&value)?;
        let storage_key = self.config.key_encoding.storage_key(key);

        self.with_open("save", |open| {
            let mut writes = self.lock_writes();
            debug!("Saving {} to memory", key);
            self.cache.set(key.to_string(), value);
            open.queue.enqueue_upsert(key, storage_key, encoded)?;
            *writes += 1;
            Ok(())
        })
    }

    /// Dict-style read. Cache only; never touches the store.
    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        key::validate(key)?;
        self.with_open("read", |_| {
            let value = self
                .cache
                .get(key)
                .ok_or_else(|| PmemError::KeyNotFound(key.to_string()))?;
            codec::from_value(value)
        })
    }

    /// Dict-style deletion: same effect as [`PersistentMemory::delete`].
    /// Absent keys still queue a delete, since the store may hold them.
    pub fn remove(&self, key: &str) -> Result<()> {
        key::validate(key)?;
        let storage_key = self.config.key_encoding.storage_key(key);

        self.with_open("delete", |open| {
            let mut writes = self.lock_writes();
            debug!("Deleting {} from memory", key);
            self.cache.delete(key);
            open.queue.enqueue_delete(key, storage_key)?;
            *writes += 1;
            Ok(())
        })
    }

    /// Cache membership only.
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        key::validate(key)?;
        self.with_open("read", |_| Ok(self.cache.contains(key)))
    }

    /// Keys whose cached value never reached the store. Still available
    /// after close.
    pub fn dirty_keys(&self) -> Vec<String> {
        self.tracker.dirty_keys()
    }

    pub fn stats(&self) -> MemoryStats {
        let snapshot = self.tracker.snapshot();
        MemoryStats {
            cached: self.cache.len(),
            pending: snapshot.pending,
            dirty: snapshot.dirty,
            applied: snapshot.applied,
            failed: snapshot.failed,
        }
    }

    /// Drain every queued intent, then release the store. Waits as long as
    /// the drain takes.
    pub async fn close(&self) -> Result<()> {
        self.shutdown(None).await
    }

    /// Drain for at most `deadline`. Keys still queued when it expires are
    /// reported in [`PmemError::ShutdownIncomplete`] and marked dirty. The
    /// memory is closed either way.
    ///
    /// The write in flight at the deadline is reported too, even though it
    /// may still reach the store.
    pub async fn close_within(&self, deadline: Duration) -> Result<()> {
        self.shutdown(Some(deadline)).await
    }

    async fn shutdown(&self, deadline: Option<Duration>) -> Result<()> {
        let open = {
            let mut state = self.write_state();
            match std::mem::replace(&mut *state, Lifecycle::Closed) {
                Lifecycle::Open(open) => open,
                Lifecycle::Opening => {
                    *state = Lifecycle::Opening;
                    return Err(PmemError::Usage(
                        "cannot close memory that is opening".to_string(),
                    ));
                }
                Lifecycle::Ready(_) | Lifecycle::Closed => return Ok(()),
            }
        };

        info!(
            "Closing persistent memory ({} pending writes)",
            self.tracker.pending_count()
        );

        let drained = open.queue.shutdown(deadline).await;
        open.store.close().await;
        self.cache.clear();

        let dirty = self.tracker.dirty_keys();
        if !dirty.is_empty() {
            warn!(
                "Closed with {} key(s) not durable: {}",
                dirty.len(),
                dirty.join(", ")
            );
        }

        info!("Persistent memory closed");
        drained
    }

    fn with_open<R>(&self, action: &str, f: impl FnOnce(&OpenState) -> Result<R>) -> Result<R> {
        let state = self.read_state();
        match &*state {
            Lifecycle::Open(open) => f(open),
            other => Err(PmemError::Usage(format!(
                "cannot {} while memory is {}",
                action,
                other.name()
            ))),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_writes(&self) -> MutexGuard<'_, u64> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PersistentMemory {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Lifecycle::Open(_) = state {
            warn!(
                "PersistentMemory dropped without close; {} queued write(s) continue in the background",
                self.tracker.pending_count()
            );
        }
    }
}
