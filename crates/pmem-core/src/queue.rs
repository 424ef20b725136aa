//! Write-behind queue
//!
//! Callers enqueue intents without waiting on storage. A single worker task
//! drains the channel in FIFO order and applies each intent before reading the
//! next, so writes to one key land in the order they were issued.
//!
//! The queue is unbounded: if the store is persistently slower than the
//! caller, memory grows rather than `enqueue` blocking.

use crate::error::{PmemError, Result};
use crate::retry::RetryPolicy;
use crate::store::KvStore;
use crate::tracker::IntentTracker;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOp {
    /// Encoded value for the row
    Upsert(String),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Upsert,
    Delete,
}

impl IntentOp {
    pub fn kind(&self) -> IntentKind {
        match self {
            IntentOp::Upsert(_) => IntentKind::Upsert,
            IntentOp::Delete => IntentKind::Delete,
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentKind::Upsert => write!(f, "upsert"),
            IntentKind::Delete => write!(f, "delete"),
        }
    }
}

/// A write or delete not yet applied to the store
#[derive(Debug, Clone)]
pub struct WriteIntent {
    /// Caller's key
    pub key: String,
    /// Row key in the store
    pub storage_key: String,
    pub op: IntentOp,
    /// Position in the queue
    pub seq: u64,
}

/// Reported once an intent has exhausted its retries.
#[derive(Debug, Clone, Serialize)]
pub struct WriteFailure {
    pub key: String,
    pub kind: IntentKind,
    pub seq: u64,
    pub attempts: u32,
    pub message: String,
}

pub type FailureHook = Arc<dyn Fn(&WriteFailure) + Send + Sync>;

enum Command {
    Apply(WriteIntent),
    /// Answered once every earlier command has been handled.
    Flush(oneshot::Sender<()>),
}

struct Sender {
    tx: mpsc::UnboundedSender<Command>,
    next_seq: u64,
}

pub struct WriteQueue {
    sender: Mutex<Sender>,
    worker: JoinHandle<()>,
    tracker: Arc<IntentTracker>,
}

impl WriteQueue {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn start(
        store: Arc<dyn KvStore>,
        retry: RetryPolicy,
        tracker: Arc<IntentTracker>,
        on_failure: Option<FailureHook>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(
            rx,
            store,
            retry,
            tracker.clone(),
            on_failure,
        ));

        Self {
            sender: Mutex::new(Sender { tx, next_seq: 0 }),
            worker,
            tracker,
        }
    }

    pub fn enqueue_upsert(&self, key: &str, storage_key: String, encoded: String) -> Result<u64> {
        self.enqueue(key, storage_key, IntentOp::Upsert(encoded))
    }

    pub fn enqueue_delete(&self, key: &str, storage_key: String) -> Result<u64> {
        self.enqueue(key, storage_key, IntentOp::Delete)
    }

    /// Append to the tail and return the intent's sequence number. Never
    /// waits on storage.
    fn enqueue(&self, key: &str, storage_key: String, op: IntentOp) -> Result<u64> {
        let mut sender = self.lock_sender();
        let seq = sender.next_seq;

        self.tracker.begin(key);
        let intent = WriteIntent {
            key: key.to_string(),
            storage_key,
            op,
            seq,
        };

        if sender.tx.send(Command::Apply(intent)).is_err() {
            self.tracker.abandon(key);
            return Err(PmemError::Storage("write worker has stopped".to_string()));
        }

        sender.next_seq += 1;
        Ok(seq)
    }

    /// Wait until every intent enqueued before this call has been handled.
    pub async fn flush(&self) -> Result<()> {
        self.request_flush()?.wait().await
    }

    /// Place a flush marker at the tail without waiting for it.
    pub fn request_flush(&self) -> Result<FlushWaiter> {
        let (done_tx, done_rx) = oneshot::channel();
        self.lock_sender()
            .tx
            .send(Command::Flush(done_tx))
            .map_err(|_| PmemError::Storage("write worker has stopped".to_string()))?;

        Ok(FlushWaiter(done_rx))
    }

    /// Stop accepting intents and drain the rest.
    ///
    /// With no deadline this waits for the full drain. With a deadline the
    /// worker is aborted when it expires, the keys that still have unapplied
    /// intents are marked dirty, and `ShutdownIncomplete` names them.
    ///
    /// A key whose write was in flight at the deadline is always reported,
    /// but the write itself may still commit: aborting drops the future, not
    /// a statement the driver already handed to SQLite. Reported keys are
    /// therefore not confirmed durable, rather than confirmed absent.
    pub async fn shutdown(self, deadline: Option<Duration>) -> Result<()> {
        let WriteQueue {
            sender,
            mut worker,
            tracker,
        } = self;

        // Closing the channel lets the worker exit once it is empty.
        drop(sender);

        let joined = match deadline {
            None => (&mut worker).await,
            Some(limit) => match tokio::time::timeout(limit, &mut worker).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Write queue did not drain within {:?}, aborting", limit);
                    worker.abort();
                    let _ = (&mut worker).await;
                    return incomplete(&tracker);
                }
            },
        };

        if let Err(e) = joined {
            error!("Write worker ended abnormally: {}", e);
            return incomplete(&tracker);
        }

        info!("Write queue drained");
        Ok(())
    }

    fn lock_sender(&self) -> MutexGuard<'_, Sender> {
        self.sender.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resolves once the worker reaches the flush marker.
pub struct FlushWaiter(oneshot::Receiver<()>);

impl FlushWaiter {
    pub async fn wait(self) -> Result<()> {
        self.0
            .await
            .map_err(|_| PmemError::Storage("write worker stopped before flush".to_string()))
    }
}

fn incomplete(tracker: &IntentTracker) -> Result<()> {
    let keys = tracker.pending_keys();
    if keys.is_empty() {
        return Ok(());
    }
    tracker.mark_dirty(&keys);
    Err(PmemError::ShutdownIncomplete { keys })
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Command>,
    store: Arc<dyn KvStore>,
    retry: RetryPolicy,
    tracker: Arc<IntentTracker>,
    on_failure: Option<FailureHook>,
) {
    debug!("Write worker started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Apply(intent) => {
                apply(store.as_ref(), &retry, &tracker, on_failure.as_ref(), intent).await
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Write queue empty, worker stopping");
}

async fn apply(
    store: &dyn KvStore,
    retry: &RetryPolicy,
    tracker: &IntentTracker,
    on_failure: Option<&FailureHook>,
    intent: WriteIntent,
) {
    let kind = intent.op.kind();
    let what = format!("{} of {}", kind, intent.key);
    debug!("Writing {} to store (#{})", intent.key, intent.seq);

    let target = &intent;
    let result = retry
        .execute(&what, move || async move {
            match &target.op {
                IntentOp::Upsert(encoded) => store.put(&target.storage_key, encoded).await,
                IntentOp::Delete => store.delete(&target.storage_key).await,
            }
        })
        .await;

    match result {
        Ok(()) => {
            debug!("Write complete for {} (#{})", intent.key, intent.seq);
            tracker.applied(&intent.key);
        }
        Err(e) => {
            error!(
                "Giving up on {} after {} attempts, cached value is not durable: {}",
                what,
                retry.max_attempts(),
                e
            );
            tracker.failed(&intent.key);

            if let Some(hook) = on_failure {
                hook(&WriteFailure {
                    key: intent.key.clone(),
                    kind,
                    seq: intent.seq,
                    attempts: retry.max_attempts(),
                    message: e.to_string(),
                });
            }
        }
    }
}
