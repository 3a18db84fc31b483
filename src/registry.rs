//! Registry of on-duty workers, keyed by identity.
//!
//! All operations are synchronous and guarded by one `RwLock`, so a lookup
//! always scans a consistent snapshot even while other tasks put workers on
//! or off duty. Lookups hand out cloned [`Worker`] handles; an in-flight
//! hand-off keeps its handle after the worker is deregistered.
//!
//! A worker whose hand-off is abandoned after the order was forwarded but
//! before its result was read is poisoned: its channel may still carry that
//! late result, so it is never offered to another order. Putting the worker
//! on duty again registers a fresh channel and clears the condition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rand::seq::IndexedRandom;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::channel::Channel;
use crate::model::{Capability, Identity};

/// A registered worker: its identity, what it serves, and the channel its
/// on-duty request left open.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    identity: Identity,
    capabilities: Vec<Capability>,
    channel: Arc<dyn Channel>,
    /// Held across forward + await-result so concurrent orders to one worker
    /// cannot read each other's results.
    handoff: Arc<Mutex<()>>,
    poisoned: AtomicBool,
}

impl Worker {
    pub fn new(
        identity: impl Into<Identity>,
        capabilities: Vec<Capability>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                identity: identity.into(),
                capabilities,
                channel,
                handoff: Arc::new(Mutex::new(())),
                poisoned: AtomicBool::new(false),
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.inner.capabilities
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.inner.channel
    }

    /// Does this worker serve at least one of `required`?
    pub fn serves_any(&self, required: &[Capability]) -> bool {
        required.iter().any(|c| self.inner.capabilities.contains(c))
    }

    /// Was a hand-off with this worker abandoned mid-exchange?
    pub fn is_poisoned(&self) -> bool {
        self.inner.poisoned.load(Ordering::Acquire)
    }

    /// Wait for exclusive use of the worker's channel.
    ///
    /// Returns `None` when the worker was poisoned, possibly by the hand-off
    /// that held the channel before us.
    pub(crate) async fn begin_handoff(&self) -> Option<Handoff> {
        let guard = Arc::clone(&self.inner.handoff).lock_owned().await;
        if self.is_poisoned() {
            return None;
        }
        Some(Handoff {
            worker: self.clone(),
            _guard: guard,
            settled: false,
        })
    }
}

/// Exclusive use of a worker's channel for one forward + result exchange.
///
/// Dropping it without [`Handoff::settle`] poisons the worker. That covers
/// deadlines, channel errors, and the dispatching future being dropped.
pub(crate) struct Handoff {
    worker: Worker,
    _guard: OwnedMutexGuard<()>,
    settled: bool,
}

impl Handoff {
    /// The exchange completed; the channel is back in step.
    pub(crate) fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        if !self.settled {
            // Set before `_guard` releases the lock, so the next waiter sees it.
            self.worker.inner.poisoned.store(true, Ordering::Release);
            warn!(
                identity = %self.worker.identity(),
                "hand-off abandoned mid-exchange, worker no longer eligible"
            );
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("identity", &self.inner.identity)
            .field("capabilities", &self.inner.capabilities)
            .finish_non_exhaustive()
    }
}

/// Workers currently on duty.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<Identity, Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a worker on duty under its identity, replacing any previous entry.
    /// Returns `true` when an entry was replaced.
    pub fn register(&self, worker: Worker) -> bool {
        let identity = worker.identity().to_string();
        self.write().insert(identity, worker).is_some()
    }

    /// Take `identity` off duty. Unknown identities are a no-op.
    /// Returns `true` when an entry was removed.
    pub fn deregister(&self, identity: &str) -> bool {
        self.write().remove(identity).is_some()
    }

    /// Every on-duty, unpoisoned worker serving at least one of `required`.
    pub fn find_candidates(&self, required: &[Capability]) -> Vec<Worker> {
        self.read()
            .values()
            .filter(|w| !w.is_poisoned() && w.serves_any(required))
            .cloned()
            .collect()
    }

    /// One candidate drawn uniformly at random, or `None` when nobody matches.
    pub fn pick(&self, required: &[Capability]) -> Option<Worker> {
        self.find_candidates(required)
            .choose(&mut rand::rng())
            .cloned()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.read().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// On-duty identities, sorted.
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<_> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    // A panic while holding the lock cannot leave the map half-updated:
    // every mutation is a single insert or remove.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Identity, Worker>> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Identity, Worker>> {
        self.workers.write().unwrap_or_else(PoisonError::into_inner)
    }
}
