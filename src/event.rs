//! Structured events emitted on every membership change and order outcome.
//!
//! Consumers subscribe to build dashboards, alerting, or audit trails of
//! their own. Nothing is retained here: a subscriber that lags past the
//! buffer capacity simply misses events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::engine::handoff::Step;
use crate::model::{Capability, Identity, OrderId};

/// A structured event emitted by the router or dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WorkerOnDuty {
        identity: Identity,
        capabilities: Vec<Capability>,
        replaced: bool,
    },
    WorkerOffDuty {
        identity: Identity,
        was_on_duty: bool,
    },
    OrderReceived {
        id: OrderId,
        capabilities: Vec<Capability>,
    },
    OrderAssigned {
        id: OrderId,
        worker: Identity,
    },
    OrderDelivered {
        id: OrderId,
        worker: Identity,
        duration_ms: u64,
    },
    OrderUnroutable {
        id: OrderId,
        capabilities: Vec<Capability>,
    },
    OrderFailed {
        id: OrderId,
        step: Option<Step>,
        error: String,
    },
}

/// Fan-out of events to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    seq: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Stamp and broadcast an event. Returns its sequence number.
    pub fn publish(&self, kind: EventKind) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is not an error.
        let _ = self.tx.send(Event {
            seq,
            timestamp: Utc::now(),
            kind,
        });
        seq
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
