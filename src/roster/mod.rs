//! Roster of simulated workers.
//!
//! Each `.toml` file in a roster directory describes one worker: its
//! identity, the capabilities it serves, and how it answers an order.
//! [`SimulatedWorker`] plays the worker's side of the hand-off over an
//! in-memory channel, which is how the CLI and the tests staff a kitchen
//! without a real transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::{Channel, MemoryChannel};
use crate::error::{Error, Result};
use crate::model::{Capability, Identity, Payload, Request};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct RosterFile {
    worker: RosterEntry,
}

/// One worker in the roster.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub identity: Identity,
    pub capabilities: Vec<Capability>,
    /// Fixed answer to every order. When absent the worker echoes the order.
    #[serde(default)]
    pub reply: Option<String>,
    /// Simulated preparation time per order.
    #[serde(default)]
    pub delay_ms: u64,
}

impl RosterEntry {
    pub fn new(identity: impl Into<Identity>, capabilities: &[&str]) -> Self {
        Self {
            identity: identity.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            reply: None,
            delay_ms: 0,
        }
    }

    pub fn reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

/// Loaded roster entries, sorted by identity.
#[derive(Debug, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn from_entries(mut entries: Vec<RosterEntry>) -> Self {
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        Self { entries }
    }

    /// Load all `.toml` files from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut entries = Vec::new();

        let listing = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read roster dir {}: {e}", dir.display()))
        })?;

        for entry in listing {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)?;
                let file: RosterFile = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("bad roster file {}: {e}", path.display()))
                })?;
                entries.push(file.worker);
            }
        }

        Ok(Self::from_entries(entries))
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn get(&self, identity: &str) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.identity == identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A worker task answering orders forwarded over its on-duty channel.
pub struct SimulatedWorker {
    identity: Identity,
    handle: JoinHandle<usize>,
}

impl SimulatedWorker {
    /// Start the worker task. Returns the on-duty request to route and the
    /// handle of the running worker.
    ///
    /// The task runs until the dispatcher's end of the channel is dropped,
    /// i.e. once the worker is off duty and no hand-off still holds it.
    pub fn spawn(entry: &RosterEntry) -> (Request, SimulatedWorker) {
        let (dispatch_end, worker_end) = MemoryChannel::duplex(1);
        let request = Request::on_duty(
            &entry.identity,
            entry.capabilities.as_slice(),
            Arc::new(dispatch_end),
        );
        let handle = tokio::spawn(serve(entry.clone(), worker_end));
        (
            request,
            SimulatedWorker {
                identity: entry.identity.clone(),
                handle,
            },
        )
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The request taking this worker off duty.
    pub fn off_duty_request(&self) -> Request {
        Request::off_duty(&self.identity, Arc::new(MemoryChannel::closed()))
    }

    /// Wait for the task to finish. Returns how many orders it answered.
    pub async fn finish(self) -> Result<usize> {
        self.handle
            .await
            .map_err(|e| Error::Other(format!("worker {} task failed: {e}", self.identity)))
    }
}

async fn serve(entry: RosterEntry, channel: MemoryChannel) -> usize {
    let mut served = 0;
    while let Ok(order) = channel.receive_next().await {
        debug!(identity = %entry.identity, ?order, "worker preparing order");
        if entry.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
        }
        let result: Payload = match &entry.reply {
            Some(reply) => Payload::String(reply.clone()),
            None => order,
        };
        if channel.send_payload(result).await.is_err() {
            break;
        }
        served += 1;
    }
    debug!(identity = %entry.identity, served, "worker stopped");
    served
}
