//! Duplex payload channels.
//!
//! Every request arrives with a channel tied to its one logical interaction.
//! The core only ever calls [`Channel::receive_next`] and
//! [`Channel::send_payload`]; how bytes move is the transport's business.
//! [`MemoryChannel`] is the in-process implementation used by the roster
//! simulator and the tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use crate::engine::handoff::Step;
use crate::error::Error;
use crate::model::Payload;

/// Failure reported by a channel implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The peer went away; nothing more will be sent or received.
    #[error("peer disconnected")]
    Closed,

    /// Transport-specific failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Attach the hand-off step at which the failure surfaced.
    pub fn at(self, step: Step) -> Error {
        match self {
            ChannelError::Closed => Error::ChannelClosed { step },
            ChannelError::Transport(message) => Error::Other(format!("{step}: {message}")),
        }
    }
}

/// One end of a single-use duplex stream.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Suspend until the peer sends the next payload.
    async fn receive_next(&self) -> Result<Payload, ChannelError>;

    /// Suspend until `payload` has been handed to the peer.
    async fn send_payload(&self, payload: Payload) -> Result<(), ChannelError>;
}

/// In-memory channel end backed by a pair of bounded tokio mpsc queues.
pub struct MemoryChannel {
    tx: mpsc::Sender<Payload>,
    rx: Mutex<mpsc::Receiver<Payload>>,
}

impl MemoryChannel {
    /// Create two connected ends. What one end sends, the other receives.
    ///
    /// `capacity` bounds how many payloads may sit undelivered in each
    /// direction before `send_payload` starts waiting.
    pub fn duplex(capacity: usize) -> (MemoryChannel, MemoryChannel) {
        let capacity = capacity.max(1);
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (
            MemoryChannel {
                tx: a_tx,
                rx: Mutex::new(b_rx),
            },
            MemoryChannel {
                tx: b_tx,
                rx: Mutex::new(a_rx),
            },
        )
    }

    /// An end whose peer is already gone. Every operation reports `Closed`.
    ///
    /// Useful for membership requests, which never exchange payloads.
    pub fn closed() -> MemoryChannel {
        let (end, _peer) = Self::duplex(1);
        end
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn receive_next(&self) -> Result<Payload, ChannelError> {
        self.rx.lock().await.recv().await.ok_or(ChannelError::Closed)
    }

    async fn send_payload(&self, payload: Payload) -> Result<(), ChannelError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| ChannelError::Closed)
    }
}
