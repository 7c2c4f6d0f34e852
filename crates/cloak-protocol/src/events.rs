//! Protocol event bus.
//!
//! Every flow transition is broadcast to subscribers (UI layers, logs,
//! tests). A bus with no subscribers drops events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cloak_types::{Commitment, TxId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Which flow a transition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Sender,
    Receiver,
}

/// An event emitted by the claim protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A flow moved between states.
    Transition {
        flow: Flow,
        from: String,
        to: String,
    },
    /// The ledger accepted a deposit.
    Deposited {
        commitment: Commitment,
        tx: TxId,
        leaf_index: usize,
    },
    /// The deposit confirmed; the artifact can be shared.
    ShareReady {
        commitment: Commitment,
        link: String,
    },
    ClaimVerified {
        commitment: Commitment,
        leaf_index: usize,
    },
    ClaimCompleted {
        commitment: Commitment,
        tx: Option<TxId>,
    },
    ClaimFailed {
        commitment: Option<Commitment>,
        error: String,
        retryable: bool,
    },
    /// Local state was reconciled against the ledger.
    Recovered {
        commitment: Commitment,
        spent: bool,
    },
}

/// Broadcast bus for [`ProtocolEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProtocolEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: ProtocolEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sequence", &self.sequence())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
