//! # cloak-protocol
//!
//! The claim protocol: the sender and receiver state machines that tie
//! secret generation, commitments, the Merkle accumulator, disclosure proofs
//! and the ledger together.
//!
//! ```text
//! sender:   Connect → Confirm → Generating → Depositing → Sharing
//! receiver: AwaitingSecret → Verifying → Claiming → Completed | Failed
//! ```
//!
//! All shared state lives in an explicit [`ClaimProtocol`] context; flows
//! borrow it. The ledger is the authority on spent nullifiers, and local
//! records are caches reconciled against it by [`ClaimProtocol::recover`].
//!
//! ## Modules
//!
//! - [`protocol`]: The [`ClaimProtocol`] context and crash recovery
//! - [`sender`]: [`SenderFlow`]
//! - [`receiver`]: [`ReceiverFlow`]
//! - [`retry`]: Bounded exponential backoff for ledger calls
//! - [`config`]: [`ProtocolConfig`]
//! - [`events`]: [`ProtocolEvent`] broadcast bus
//! - [`error`]: [`ClaimError`]

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod receiver;
pub mod retry;
pub mod sender;

pub use config::ProtocolConfig;
pub use error::ClaimError;
pub use events::{EventBus, Flow, ProtocolEvent};
pub use protocol::ClaimProtocol;
pub use receiver::{ClaimInput, ReceiverFlow, ReceiverState};
pub use retry::{with_retry, RetryPolicy};
pub use sender::{SenderFlow, SenderState};

/// Convenience result type for protocol operations.
pub type Result<T> = std::result::Result<T, ClaimError>;
