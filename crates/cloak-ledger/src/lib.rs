//! # cloak-ledger
//!
//! The two collaborators the payment core talks to.
//!
//! The **ledger** holds funds behind commitments, releases them on a valid
//! withdrawal and is the authority on which nullifiers are spent. The
//! **wallet** supplies the signing identity that authorizes ledger calls.
//! Both are traits; [`memory`] provides in-process implementations with
//! fault injection for tests and the sandbox.
//!
//! ## Modules
//!
//! - [`types`]: Requests, statuses and identities exchanged with collaborators
//! - [`traits`]: [`Ledger`] and [`Wallet`]
//! - [`memory`]: [`MemoryLedger`] and [`MemoryWallet`]

pub mod memory;
pub mod traits;
pub mod types;

pub use memory::{MemoryLedger, MemoryWallet};
pub use traits::{Ledger, Wallet};
pub use types::{
    CommitmentStatus, DepositRequest, Identity, TxDetails, TxKind, TxStatus, WithdrawRequest,
};

/// Error types for collaborator calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Network-level failure; the same call may succeed if repeated.
    #[error("transient ledger failure: {0}")]
    Transient(String),

    /// Refused by the ledger's rules; repeating the call will not help.
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    /// Unknown transaction or commitment.
    #[error("not found on ledger")]
    NotFound,

    /// The wallet is disconnected or refused to sign.
    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient(_))
    }
}

/// Convenience result type for collaborator calls.
pub type Result<T> = std::result::Result<T, LedgerError>;
