//! # cloak-nullifier
//!
//! Local double-spend guard.
//!
//! The ledger is the source of truth for which nullifiers are spent. This
//! crate keeps a cache of what the ledger has confirmed plus the nullifiers
//! reserved by claims currently in flight, so a second claim on the same
//! nullifier is refused before it ever reaches the ledger.
//!
//! ## Modules
//!
//! - [`cache`]: [`SpentNullifiers`]

pub mod cache;

pub use cache::SpentNullifiers;

use cloak_types::{Nullifier, TxId};

/// Error types for nullifier operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NullifierError {
    /// The nullifier has been spent.
    #[error("nullifier already spent")]
    AlreadySpent {
        /// Withdrawal that spent it, when known.
        tx: Option<TxId>,
    },

    /// Another claim holds a reservation on the nullifier.
    #[error("nullifier reserved by a claim in progress")]
    InFlight,

    /// The nullifier was already marked spent by a different transaction.
    #[error("nullifier {nullifier} already spent by another transaction")]
    ConflictingSpend { nullifier: Nullifier },
}

/// Convenience result type for nullifier operations.
pub type Result<T> = std::result::Result<T, NullifierError>;
