//! Claim protocol errors.

use cloak_accumulator::AccumulatorError;
use cloak_commitment::CommitmentError;
use cloak_ledger::LedgerError;
use cloak_nullifier::NullifierError;
use cloak_proof::ProofError;
use cloak_types::TypesError;

/// Every failure the sender and receiver flows can surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    /// The entropy source failed. Fatal; never retried silently.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Secret, nullifier or commitment input was malformed.
    #[error("invalid secret format: {0}")]
    InvalidSecretFormat(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The confirmation step was missing a required field.
    #[error("incomplete confirmation: {0}")]
    IncompleteConfirmation(String),

    /// The commitment collided with an existing leaf, and every fresh
    /// secret/nullifier pair tried collided too.
    #[error("duplicate leaf in accumulator")]
    DuplicateLeaf,

    /// A leaf index outside the tree. Indicates broken index tracking.
    #[error("leaf index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The nullifier has been spent.
    #[error("payment already claimed")]
    AlreadyClaimed,

    /// The ledger kept failing transiently.
    #[error("ledger timed out after {attempts} attempts: {last_error}")]
    LedgerTimeout { attempts: u32, last_error: String },

    /// The ledger refused the request by its rules.
    #[error("ledger rejected request: {0}")]
    LedgerRejected(String),

    #[error("proof verification failed: {0}")]
    ProofVerificationFailed(String),

    /// Another claim on the same nullifier is in flight.
    #[error("a claim for this payment is already in progress")]
    ClaimInProgress,

    /// The operation is not valid in the flow's current state.
    #[error("cannot {operation} in state {state}")]
    InvalidTransition {
        state: String,
        operation: &'static str,
    },

    /// The ledger has accepted the operation; it can no longer be abandoned.
    #[error("operation already accepted by the ledger and cannot be cancelled")]
    NotCancellable,

    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClaimError {
    /// Whether repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClaimError::LedgerTimeout { .. }
                | ClaimError::ClaimInProgress
                | ClaimError::WalletUnavailable(_)
        )
    }

    /// Whether the user can fix the input and try again.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            ClaimError::InvalidSecretFormat(_)
                | ClaimError::InvalidAmount(_)
                | ClaimError::IncompleteConfirmation(_)
        )
    }
}

impl From<CommitmentError> for ClaimError {
    fn from(err: CommitmentError) -> Self {
        match err {
            CommitmentError::EntropyUnavailable(msg) => ClaimError::EntropyUnavailable(msg),
            CommitmentError::InvalidAmount(msg) => ClaimError::InvalidAmount(msg),
            other => ClaimError::InvalidSecretFormat(other.to_string()),
        }
    }
}

impl From<TypesError> for ClaimError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::InvalidHex { .. } => ClaimError::InvalidSecretFormat(err.to_string()),
            TypesError::InvalidAmount { .. } => ClaimError::InvalidAmount(err.to_string()),
            TypesError::InvalidTransition { from, .. } => ClaimError::InvalidTransition {
                state: format!("{from:?}"),
                operation: "update claim record",
            },
        }
    }
}

impl From<AccumulatorError> for ClaimError {
    fn from(err: AccumulatorError) -> Self {
        match err {
            AccumulatorError::DuplicateLeaf { .. } => ClaimError::DuplicateLeaf,
            AccumulatorError::IndexOutOfRange { index, len } => {
                ClaimError::IndexOutOfRange { index, len }
            }
            AccumulatorError::HistoryTooSmall(_) => ClaimError::InvalidConfig(err.to_string()),
        }
    }
}

impl From<NullifierError> for ClaimError {
    fn from(err: NullifierError) -> Self {
        match err {
            NullifierError::AlreadySpent { .. } | NullifierError::ConflictingSpend { .. } => {
                ClaimError::AlreadyClaimed
            }
            NullifierError::InFlight => ClaimError::ClaimInProgress,
        }
    }
}

impl From<LedgerError> for ClaimError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Transient(msg) => ClaimError::LedgerTimeout {
                attempts: 1,
                last_error: msg,
            },
            LedgerError::Rejected(msg) => ClaimError::LedgerRejected(msg),
            LedgerError::NotFound => ClaimError::LedgerRejected("not found".into()),
            LedgerError::WalletUnavailable(msg) => ClaimError::WalletUnavailable(msg),
        }
    }
}

impl From<ProofError> for ClaimError {
    fn from(err: ProofError) -> Self {
        ClaimError::ProofVerificationFailed(err.to_string())
    }
}
