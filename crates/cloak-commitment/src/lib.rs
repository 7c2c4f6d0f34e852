//! # cloak-commitment
//!
//! Secret generation and the commitment scheme.
//!
//! A payment is hidden behind `commitment = H(secret || nullifier || amount)`.
//! The sender draws the secret and nullifier from the OS CSPRNG, commits to
//! the canonical amount, and shares the secret out of band; the receiver
//! recomputes the commitment to check what it was handed.
//!
//! ## Modules
//!
//! - [`generator`]: [`generator::SecretGenerator`] and its CSPRNG backend
//! - [`scheme`]: `commit` / `verify`
//! - [`link`]: Shareable links derived from a commitment
//! - [`envelope`]: Password-sealed secrets for transport

pub mod envelope;
pub mod generator;
pub mod link;
pub mod scheme;

pub use generator::{OsSecretGenerator, ScriptedGenerator, SecretGenerator};
pub use scheme::{commit, verify};

use cloak_types::TypesError;

/// Error types for commitment operations.
#[derive(Debug, thiserror::Error)]
pub enum CommitmentError {
    /// The entropy source could not be read. Never retried silently.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// A secret, nullifier or commitment string was malformed.
    #[error("invalid secret format: {0}")]
    InvalidSecretFormat(String),

    /// An amount string could not be canonicalized.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A shareable link did not end in a commitment.
    #[error("invalid shareable link: {0}")]
    InvalidLink(String),

    /// A sealed envelope was truncated or not hex.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Wrong password or tampered envelope.
    #[error("envelope authentication failed")]
    EnvelopeAuthentication,

    /// Key derivation failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl From<TypesError> for CommitmentError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::InvalidAmount { .. } => CommitmentError::InvalidAmount(err.to_string()),
            other => CommitmentError::InvalidSecretFormat(other.to_string()),
        }
    }
}

/// Convenience result type for commitment operations.
pub type Result<T> = std::result::Result<T, CommitmentError>;
