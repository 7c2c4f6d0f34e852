//! # cloak-proof
//!
//! Disclosure proofs: an artifact showing that whoever produced it held the
//! secret behind a commitment, checkable from the public inputs
//! `{commitment, amount}` alone.
//!
//! The claim protocol only sees the [`ProofService`] trait, so a succinct
//! proof backend can replace [`Ed25519Disclosure`] without touching the
//! state machine.
//!
//! ## Modules
//!
//! - [`disclosure`]: Proof data types
//! - [`ed25519`]: Signature-based backend

pub mod disclosure;
pub mod ed25519;

pub use disclosure::{DisclosureKey, DisclosureProof, PublicInputs};
pub use ed25519::Ed25519Disclosure;

use cloak_types::{Amount, Commitment, Secret};

/// Error types for proof generation.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    /// Key derivation or signing failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Proof bytes do not have the backend's layout.
    #[error("malformed proof: {0}")]
    Malformed(String),
}

/// Convenience result type for proof operations.
pub type Result<T> = std::result::Result<T, ProofError>;

/// Capability to produce and check disclosure proofs.
pub trait ProofService: Send + Sync {
    /// Identifier stored in every proof this backend produces.
    fn scheme(&self) -> &'static str;

    /// Key that proofs generated from `secret` verify under. Published with
    /// the deposit.
    fn disclosure_key(&self, secret: &Secret) -> DisclosureKey;

    /// Record the key deposited with `commitment`. Proofs for a commitment
    /// with no recorded key never verify.
    fn register_key(&self, commitment: Commitment, key: DisclosureKey);

    /// Bind `(secret, commitment, amount)` into a proof.
    fn generate_disclosure_proof(
        &self,
        secret: &Secret,
        commitment: &Commitment,
        amount: &Amount,
    ) -> Result<DisclosureProof>;

    /// Check `proof` against `public_inputs`, the commitment the caller
    /// expects, and the key recorded for it. Any mismatch is `false`; there
    /// is no other outcome.
    fn verify_disclosure_proof(
        &self,
        proof: &DisclosureProof,
        public_inputs: &PublicInputs,
        expected_commitment: &Commitment,
    ) -> bool;
}
