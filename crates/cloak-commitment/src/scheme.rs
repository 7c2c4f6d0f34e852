//! Commitment derivation and verification.
//!
//! ```text
//! commitment = BLAKE3::derive_key(
//!     "Cloak v1 payment-commitment",
//!     LE32(32) || secret || LE32(32) || nullifier || LE32(len) || canonical_amount)
//! ```
//!
//! `canonical_amount` is the ASCII minor-unit integer, so every decimal
//! spelling of the same value commits identically.

use cloak_crypto::hash::Domain;
use cloak_types::{Amount, Commitment, Nullifier, Secret};

use crate::Result;

/// Commit to `(secret, amount, nullifier)`. Pure and deterministic.
pub fn commit(secret: &Secret, amount: &Amount, nullifier: &Nullifier) -> Commitment {
    let canonical = amount.canonical();
    Commitment::from_bytes(Domain::PaymentCommitment.derive(&[
        secret.as_bytes(),
        nullifier.as_bytes(),
        canonical.as_bytes(),
    ]))
}

/// Recompute the commitment and compare in constant time.
pub fn verify(
    secret: &Secret,
    commitment: &Commitment,
    amount: &Amount,
    nullifier: &Nullifier,
) -> bool {
    let recomputed = commit(secret, amount, nullifier);
    cloak_crypto::ct_eq(recomputed.as_bytes(), commitment.as_bytes())
}

/// [`commit`] over string inputs as they arrive from users.
///
/// # Errors
///
/// - [`crate::CommitmentError::InvalidSecretFormat`] for a malformed secret or nullifier
/// - [`crate::CommitmentError::InvalidAmount`] for a malformed amount
pub fn commit_str(secret: &str, amount: &str, nullifier: &str) -> Result<Commitment> {
    let secret = Secret::parse(secret)?;
    let nullifier = Nullifier::parse(nullifier)?;
    let amount = Amount::parse(amount)?;
    Ok(commit(&secret, &amount, &nullifier))
}
