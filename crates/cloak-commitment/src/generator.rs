//! Secret and nullifier generation.
//!
//! Every value is 256 bits drawn fresh from the entropy source. Nothing is
//! derived from a counter, so two calls never share bytes except by CSPRNG
//! collision.

use std::collections::VecDeque;
use std::sync::Mutex;

use cloak_crypto::CryptoError;
use cloak_types::{now_millis, Amount, Nullifier, PaymentSecret, Secret, VALUE_LEN};
use tracing::debug;

use crate::{scheme, CommitmentError, Result};

/// Source of payment secrets and nullifiers.
pub trait SecretGenerator: Send + Sync {
    /// Draw a fresh 256-bit secret.
    fn new_secret(&self) -> Result<Secret>;

    /// Draw a fresh 256-bit nullifier.
    fn new_nullifier(&self) -> Result<Nullifier>;

    /// Draw a secret/nullifier pair and commit to `amount`.
    fn new_payment(&self, amount: Amount) -> Result<PaymentSecret> {
        let secret = self.new_secret()?;
        let nullifier = self.new_nullifier()?;
        let commitment = scheme::commit(&secret, &amount, &nullifier);
        debug!(commitment = %commitment.short(), "generated payment secret");
        Ok(PaymentSecret {
            secret,
            nullifier,
            commitment,
            amount,
            timestamp: now_millis(),
        })
    }
}

/// Generator backed by the operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSecretGenerator;

fn draw() -> Result<[u8; VALUE_LEN]> {
    cloak_crypto::random::bytes::<VALUE_LEN>().map_err(|e| match e {
        CryptoError::EntropyUnavailable(msg) => CommitmentError::EntropyUnavailable(msg),
        other => CommitmentError::EntropyUnavailable(other.to_string()),
    })
}

impl SecretGenerator for OsSecretGenerator {
    fn new_secret(&self) -> Result<Secret> {
        draw().map(Secret::from_bytes)
    }

    fn new_nullifier(&self) -> Result<Nullifier> {
        draw().map(Nullifier::from_bytes)
    }
}

/// Generator that replays a fixed sequence of 32-byte values.
///
/// Secrets and nullifiers are taken from the same queue in call order.
/// Once the queue is empty every call fails with
/// [`CommitmentError::EntropyUnavailable`]. Used for deterministic vectors
/// and for exercising collision and entropy-failure paths.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    values: Mutex<VecDeque<[u8; VALUE_LEN]>>,
}

impl ScriptedGenerator {
    pub fn new(values: impl IntoIterator<Item = [u8; VALUE_LEN]>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
        }
    }

    /// Values not yet handed out.
    pub fn remaining(&self) -> usize {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next(&self) -> Result<[u8; VALUE_LEN]> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| CommitmentError::EntropyUnavailable("scripted values exhausted".into()))
    }
}

impl SecretGenerator for ScriptedGenerator {
    fn new_secret(&self) -> Result<Secret> {
        self.next().map(Secret::from_bytes)
    }

    fn new_nullifier(&self) -> Result<Nullifier> {
        self.next().map(Nullifier::from_bytes)
    }
}
