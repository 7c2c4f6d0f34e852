//! Ed25519 disclosure backend.
//!
//! ```text
//! seed  = BLAKE3::derive_key("Cloak v1 disclosure-key", secret)
//! msg   = "Cloak v1 disclosure" || commitment || canonical_amount
//! bytes = verifying_key(seed)[32] || Sign(seed, msg)[64]
//! ```
//!
//! The seed is a one-way function of the secret, so the proof reveals
//! nothing that recovers the secret. A holder of the secret can confirm a
//! proof came from it with [`Ed25519Disclosure::opens_with`].
//!
//! The embedded verifying key must equal the [`DisclosureKey`] registered
//! for the commitment at deposit time. Without that binding any secret
//! could sign for any commitment.

use cloak_crypto::hash::Domain;
use cloak_crypto::keys::{Signature, SigningKey, VerifyingKey};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cloak_types::{Amount, Commitment, Secret};
use tracing::debug;
use zeroize::Zeroize;

use crate::{DisclosureKey, DisclosureProof, ProofService, PublicInputs, Result};

/// Scheme identifier for this backend.
pub const SCHEME: &str = "ed25519-disclosure-v1";

const KEY_LEN: usize = 32;
const SIG_LEN: usize = 64;
const PROOF_LEN: usize = KEY_LEN + SIG_LEN;

/// Disclosure proofs signed by a key derived from the payment secret.
///
/// Clones share one key registry.
#[derive(Clone, Debug, Default)]
pub struct Ed25519Disclosure {
    keys: Arc<RwLock<HashMap<Commitment, DisclosureKey>>>,
}

impl Ed25519Disclosure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key registered for `commitment`, if any.
    pub fn registered_key(&self, commitment: &Commitment) -> Option<DisclosureKey> {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(commitment)
            .copied()
    }

    fn signing_key(secret: &Secret) -> SigningKey {
        let mut seed = Domain::DisclosureKey.derive_key(secret.as_bytes());
        let key = SigningKey::from_seed(&seed);
        seed.zeroize();
        key
    }

    fn message(inputs: &PublicInputs) -> Vec<u8> {
        let mut msg = Domain::DisclosureMessage.context().as_bytes().to_vec();
        msg.extend_from_slice(&inputs.to_bytes());
        msg
    }

    fn split(bytes: &[u8]) -> Option<([u8; KEY_LEN], [u8; SIG_LEN])> {
        if bytes.len() != PROOF_LEN {
            return None;
        }
        let mut vk = [0u8; KEY_LEN];
        let mut sig = [0u8; SIG_LEN];
        vk.copy_from_slice(&bytes[..KEY_LEN]);
        sig.copy_from_slice(&bytes[KEY_LEN..]);
        Some((vk, sig))
    }

    /// Whether `proof` was produced from `secret`.
    pub fn opens_with(&self, proof: &DisclosureProof, secret: &Secret) -> bool {
        let Some((vk, _)) = Self::split(&proof.bytes) else {
            return false;
        };
        let expected = Self::signing_key(secret).verifying_key();
        cloak_crypto::ct_eq(&vk, expected.as_bytes())
    }
}

impl ProofService for Ed25519Disclosure {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn disclosure_key(&self, secret: &Secret) -> DisclosureKey {
        DisclosureKey(Self::signing_key(secret).verifying_key().to_bytes())
    }

    fn register_key(&self, commitment: Commitment, key: DisclosureKey) {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = keys.get(&commitment) {
            if *existing != key {
                debug!(commitment = %commitment.short(), "disclosure key already registered");
            }
            return;
        }
        keys.insert(commitment, key);
    }

    fn generate_disclosure_proof(
        &self,
        secret: &Secret,
        commitment: &Commitment,
        amount: &Amount,
    ) -> Result<DisclosureProof> {
        let inputs = PublicInputs::new(*commitment, *amount);
        let key = Self::signing_key(secret);
        let signature = key.sign(&Self::message(&inputs));

        let mut bytes = Vec::with_capacity(PROOF_LEN);
        bytes.extend_from_slice(key.verifying_key().as_bytes());
        bytes.extend_from_slice(&signature.to_bytes());

        debug!(commitment = %commitment.short(), "disclosure proof generated");
        Ok(DisclosureProof {
            scheme: SCHEME.to_string(),
            public_inputs: inputs,
            bytes,
        })
    }

    fn verify_disclosure_proof(
        &self,
        proof: &DisclosureProof,
        public_inputs: &PublicInputs,
        expected_commitment: &Commitment,
    ) -> bool {
        if proof.scheme != SCHEME {
            return false;
        }
        let commitment_ok =
            cloak_crypto::ct_eq(public_inputs.commitment.as_bytes(), expected_commitment.as_bytes())
                & cloak_crypto::ct_eq(
                    proof.public_inputs.commitment.as_bytes(),
                    expected_commitment.as_bytes(),
                );
        if !commitment_ok || proof.public_inputs.amount != public_inputs.amount {
            return false;
        }

        let Some((vk, sig)) = Self::split(&proof.bytes) else {
            return false;
        };
        let Some(bound) = self.registered_key(expected_commitment) else {
            debug!(commitment = %expected_commitment.short(), "no disclosure key registered");
            return false;
        };
        if !cloak_crypto::ct_eq(&vk, bound.as_bytes()) {
            return false;
        }
        let Ok(vk) = VerifyingKey::from_bytes(&vk) else {
            return false;
        };
        vk.verify(&Self::message(public_inputs), &Signature::from_bytes(&sig))
            .is_ok()
    }
}
