//! Ed25519 keys (RFC 8032).
//!
//! Wallets sign ledger requests with a [`SigningKey`]; disclosure proofs
//! sign with a key seeded one-way from the payment secret. A wallet is
//! known to the ledger by its address:
//!
//! ```text
//! address = "0x" || hex(BLAKE3(public_key)[..20])
//! ```

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};

use crate::{CryptoError, Result};

/// Address length in bytes (40 hex digits).
pub const ADDRESS_LEN: usize = 20;

/// Private key. The inner key wipes itself on drop.
#[derive(Clone)]
pub struct SigningKey(ed25519_dalek::SigningKey);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(ed25519_dalek::Signature);

impl SigningKey {
    /// Fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Deterministic key from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey({})", self.verifying_key().address())
    }
}

impl VerifyingKey {
    /// # Errors
    ///
    /// - [`CryptoError::InvalidKey`] if the bytes are not a curve point
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Strict verification; rejects malleable signatures.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.0
            .verify_strict(message, &signature.0)
            .map_err(|_| CryptoError::SignatureVerification)
    }

    /// `0x` + 40 hex digits.
    pub fn address(&self) -> String {
        let digest = crate::hash::hash(self.as_bytes());
        format!("0x{}", hex::encode(&digest[..ADDRESS_LEN]))
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8032, section 7.1, TEST 1.
    const RFC_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const RFC_PUBLIC: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    fn rfc_key() -> SigningKey {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(RFC_SEED, &mut seed).expect("seed hex");
        SigningKey::from_seed(&seed)
    }

    #[test]
    fn test_rfc8032_test1() {
        let key = rfc_key();
        assert_eq!(hex::encode(key.verifying_key().as_bytes()), RFC_PUBLIC);

        let sig = key.sign(b"");
        assert_eq!(
            hex::encode(sig.to_bytes()),
            "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155\
             5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b"
        );
        key.verifying_key().verify(b"", &sig).expect("verify");
    }

    #[test]
    fn test_signature_bound_to_message_and_key() {
        let key = SigningKey::generate();
        let other = SigningKey::generate();
        let sig = key.sign(b"withdraw");

        assert!(key.verifying_key().verify(b"deposit", &sig).is_err());
        assert!(other.verifying_key().verify(b"withdraw", &sig).is_err());
        assert_eq!(sig, Signature::from_bytes(&sig.to_bytes()));
    }

    #[test]
    fn test_seeded_keys_deterministic() {
        let a = SigningKey::from_seed(&[42; 32]).verifying_key();
        assert_eq!(a, SigningKey::from_seed(&[42; 32]).verifying_key());
        assert_ne!(a, SigningKey::from_seed(&[43; 32]).verifying_key());
        assert_eq!(VerifyingKey::from_bytes(a.as_bytes()).expect("decode"), a);
    }

    #[test]
    fn test_address_format() {
        let address = SigningKey::from_seed(&[7; 32]).verifying_key().address();
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 2 + ADDRESS_LEN * 2);
    }

    #[test]
    fn test_debug_shows_address_only() {
        let key = rfc_key();
        let debug = format!("{key:?}");
        assert!(debug.contains(&key.verifying_key().address()));
        assert!(!debug.contains(RFC_SEED));
    }
}
