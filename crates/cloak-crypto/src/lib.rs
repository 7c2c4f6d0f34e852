//! # cloak-crypto
//!
//! Cryptographic primitives for the Cloak payment core.
//!
//! The suite is fixed: BLAKE3 for every digest, Ed25519 for signatures,
//! Argon2id + ChaCha20-Poly1305 for password-sealed secrets, and the OS
//! CSPRNG for all randomness.
//!
//! ## Modules
//!
//! - [`hash`]: BLAKE3 keyed by a [`hash::Domain`] per purpose, Merkle inner nodes
//! - [`keys`]: Ed25519 wallet and disclosure keys, identity addresses
//! - [`seal`]: Password-derived sealing keys
//! - [`random`]: CSPRNG access with explicit entropy failure

pub mod hash;
pub mod keys;
pub mod random;
pub mod seal;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The operating system entropy source could not be read.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("signature verification failed")]
    SignatureVerification,

    /// Malformed Ed25519 public key bytes.
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// Wrong password, tampered ciphertext, or mismatched associated data.
    #[error("sealed payload failed authentication")]
    Unseal,

    #[error("key stretching failed: {0}")]
    KeyStretch(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Compare two byte strings in constant time.
///
/// Slices of different length compare unequal without inspecting contents.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(b"commitment", b"commitment"));
        assert!(!ct_eq(b"commitment", b"commitmenT"));
        assert!(!ct_eq(b"abc", b"ab"));
        assert!(ct_eq(&[], &[]));
    }
}
