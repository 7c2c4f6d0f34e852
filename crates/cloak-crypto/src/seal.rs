//! Password sealing.
//!
//! ```text
//! key        = Argon2id(password, salt[16])
//! ciphertext = ChaCha20-Poly1305(key, nonce[12], plaintext, aad)
//! ```

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
/// Poly1305 tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Argon2id cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
}

impl Default for CostParams {
    /// 64 MiB, 3 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            lanes: 1,
        }
    }
}

/// A 256-bit key stretched from a password.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealKey([u8; 32]);

impl SealKey {
    /// # Errors
    ///
    /// - [`CryptoError::KeyStretch`] for cost parameters Argon2 refuses
    pub fn from_password(password: &[u8], salt: &[u8; SALT_LEN], cost: CostParams) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.lanes, Some(32))
            .map_err(|e| CryptoError::KeyStretch(e.to_string()))?;
        let mut key = [0u8; 32];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| CryptoError::KeyStretch(e.to_string()))?;
        Ok(Self(key))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt and authenticate; output is `plaintext.len() + TAG_LEN` bytes.
    /// `nonce` must never repeat under one key.
    pub fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::Unseal)
    }

    /// # Errors
    ///
    /// - [`CryptoError::Unseal`] if the tag does not verify
    pub fn open(&self, nonce: &[u8; NONCE_LEN], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::Unseal)
    }
}

impl std::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: CostParams = CostParams {
        memory_kib: 1024,
        iterations: 1,
        lanes: 1,
    };
    const SALT: [u8; SALT_LEN] = *b"cloak-test-salt!";
    const NONCE: [u8; NONCE_LEN] = [9; NONCE_LEN];

    fn key(password: &str, salt: &[u8; SALT_LEN]) -> SealKey {
        SealKey::from_password(password.as_bytes(), salt, FAST).expect("stretch")
    }

    #[test]
    fn test_seal_open() {
        let key = key("hunter2", &SALT);
        let sealed = key.seal(&NONCE, b"payment secret", b"aad").expect("seal");
        assert_eq!(sealed.len(), b"payment secret".len() + TAG_LEN);
        assert_eq!(key.open(&NONCE, &sealed, b"aad").expect("open"), b"payment secret");
    }

    #[test]
    fn test_stretch_deterministic_per_password_and_salt() {
        let sealed = key("pw", &SALT).seal(&NONCE, b"x", b"").expect("seal");
        assert!(key("pw", &SALT).open(&NONCE, &sealed, b"").is_ok());
        assert!(key("other", &SALT).open(&NONCE, &sealed, b"").is_err());
        assert!(key("pw", b"another-salt-16b").open(&NONCE, &sealed, b"").is_err());
    }

    #[test]
    fn test_aad_and_tampering_detected() {
        let key = key("pw", &SALT);
        let mut sealed = key.seal(&NONCE, b"secret", b"aad1").expect("seal");
        assert!(matches!(key.open(&NONCE, &sealed, b"aad2"), Err(CryptoError::Unseal)));

        sealed[0] ^= 0x80;
        assert!(key.open(&NONCE, &sealed, b"aad1").is_err());
    }

    #[test]
    fn test_bad_cost_rejected() {
        let cost = CostParams {
            memory_kib: 1,
            ..FAST
        };
        assert!(matches!(
            SealKey::from_password(b"pw", &SALT, cost),
            Err(CryptoError::KeyStretch(_))
        ));
    }
}
