//! Password-sealed secrets.
//!
//! ```text
//! key      = Argon2id(password, salt)
//! envelope = hex(salt[16] || nonce[12] || ChaCha20-Poly1305(key, nonce, secret, aad = context))
//! ```
//!
//! The secret can travel through a channel the sender does not fully trust;
//! only someone holding the password can open it.

use cloak_crypto::hash::Domain;
use cloak_crypto::seal::{CostParams, SealKey, NONCE_LEN, SALT_LEN, TAG_LEN};
use cloak_crypto::CryptoError;
use cloak_types::{Secret, VALUE_LEN};
use zeroize::Zeroize;

use crate::{CommitmentError, Result};

const ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + VALUE_LEN + TAG_LEN;
const AAD: &[u8] = Domain::SecretEnvelope.context().as_bytes();

/// Seal `secret` under `password` with the default Argon2id cost.
pub fn seal_secret(secret: &Secret, password: &str) -> Result<String> {
    seal_secret_with(secret, password, CostParams::default())
}

/// Open an envelope produced by [`seal_secret`].
pub fn open_secret(envelope: &str, password: &str) -> Result<Secret> {
    open_secret_with(envelope, password, CostParams::default())
}

/// [`seal_secret`] with explicit Argon2id cost parameters.
pub fn seal_secret_with(secret: &Secret, password: &str, cost: CostParams) -> Result<String> {
    let salt = cloak_crypto::random::bytes::<SALT_LEN>().map_err(entropy)?;
    let nonce = cloak_crypto::random::bytes::<NONCE_LEN>().map_err(entropy)?;

    let ciphertext = SealKey::from_password(password.as_bytes(), &salt, cost)
        .and_then(|key| key.seal(&nonce, secret.as_bytes(), AAD))
        .map_err(|e| CommitmentError::Crypto(e.to_string()))?;

    let mut out = Vec::with_capacity(ENVELOPE_LEN);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(format!("0x{}", hex::encode(out)))
}

/// [`open_secret`] with explicit Argon2id cost parameters.
///
/// # Errors
///
/// - [`CommitmentError::MalformedEnvelope`] if the envelope is not hex or has the wrong length
/// - [`CommitmentError::EnvelopeAuthentication`] on a wrong password or tampering
pub fn open_secret_with(envelope: &str, password: &str, cost: CostParams) -> Result<Secret> {
    let digits = envelope.strip_prefix("0x").unwrap_or(envelope);
    let raw = hex::decode(digits).map_err(|e| CommitmentError::MalformedEnvelope(e.to_string()))?;
    if raw.len() != ENVELOPE_LEN {
        return Err(CommitmentError::MalformedEnvelope(format!(
            "expected {ENVELOPE_LEN} bytes, got {}",
            raw.len()
        )));
    }

    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    salt.copy_from_slice(&raw[..SALT_LEN]);
    nonce.copy_from_slice(&raw[SALT_LEN..SALT_LEN + NONCE_LEN]);
    let ciphertext = &raw[SALT_LEN + NONCE_LEN..];

    let key = SealKey::from_password(password.as_bytes(), &salt, cost)
        .map_err(|e| CommitmentError::Crypto(e.to_string()))?;
    let mut plaintext = key
        .open(&nonce, ciphertext, AAD)
        .map_err(|_| CommitmentError::EnvelopeAuthentication)?;

    let mut bytes = [0u8; VALUE_LEN];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    let secret = Secret::from_bytes(bytes);
    bytes.zeroize();
    Ok(secret)
}

fn entropy(err: CryptoError) -> CommitmentError {
    CommitmentError::EntropyUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: CostParams = CostParams {
        memory_kib: 1024,
        iterations: 1,
        lanes: 1,
    };

    #[test]
    fn test_seal_open_roundtrip() {
        let secret = Secret::from_bytes([0x42; 32]);
        let envelope = seal_secret_with(&secret, "hunter2", FAST).expect("seal");
        let opened = open_secret_with(&envelope, "hunter2", FAST).expect("open");
        assert_eq!(opened.as_bytes(), secret.as_bytes());
    }

    #[test]
    fn test_envelope_does_not_contain_secret() {
        let secret = Secret::from_bytes([0x42; 32]);
        let envelope = seal_secret_with(&secret, "pw", FAST).expect("seal");
        assert!(!envelope.contains(&"42".repeat(32)));
        assert_eq!(envelope.len(), 2 + ENVELOPE_LEN * 2);
    }

    #[test]
    fn test_wrong_password_fails_authentication() {
        let secret = Secret::from_bytes([0x42; 32]);
        let envelope = seal_secret_with(&secret, "right", FAST).expect("seal");
        assert!(matches!(
            open_secret_with(&envelope, "wrong", FAST),
            Err(CommitmentError::EnvelopeAuthentication)
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(
            open_secret_with("0xzz", "pw", FAST),
            Err(CommitmentError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            open_secret_with("0xabcd", "pw", FAST),
            Err(CommitmentError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_fresh_salt_per_seal() {
        let secret = Secret::from_bytes([0x42; 32]);
        let a = seal_secret_with(&secret, "pw", FAST).expect("seal");
        let b = seal_secret_with(&secret, "pw", FAST).expect("seal");
        assert_ne!(a, b);
    }
}
