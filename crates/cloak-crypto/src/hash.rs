//! Domain-separated BLAKE3.
//!
//! Each digest the protocol produces belongs to one [`Domain`], and each
//! domain keys BLAKE3's derive-key mode with its own context string. Two
//! domains can never produce the same digest for the same input.
//!
//! Multi-field inputs are length-prefixed before hashing:
//!
//! ```text
//! LE32(len(f0)) || f0 || LE32(len(f1)) || f1 || ...
//! ```

use std::sync::OnceLock;

/// Purpose a digest is computed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    /// `H(secret || nullifier || amount)`.
    PaymentCommitment,
    /// Key for Merkle inner nodes.
    MerkleInnerNode,
    /// Disclosure signing seed from a payment secret.
    DisclosureKey,
    DisclosureMessage,
    /// Associated data for sealed secrets.
    SecretEnvelope,
    /// Payload a wallet signs for a ledger request.
    LedgerRequest,
    LedgerTxId,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::PaymentCommitment,
        Domain::MerkleInnerNode,
        Domain::DisclosureKey,
        Domain::DisclosureMessage,
        Domain::SecretEnvelope,
        Domain::LedgerRequest,
        Domain::LedgerTxId,
    ];

    /// The BLAKE3 context string. Frozen: changing one changes every digest.
    pub const fn context(self) -> &'static str {
        match self {
            Domain::PaymentCommitment => "Cloak v1 payment-commitment",
            Domain::MerkleInnerNode => "Cloak v1 merkle-inner-node",
            Domain::DisclosureKey => "Cloak v1 disclosure-key",
            Domain::DisclosureMessage => "Cloak v1 disclosure",
            Domain::SecretEnvelope => "Cloak v1 secret-envelope",
            Domain::LedgerRequest => "Cloak v1 ledger-request",
            Domain::LedgerTxId => "Cloak v1 ledger-tx-id",
        }
    }

    /// Derive 32 bytes from raw key material.
    pub fn derive_key(self, material: &[u8]) -> [u8; 32] {
        let mut hasher = ::blake3::Hasher::new_derive_key(self.context());
        hasher.update(material);
        *hasher.finalize().as_bytes()
    }

    /// Derive 32 bytes from length-prefixed `fields`.
    pub fn derive(self, fields: &[&[u8]]) -> [u8; 32] {
        let mut hasher = ::blake3::Hasher::new_derive_key(self.context());
        for field in fields {
            hasher.update(&(field.len() as u32).to_le_bytes());
            hasher.update(field);
        }
        *hasher.finalize().as_bytes()
    }
}

/// Plain BLAKE3, for addresses and test fixtures.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// `keyed_hash(K_inner, left || right)` with
/// `K_inner = derive_key("Cloak v1 merkle-inner-node", "")`.
///
/// Order matters: `merkle_inner(a, b) != merkle_inner(b, a)`.
pub fn merkle_inner(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    static INNER_KEY: OnceLock<[u8; 32]> = OnceLock::new();
    let key = INNER_KEY.get_or_init(|| Domain::MerkleInnerNode.derive_key(b""));

    let mut hasher = ::blake3::Hasher::new_keyed(key);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}
