//! Disclosure proof data types.

use cloak_types::{Amount, Commitment};
use serde::{Deserialize, Serialize};

/// The public side of a disclosure: exactly the commitment and the amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub commitment: Commitment,
    pub amount: Amount,
}

impl PublicInputs {
    pub fn new(commitment: Commitment, amount: Amount) -> Self {
        Self { commitment, amount }
    }

    /// Byte string a backend binds to: `commitment || canonical amount`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let amount = self.amount.canonical();
        let mut out = Vec::with_capacity(32 + amount.len());
        out.extend_from_slice(self.commitment.as_bytes());
        out.extend_from_slice(amount.as_bytes());
        out
    }
}

/// Public key a commitment's disclosure proofs must verify under.
///
/// Derived from the secret and fixed when the commitment is deposited, so
/// only the secret behind the commitment can produce an accepted proof.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisclosureKey(#[serde(with = "hex_key")] pub [u8; 32]);

impl DisclosureKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for DisclosureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisclosureKey({})", hex::encode(&self.0[..4]))
    }
}

/// An opaque proof plus the public inputs it was generated for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureProof {
    /// Backend identifier, e.g. `"ed25519-disclosure-v1"`.
    pub scheme: String,
    pub public_inputs: PublicInputs,
    /// Backend-specific bytes; callers must not interpret them.
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(D::Error::custom)
    }
}

mod hex_key {
    use cloak_types::value;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value::to_prefixed_hex(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        value::parse_hex32("disclosure key", &s).map_err(D::Error::custom)
    }
}
