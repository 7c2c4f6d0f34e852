//! 256-bit protocol values.
//!
//! Every secret, nullifier, commitment and transaction identifier is 32 bytes
//! rendered as `0x` followed by 64 lowercase hex digits. Parsing accepts an
//! optional `0x`/`0X` prefix and either hex case, and nothing else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Result, TypesError, HEX_DIGITS, VALUE_LEN};

/// Parse a `0x`-prefixed (or bare) 64-digit hex string into 32 bytes.
///
/// # Errors
///
/// - [`TypesError::InvalidHex`] on wrong length or a non-hex character
pub fn parse_hex32(field: &'static str, input: &str) -> Result<[u8; VALUE_LEN]> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    if digits.len() != HEX_DIGITS {
        return Err(TypesError::InvalidHex {
            field,
            reason: format!("expected {HEX_DIGITS} hex digits, got {}", digits.len()),
        });
    }
    if let Some(pos) = digits.find(|c: char| !c.is_ascii_hexdigit()) {
        return Err(TypesError::InvalidHex {
            field,
            reason: format!("non-hex character at position {pos}"),
        });
    }

    let mut out = [0u8; VALUE_LEN];
    ::hex::decode_to_slice(digits, &mut out).map_err(|e| TypesError::InvalidHex {
        field,
        reason: e.to_string(),
    })?;
    Ok(out)
}

/// Render 32 bytes as `0x` + 64 lowercase hex digits.
pub fn to_prefixed_hex(bytes: &[u8; VALUE_LEN]) -> String {
    format!("0x{}", ::hex::encode(bytes))
}

macro_rules! public_value {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; VALUE_LEN]);

        impl $name {
            /// Wrap raw bytes.
            pub fn from_bytes(bytes: [u8; VALUE_LEN]) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8; VALUE_LEN] {
                &self.0
            }

            /// Render as `0x`-prefixed lowercase hex.
            pub fn to_hex(&self) -> String {
                to_prefixed_hex(&self.0)
            }

            /// Parse from hex (optional `0x` prefix, exactly 64 digits).
            pub fn parse(input: &str) -> Result<Self> {
                parse_hex32($field, input).map(Self)
            }

            /// First 8 hex digits, for log lines.
            pub fn short(&self) -> String {
                ::hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

public_value!(
    /// Single-use token bound 1:1 to a secret; spending it twice is rejected.
    Nullifier,
    "nullifier"
);

public_value!(
    /// `H(secret || nullifier || amount)`; identifies exactly one deposit.
    Commitment,
    "commitment"
);

public_value!(
    /// Opaque ledger transaction identifier.
    TxId,
    "transaction id"
);

/// A 256-bit payment secret.
///
/// Held only transiently and wiped from memory on drop. `Debug` never
/// prints the value; [`Secret::expose_hex`] must be called explicitly to
/// render it for the out-of-band channel.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; VALUE_LEN]);

impl Secret {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; VALUE_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; VALUE_LEN] {
        &self.0
    }

    /// Parse from hex (optional `0x` prefix, exactly 64 digits).
    pub fn parse(input: &str) -> Result<Self> {
        parse_hex32("secret", input).map(Self)
    }

    /// Render the secret as `0x`-prefixed hex for transmission.
    pub fn expose_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.expose_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
