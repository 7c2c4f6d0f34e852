//! # cloak-types
//!
//! Shared data model for the Cloak payment core.
//!
//! - [`value`]: 256-bit values (`Secret`, `Nullifier`, `Commitment`, `TxId`)
//!   rendered as `0x`-prefixed hex
//! - [`amount`]: Decimal amounts canonicalized to minor units
//! - [`payment`]: The sender's [`payment::PaymentSecret`] bundle and the
//!   [`payment::ShareableArtifact`] handed to the out-of-band channel
//! - [`claim`]: [`claim::ClaimRecord`] with monotonic status transitions

pub mod amount;
pub mod claim;
pub mod payment;
pub mod value;

pub use amount::Amount;
pub use claim::{ClaimRecord, ClaimStatus};
pub use payment::{PaymentSecret, ShareableArtifact};
pub use value::{Commitment, Nullifier, Secret, TxId};

/// A 256-bit digest (Merkle nodes, roots).
pub type Digest = [u8; 32];

/// Byte length of secrets, nullifiers, commitments and digests.
pub const VALUE_LEN: usize = 32;

/// Hex digits in a rendered 256-bit value, excluding the `0x` prefix.
pub const HEX_DIGITS: usize = VALUE_LEN * 2;

/// Decimal places of the ledger's minor unit (1 unit = 10^18 minor units).
pub const MINOR_UNIT_DECIMALS: usize = 18;

/// Error types for parsing and state transitions on shared types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// A hex-rendered value was malformed.
    #[error("invalid {field}: {reason}")]
    InvalidHex {
        /// Which value failed to parse ("secret", "nullifier", ...).
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// An amount string was not a canonicalizable decimal.
    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmount {
        /// The rejected input.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A claim record transition would move backwards or sideways.
    #[error("invalid claim transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: ClaimStatus,
        /// Requested status.
        to: ClaimStatus,
    },
}

/// Convenience result type for shared type operations.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    #[test]
    #[ignore] // Run manually to generate bindings for the UI layer
    fn export_ts_bindings() {
        use ts_rs::TS;
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bindings");
        std::fs::create_dir_all(&dir).expect("create bindings dir");
        crate::payment::ShareableArtifact::export_all_to(&dir).expect("export artifact");
        crate::claim::ClaimRecord::export_all_to(&dir).expect("export claim record");
    }
}
