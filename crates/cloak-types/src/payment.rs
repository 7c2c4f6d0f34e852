//! Sender-side payment bundles.

use serde::{Deserialize, Serialize};

use crate::{Amount, Commitment, Nullifier, Secret, TxId};

/// Everything the sender produces for one payment.
///
/// Created at generation time, transmitted once, and logically consumed when
/// the receiver's claim flips the nullifier to spent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentSecret {
    pub secret: Secret,
    pub nullifier: Nullifier,
    pub commitment: Commitment,
    pub amount: Amount,
    /// Generation time, Unix milliseconds.
    pub timestamp: u64,
}

/// Plain data handed to the out-of-band channel once the deposit is confirmed.
#[derive(Clone, Debug, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ShareableArtifact {
    #[ts(type = "string")]
    pub secret: Secret,
    #[ts(type = "string")]
    pub commitment: Commitment,
    /// Deterministic function of `commitment`.
    pub shareable_link: String,
    #[ts(type = "string")]
    pub tx_hash: TxId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_json_shape() {
        let artifact = ShareableArtifact {
            secret: Secret::from_bytes([1u8; 32]),
            commitment: Commitment::from_bytes([2u8; 32]),
            shareable_link: "https://pay.private/02".to_string(),
            tx_hash: TxId::from_bytes([3u8; 32]),
        };
        let value = serde_json::to_value(&artifact).expect("serialize");
        assert_eq!(value["secret"], format!("0x{}", "01".repeat(32)));
        assert_eq!(value["shareableLink"], "https://pay.private/02");
        assert_eq!(value["txHash"], format!("0x{}", "03".repeat(32)));
    }

    #[test]
    fn test_payment_secret_debug_hides_secret() {
        let bundle = PaymentSecret {
            secret: Secret::from_bytes([0xAB; 32]),
            nullifier: Nullifier::from_bytes([0xCD; 32]),
            commitment: Commitment::from_bytes([0xEF; 32]),
            amount: Amount::from_minor(5),
            timestamp: 0,
        };
        let debug = format!("{bundle:?}");
        assert!(!debug.contains("abab"));
        assert!(debug.contains("cdcd"));
    }
}
