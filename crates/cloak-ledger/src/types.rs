//! Data exchanged with the ledger and wallet.

use cloak_accumulator::MerkleProof;
use cloak_crypto::hash::Domain;
use cloak_crypto::keys::{Signature, VerifyingKey};
use cloak_proof::{DisclosureKey, DisclosureProof};
use cloak_types::{Amount, Commitment, Digest, Nullifier, Secret, TxId};
use serde::{Deserialize, Serialize};

/// A wallet's public signing identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// `0x` + 40 hex digits, derived from `verifying_key`.
    pub address: String,
    pub verifying_key: VerifyingKey,
}

impl Identity {
    pub fn from_key(verifying_key: VerifyingKey) -> Self {
        Self {
            address: verifying_key.address(),
            verifying_key,
        }
    }

    /// Check that `signature` over `payload` was made by this identity and
    /// that the address matches the key.
    pub fn verify(&self, payload: &[u8], signature: &Signature) -> bool {
        self.address == self.verifying_key.address()
            && self.verifying_key.verify(payload, signature).is_ok()
    }
}

/// Lock funds behind a commitment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub commitment: Commitment,
    pub amount: Amount,
    pub nullifier: Nullifier,
    /// Key every disclosure proof for this commitment must verify under.
    pub disclosure_key: DisclosureKey,
    pub signer: Identity,
    /// Signature over [`DepositRequest::payload`].
    pub signature: Signature,
}

impl DepositRequest {
    /// Digest the signer signs.
    pub fn payload(
        commitment: &Commitment,
        amount: &Amount,
        nullifier: &Nullifier,
        disclosure_key: &DisclosureKey,
    ) -> Digest {
        let amount = amount.canonical();
        Domain::LedgerRequest.derive(&[
            b"deposit",
            commitment.as_bytes(),
            nullifier.as_bytes(),
            amount.as_bytes(),
            disclosure_key.as_bytes(),
        ])
    }

    pub fn signed_payload(&self) -> Digest {
        Self::payload(
            &self.commitment,
            &self.amount,
            &self.nullifier,
            &self.disclosure_key,
        )
    }
}

/// Release funds to a recipient by revealing the secret.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub secret: Secret,
    pub nullifier: Nullifier,
    pub recipient: String,
    pub amount: Amount,
    pub commitment: Commitment,
    pub leaf_index: usize,
    pub merkle_proof: MerkleProof,
    /// Root the Merkle proof was generated against.
    #[serde(with = "digest_hex")]
    pub root: Digest,
    pub disclosure: DisclosureProof,
    pub signer: Identity,
    /// Signature over [`WithdrawRequest::payload`].
    pub signature: Signature,
}

impl WithdrawRequest {
    /// Digest the signer signs.
    pub fn payload(
        nullifier: &Nullifier,
        commitment: &Commitment,
        recipient: &str,
        amount: &Amount,
        leaf_index: usize,
        root: &Digest,
    ) -> Digest {
        let amount = amount.canonical();
        let index = (leaf_index as u64).to_le_bytes();
        Domain::LedgerRequest.derive(&[
            b"withdraw",
            nullifier.as_bytes(),
            commitment.as_bytes(),
            recipient.as_bytes(),
            amount.as_bytes(),
            &index,
            root,
        ])
    }

    pub fn signed_payload(&self) -> Digest {
        Self::payload(
            &self.nullifier,
            &self.commitment,
            &self.recipient,
            &self.amount,
            self.leaf_index,
            &self.root,
        )
    }
}

/// The ledger's view of one commitment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentStatus {
    pub exists: bool,
    pub amount: Option<Amount>,
    /// Deposit time, Unix milliseconds (0 when absent).
    pub timestamp: u64,
    pub is_spent: bool,
    /// Disclosure key deposited with the commitment.
    pub disclosure_key: Option<DisclosureKey>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdraw,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Rejected(String),
}

/// State of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDetails {
    pub tx: TxId,
    pub kind: TxKind,
    pub status: TxStatus,
    pub commitment: Commitment,
    pub submitted_at: u64,
}

mod digest_hex {
    use cloak_types::{value, Digest};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &Digest, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value::to_prefixed_hex(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Digest, D::Error> {
        let s = String::deserialize(deserializer)?;
        value::parse_hex32("merkle root", &s).map_err(D::Error::custom)
    }
}
