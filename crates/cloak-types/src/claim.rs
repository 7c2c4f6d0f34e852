//! Claim records.
//!
//! A [`ClaimRecord`] is the claim side's local cache of a claim's outcome.
//! The ledger stays authoritative; the record only moves forward.

use serde::{Deserialize, Serialize};

use crate::{Commitment, Nullifier, Result, TxId, TypesError};

/// Claim status. `Pending` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Completed,
    Failed,
}

impl ClaimStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Pending)
    }
}

/// Local record of one claim attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    #[ts(type = "string")]
    pub commitment: Commitment,
    #[ts(type = "string")]
    pub nullifier: Nullifier,
    pub status: ClaimStatus,
    #[ts(type = "string | null")]
    pub tx_hash: Option<TxId>,
}

impl ClaimRecord {
    /// A fresh pending record.
    pub fn pending(commitment: Commitment, nullifier: Nullifier) -> Self {
        Self {
            commitment,
            nullifier,
            status: ClaimStatus::Pending,
            tx_hash: None,
        }
    }

    /// Pending → Completed.
    ///
    /// `tx_hash` is `None` when completion was learned from the ledger's
    /// spent state rather than from a withdrawal this side submitted.
    /// Completing again is a no-op, and may fill in a hash that was missing.
    pub fn complete(&mut self, tx_hash: Option<TxId>) -> Result<()> {
        match (self.status, self.tx_hash, tx_hash) {
            (ClaimStatus::Pending, _, _) => {
                self.status = ClaimStatus::Completed;
                self.tx_hash = tx_hash;
                Ok(())
            }
            (ClaimStatus::Completed, Some(known), Some(new)) if known != new => {
                Err(TypesError::InvalidTransition {
                    from: ClaimStatus::Completed,
                    to: ClaimStatus::Completed,
                })
            }
            (ClaimStatus::Completed, None, Some(new)) => {
                self.tx_hash = Some(new);
                Ok(())
            }
            (ClaimStatus::Completed, _, _) => Ok(()),
            (from, _, _) => Err(TypesError::InvalidTransition {
                from,
                to: ClaimStatus::Completed,
            }),
        }
    }

    /// Pending → Failed.
    pub fn fail(&mut self) -> Result<()> {
        match self.status {
            ClaimStatus::Pending => {
                self.status = ClaimStatus::Failed;
                Ok(())
            }
            ClaimStatus::Failed => Ok(()),
            from => Err(TypesError::InvalidTransition {
                from,
                to: ClaimStatus::Failed,
            }),
        }
    }
}
