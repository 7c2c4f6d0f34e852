//! Collaborator interfaces.
//!
//! Implementors provide the actual ledger transport and key custody. Every
//! call is a suspension point and may take arbitrarily long.

use std::future::Future;

use cloak_crypto::keys::Signature;
use cloak_types::{Commitment, TxId};

use crate::types::{CommitmentStatus, DepositRequest, Identity, TxDetails, WithdrawRequest};
use crate::Result;

/// The ledger that custodies deposits.
pub trait Ledger: Send + Sync {
    /// Lock `request.amount` behind `request.commitment`.
    fn deposit(&self, request: DepositRequest) -> impl Future<Output = Result<TxId>> + Send;

    /// Release a deposit to `request.recipient`, spending its nullifier.
    fn withdraw(&self, request: WithdrawRequest) -> impl Future<Output = Result<TxId>> + Send;

    /// Authoritative deposit and spent state for a commitment.
    fn get_commitment_status(
        &self,
        commitment: &Commitment,
    ) -> impl Future<Output = Result<CommitmentStatus>> + Send;

    /// Current state of a submitted transaction.
    fn get_transaction(&self, tx: &TxId) -> impl Future<Output = Result<TxDetails>> + Send;
}

/// A signing identity.
pub trait Wallet: Send + Sync {
    fn connect(&self) -> impl Future<Output = Result<Identity>> + Send;

    /// Sign a request payload. Fails when not connected.
    fn sign(&self, payload: &[u8]) -> impl Future<Output = Result<Signature>> + Send;

    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}
