//! In-process ledger and wallet.
//!
//! [`MemoryLedger`] enforces the same rules a deployed ledger contract
//! would: signed requests, unique commitments, single-use nullifiers, and a
//! full opening check on withdrawal. Withdrawals must prove inclusion
//! against a root of the ledger's own commitment tree. Transactions stay pending for a
//! configurable number of polls before confirming. Faults can be injected
//! to drive retry and crash-recovery paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use cloak_accumulator::MerkleAccumulator;
use cloak_crypto::hash::Domain;
use cloak_crypto::keys::{Signature, SigningKey};
use cloak_proof::{DisclosureKey, Ed25519Disclosure, ProofService, PublicInputs};
use cloak_types::{now_millis, Amount, Commitment, Nullifier, TxId};
use tracing::{debug, info, warn};

use crate::traits::{Ledger, Wallet};
use crate::types::{
    CommitmentStatus, DepositRequest, Identity, TxDetails, TxKind, TxStatus, WithdrawRequest,
};
use crate::{LedgerError, Result};

#[derive(Debug)]
struct DepositEntry {
    amount: Amount,
    nullifier: Nullifier,
    disclosure_key: DisclosureKey,
    timestamp: u64,
}

#[derive(Debug)]
struct SpendEntry {
    tx: TxId,
    recipient: String,
}

#[derive(Debug)]
struct TxEntry {
    details: TxDetails,
    polls_remaining: u32,
}

#[derive(Debug, Default)]
struct Faults {
    transient: u32,
    reject_next: bool,
    lose_withdraw_ack: bool,
}

/// Roots a withdrawal may prove against.
const ROOT_HISTORY: usize = 64;

#[derive(Debug)]
struct State {
    deposits: HashMap<Commitment, DepositEntry>,
    /// Accepted commitments in deposit order.
    tree: MerkleAccumulator,
    deposit_nullifiers: HashSet<Nullifier>,
    spent: HashMap<Nullifier, SpendEntry>,
    txs: HashMap<TxId, TxEntry>,
    balances: HashMap<String, u128>,
    faults: Faults,
    tx_counter: u64,
}

impl State {
    fn new() -> Self {
        Self {
            deposits: HashMap::new(),
            tree: MerkleAccumulator::with_history(ROOT_HISTORY).unwrap_or_default(),
            deposit_nullifiers: HashSet::new(),
            spent: HashMap::new(),
            txs: HashMap::new(),
            balances: HashMap::new(),
            faults: Faults::default(),
            tx_counter: 0,
        }
    }

    fn next_tx_id(&mut self, commitment: &Commitment) -> TxId {
        self.tx_counter += 1;
        let counter = self.tx_counter.to_le_bytes();
        TxId::from_bytes(Domain::LedgerTxId.derive(&[&counter, commitment.as_bytes()]))
    }

    fn record_tx(&mut self, tx: TxId, kind: TxKind, commitment: Commitment, polls: u32) {
        self.txs.insert(
            tx,
            TxEntry {
                details: TxDetails {
                    tx,
                    kind,
                    status: TxStatus::Pending,
                    commitment,
                    submitted_at: now_millis(),
                },
                polls_remaining: polls,
            },
        );
    }

    /// Consume one injected transient failure, if any.
    fn take_transient(&mut self, call: &'static str) -> Result<()> {
        if self.faults.transient > 0 {
            self.faults.transient -= 1;
            warn!(call, remaining = self.faults.transient, "injected transient failure");
            return Err(LedgerError::Transient(format!("{call}: injected network failure")));
        }
        Ok(())
    }

    fn take_rejection(&mut self, call: &'static str) -> Result<()> {
        if std::mem::take(&mut self.faults.reject_next) {
            warn!(call, "injected rejection");
            return Err(LedgerError::Rejected(format!("{call}: injected rejection")));
        }
        Ok(())
    }
}

/// An in-process ledger.
#[derive(Debug)]
pub struct MemoryLedger {
    state: Mutex<State>,
    confirmation_polls: u32,
    latency: Duration,
    disclosure: Ed25519Disclosure,
}

impl MemoryLedger {
    /// Ledger whose transactions confirm on the first poll.
    pub fn new() -> Self {
        Self::with_confirmation_polls(0)
    }

    /// Ledger whose transactions report `Pending` for `polls` polls first.
    pub fn with_confirmation_polls(polls: u32) -> Self {
        Self {
            state: Mutex::new(State::new()),
            confirmation_polls: polls,
            latency: Duration::ZERO,
            disclosure: Ed25519Disclosure::new(),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Fail the next `n` calls with [`LedgerError::Transient`].
    pub fn fail_next(&self, n: u32) {
        self.lock().faults.transient = n;
    }

    /// Reject the next deposit or withdrawal with [`LedgerError::Rejected`].
    pub fn reject_next(&self) {
        self.lock().faults.reject_next = true;
    }

    /// Apply the next withdrawal but report a transient failure to the caller,
    /// as if the connection dropped after submission.
    pub fn lose_withdraw_ack(&self) {
        self.lock().faults.lose_withdraw_ack = true;
    }

    pub fn balance_of(&self, address: &str) -> u128 {
        self.lock().balances.get(address).copied().unwrap_or(0)
    }

    pub fn deposit_count(&self) -> usize {
        self.lock().deposits.len()
    }

    pub fn is_spent(&self, nullifier: &Nullifier) -> bool {
        self.lock().spent.contains_key(nullifier)
    }

    fn apply_deposit(&self, request: &DepositRequest) -> Result<TxId> {
        let mut state = self.lock();
        state.take_transient("deposit")?;
        state.take_rejection("deposit")?;

        if !request
            .signer
            .verify(&request.signed_payload(), &request.signature)
        {
            return Err(LedgerError::Rejected("invalid deposit signature".into()));
        }
        if request.amount.is_zero() {
            return Err(LedgerError::Rejected("zero amount".into()));
        }
        if state.deposits.contains_key(&request.commitment) {
            return Err(LedgerError::Rejected("commitment already deposited".into()));
        }
        if state.deposit_nullifiers.contains(&request.nullifier)
            || state.spent.contains_key(&request.nullifier)
        {
            return Err(LedgerError::Rejected("nullifier already used".into()));
        }

        let leaf_index = state
            .tree
            .insert(request.commitment)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let tx = state.next_tx_id(&request.commitment);
        state.deposits.insert(
            request.commitment,
            DepositEntry {
                amount: request.amount,
                nullifier: request.nullifier,
                disclosure_key: request.disclosure_key,
                timestamp: now_millis(),
            },
        );
        state.deposit_nullifiers.insert(request.nullifier);
        self.disclosure
            .register_key(request.commitment, request.disclosure_key);
        state.record_tx(tx, TxKind::Deposit, request.commitment, self.confirmation_polls);

        info!(
            commitment = %request.commitment.short(),
            tx = %tx.short(),
            leaf_index,
            "ledger accepted deposit"
        );
        Ok(tx)
    }

    fn apply_withdraw(&self, request: &WithdrawRequest) -> Result<TxId> {
        let mut state = self.lock();
        state.take_transient("withdraw")?;
        state.take_rejection("withdraw")?;

        if !request
            .signer
            .verify(&request.signed_payload(), &request.signature)
        {
            return Err(LedgerError::Rejected("invalid withdraw signature".into()));
        }
        let Some(entry) = state.deposits.get(&request.commitment) else {
            return Err(LedgerError::Rejected("unknown commitment".into()));
        };
        if let Some(spend) = state.spent.get(&request.nullifier) {
            // An identical resubmission reports the original transaction.
            if spend.recipient == request.recipient {
                debug!(tx = %spend.tx.short(), "withdraw resubmitted");
                return Ok(spend.tx);
            }
            return Err(LedgerError::Rejected("nullifier already spent".into()));
        }
        if entry.nullifier != request.nullifier || entry.amount != request.amount {
            return Err(LedgerError::Rejected("request does not match deposit".into()));
        }
        if !cloak_commitment::verify(
            &request.secret,
            &request.commitment,
            &request.amount,
            &request.nullifier,
        ) {
            return Err(LedgerError::Rejected("commitment opening mismatch".into()));
        }
        if !state.tree.is_recent_root(&request.root) {
            return Err(LedgerError::Rejected("unknown merkle root".into()));
        }
        if !state.tree.verify(
            &request.commitment,
            &request.merkle_proof,
            request.leaf_index,
            &request.root,
        ) {
            return Err(LedgerError::Rejected("invalid merkle proof".into()));
        }
        let inputs = PublicInputs::new(request.commitment, request.amount);
        if !self
            .disclosure
            .verify_disclosure_proof(&request.disclosure, &inputs, &request.commitment)
            || !self.disclosure.opens_with(&request.disclosure, &request.secret)
        {
            return Err(LedgerError::Rejected("invalid disclosure proof".into()));
        }

        let tx = state.next_tx_id(&request.commitment);
        state.spent.insert(
            request.nullifier,
            SpendEntry {
                tx,
                recipient: request.recipient.clone(),
            },
        );
        let balance = state.balances.entry(request.recipient.clone()).or_default();
        *balance = balance.saturating_add(request.amount.minor());
        state.record_tx(tx, TxKind::Withdraw, request.commitment, self.confirmation_polls);

        info!(
            commitment = %request.commitment.short(),
            tx = %tx.short(),
            "ledger released deposit"
        );

        if std::mem::take(&mut state.faults.lose_withdraw_ack) {
            warn!(tx = %tx.short(), "dropping withdraw acknowledgement");
            return Err(LedgerError::Transient("connection lost after submit".into()));
        }
        Ok(tx)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for MemoryLedger {
    async fn deposit(&self, request: DepositRequest) -> Result<TxId> {
        self.delay().await;
        self.apply_deposit(&request)
    }

    async fn withdraw(&self, request: WithdrawRequest) -> Result<TxId> {
        self.delay().await;
        self.apply_withdraw(&request)
    }

    async fn get_commitment_status(&self, commitment: &Commitment) -> Result<CommitmentStatus> {
        self.delay().await;
        let mut state = self.lock();
        state.take_transient("get_commitment_status")?;

        let status = match state.deposits.get(commitment) {
            Some(entry) => CommitmentStatus {
                exists: true,
                amount: Some(entry.amount),
                timestamp: entry.timestamp,
                is_spent: state.spent.contains_key(&entry.nullifier),
                disclosure_key: Some(entry.disclosure_key),
            },
            None => CommitmentStatus::default(),
        };
        Ok(status)
    }

    async fn get_transaction(&self, tx: &TxId) -> Result<TxDetails> {
        self.delay().await;
        let mut state = self.lock();
        state.take_transient("get_transaction")?;

        let entry = state.txs.get_mut(tx).ok_or(LedgerError::NotFound)?;
        if entry.polls_remaining > 0 {
            entry.polls_remaining -= 1;
        } else if entry.details.status == TxStatus::Pending {
            entry.details.status = TxStatus::Confirmed;
            debug!(tx = %tx.short(), "transaction confirmed");
        }
        Ok(entry.details.clone())
    }
}

/// Wallet holding one Ed25519 keypair.
pub struct MemoryWallet {
    key: SigningKey,
    connected: AtomicBool,
}

impl MemoryWallet {
    pub fn generate() -> Self {
        Self::from_key(SigningKey::generate())
    }

    pub fn from_key(key: SigningKey) -> Self {
        Self {
            key,
            connected: AtomicBool::new(false),
        }
    }

    /// Identity without requiring a connection.
    pub fn identity(&self) -> Identity {
        Identity::from_key(self.key.verifying_key())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWallet")
            .field("address", &self.identity().address)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Wallet for MemoryWallet {
    async fn connect(&self) -> Result<Identity> {
        self.connected.store(true, Ordering::SeqCst);
        let identity = self.identity();
        debug!(address = %identity.address, "wallet connected");
        Ok(identity)
    }

    async fn sign(&self, payload: &[u8]) -> Result<Signature> {
        if !self.is_connected() {
            return Err(LedgerError::WalletUnavailable("wallet not connected".into()));
        }
        Ok(self.key.sign(payload))
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloak_accumulator::MerkleProof;
    use cloak_commitment::{OsSecretGenerator, SecretGenerator};
    use cloak_types::PaymentSecret;

    async fn signed_deposit(wallet: &MemoryWallet, payment: &PaymentSecret) -> DepositRequest {
        let key = Ed25519Disclosure::new().disclosure_key(&payment.secret);
        signed_deposit_with_key(wallet, payment, key).await
    }

    async fn signed_deposit_with_key(
        wallet: &MemoryWallet,
        payment: &PaymentSecret,
        disclosure_key: DisclosureKey,
    ) -> DepositRequest {
        let payload = DepositRequest::payload(
            &payment.commitment,
            &payment.amount,
            &payment.nullifier,
            &disclosure_key,
        );
        DepositRequest {
            commitment: payment.commitment,
            amount: payment.amount,
            nullifier: payment.nullifier,
            disclosure_key,
            signer: wallet.identity(),
            signature: wallet.sign(&payload).await.expect("sign"),
        }
    }

    async fn signed_withdraw(
        wallet: &MemoryWallet,
        payment: &PaymentSecret,
        acc: &MerkleAccumulator,
    ) -> WithdrawRequest {
        let index = acc.index_of(&payment.commitment).expect("leaf");
        let (proof, root) = acc.proof_with_root(index).expect("proof");
        let recipient = wallet.identity().address;
        let payload = WithdrawRequest::payload(
            &payment.nullifier,
            &payment.commitment,
            &recipient,
            &payment.amount,
            index,
            &root,
        );
        WithdrawRequest {
            secret: payment.secret.clone(),
            nullifier: payment.nullifier,
            recipient,
            amount: payment.amount,
            commitment: payment.commitment,
            leaf_index: index,
            merkle_proof: proof,
            root,
            disclosure: Ed25519Disclosure::new()
                .generate_disclosure_proof(&payment.secret, &payment.commitment, &payment.amount)
                .expect("disclosure"),
            signer: wallet.identity(),
            signature: wallet.sign(&payload).await.expect("sign"),
        }
    }

    fn payment(amount: &str) -> PaymentSecret {
        OsSecretGenerator
            .new_payment(Amount::parse(amount).expect("amount"))
            .expect("payment")
    }

    #[tokio::test]
    async fn test_deposit_then_status() {
        let ledger = MemoryLedger::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");
        let p = payment("0.05");

        let tx = ledger
            .deposit(signed_deposit(&wallet, &p).await)
            .await
            .expect("deposit");
        let status = ledger
            .get_commitment_status(&p.commitment)
            .await
            .expect("status");
        assert!(status.exists);
        assert!(!status.is_spent);
        assert_eq!(status.amount, Some(p.amount));
        assert_eq!(
            status.disclosure_key,
            Some(Ed25519Disclosure::new().disclosure_key(&p.secret))
        );

        let details = ledger.get_transaction(&tx).await.expect("tx");
        assert_eq!(details.status, TxStatus::Confirmed);
        assert_eq!(details.kind, TxKind::Deposit);
    }

    #[tokio::test]
    async fn test_duplicate_commitment_rejected() {
        let ledger = MemoryLedger::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");
        let p = payment("1");
        let req = signed_deposit(&wallet, &p).await;
        ledger.deposit(req.clone()).await.expect("first");
        assert!(matches!(
            ledger.deposit(req).await,
            Err(LedgerError::Rejected(_))
        ));
        assert_eq!(ledger.deposit_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let ledger = MemoryLedger::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");
        let p = payment("1");
        let mut req = signed_deposit(&wallet, &p).await;
        req.amount = Amount::parse("2").expect("amount");
        assert!(matches!(
            ledger.deposit(req).await,
            Err(LedgerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_spends_and_credits() {
        let ledger = MemoryLedger::new();
        let acc = MerkleAccumulator::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");

        let p = payment("0.05");
        acc.insert(p.commitment).expect("insert");
        ledger
            .deposit(signed_deposit(&wallet, &p).await)
            .await
            .expect("deposit");

        let req = signed_withdraw(&wallet, &p, &acc).await;
        let tx = ledger.withdraw(req.clone()).await.expect("withdraw");
        assert!(ledger.is_spent(&p.nullifier));
        assert_eq!(ledger.balance_of(&wallet.identity().address), p.amount.minor());

        // Resubmitting the same withdrawal is not a second spend.
        assert_eq!(ledger.withdraw(req).await, Ok(tx));
        assert_eq!(ledger.balance_of(&wallet.identity().address), p.amount.minor());

        let other = MemoryWallet::generate();
        other.connect().await.expect("connect");
        assert!(matches!(
            ledger.withdraw(signed_withdraw(&other, &p, &acc).await).await,
            Err(LedgerError::Rejected(_))
        ));
        let status = ledger
            .get_commitment_status(&p.commitment)
            .await
            .expect("status");
        assert!(status.is_spent);
    }

    #[tokio::test]
    async fn test_withdraw_wrong_secret_rejected() {
        let ledger = MemoryLedger::new();
        let acc = MerkleAccumulator::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");

        let p = payment("3");
        acc.insert(p.commitment).expect("insert");
        ledger
            .deposit(signed_deposit(&wallet, &p).await)
            .await
            .expect("deposit");

        let mut req = signed_withdraw(&wallet, &p, &acc).await;
        req.secret = cloak_types::Secret::from_bytes([0u8; 32]);
        assert!(matches!(
            ledger.withdraw(req).await,
            Err(LedgerError::Rejected(_))
        ));
        assert!(!ledger.is_spent(&p.nullifier));
    }

    #[tokio::test]
    async fn test_withdraw_self_chosen_root_rejected() {
        let ledger = MemoryLedger::new();
        let acc = MerkleAccumulator::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");

        let first = payment("1");
        let second = payment("2");
        for p in [&first, &second] {
            acc.insert(p.commitment).expect("insert");
            ledger
                .deposit(signed_deposit(&wallet, p).await)
                .await
                .expect("deposit");
        }

        // An empty path verifies any leaf against a root equal to itself.
        let mut req = signed_withdraw(&wallet, &second, &acc).await;
        req.merkle_proof = MerkleProof::default();
        req.leaf_index = 0;
        req.root = *second.commitment.as_bytes();
        req.signature = wallet.sign(&req.signed_payload()).await.expect("sign");
        assert_eq!(
            ledger.withdraw(req).await,
            Err(LedgerError::Rejected("unknown merkle root".into()))
        );
        assert!(!ledger.is_spent(&second.nullifier));

        // A genuine proof against a tree the ledger never built is refused too.
        let reordered = MerkleAccumulator::new();
        reordered.insert(second.commitment).expect("insert");
        reordered.insert(first.commitment).expect("insert");
        let req = signed_withdraw(&wallet, &second, &reordered).await;
        assert!(matches!(
            ledger.withdraw(req).await,
            Err(LedgerError::Rejected(_))
        ));

        let req = signed_withdraw(&wallet, &second, &acc).await;
        ledger.withdraw(req).await.expect("withdraw");
        assert!(ledger.is_spent(&second.nullifier));
    }

    #[tokio::test]
    async fn test_withdraw_uses_deposited_disclosure_key() {
        let ledger = MemoryLedger::new();
        let acc = MerkleAccumulator::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");

        // The key published at deposit belongs to an unrelated secret.
        let p = payment("1");
        let unrelated = Ed25519Disclosure::new().disclosure_key(&payment("1").secret);
        acc.insert(p.commitment).expect("insert");
        ledger
            .deposit(signed_deposit_with_key(&wallet, &p, unrelated).await)
            .await
            .expect("deposit");
        let status = ledger
            .get_commitment_status(&p.commitment)
            .await
            .expect("status");
        assert_eq!(status.disclosure_key, Some(unrelated));

        assert_eq!(
            ledger.withdraw(signed_withdraw(&wallet, &p, &acc).await).await,
            Err(LedgerError::Rejected("invalid disclosure proof".into()))
        );
        assert!(!ledger.is_spent(&p.nullifier));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let ledger = MemoryLedger::new();
        let c = Commitment::from_bytes([1; 32]);
        ledger.fail_next(2);
        assert!(ledger.get_commitment_status(&c).await.is_err_and(|e| e.is_transient()));
        assert!(ledger.get_commitment_status(&c).await.is_err_and(|e| e.is_transient()));
        assert!(!ledger.get_commitment_status(&c).await.expect("recovered").exists);
    }

    #[tokio::test]
    async fn test_lost_ack_still_applies() {
        let ledger = MemoryLedger::new();
        let acc = MerkleAccumulator::new();
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");
        let p = payment("1");
        acc.insert(p.commitment).expect("insert");
        ledger
            .deposit(signed_deposit(&wallet, &p).await)
            .await
            .expect("deposit");

        ledger.lose_withdraw_ack();
        let req = signed_withdraw(&wallet, &p, &acc).await;
        assert!(matches!(
            ledger.withdraw(req).await,
            Err(LedgerError::Transient(_))
        ));
        assert!(ledger.is_spent(&p.nullifier));
    }

    #[tokio::test]
    async fn test_pending_until_polled() {
        let ledger = MemoryLedger::with_confirmation_polls(2);
        let wallet = MemoryWallet::generate();
        wallet.connect().await.expect("connect");
        let p = payment("1");
        let tx = ledger
            .deposit(signed_deposit(&wallet, &p).await)
            .await
            .expect("deposit");

        assert_eq!(ledger.get_transaction(&tx).await.expect("poll").status, TxStatus::Pending);
        assert_eq!(ledger.get_transaction(&tx).await.expect("poll").status, TxStatus::Pending);
        assert_eq!(ledger.get_transaction(&tx).await.expect("poll").status, TxStatus::Confirmed);
        assert_eq!(
            ledger.get_transaction(&TxId::from_bytes([0; 32])).await,
            Err(LedgerError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_wallet_requires_connection() {
        let wallet = MemoryWallet::generate();
        assert!(matches!(
            wallet.sign(b"x").await,
            Err(LedgerError::WalletUnavailable(_))
        ));
        let identity = wallet.connect().await.expect("connect");
        assert_eq!(identity.address.len(), 42);
        assert!(wallet.sign(b"x").await.is_ok());
        wallet.disconnect().await;
        assert!(!wallet.is_connected());
    }
}
