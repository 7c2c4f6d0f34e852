//! The claim protocol context.
//!
//! [`ClaimProtocol`] owns every piece of state the flows share: the ledger
//! handle, the accumulator, the spent-nullifier cache, the proof backend,
//! the secret generator, configuration, the event bus, and the local claim
//! records. Nothing is ambient; flows borrow the context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use cloak_accumulator::MerkleAccumulator;
use cloak_commitment::{OsSecretGenerator, SecretGenerator};
use cloak_ledger::{CommitmentStatus, Ledger, LedgerError, TxStatus};
use cloak_nullifier::SpentNullifiers;
use cloak_proof::ProofService;
use cloak_types::{ClaimRecord, ClaimStatus, Commitment, Nullifier, TxId};
use tracing::{debug, info, warn};

use crate::config::ProtocolConfig;
use crate::events::{EventBus, ProtocolEvent};
use crate::receiver::ReceiverFlow;
use crate::retry::{with_retry, RetryPolicy};
use crate::sender::SenderFlow;
use crate::{ClaimError, Result};

/// Shared context for sender and receiver flows.
pub struct ClaimProtocol<L: Ledger, P: ProofService> {
    ledger: Arc<L>,
    proofs: P,
    generator: Box<dyn SecretGenerator>,
    accumulator: Arc<MerkleAccumulator>,
    /// Held from deposit submission until the leaf is appended.
    deposit_order: Arc<tokio::sync::Mutex<()>>,
    nullifiers: Arc<SpentNullifiers>,
    config: ProtocolConfig,
    events: EventBus,
    claims: Mutex<HashMap<Nullifier, ClaimRecord>>,
}

impl<L: Ledger, P: ProofService> ClaimProtocol<L, P> {
    /// Build a context with a fresh accumulator and nullifier cache and the
    /// OS-backed secret generator.
    pub fn new(ledger: Arc<L>, proofs: P, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        let accumulator = MerkleAccumulator::with_history(config.accumulator.root_history)?;
        Ok(Self {
            ledger,
            proofs,
            generator: Box::new(OsSecretGenerator),
            accumulator: Arc::new(accumulator),
            deposit_order: Arc::new(tokio::sync::Mutex::new(())),
            nullifiers: Arc::new(SpentNullifiers::new()),
            config,
            events: EventBus::default(),
            claims: Mutex::new(HashMap::new()),
        })
    }

    /// Replace the secret generator.
    pub fn with_generator(mut self, generator: impl SecretGenerator + 'static) -> Self {
        self.generator = Box::new(generator);
        self
    }

    /// Share `other`'s accumulator. Deposits through either context are
    /// then appended in the order the ledger accepts them.
    pub fn with_accumulator_of<L2: Ledger, P2: ProofService>(
        mut self,
        other: &ClaimProtocol<L2, P2>,
    ) -> Self {
        self.accumulator = Arc::clone(&other.accumulator);
        self.deposit_order = Arc::clone(&other.deposit_order);
        self
    }

    /// Share a nullifier cache with other contexts.
    pub fn with_nullifiers(mut self, nullifiers: Arc<SpentNullifiers>) -> Self {
        self.nullifiers = nullifiers;
        self
    }

    /// Start a sender flow in `Connect`.
    pub fn sender(&self) -> SenderFlow<'_, L, P> {
        SenderFlow::new(self)
    }

    /// Start a receiver flow in `AwaitingSecret`.
    pub fn receiver(&self) -> ReceiverFlow<'_, L, P> {
        ReceiverFlow::new(self)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn proofs(&self) -> &P {
        &self.proofs
    }

    pub fn accumulator(&self) -> &Arc<MerkleAccumulator> {
        &self.accumulator
    }

    pub(crate) fn deposit_order(&self) -> &tokio::sync::Mutex<()> {
        &self.deposit_order
    }

    pub fn nullifiers(&self) -> &Arc<SpentNullifiers> {
        &self.nullifiers
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn generator(&self) -> &dyn SecretGenerator {
        self.generator.as_ref()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry.policy()
    }

    fn claims(&self) -> MutexGuard<'_, HashMap<Nullifier, ClaimRecord>> {
        self.claims.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Local record for `nullifier`, if a claim was attempted here.
    pub fn claim_record(&self, nullifier: &Nullifier) -> Option<ClaimRecord> {
        self.claims().get(nullifier).cloned()
    }

    /// Open a pending record, replacing a failed one from an earlier attempt.
    pub(crate) fn start_record(&self, commitment: Commitment, nullifier: Nullifier) -> ClaimRecord {
        let mut claims = self.claims();
        let record = claims
            .entry(nullifier)
            .and_modify(|r| {
                if r.status == ClaimStatus::Failed {
                    *r = ClaimRecord::pending(commitment, nullifier);
                }
            })
            .or_insert_with(|| ClaimRecord::pending(commitment, nullifier));
        record.clone()
    }

    pub(crate) fn complete_record(
        &self,
        commitment: Commitment,
        nullifier: Nullifier,
        tx: Option<TxId>,
    ) -> Result<ClaimRecord> {
        let mut claims = self.claims();
        let record = claims
            .entry(nullifier)
            .or_insert_with(|| ClaimRecord::pending(commitment, nullifier));
        if record.status == ClaimStatus::Failed {
            *record = ClaimRecord::pending(commitment, nullifier);
        }
        record.complete(tx)?;
        Ok(record.clone())
    }

    pub(crate) fn fail_record(&self, nullifier: &Nullifier) {
        if let Some(record) = self.claims().get_mut(nullifier) {
            if record.status == ClaimStatus::Pending {
                let _ = record.fail();
            }
        }
    }

    /// Ledger status of `commitment`, with transient failures retried.
    pub async fn commitment_status(&self, commitment: &Commitment) -> Result<CommitmentStatus> {
        let ledger = self.ledger.as_ref();
        let commitment = *commitment;
        with_retry(&self.retry_policy(), "get_commitment_status", move || async move {
            ledger.get_commitment_status(&commitment).await
        })
        .await
    }

    /// Poll `tx` until the ledger confirms or rejects it.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::LedgerRejected`] if the transaction was rejected
    /// - [`ClaimError::LedgerTimeout`] if it is still pending after `max_polls`
    pub async fn await_confirmation(&self, tx: TxId) -> Result<()> {
        let policy = self.retry_policy();
        let polls = self.config.confirmation.max_polls;
        let interval = self.config.confirmation.poll_interval();
        let ledger = self.ledger.as_ref();

        for poll in 1..=polls {
            let details = with_retry(&policy, "get_transaction", move || async move {
                match ledger.get_transaction(&tx).await {
                    Ok(details) => Ok(Some(details)),
                    // Not yet visible counts as pending.
                    Err(LedgerError::NotFound) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await?;

            match details.map(|d| d.status) {
                Some(TxStatus::Confirmed) => {
                    debug!(tx = %tx.short(), poll, "transaction confirmed");
                    return Ok(());
                }
                Some(TxStatus::Rejected(reason)) => {
                    warn!(tx = %tx.short(), %reason, "transaction rejected");
                    return Err(ClaimError::LedgerRejected(reason));
                }
                _ => {
                    debug!(tx = %tx.short(), poll, polls, "transaction pending");
                    if poll < polls {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        warn!(tx = %tx.short(), polls, "transaction not confirmed in time");
        Err(ClaimError::LedgerTimeout {
            attempts: polls,
            last_error: "transaction still pending".into(),
        })
    }

    /// Reconcile local state for one payment with the ledger after a crash.
    ///
    /// The ledger decides: if it reports the nullifier spent, the local
    /// cache and the claim record are brought to spent/`Completed`.
    /// Otherwise a reservation left by a dropped claim flow is released and
    /// the record is returned as it stands (a new `Pending` record if none
    /// existed). A reservation held by a live flow is kept.
    pub async fn recover(&self, commitment: &Commitment, nullifier: &Nullifier) -> Result<ClaimRecord> {
        let status = self.commitment_status(commitment).await?;

        let record = if status.is_spent {
            self.nullifiers.mark_spent(nullifier, None)?;
            self.complete_record(*commitment, *nullifier, None)?
        } else {
            if !status.exists {
                warn!(commitment = %commitment.short(), "recovering a commitment the ledger does not know");
            }
            if self.nullifiers.release_abandoned(nullifier) {
                debug!(nullifier = %nullifier.short(), "claim in progress, reservation kept");
            }
            self.claims()
                .entry(*nullifier)
                .or_insert_with(|| ClaimRecord::pending(*commitment, *nullifier))
                .clone()
        };

        info!(
            commitment = %commitment.short(),
            spent = status.is_spent,
            status = ?record.status,
            "recovered claim state from ledger"
        );
        self.events.emit(ProtocolEvent::Recovered {
            commitment: *commitment,
            spent: status.is_spent,
        });
        Ok(record)
    }
}

impl<L: Ledger, P: ProofService> std::fmt::Debug for ClaimProtocol<L, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimProtocol")
            .field("scheme", &self.proofs.scheme())
            .field("leaves", &self.accumulator.len())
            .field("spent", &self.nullifiers.spent_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloak_ledger::MemoryLedger;
    use cloak_proof::Ed25519Disclosure;

    fn protocol(ledger: Arc<MemoryLedger>) -> ClaimProtocol<MemoryLedger, Ed25519Disclosure> {
        let mut config = ProtocolConfig::default();
        config.confirmation.poll_interval_ms = 10;
        config.retry.initial_backoff_ms = 10;
        ClaimProtocol::new(ledger, Ed25519Disclosure::new(), config).expect("protocol")
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ProtocolConfig::default();
        config.accumulator.root_history = 0;
        let result = ClaimProtocol::new(Arc::new(MemoryLedger::new()), Ed25519Disclosure::new(), config);
        assert!(matches!(result, Err(ClaimError::InvalidConfig(_))));
    }

    #[test]
    fn test_record_lifecycle() {
        let p = protocol(Arc::new(MemoryLedger::new()));
        let c = Commitment::from_bytes([1; 32]);
        let n = Nullifier::from_bytes([2; 32]);

        assert_eq!(p.start_record(c, n).status, ClaimStatus::Pending);
        p.fail_record(&n);
        assert_eq!(p.claim_record(&n).map(|r| r.status), Some(ClaimStatus::Failed));

        assert_eq!(p.start_record(c, n).status, ClaimStatus::Pending);
        let done = p
            .complete_record(c, n, Some(TxId::from_bytes([3; 32])))
            .expect("complete");
        assert_eq!(done.status, ClaimStatus::Completed);

        p.fail_record(&n);
        assert_eq!(p.claim_record(&n).map(|r| r.status), Some(ClaimStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_unknown_tx_times_out() {
        let p = protocol(Arc::new(MemoryLedger::new()));
        let err = p
            .await_confirmation(TxId::from_bytes([9; 32]))
            .await
            .expect_err("never confirms");
        assert!(matches!(err, ClaimError::LedgerTimeout { attempts: 20, .. }));
    }

    #[tokio::test]
    async fn test_recover_unknown_commitment_stays_pending() {
        let p = protocol(Arc::new(MemoryLedger::new()));
        let mut rx = p.events().subscribe();
        let c = Commitment::from_bytes([1; 32]);
        let n = Nullifier::from_bytes([2; 32]);
        p.nullifiers().reserve(&n).expect("reserve");
        p.nullifiers().abandon(&n);

        let record = p.recover(&c, &n).await.expect("recover");
        assert_eq!(record.status, ClaimStatus::Pending);
        assert!(!p.nullifiers().is_in_flight(&n));
        assert_eq!(
            rx.try_recv().expect("event"),
            ProtocolEvent::Recovered {
                commitment: c,
                spent: false
            }
        );
    }
}
