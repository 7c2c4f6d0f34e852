//! Receiver flow: accept a shared secret, verify it against the ledger and
//! the accumulator, and withdraw the deposit.
//!
//! ```text
//! AwaitingSecret -> Verifying -> Claiming -> Completed
//!                        \           \
//!                         +-----------+--> Failed -> (reset) AwaitingSecret
//! ```
//!
//! The nullifier is reserved in the local cache from the end of
//! verification until the ledger settles the withdrawal, so a second claim
//! on the same payment in this process fails fast with
//! [`ClaimError::ClaimInProgress`].

use std::fmt;

use cloak_accumulator::MerkleProof;
use cloak_commitment::link::parse_shareable_link;
use cloak_ledger::{Ledger, Wallet, WithdrawRequest};
use cloak_proof::{DisclosureProof, ProofService, PublicInputs};
use cloak_types::{
    Amount, ClaimRecord, Commitment, Digest, Nullifier, PaymentSecret, Secret, TxId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{Flow, ProtocolEvent};
use crate::protocol::ClaimProtocol;
use crate::retry::with_retry;
use crate::{ClaimError, Result};

/// Raw claim input as entered by the receiver.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ClaimInput {
    pub secret: String,
    pub nullifier: String,
    pub amount: String,
    /// Expected commitment. Recomputed from the other fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<String>,
}

impl ClaimInput {
    pub fn new(
        secret: impl Into<String>,
        nullifier: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            nullifier: nullifier.into(),
            amount: amount.into(),
            commitment: None,
        }
    }

    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = Some(commitment.into());
        self
    }

    /// Input whose expected commitment comes from a shareable link.
    pub fn from_link(
        link: &str,
        secret: impl Into<String>,
        nullifier: impl Into<String>,
        amount: impl Into<String>,
    ) -> Result<Self> {
        let commitment = parse_shareable_link(link)?;
        Ok(Self::new(secret, nullifier, amount).with_commitment(commitment.to_hex()))
    }

    /// Everything the receiver needs, taken from the sender's payment.
    pub fn from_payment(payment: &PaymentSecret) -> Self {
        Self::new(
            payment.secret.expose_hex(),
            payment.nullifier.to_hex(),
            payment.amount.to_decimal(),
        )
        .with_commitment(payment.commitment.to_hex())
    }
}

impl fmt::Debug for ClaimInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimInput")
            .field("secret", &"<redacted>")
            .field("nullifier", &self.nullifier)
            .field("amount", &self.amount)
            .field("commitment", &self.commitment)
            .finish()
    }
}

/// Receiver flow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitingSecret,
    Verifying,
    Claiming,
    Completed,
    Failed,
}

impl ReceiverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiverState::AwaitingSecret => "awaiting_secret",
            ReceiverState::Verifying => "verifying",
            ReceiverState::Claiming => "claiming",
            ReceiverState::Completed => "completed",
            ReceiverState::Failed => "failed",
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Parsed {
    secret: Secret,
    nullifier: Nullifier,
    amount: Amount,
    expected: Option<Commitment>,
}

struct Verified {
    commitment: Commitment,
    leaf_index: usize,
    proof: MerkleProof,
    root: Digest,
    disclosure: DisclosureProof,
}

/// One claim from the receiver side.
pub struct ReceiverFlow<'a, L: Ledger, P: ProofService> {
    protocol: &'a ClaimProtocol<L, P>,
    state: ReceiverState,
    parsed: Option<Parsed>,
    verified: Option<Verified>,
    record: Option<ClaimRecord>,
    last_error: Option<ClaimError>,
}

impl<'a, L: Ledger, P: ProofService> ReceiverFlow<'a, L, P> {
    pub(crate) fn new(protocol: &'a ClaimProtocol<L, P>) -> Self {
        Self {
            protocol,
            state: ReceiverState::AwaitingSecret,
            parsed: None,
            verified: None,
            record: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// The commitment under claim, once known.
    pub fn commitment(&self) -> Option<Commitment> {
        match (&self.verified, &self.parsed) {
            (Some(v), _) => Some(v.commitment),
            (None, Some(p)) => p.expected,
            (None, None) => None,
        }
    }

    pub fn leaf_index(&self) -> Option<usize> {
        self.verified.as_ref().map(|v| v.leaf_index)
    }

    /// The settled claim record, after `Completed`.
    pub fn record(&self) -> Option<&ClaimRecord> {
        self.record.as_ref()
    }

    /// The error that moved the flow to `Failed`.
    pub fn last_error(&self) -> Option<&ClaimError> {
        self.last_error.as_ref()
    }

    fn require(&self, expected: ReceiverState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(ClaimError::InvalidTransition {
                state: self.state.to_string(),
                operation,
            });
        }
        Ok(())
    }

    fn set_state(&mut self, to: ReceiverState) {
        let from = self.state;
        self.state = to;
        debug!(flow = "receiver", %from, %to, "state transition");
        self.protocol.events().emit(ProtocolEvent::Transition {
            flow: Flow::Receiver,
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    fn missing(&self, operation: &'static str) -> ClaimError {
        ClaimError::InvalidTransition {
            state: self.state.to_string(),
            operation,
        }
    }

    fn fail(&mut self, error: ClaimError) -> ClaimError {
        warn!(
            commitment = ?self.commitment().map(|c| c.short()),
            error = %error,
            retryable = error.is_retryable(),
            "claim failed"
        );
        self.protocol.events().emit(ProtocolEvent::ClaimFailed {
            commitment: self.commitment(),
            error: error.to_string(),
            retryable: error.is_retryable(),
        });
        self.last_error = Some(error.clone());
        self.set_state(ReceiverState::Failed);
        error
    }

    /// Check the input's format. `AwaitingSecret -> Verifying`.
    ///
    /// Malformed input is rejected without changing state, so the user can
    /// correct it and submit again.
    pub fn submit(&mut self, input: &ClaimInput) -> Result<()> {
        self.require(ReceiverState::AwaitingSecret, "submit")?;

        let secret = Secret::parse(input.secret.trim())?;
        let nullifier = Nullifier::parse(input.nullifier.trim())?;
        let amount = Amount::parse(input.amount.trim())?;
        let expected = input
            .commitment
            .as_deref()
            .map(|c| Commitment::parse(c.trim()))
            .transpose()?;

        self.parsed = Some(Parsed {
            secret,
            nullifier,
            amount,
            expected,
        });
        self.set_state(ReceiverState::Verifying);
        Ok(())
    }

    /// Verify the claim end to end and reserve its nullifier.
    /// `Verifying -> Claiming`, or `Failed`.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::ProofVerificationFailed`] if the secret does not open
    ///   the commitment, the deposit is unknown or differs, or a proof fails
    /// - [`ClaimError::AlreadyClaimed`] if the nullifier is spent
    /// - [`ClaimError::ClaimInProgress`] if another claim holds the nullifier
    pub async fn verify(&mut self) -> Result<()> {
        self.require(ReceiverState::Verifying, "verify")?;

        let outcome = self.check().await;
        match outcome {
            Ok(verified) => {
                info!(
                    commitment = %verified.commitment.short(),
                    leaf_index = verified.leaf_index,
                    "claim verified"
                );
                self.protocol.events().emit(ProtocolEvent::ClaimVerified {
                    commitment: verified.commitment,
                    leaf_index: verified.leaf_index,
                });
                self.verified = Some(verified);
                self.set_state(ReceiverState::Claiming);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn check(&self) -> Result<Verified> {
        let protocol = self.protocol;
        let parsed = self.parsed.as_ref().ok_or_else(|| self.missing("verify"))?;
        let commitment = parsed.expected.unwrap_or_else(|| {
            cloak_commitment::commit(&parsed.secret, &parsed.amount, &parsed.nullifier)
        });

        if !cloak_commitment::verify(&parsed.secret, &commitment, &parsed.amount, &parsed.nullifier) {
            return Err(ClaimError::ProofVerificationFailed(
                "secret does not open the commitment".into(),
            ));
        }
        if protocol.nullifiers().is_spent(&parsed.nullifier) {
            return Err(ClaimError::AlreadyClaimed);
        }

        let status = protocol.commitment_status(&commitment).await?;
        if !status.exists {
            return Err(ClaimError::ProofVerificationFailed(
                "commitment has no deposit on the ledger".into(),
            ));
        }
        if status.is_spent {
            protocol.nullifiers().mark_spent(&parsed.nullifier, None)?;
            return Err(ClaimError::AlreadyClaimed);
        }
        if status.amount != Some(parsed.amount) {
            return Err(ClaimError::ProofVerificationFailed(
                "amount does not match the deposit".into(),
            ));
        }

        let key = status.disclosure_key.ok_or_else(|| {
            ClaimError::ProofVerificationFailed("deposit carries no disclosure key".into())
        })?;
        protocol.proofs().register_key(commitment, key);

        let accumulator = protocol.accumulator();
        let leaf_index = accumulator.index_of(&commitment).ok_or_else(|| {
            ClaimError::ProofVerificationFailed("commitment is not in the accumulator".into())
        })?;
        let (proof, root) = accumulator.proof_with_root(leaf_index)?;
        if !accumulator.is_recent_root(&root)
            || !accumulator.verify(&commitment, &proof, leaf_index, &root)
        {
            return Err(ClaimError::ProofVerificationFailed(
                "merkle inclusion proof rejected".into(),
            ));
        }

        let proofs = protocol.proofs();
        let disclosure =
            proofs.generate_disclosure_proof(&parsed.secret, &commitment, &parsed.amount)?;
        let inputs = PublicInputs::new(commitment, parsed.amount);
        if !proofs.verify_disclosure_proof(&disclosure, &inputs, &commitment) {
            return Err(ClaimError::ProofVerificationFailed(
                "disclosure proof rejected".into(),
            ));
        }

        protocol.nullifiers().reserve(&parsed.nullifier)?;
        protocol.start_record(commitment, parsed.nullifier);

        Ok(Verified {
            commitment,
            leaf_index,
            proof,
            root,
            disclosure,
        })
    }

    /// Withdraw the deposit to the connected wallet and wait for the ledger
    /// to settle it. `Claiming -> Completed`, or `Failed`.
    ///
    /// When the ledger's answer is lost, its spent state decides the
    /// outcome. On failure the reservation is released so the claim can be
    /// retried after [`ReceiverFlow::reset`]. A timed-out claim keeps its
    /// record `Pending`; any other failure marks it `Failed`.
    pub async fn claim<W: Wallet>(&mut self, wallet: &W) -> Result<ClaimRecord> {
        self.require(ReceiverState::Claiming, "claim")?;

        let outcome = self.withdraw(wallet).await;
        match outcome {
            Ok(record) => {
                info!(
                    commitment = %record.commitment.short(),
                    tx = ?record.tx_hash.map(|t| t.short()),
                    "claim completed"
                );
                self.protocol.events().emit(ProtocolEvent::ClaimCompleted {
                    commitment: record.commitment,
                    tx: record.tx_hash,
                });
                self.record = Some(record.clone());
                self.set_state(ReceiverState::Completed);
                Ok(record)
            }
            Err(e) => {
                if let Some(parsed) = &self.parsed {
                    self.protocol.nullifiers().release(&parsed.nullifier);
                    if !matches!(e, ClaimError::LedgerTimeout { .. }) {
                        self.protocol.fail_record(&parsed.nullifier);
                    }
                }
                Err(self.fail(e))
            }
        }
    }

    async fn withdraw<W: Wallet>(&self, wallet: &W) -> Result<ClaimRecord> {
        let protocol = self.protocol;
        let parsed = self.parsed.as_ref().ok_or_else(|| self.missing("claim"))?;
        let verified = self.verified.as_ref().ok_or_else(|| self.missing("claim"))?;

        let identity = wallet.connect().await?;
        let payload = WithdrawRequest::payload(
            &parsed.nullifier,
            &verified.commitment,
            &identity.address,
            &parsed.amount,
            verified.leaf_index,
            &verified.root,
        );
        let signature = wallet.sign(&payload).await?;
        let request = WithdrawRequest {
            secret: parsed.secret.clone(),
            nullifier: parsed.nullifier,
            recipient: identity.address.clone(),
            amount: parsed.amount,
            commitment: verified.commitment,
            leaf_index: verified.leaf_index,
            merkle_proof: verified.proof.clone(),
            root: verified.root,
            disclosure: verified.disclosure.clone(),
            signer: identity,
            signature,
        };

        let ledger = protocol.ledger();
        let submitted = with_retry(&protocol.retry_policy(), "withdraw", move || {
            ledger.withdraw(request.clone())
        })
        .await;
        let tx = match submitted {
            Ok(tx) => tx,
            Err(e) => {
                return self
                    .settle(verified.commitment, parsed.nullifier, None, e)
                    .await
            }
        };

        debug!(tx = %tx.short(), "withdraw submitted");
        match protocol.await_confirmation(tx).await {
            Ok(()) => {
                protocol.nullifiers().mark_spent(&parsed.nullifier, Some(tx))?;
                protocol.complete_record(verified.commitment, parsed.nullifier, Some(tx))
            }
            Err(e) => {
                self.settle(verified.commitment, parsed.nullifier, Some(tx), e)
                    .await
            }
        }
    }

    /// Decide a withdrawal whose outcome the ledger did not report, using
    /// its spent state.
    ///
    /// After a timeout, a spent nullifier means our request landed and the
    /// claim completes. A refused submission on a spent nullifier means
    /// someone else claimed first.
    async fn settle(
        &self,
        commitment: Commitment,
        nullifier: Nullifier,
        tx: Option<TxId>,
        error: ClaimError,
    ) -> Result<ClaimRecord> {
        let protocol = self.protocol;
        let ambiguous = matches!(error, ClaimError::LedgerTimeout { .. });
        let refused = tx.is_none() && matches!(error, ClaimError::LedgerRejected(_));
        if !ambiguous && !refused {
            return Err(error);
        }

        let spent = match protocol.commitment_status(&commitment).await {
            Ok(status) => status.is_spent,
            Err(status_error) => {
                debug!(error = %status_error, "could not read spent state");
                return Err(error);
            }
        };
        if !spent {
            return Err(error);
        }

        protocol.nullifiers().mark_spent(&nullifier, tx)?;
        if !ambiguous {
            return Err(ClaimError::AlreadyClaimed);
        }

        warn!(
            commitment = %commitment.short(),
            error = %error,
            "withdraw outcome unknown but ledger reports spent"
        );
        protocol.events().emit(ProtocolEvent::Recovered {
            commitment,
            spent: true,
        });
        protocol.complete_record(commitment, nullifier, tx)
    }

    /// Return a failed flow to `AwaitingSecret`.
    pub fn reset(&mut self) -> Result<()> {
        self.require(ReceiverState::Failed, "reset")?;
        self.parsed = None;
        self.verified = None;
        self.last_error = None;
        self.set_state(ReceiverState::AwaitingSecret);
        Ok(())
    }

    /// Submit, verify and claim in one call.
    pub async fn run<W: Wallet>(&mut self, wallet: &W, input: &ClaimInput) -> Result<ClaimRecord> {
        self.submit(input)?;
        self.verify().await?;
        self.claim(wallet).await
    }
}

impl<L: Ledger, P: ProofService> Drop for ReceiverFlow<'_, L, P> {
    fn drop(&mut self) {
        // A flow dropped mid-claim leaves its reservation for `recover`.
        if self.state == ReceiverState::Claiming {
            if let Some(parsed) = &self.parsed {
                self.protocol.nullifiers().abandon(&parsed.nullifier);
            }
        }
    }
}

impl<L: Ledger, P: ProofService> fmt::Debug for ReceiverFlow<'_, L, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverFlow")
            .field("state", &self.state)
            .field("commitment", &self.commitment())
            .field("leaf_index", &self.leaf_index())
            .field("last_error", &self.last_error)
            .finish()
    }
}
