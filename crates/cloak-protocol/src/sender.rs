//! Sender flow: connect a wallet, confirm an amount, deposit a commitment,
//! and hand back the artifact to share with the receiver.
//!
//! ```text
//! Connect -> Confirm -> Generating -> Depositing -> Sharing
//!    \          \            \
//!     +----------+------------+--> Cancelled
//! ```

use std::fmt;

use cloak_accumulator::AccumulatorError;
use cloak_commitment::envelope::seal_secret;
use cloak_commitment::link::shareable_link;
use cloak_ledger::{DepositRequest, Identity, Ledger, Wallet};
use cloak_proof::ProofService;
use cloak_types::{Amount, Commitment, PaymentSecret, ShareableArtifact, TxId};
use tracing::{debug, info, warn};

use crate::events::{Flow, ProtocolEvent};
use crate::protocol::ClaimProtocol;
use crate::retry::with_retry;
use crate::{ClaimError, Result};

/// Sender flow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Connect,
    Confirm,
    Generating,
    Depositing,
    Sharing,
    Cancelled,
}

impl SenderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderState::Connect => "connect",
            SenderState::Confirm => "confirm",
            SenderState::Generating => "generating",
            SenderState::Depositing => "depositing",
            SenderState::Sharing => "sharing",
            SenderState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment from the sender side.
pub struct SenderFlow<'a, L: Ledger, P: ProofService> {
    protocol: &'a ClaimProtocol<L, P>,
    state: SenderState,
    identity: Option<Identity>,
    merchant: Option<String>,
    payment: Option<PaymentSecret>,
    leaf_index: Option<usize>,
    tx: Option<TxId>,
    artifact: Option<ShareableArtifact>,
}

impl<'a, L: Ledger, P: ProofService> SenderFlow<'a, L, P> {
    pub(crate) fn new(protocol: &'a ClaimProtocol<L, P>) -> Self {
        Self {
            protocol,
            state: SenderState::Connect,
            identity: None,
            merchant: None,
            payment: None,
            leaf_index: None,
            tx: None,
            artifact: None,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn merchant(&self) -> Option<&str> {
        self.merchant.as_deref()
    }

    /// The generated payment. Holds the secret; do not log.
    pub fn payment(&self) -> Option<&PaymentSecret> {
        self.payment.as_ref()
    }

    pub fn commitment(&self) -> Option<Commitment> {
        self.payment.as_ref().map(|p| p.commitment)
    }

    pub fn leaf_index(&self) -> Option<usize> {
        self.leaf_index
    }

    pub fn tx(&self) -> Option<TxId> {
        self.tx
    }

    pub fn artifact(&self) -> Option<&ShareableArtifact> {
        self.artifact.as_ref()
    }

    fn require(&self, expected: SenderState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(ClaimError::InvalidTransition {
                state: self.state.to_string(),
                operation,
            });
        }
        Ok(())
    }

    fn set_state(&mut self, to: SenderState) {
        let from = self.state;
        self.state = to;
        debug!(flow = "sender", %from, %to, "state transition");
        self.protocol.events().emit(ProtocolEvent::Transition {
            flow: Flow::Sender,
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

    /// Connect the sender's wallet. `Connect -> Confirm`.
    pub async fn connect<W: Wallet>(&mut self, wallet: &W) -> Result<Identity> {
        self.require(SenderState::Connect, "connect")?;
        let identity = wallet.connect().await?;
        info!(address = %identity.address, "sender wallet connected");
        self.identity = Some(identity.clone());
        self.set_state(SenderState::Confirm);
        Ok(identity)
    }

    /// Confirm amount and merchant and generate the payment secret.
    /// `Confirm -> Generating`.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::IncompleteConfirmation`] if `merchant` is blank
    /// - [`ClaimError::InvalidAmount`] if `amount` is malformed or zero
    /// - [`ClaimError::EntropyUnavailable`] if no secret could be drawn
    pub fn confirm(&mut self, amount: &str, merchant: &str) -> Result<()> {
        self.require(SenderState::Confirm, "confirm")?;

        let merchant = merchant.trim();
        if merchant.is_empty() {
            return Err(ClaimError::IncompleteConfirmation(
                "merchant is required".into(),
            ));
        }
        let amount = Amount::parse(amount.trim())?;
        if amount.is_zero() {
            return Err(ClaimError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }

        let payment = self.protocol.generator().new_payment(amount)?;
        info!(
            commitment = %payment.commitment.short(),
            %amount,
            merchant,
            "payment confirmed"
        );
        self.merchant = Some(merchant.to_string());
        self.payment = Some(payment);
        self.set_state(SenderState::Generating);
        Ok(())
    }

    /// Submit the deposit, record the commitment as a leaf once the ledger
    /// accepts it, then wait for confirmation.
    /// `Generating -> Depositing -> Sharing`.
    ///
    /// Deposits through contexts sharing an accumulator run one at a time,
    /// so local leaves are appended in the order the ledger accepted them.
    /// A failed submission leaves the flow in `Generating` with no leaf, so
    /// calling again resubmits. A confirmation timeout leaves it in
    /// `Depositing`; resume with [`SenderFlow::await_confirmation`].
    pub async fn deposit<W: Wallet>(&mut self, wallet: &W) -> Result<ShareableArtifact> {
        self.require(SenderState::Generating, "deposit")?;
        let identity = self.identity.clone().ok_or_else(|| self.missing("deposit"))?;

        let protocol = self.protocol;
        let ordered = protocol.deposit_order().lock().await;

        if self.leaf_index.is_none() {
            self.ensure_unique_commitment()?;
        }
        let payment = self.payment.as_ref().ok_or_else(|| self.missing("deposit"))?;
        let disclosure_key = self.protocol.proofs().disclosure_key(&payment.secret);
        let payload = DepositRequest::payload(
            &payment.commitment,
            &payment.amount,
            &payment.nullifier,
            &disclosure_key,
        );
        let signature = wallet.sign(&payload).await?;
        let request = DepositRequest {
            commitment: payment.commitment,
            amount: payment.amount,
            nullifier: payment.nullifier,
            disclosure_key,
            signer: identity,
            signature,
        };
        let commitment = request.commitment;

        let ledger = self.protocol.ledger();
        let submitted = with_retry(&self.protocol.retry_policy(), "deposit", move || {
            ledger.deposit(request.clone())
        })
        .await;
        let tx = match submitted {
            Ok(tx) => tx,
            Err(e) => {
                warn!(commitment = %commitment.short(), error = %e, "deposit failed");
                return Err(e);
            }
        };
        self.tx = Some(tx);

        let leaf_index = match self.leaf_index {
            Some(index) => index,
            None => {
                let index = self.protocol.accumulator().insert(commitment)?;
                self.leaf_index = Some(index);
                index
            }
        };
        drop(ordered);

        info!(commitment = %commitment.short(), tx = %tx.short(), leaf_index, "deposit submitted");
        self.protocol.events().emit(ProtocolEvent::Deposited {
            commitment,
            tx,
            leaf_index,
        });
        self.set_state(SenderState::Depositing);
        self.await_confirmation().await
    }

    /// Regenerate the secret and nullifier while the commitment is already a
    /// leaf, up to the configured limit.
    fn ensure_unique_commitment(&mut self) -> Result<()> {
        let limit = self.protocol.config().generation.max_regenerations;
        let mut regenerations = 0;
        loop {
            let payment = self.payment.as_ref().ok_or_else(|| self.missing("deposit"))?;
            let Some(existing) = self.protocol.accumulator().index_of(&payment.commitment) else {
                return Ok(());
            };
            if regenerations >= limit {
                return Err(AccumulatorError::DuplicateLeaf { existing }.into());
            }
            regenerations += 1;
            warn!(existing, regenerations, "commitment collided, regenerating");
            let amount = payment.amount;
            self.payment = Some(self.protocol.generator().new_payment(amount)?);
        }
    }

    /// Wait for the submitted deposit to confirm and build the share
    /// artifact. `Depositing -> Sharing`.
    ///
    /// A ledger rejection returns the flow to `Generating`.
    pub async fn await_confirmation(&mut self) -> Result<ShareableArtifact> {
        self.require(SenderState::Depositing, "await confirmation")?;
        let tx = self.tx.ok_or_else(|| self.missing("await confirmation"))?;

        match self.protocol.await_confirmation(tx).await {
            Ok(()) => {}
            Err(e @ ClaimError::LedgerRejected(_)) => {
                self.tx = None;
                self.set_state(SenderState::Generating);
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let payment = self
            .payment
            .as_ref()
            .ok_or_else(|| self.missing("await confirmation"))?;
        let link = shareable_link(&self.protocol.config().sharing.base_url, &payment.commitment);
        let artifact = ShareableArtifact {
            secret: payment.secret.clone(),
            commitment: payment.commitment,
            shareable_link: link.clone(),
            tx_hash: tx,
        };

        info!(commitment = %artifact.commitment.short(), tx = %tx.short(), "payment ready to share");
        self.protocol.events().emit(ProtocolEvent::ShareReady {
            commitment: artifact.commitment,
            link,
        });
        self.artifact = Some(artifact.clone());
        self.set_state(SenderState::Sharing);
        Ok(artifact)
    }

    /// Seal the payment secret under `password` for the out-of-band channel.
    /// Only available once the deposit has confirmed.
    pub fn sealed_secret(&self, password: &str) -> Result<String> {
        self.require(SenderState::Sharing, "seal secret")?;
        let payment = self.payment.as_ref().ok_or_else(|| self.missing("seal secret"))?;
        Ok(seal_secret(&payment.secret, password)?)
    }

    /// Abandon the payment. Allowed until the ledger has accepted the
    /// deposit; the generated secret is wiped. No leaf exists before
    /// acceptance, so a cancelled payment leaves the accumulator untouched.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::NotCancellable`] once in `Depositing` or `Sharing`
    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            SenderState::Depositing | SenderState::Sharing => Err(ClaimError::NotCancellable),
            SenderState::Cancelled => Ok(()),
            _ => {
                if let Some(index) = self.leaf_index {
                    debug!(leaf_index = index, "cancelled a payment the ledger later rejected");
                }
                self.payment = None;
                self.set_state(SenderState::Cancelled);
                Ok(())
            }
        }
    }
}

impl<L: Ledger, P: ProofService> fmt::Debug for SenderFlow<'_, L, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderFlow")
            .field("state", &self.state)
            .field("commitment", &self.commitment())
            .field("leaf_index", &self.leaf_index)
            .field("tx", &self.tx)
            .finish()
    }
}
