//! cloak-sandbox: runs one payment end to end against the in-memory ledger.
//!
//! The sender deposits, the receiver claims, and a second claim on the same
//! secret is refused. Protocol events are streamed to the log as JSON.
//!
//! Usage:
//!   cloak-sandbox [AMOUNT] [MERCHANT]

use std::sync::Arc;
use std::time::Duration;

use cloak_ledger::{MemoryLedger, MemoryWallet};
use cloak_proof::Ed25519Disclosure;
use cloak_protocol::{ClaimError, ClaimInput, ClaimProtocol, ProtocolConfig};
use cloak_types::Commitment;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

type Protocol = ClaimProtocol<MemoryLedger, Ed25519Disclosure>;

/// How often the status task refreshes the deposit's ledger state.
const STATUS_REFRESH: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProtocolConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.log_level))?,
        )
        .init();

    let mut args = std::env::args().skip(1);
    let amount = args.next().unwrap_or_else(|| "0.05".to_string());
    let merchant = args.next().unwrap_or_else(|| "sandbox merchant".to_string());

    info!(%amount, %merchant, "Cloak sandbox starting");

    let ledger = Arc::new(MemoryLedger::with_confirmation_polls(2));
    let protocol = Arc::new(ClaimProtocol::new(ledger, Ed25519Disclosure::new(), config)?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let event_log = spawn_event_log(&protocol, shutdown_tx.subscribe());

    let result = run(&protocol, &amount, &merchant, &shutdown_tx).await;

    let _ = shutdown_tx.send(());
    if let Err(e) = event_log.await {
        warn!("event log task ended abnormally: {}", e);
    }

    match &result {
        Ok(()) => info!(sequence = protocol.events().sequence(), "Sandbox run complete"),
        Err(e) => error!("Sandbox run failed: {:#}", e),
    }
    result
}

async fn run(
    protocol: &Arc<Protocol>,
    amount: &str,
    merchant: &str,
    shutdown_tx: &broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let sender_wallet = MemoryWallet::generate();
    let receiver_wallet = MemoryWallet::generate();

    // 1. Sender: connect, confirm, deposit
    let mut sender = protocol.sender();
    sender.connect(&sender_wallet).await?;
    sender.confirm(amount, merchant)?;
    let artifact = sender.deposit(&sender_wallet).await?;
    let payment = sender
        .payment()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("sender finished without a payment"))?;

    info!(
        link = %artifact.shareable_link,
        tx = %artifact.tx_hash,
        "share the secret with the receiver out of band"
    );

    // 2. Refresh the deposit's status while the receiver works
    let status_task = spawn_status_refresh(protocol, artifact.commitment, shutdown_tx.subscribe());

    // 3. Receiver: claim
    let input = ClaimInput::from_link(
        &artifact.shareable_link,
        payment.secret.expose_hex(),
        payment.nullifier.to_hex(),
        payment.amount.to_decimal(),
    )?;
    let record = protocol.receiver().run(&receiver_wallet, &input).await?;
    info!(
        status = ?record.status,
        tx = ?record.tx_hash,
        balance = protocol
            .ledger()
            .balance_of(&receiver_wallet.identity().address),
        "receiver claimed payment"
    );

    // 4. A second claim on the same secret must be refused
    match protocol.receiver().run(&receiver_wallet, &input).await {
        Err(ClaimError::AlreadyClaimed) => info!("second claim refused as expected"),
        Err(e) => anyhow::bail!("second claim failed for the wrong reason: {e}"),
        Ok(_) => anyhow::bail!("second claim on a spent nullifier succeeded"),
    }

    status_task.abort();
    Ok(())
}

/// Log every protocol event as a JSON line until shutdown.
fn spawn_event_log(
    protocol: &Arc<Protocol>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let mut events = protocol.events().subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => info!(target: "cloak::events", "{}", json),
                        Err(e) => warn!("unserializable event: {}", e),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event log lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}

/// Periodically re-read the deposit's ledger status. Owned by the caller,
/// stopped by aborting the handle or through `shutdown_rx`.
fn spawn_status_refresh(
    protocol: &Arc<Protocol>,
    commitment: Commitment,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let protocol = Arc::clone(protocol);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_REFRESH);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match protocol.commitment_status(&commitment).await {
                        Ok(status) => info!(
                            commitment = %commitment.short(),
                            exists = status.exists,
                            spent = status.is_spent,
                            "deposit status"
                        ),
                        Err(e) => warn!(commitment = %commitment.short(), "status refresh failed: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}
