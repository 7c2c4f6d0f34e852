//! Shared setup for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use cloak_ledger::{MemoryLedger, MemoryWallet};
use cloak_proof::Ed25519Disclosure;
use cloak_protocol::{ClaimProtocol, ProtocolConfig, ProtocolEvent};
use cloak_types::{PaymentSecret, ShareableArtifact};

pub type Protocol = ClaimProtocol<MemoryLedger, Ed25519Disclosure>;

/// Config with short backoff and poll intervals.
pub fn fast_config() -> ProtocolConfig {
    let mut config = ProtocolConfig::default();
    config.retry.initial_backoff_ms = 10;
    config.retry.max_backoff_ms = 40;
    config.confirmation.poll_interval_ms = 10;
    config
}

pub fn protocol(ledger: Arc<MemoryLedger>) -> Protocol {
    ClaimProtocol::new(ledger, Ed25519Disclosure::new(), fast_config()).expect("protocol")
}

/// Run the sender flow to `Sharing`.
pub async fn send(protocol: &Protocol, amount: &str) -> (PaymentSecret, ShareableArtifact) {
    let wallet = MemoryWallet::generate();
    let mut sender = protocol.sender();
    sender.connect(&wallet).await.expect("connect sender");
    sender.confirm(amount, "integration merchant").expect("confirm");
    let artifact = sender.deposit(&wallet).await.expect("deposit");
    let payment = sender.payment().cloned().expect("payment");
    (payment, artifact)
}

/// Drain every event currently buffered on `rx`.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<ProtocolEvent>) -> Vec<ProtocolEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
