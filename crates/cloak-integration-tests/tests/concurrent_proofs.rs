//! Integration test: proofs read while leaves are being appended stay valid
//! against the root they were issued with.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cloak_accumulator::MerkleAccumulator;
use cloak_ledger::{MemoryLedger, MemoryWallet};
use cloak_protocol::ClaimInput;
use cloak_types::Commitment;

use common::{protocol, send};

fn leaf(i: u32) -> Commitment {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&i.to_le_bytes());
    bytes[31] = 0xaa;
    Commitment::from_bytes(bytes)
}

#[test]
fn readers_during_inserts() {
    let acc = Arc::new(MerkleAccumulator::new());
    acc.insert(leaf(0)).expect("seed");
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let acc = Arc::clone(&acc);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 1..300 {
                acc.insert(leaf(i)).expect("insert");
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|r| {
            let acc = Arc::clone(&acc);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checked = 0u32;
                while !done.load(Ordering::SeqCst) || checked < 50 {
                    let len = acc.len();
                    let index = (checked as usize * 7 + r) % len;
                    let (proof, root) = acc.proof_with_root(index).expect("proof");
                    let leaf = acc.leaves()[index];
                    assert!(
                        cloak_accumulator::tree::verify(&leaf, &proof, index, &root),
                        "index {index}"
                    );
                    checked += 1;
                }
                checked
            })
        })
        .collect();

    writer.join().expect("writer");
    for reader in readers {
        assert!(reader.join().expect("reader") >= 50);
    }
    assert_eq!(acc.len(), 300);
}

#[tokio::test]
async fn claims_interleaved_with_new_deposits() {
    let protocol = Arc::new(protocol(Arc::new(MemoryLedger::new())));
    let (first, _) = send(&protocol, "1").await;

    let depositor = {
        let protocol = Arc::clone(&protocol);
        tokio::spawn(async move {
            for _ in 0..5 {
                send(&protocol, "0.1").await;
                tokio::task::yield_now().await;
            }
        })
    };

    let record = protocol
        .receiver()
        .run(&MemoryWallet::generate(), &ClaimInput::from_payment(&first))
        .await
        .expect("claim");
    assert_eq!(record.commitment, first.commitment);

    depositor.await.expect("depositor");
    assert_eq!(protocol.accumulator().len(), 6);
}
