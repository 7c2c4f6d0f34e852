//! Thread-safe Merkle accumulator.
//!
//! Writers are serialized behind a `RwLock`: an insert updates the leaf set,
//! the tree and the root history before the next insert can begin. Proof
//! queries take the read lock and may run concurrently.

use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cloak_types::{Commitment, Digest};
use tracing::{debug, info};

use crate::tree::{self, IncrementalTree, MerkleProof};
use crate::{AccumulatorError, Result};

/// Number of recent roots retained when none is configured.
pub const DEFAULT_ROOT_HISTORY: usize = 8;

#[derive(Debug, Default)]
struct State {
    tree: IncrementalTree,
    index: HashMap<Digest, usize>,
    /// `(root, leaf count)` for the most recent roots, newest last.
    history: VecDeque<(Digest, usize)>,
}

/// Append-only set of commitments exposed as a Merkle tree.
#[derive(Debug)]
pub struct MerkleAccumulator {
    state: RwLock<State>,
    history_limit: usize,
}

impl MerkleAccumulator {
    /// Create an empty accumulator retaining [`DEFAULT_ROOT_HISTORY`] roots.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            history_limit: DEFAULT_ROOT_HISTORY,
        }
    }

    /// Create an empty accumulator retaining `root_history` recent roots.
    pub fn with_history(root_history: usize) -> Result<Self> {
        if root_history < 2 {
            return Err(AccumulatorError::HistoryTooSmall(root_history));
        }
        Ok(Self {
            state: RwLock::new(State::default()),
            history_limit: root_history,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `leaf` and return its index.
    ///
    /// # Errors
    ///
    /// - [`AccumulatorError::DuplicateLeaf`] if the commitment is already present;
    ///   the tree is left unchanged
    pub fn insert(&self, leaf: Commitment) -> Result<usize> {
        let mut state = self.write();
        let digest = *leaf.as_bytes();
        if let Some(&existing) = state.index.get(&digest) {
            debug!(commitment = %leaf.short(), existing, "rejected duplicate leaf");
            return Err(AccumulatorError::DuplicateLeaf { existing });
        }

        let index = state.tree.push(digest);
        state.index.insert(digest, index);
        let root = state.tree.root();
        let len = state.tree.len();
        state.history.push_back((root, len));
        while state.history.len() > self.history_limit {
            state.history.pop_front();
        }

        info!(
            commitment = %leaf.short(),
            index,
            root = %hex::encode(&root[..4]),
            "leaf inserted"
        );
        Ok(index)
    }

    /// Current root. The empty accumulator's root is all zeros.
    pub fn root(&self) -> Digest {
        self.read().tree.root()
    }

    /// Inclusion proof for `index` against the current root.
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        self.read().tree.proof(index)
    }

    /// Proof for `index` together with the root it was generated against,
    /// both read from the same snapshot.
    pub fn proof_with_root(&self, index: usize) -> Result<(MerkleProof, Digest)> {
        let state = self.read();
        let proof = state.tree.proof(index)?;
        Ok((proof, state.tree.root()))
    }

    /// Check `leaf` at `index` against `expected_root`.
    ///
    /// Beyond the path check, when `expected_root` is one of the retained
    /// roots the index must also lie within the tree that root describes.
    pub fn verify(
        &self,
        leaf: &Commitment,
        proof: &MerkleProof,
        index: usize,
        expected_root: &Digest,
    ) -> bool {
        if let Some(len) = self.leaf_count_at(expected_root) {
            if index >= len {
                return false;
            }
        }
        tree::verify(leaf.as_bytes(), proof, index, expected_root)
    }

    /// Whether `root` is among the retained recent roots.
    pub fn is_recent_root(&self, root: &Digest) -> bool {
        self.leaf_count_at(root).is_some()
    }

    fn leaf_count_at(&self, root: &Digest) -> Option<usize> {
        self.read()
            .history
            .iter()
            .rev()
            .find(|(r, _)| r == root)
            .map(|(_, len)| *len)
    }

    pub fn index_of(&self, leaf: &Commitment) -> Option<usize> {
        self.read().index.get(leaf.as_bytes()).copied()
    }

    pub fn contains(&self, leaf: &Commitment) -> bool {
        self.index_of(leaf).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the leaves in insertion order.
    pub fn leaves(&self) -> Vec<Digest> {
        self.read().tree.leaves().to_vec()
    }
}

impl Default for MerkleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn commitment(i: u8) -> Commitment {
        Commitment::from_bytes(cloak_crypto::hash::hash(&[i]))
    }

    #[test]
    fn test_insert_assigns_sequential_indices() {
        let acc = MerkleAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.root(), tree::EMPTY_ROOT);
        for i in 0..5u8 {
            assert_eq!(acc.insert(commitment(i)).expect("insert"), i as usize);
        }
        assert_eq!(acc.len(), 5);
        assert_eq!(acc.index_of(&commitment(3)), Some(3));
        assert!(!acc.contains(&commitment(9)));
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let acc = MerkleAccumulator::new();
        let c = commitment(0);
        assert_eq!(acc.insert(c).expect("insert"), 0);
        assert_eq!(acc.root(), *c.as_bytes());
        let proof = acc.proof(0).expect("proof");
        assert!(acc.verify(&c, &proof, 0, &acc.root()));
    }

    #[test]
    fn test_duplicate_leaves_tree_unchanged() {
        let acc = MerkleAccumulator::new();
        acc.insert(commitment(1)).expect("insert");
        acc.insert(commitment(2)).expect("insert");
        let root = acc.root();

        assert_eq!(
            acc.insert(commitment(1)),
            Err(AccumulatorError::DuplicateLeaf { existing: 0 })
        );
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.root(), root);
    }

    #[test]
    fn test_root_changes_on_every_insert() {
        let acc = MerkleAccumulator::new();
        let mut seen = vec![acc.root()];
        for i in 0..6u8 {
            acc.insert(commitment(i)).expect("insert");
            let root = acc.root();
            assert!(!seen.contains(&root));
            seen.push(root);
        }
    }

    #[test]
    fn test_all_proofs_verify_with_odd_levels() {
        let acc = MerkleAccumulator::new();
        for i in 0..11u8 {
            acc.insert(commitment(i)).expect("insert");
            let root = acc.root();
            for j in 0..=i {
                let proof = acc.proof(j as usize).expect("proof");
                assert!(acc.verify(&commitment(j), &proof, j as usize, &root), "{j} of {i}");
            }
        }
    }

    #[test]
    fn test_proof_out_of_range() {
        let acc = MerkleAccumulator::new();
        assert_eq!(
            acc.proof(0),
            Err(AccumulatorError::IndexOutOfRange { index: 0, len: 0 })
        );
        acc.insert(commitment(0)).expect("insert");
        assert!(acc.proof(1).is_err());
    }

    #[test]
    fn test_duplicated_slot_index_rejected_for_known_root() {
        let acc = MerkleAccumulator::new();
        for i in 0..3u8 {
            acc.insert(commitment(i)).expect("insert");
        }
        let (proof, root) = acc.proof_with_root(2).expect("proof");
        // Index 3 walks the same path as the duplicated last leaf.
        assert!(tree::verify(commitment(2).as_bytes(), &proof, 3, &root));
        assert!(!acc.verify(&commitment(2), &proof, 3, &root));
    }

    #[test]
    fn test_proof_valid_against_recent_root_after_insert() {
        let acc = MerkleAccumulator::with_history(2).expect("history");
        acc.insert(commitment(0)).expect("insert");
        acc.insert(commitment(1)).expect("insert");
        let (proof, root) = acc.proof_with_root(0).expect("proof");

        acc.insert(commitment(2)).expect("racing insert");
        assert_ne!(acc.root(), root);
        assert!(acc.is_recent_root(&root));
        assert!(acc.verify(&commitment(0), &proof, 0, &root));

        acc.insert(commitment(3)).expect("insert");
        assert!(!acc.is_recent_root(&root));
    }

    #[test]
    fn test_history_too_small() {
        assert_eq!(
            MerkleAccumulator::with_history(1).err(),
            Some(AccumulatorError::HistoryTooSmall(1))
        );
    }

    #[test]
    fn test_concurrent_reads_during_inserts() {
        let acc = Arc::new(MerkleAccumulator::new());
        acc.insert(commitment(0)).expect("insert");

        let writer = {
            let acc = Arc::clone(&acc);
            std::thread::spawn(move || {
                for i in 1..64u8 {
                    acc.insert(commitment(i)).expect("insert");
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let acc = Arc::clone(&acc);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let (proof, root) = acc.proof_with_root(0).expect("proof");
                        assert!(tree::verify(commitment(0).as_bytes(), &proof, 0, &root));
                    }
                })
            })
            .collect();

        writer.join().expect("writer");
        for r in readers {
            r.join().expect("reader");
        }
        assert_eq!(acc.len(), 64);
    }
}
