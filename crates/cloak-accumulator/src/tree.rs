//! Merkle tree construction, proofs and verification.

use cloak_crypto::hash;
use cloak_types::Digest;
use serde::{Deserialize, Serialize};

use crate::{AccumulatorError, Result};

/// Root of the empty tree.
pub const EMPTY_ROOT: Digest = [0u8; 32];

/// Sibling digests from a leaf up to (not including) the root.
///
/// The left/right position at each level is not stored; it is read from the
/// bits of the leaf index during verification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(with = "hex_digests")]
    pub siblings: Vec<Digest>,
}

impl MerkleProof {
    /// Number of levels covered (the tree height).
    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }
}

/// Compute the root over `leaves` from scratch.
pub fn compute_root(leaves: &[Digest]) -> Digest {
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Build the inclusion proof for `leaves[index]` from scratch.
pub fn build_proof(leaves: &[Digest], index: usize) -> Result<MerkleProof> {
    if index >= leaves.len() {
        return Err(AccumulatorError::IndexOutOfRange {
            index,
            len: leaves.len(),
        });
    }

    let mut siblings = Vec::new();
    let mut level = leaves.to_vec();
    let mut idx = index;
    while level.len() > 1 {
        siblings.push(sibling(&level, idx));
        level = next_level(&level);
        idx /= 2;
    }
    Ok(MerkleProof { siblings })
}

/// Recompute the path from `leaf` and compare against `expected_root`.
///
/// At each level an even index hashes `(current, sibling)` and an odd index
/// hashes `(sibling, current)`. An index that needs more bits than the proof
/// has levels is rejected.
pub fn verify(leaf: &Digest, proof: &MerkleProof, index: usize, expected_root: &Digest) -> bool {
    let height = proof.siblings.len();
    if u32::try_from(height)
        .ok()
        .and_then(|h| index.checked_shr(h))
        .unwrap_or(0)
        != 0
    {
        return false;
    }

    let mut current = *leaf;
    let mut idx = index;
    for sibling in &proof.siblings {
        current = if idx % 2 == 0 {
            hash::merkle_inner(&current, sibling)
        } else {
            hash::merkle_inner(sibling, &current)
        };
        idx /= 2;
    }

    cloak_crypto::ct_eq(&current, expected_root)
}

fn next_level(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash::merkle_inner(left, right),
            [only] => hash::merkle_inner(only, only),
            _ => EMPTY_ROOT,
        })
        .collect()
}

fn sibling(level: &[Digest], idx: usize) -> Digest {
    level.get(idx ^ 1).copied().unwrap_or(level[idx])
}

/// Merkle tree updated in place along the right edge on every append.
///
/// `levels[0]` holds the leaves; the last level always has exactly one node
/// (the root) once a leaf exists. An append touches one node per level.
#[derive(Clone, Debug, Default)]
pub struct IncrementalTree {
    levels: Vec<Vec<Digest>>,
}

impl IncrementalTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Levels above the leaves.
    pub fn height(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn leaves(&self) -> &[Digest] {
        self.levels.first().map_or(&[], Vec::as_slice)
    }

    pub fn root(&self) -> Digest {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(EMPTY_ROOT)
    }

    /// Append a leaf and return its index.
    pub fn push(&mut self, leaf: Digest) -> usize {
        if self.levels.is_empty() {
            self.levels.push(Vec::new());
        }
        self.levels[0].push(leaf);
        let index = self.levels[0].len() - 1;

        let mut idx = index;
        let mut depth = 0;
        while self.levels[depth].len() > 1 {
            let level = &self.levels[depth];
            let left_idx = idx & !1;
            let left = level[left_idx];
            let right = level.get(left_idx + 1).copied().unwrap_or(left);
            let parent = hash::merkle_inner(&left, &right);

            let parent_idx = idx / 2;
            if self.levels.len() == depth + 1 {
                self.levels.push(Vec::new());
            }
            let next = &mut self.levels[depth + 1];
            if parent_idx < next.len() {
                next[parent_idx] = parent;
            } else {
                next.push(parent);
            }

            tracing::trace!(depth, parent_idx, "merkle node updated");
            idx = parent_idx;
            depth += 1;
        }

        index
    }

    /// Inclusion proof for the leaf at `index` against the current root.
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        let len = self.len();
        if index >= len {
            return Err(AccumulatorError::IndexOutOfRange { index, len });
        }

        let mut idx = index;
        let siblings = self.levels[..self.height()]
            .iter()
            .map(|level| {
                let s = sibling(level, idx);
                idx /= 2;
                s
            })
            .collect();
        Ok(MerkleProof { siblings })
    }
}

mod hex_digests {
    use cloak_types::{value, Digest};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digests: &[Digest], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(digests.iter().map(value::to_prefixed_hex))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Digest>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| value::parse_hex32("merkle sibling", s).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Digest> {
        (0..n)
            .map(|i| hash::hash(format!("leaf {i}").as_bytes()))
            .collect()
    }

    #[test]
    fn test_empty_and_single_leaf_roots() {
        assert_eq!(compute_root(&[]), EMPTY_ROOT);
        let l = leaves(1);
        assert_eq!(compute_root(&l), l[0]);
        let proof = build_proof(&l, 0).expect("proof");
        assert!(proof.is_empty());
        assert!(verify(&l[0], &proof, 0, &l[0]));
    }

    #[test]
    fn test_three_leaves_duplicate_last() {
        let l = leaves(3);
        let left = hash::merkle_inner(&l[0], &l[1]);
        let right = hash::merkle_inner(&l[2], &l[2]);
        assert_eq!(compute_root(&l), hash::merkle_inner(&left, &right));

        let proof = build_proof(&l, 2).expect("proof");
        assert_eq!(proof.siblings, vec![l[2], left]);
    }

    #[test]
    fn test_every_leaf_verifies() {
        for n in 1..=17 {
            let l = leaves(n);
            let root = compute_root(&l);
            for (i, leaf) in l.iter().enumerate() {
                let proof = build_proof(&l, i).expect("proof");
                assert!(verify(leaf, &proof, i, &root), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_substituted_path_rejected() {
        let l = leaves(6);
        let root = compute_root(&l);
        for i in 0..l.len() {
            for j in 0..l.len() {
                if i == j {
                    continue;
                }
                let proof = build_proof(&l, j).expect("proof");
                assert!(!verify(&l[i], &proof, i, &root), "leaf {i} with proof {j}");
            }
        }
    }

    #[test]
    fn test_wrong_root_rejected() {
        let l = leaves(4);
        let proof = build_proof(&l, 1).expect("proof");
        assert!(!verify(&l[1], &proof, 1, &compute_root(&l[..3])));
    }

    #[test]
    fn test_index_wider_than_proof_rejected() {
        let l = leaves(4);
        let root = compute_root(&l);
        let proof = build_proof(&l, 1).expect("proof");
        assert!(!verify(&l[1], &proof, 1 + 4, &root));
        assert!(!verify(&l[0], &MerkleProof::default(), 1, &l[0]));
    }

    #[test]
    fn test_build_proof_out_of_range() {
        assert_eq!(
            build_proof(&leaves(2), 2),
            Err(AccumulatorError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert!(build_proof(&[], 0).is_err());
    }

    #[test]
    fn test_incremental_matches_rebuild() {
        let l = leaves(17);
        let mut tree = IncrementalTree::new();
        assert_eq!(tree.root(), EMPTY_ROOT);
        for (i, leaf) in l.iter().enumerate() {
            assert_eq!(tree.push(*leaf), i);
            let prefix = &l[..=i];
            assert_eq!(tree.root(), compute_root(prefix), "after {} leaves", i + 1);
            for j in 0..=i {
                assert_eq!(
                    tree.proof(j).expect("proof"),
                    build_proof(prefix, j).expect("proof"),
                    "proof {j} of {}",
                    i + 1
                );
            }
        }
        assert_eq!(tree.height(), 5);
    }

    #[test]
    fn test_proof_serde_hex() {
        let l = leaves(2);
        let proof = build_proof(&l, 0).expect("proof");
        let json = serde_json::to_string(&proof).expect("serialize");
        assert!(json.contains(&hex::encode(l[1])));
        let back: MerkleProof = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, proof);
    }
}
