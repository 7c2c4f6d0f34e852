//! # cloak-accumulator
//!
//! Append-only Merkle accumulator over payment commitments.
//!
//! Leaves are commitment digests in insertion order. Inner nodes are
//! `BLAKE3::keyed_hash(K_inner, left || right)`. A level with an odd node
//! count pairs its last node with itself, both when the tree is built and
//! when a proof is checked. The root of a one-leaf tree is the leaf; the
//! root of the empty tree is 32 zero bytes.
//!
//! ## Modules
//!
//! - [`tree`]: Pure tree functions, proofs, and the incremental tree
//! - [`accumulator`]: Thread-safe [`MerkleAccumulator`] with root history

pub mod accumulator;
pub mod tree;

pub use accumulator::{MerkleAccumulator, DEFAULT_ROOT_HISTORY};
pub use tree::MerkleProof;

/// Error types for accumulator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccumulatorError {
    /// The commitment is already a leaf.
    #[error("duplicate leaf (already at index {existing})")]
    DuplicateLeaf {
        /// Index of the existing leaf.
        existing: usize,
    },

    /// A proof was requested for a leaf that does not exist.
    #[error("leaf index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Root history must retain at least two roots.
    #[error("root history of {0} is too small (minimum 2)")]
    HistoryTooSmall(usize),
}

/// Convenience result type for accumulator operations.
pub type Result<T> = std::result::Result<T, AccumulatorError>;
