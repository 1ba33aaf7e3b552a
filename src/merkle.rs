//! Binary hash trees over an ordered list of leaf hashes.
//!
//! Levels are built bottom-up by hashing `left || right`. When a level has an odd number
//! of nodes its last node is paired with itself, so `[a, b, c]` commits to
//! `H(H(a || b) || H(c || c))`. A single leaf is its own root.
use crate::common::Hash;
use crate::config::Limits;
use crate::errors::Error;
use crate::traits::DigestService;

/// A fully materialised Merkle tree. `levels[0]` are the leaves and the last level holds
/// only the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build the tree over `leaves` with the default [`Limits`].
    ///
    /// # Errors
    /// The function fails if
    /// * `leaves` is empty (`EmptyLeaves`) or too large (`StructureTooLarge`)
    /// * the leaves do not share one algorithm (`AlgorithmMismatch`)
    /// * a leaf length differs from the digest length (`InvalidHashLength`), or `digest`
    ///   does not support the algorithm
    ///
    /// # Example
    /// ```
    /// use composite_keys::common::{Hash, StandardDigests};
    /// use composite_keys::merkle::MerkleTree;
    ///
    /// let leaves = vec![Hash::sha256(b"d"), Hash::sha256(b"f")];
    /// let tree = MerkleTree::build(leaves.clone(), &StandardDigests).unwrap();
    /// let expected = leaves[0].concatenate(&leaves[1], &StandardDigests).unwrap();
    /// assert_eq!(tree.root(), &expected);
    /// ```
    pub fn build<D: DigestService + ?Sized>(leaves: Vec<Hash>, digest: &D) -> Result<Self, Error> {
        Self::build_with(leaves, digest, &Limits::default())
    }

    /// Same as [`MerkleTree::build`] under explicit `limits`.
    pub fn build_with<D: DigestService + ?Sized>(
        leaves: Vec<Hash>,
        digest: &D,
        limits: &Limits,
    ) -> Result<Self, Error> {
        let first = leaves.first().ok_or(Error::EmptyLeaves)?;
        if leaves.len() > limits.max_merkle_leaves {
            return Err(Error::StructureTooLarge {
                what: "Merkle tree leaves",
                limit: limits.max_merkle_leaves,
            });
        }
        let algorithm = first.algorithm().to_string();
        let expected = digest.digest_length(&algorithm)?;
        for leaf in &leaves {
            if leaf.algorithm() != algorithm {
                return Err(Error::AlgorithmMismatch {
                    expected: algorithm,
                    found: leaf.algorithm().to_string(),
                });
            }
            if leaf.as_bytes().len() != expected {
                return Err(Error::InvalidHashLength {
                    expected,
                    found: leaf.as_bytes().len(),
                });
            }
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    left.concatenate(right, digest)
                })
                .collect::<Result<Vec<_>, _>>()?;
            levels.push(next);
        }
        tracing::debug!(
            leaves = levels[0].len(),
            depth = levels.len() - 1,
            %algorithm,
            "Merkle tree built"
        );
        Ok(MerkleTree { levels })
    }

    /// The root hash.
    pub fn root(&self) -> &Hash {
        // `build` never produces an empty level.
        &self.levels[self.levels.len() - 1][0]
    }

    /// The leaves in their original order.
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    /// Algorithm shared by every node.
    pub fn algorithm(&self) -> &str {
        self.root().algorithm()
    }

    /// Number of hashing levels above the leaves. Zero for a single leaf.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Position of the first leaf equal to `leaf`.
    pub fn leaf_index(&self, leaf: &Hash) -> Option<usize> {
        self.leaves().iter().position(|l| l == leaf)
    }

    pub(crate) fn levels(&self) -> &[Vec<Hash>] {
        &self.levels
    }
}
