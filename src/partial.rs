//! Pruned Merkle trees disclosing a chosen subset of leaves.
//!
//! A [`PartialMerkleTree`] keeps the shape of the [`MerkleTree`] it was cut from only
//! where a disclosed leaf lies below; every sub-tree without a disclosed leaf is replaced
//! by its root hash. A verifier supplies the disclosed leaves in order and recomputes the
//! root with the same pairing rule as the full tree.
use crate::common::Hash;
use crate::config::MAX_NESTING_DEPTH;
use crate::errors::Error;
use crate::merkle::MerkleTree;
use crate::traits::DigestService;
use std::collections::BTreeSet;

#[cfg(feature = "serde_enabled")]
use serde::{Deserialize, Serialize};

/// A node of a [`PartialMerkleTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub enum PartialNode {
    /// A disclosed leaf. Its value is supplied again by the verifier.
    Included(Hash),
    /// The hash of a leaf or sub-tree that is not disclosed.
    Pruned(Hash),
    /// An inner node with two children.
    Branch(Box<PartialNode>, Box<PartialNode>),
    /// The last node of an odd level, hashed with itself.
    Lone(Box<PartialNode>),
}

/// Selective disclosure proof against a Merkle root.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub struct PartialMerkleTree {
    root: PartialNode,
}

impl PartialMerkleTree {
    /// Prune `tree` so that exactly the leaves equal to one of `include` are disclosed.
    ///
    /// # Errors
    /// Returns `Error::LeafNotFound` if a hash of `include` is not a leaf of `tree`.
    ///
    /// # Example
    /// ```
    /// use composite_keys::common::{Hash, StandardDigests};
    /// use composite_keys::merkle::MerkleTree;
    /// use composite_keys::partial::PartialMerkleTree;
    ///
    /// let leaves: Vec<_> = ["a", "b", "c", "d"].iter().map(|s| Hash::sha256(s.as_bytes())).collect();
    /// let tree = MerkleTree::build(leaves.clone(), &StandardDigests).unwrap();
    /// let proof = PartialMerkleTree::build(&tree, &leaves[2..3]).unwrap();
    ///
    /// assert!(proof.verify(tree.root(), &leaves[2..3], &StandardDigests).is_ok());
    /// assert!(proof.verify(tree.root(), &leaves[1..2], &StandardDigests).is_err());
    /// ```
    pub fn build(tree: &MerkleTree, include: &[Hash]) -> Result<Self, Error> {
        let include: BTreeSet<&Hash> = include.iter().collect();
        if let Some(missing) = include.iter().find(|h| tree.leaf_index(h).is_none()) {
            return Err(Error::LeafNotFound((*missing).clone()));
        }
        let levels = tree.levels();
        let (root, _) = prune(levels, levels.len() - 1, 0, &|_: usize, hash: &Hash| {
            include.contains(hash)
        });
        Ok(PartialMerkleTree { root })
    }

    /// Prune `tree` so that exactly the leaves at `positions` are disclosed. Unlike
    /// [`PartialMerkleTree::build`], a leaf value occurring more than once is disclosed
    /// only where asked.
    ///
    /// # Errors
    /// Returns `Error::LeafIndexOutOfRange` for a position past the last leaf.
    pub fn build_at(tree: &MerkleTree, positions: &[usize]) -> Result<Self, Error> {
        let leaves = tree.leaves().len();
        if let Some(&index) = positions.iter().find(|&&i| i >= leaves) {
            return Err(Error::LeafIndexOutOfRange { index, leaves });
        }
        let positions: BTreeSet<usize> = positions.iter().copied().collect();
        let levels = tree.levels();
        let (root, _) = prune(levels, levels.len() - 1, 0, &|index: usize, _: &Hash| {
            positions.contains(&index)
        });
        Ok(PartialMerkleTree { root })
    }

    /// The top node.
    pub fn node(&self) -> &PartialNode {
        &self.root
    }

    /// The disclosed leaves, left to right.
    pub fn included_leaves(&self) -> Vec<&Hash> {
        let mut leaves = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                PartialNode::Included(hash) => leaves.push(hash),
                PartialNode::Pruned(_) => {}
                PartialNode::Branch(left, right) => {
                    stack.push(right);
                    stack.push(left);
                }
                PartialNode::Lone(child) => stack.push(child),
            }
        }
        leaves
    }

    /// Recompute the root from the hashes stored in the proof.
    pub fn root<D: DigestService + ?Sized>(&self, digest: &D) -> Result<Hash, Error> {
        let stored: Vec<Hash> = self.included_leaves().into_iter().cloned().collect();
        let mut supplied = stored.iter();
        recompute(&self.root, &mut supplied, digest, 0)
    }

    /// Check that `included_leaves`, placed at the disclosed positions in order, recompute
    /// to `expected_root`.
    ///
    /// # Errors
    /// Returns `Error::ProofVerificationFailed` when the number of leaves differs from the
    /// disclosed positions, the recomputed root differs, or the hashes cannot be combined.
    /// Returns `Error::StructureTooLarge` for a proof nested deeper than
    /// [`MAX_NESTING_DEPTH`].
    pub fn verify<D: DigestService + ?Sized>(
        &self,
        expected_root: &Hash,
        included_leaves: &[Hash],
        digest: &D,
    ) -> Result<(), Error> {
        let mut supplied = included_leaves.iter();
        let computed = match recompute(&self.root, &mut supplied, digest, 0) {
            Ok(root) => root,
            Err(e @ Error::StructureTooLarge { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Merkle proof could not be recomputed");
                return Err(Error::ProofVerificationFailed);
            }
        };
        if supplied.next().is_some() {
            tracing::warn!("more leaves supplied than the proof discloses");
            return Err(Error::ProofVerificationFailed);
        }
        if &computed != expected_root {
            tracing::warn!(expected = %expected_root, computed = %computed, "Merkle root mismatch");
            return Err(Error::ProofVerificationFailed);
        }
        Ok(())
    }
}

/// Node at `index` of `level`, and whether any leaf below it is disclosed. `disclose` is
/// asked about each leaf by position and value.
fn prune<F>(
    levels: &[Vec<Hash>],
    level: usize,
    index: usize,
    disclose: &F,
) -> (PartialNode, bool)
where
    F: Fn(usize, &Hash) -> bool,
{
    let hash = &levels[level][index];
    if level == 0 {
        return if disclose(index, hash) {
            (PartialNode::Included(hash.clone()), true)
        } else {
            (PartialNode::Pruned(hash.clone()), false)
        };
    }
    let (left, left_in) = prune(levels, level - 1, 2 * index, disclose);
    let (node, any) = if 2 * index + 1 < levels[level - 1].len() {
        let (right, right_in) = prune(levels, level - 1, 2 * index + 1, disclose);
        (
            PartialNode::Branch(Box::new(left), Box::new(right)),
            left_in || right_in,
        )
    } else {
        (PartialNode::Lone(Box::new(left)), left_in)
    };
    if any {
        (node, true)
    } else {
        (PartialNode::Pruned(hash.clone()), false)
    }
}

fn recompute<'a, D, I>(
    node: &PartialNode,
    supplied: &mut I,
    digest: &D,
    depth: usize,
) -> Result<Hash, Error>
where
    D: DigestService + ?Sized,
    I: Iterator<Item = &'a Hash>,
{
    if depth > MAX_NESTING_DEPTH {
        tracing::warn!(depth, "Merkle proof nested too deeply");
        return Err(Error::StructureTooLarge {
            what: "Merkle proof depth",
            limit: MAX_NESTING_DEPTH,
        });
    }
    match node {
        PartialNode::Included(_) => supplied
            .next()
            .cloned()
            .ok_or(Error::ProofVerificationFailed),
        PartialNode::Pruned(hash) => Ok(hash.clone()),
        PartialNode::Branch(left, right) => {
            let left = recompute(left, supplied, digest, depth + 1)?;
            let right = recompute(right, supplied, digest, depth + 1)?;
            left.concatenate(&right, digest)
        }
        PartialNode::Lone(child) => {
            let child = recompute(child, supplied, digest, depth + 1)?;
            child.concatenate(&child, digest)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::StandardDigests;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n)
            .map(|i| Hash::sha256(format!("item-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn both_leaves_disclosed() {
        let l = vec![Hash::sha256(b"d"), Hash::sha256(b"f")];
        let tree = MerkleTree::build(l.clone(), &StandardDigests).unwrap();
        let proof = PartialMerkleTree::build(&tree, &l).unwrap();
        assert!(proof.verify(tree.root(), &l, &StandardDigests).is_ok());

        let mut altered = l.clone();
        let mut bytes = altered[1].as_bytes().to_vec();
        bytes[0] ^= 1;
        altered[1] = Hash::new("SHA-256", bytes).unwrap();
        assert_eq!(
            proof.verify(tree.root(), &altered, &StandardDigests),
            Err(Error::ProofVerificationFailed)
        );
    }

    #[test]
    fn pruned_subtrees_collapse() {
        let l = leaves(8);
        let tree = MerkleTree::build(l.clone(), &StandardDigests).unwrap();
        let proof = PartialMerkleTree::build(&tree, &l[0..1]).unwrap();
        // Three levels above the leaves, one pruned sibling per level.
        let mut node = proof.node();
        let mut pruned = 0;
        while let PartialNode::Branch(left, right) = node {
            assert!(matches!(**right, PartialNode::Pruned(_)));
            pruned += 1;
            node = &**left;
        }
        assert_eq!(pruned, 3);
        assert_eq!(node, &PartialNode::Included(l[0].clone()));
    }

    #[test]
    fn nothing_disclosed_is_the_root() {
        let tree = MerkleTree::build(leaves(5), &StandardDigests).unwrap();
        let proof = PartialMerkleTree::build(&tree, &[]).unwrap();
        assert_eq!(proof.node(), &PartialNode::Pruned(tree.root().clone()));
        assert!(proof.verify(tree.root(), &[], &StandardDigests).is_ok());
    }

    #[test]
    fn odd_tail_is_lone() {
        let l = leaves(3);
        let tree = MerkleTree::build(l.clone(), &StandardDigests).unwrap();
        let proof = PartialMerkleTree::build(&tree, &l[2..]).unwrap();
        assert_eq!(proof.included_leaves(), vec![&l[2]]);
        assert_eq!(&proof.root(&StandardDigests).unwrap(), tree.root());
        assert!(proof.verify(tree.root(), &l[2..], &StandardDigests).is_ok());
    }

    #[test]
    fn unknown_leaf_rejected() {
        let tree = MerkleTree::build(leaves(4), &StandardDigests).unwrap();
        let stranger = Hash::sha256(b"stranger");
        assert_eq!(
            PartialMerkleTree::build(&tree, &[stranger.clone()]),
            Err(Error::LeafNotFound(stranger))
        );
    }

    #[test]
    fn leaf_count_must_match() {
        let l = leaves(4);
        let tree = MerkleTree::build(l.clone(), &StandardDigests).unwrap();
        let proof = PartialMerkleTree::build(&tree, &l[1..3]).unwrap();
        assert!(proof.verify(tree.root(), &l[1..3], &StandardDigests).is_ok());
        assert_eq!(
            proof.verify(tree.root(), &l[1..2], &StandardDigests),
            Err(Error::ProofVerificationFailed)
        );
        assert_eq!(
            proof.verify(tree.root(), &l[0..3], &StandardDigests),
            Err(Error::ProofVerificationFailed)
        );
        // Right leaves, wrong order.
        assert_eq!(
            proof.verify(tree.root(), &[l[2].clone(), l[1].clone()], &StandardDigests),
            Err(Error::ProofVerificationFailed)
        );
    }

    #[test]
    fn repeated_leaf_disclosed_by_position() {
        let (a, b) = (Hash::sha256(b"a"), Hash::sha256(b"b"));
        let l = vec![a.clone(), b, a.clone()];
        let tree = MerkleTree::build(l, &StandardDigests).unwrap();

        // By value, both copies are disclosed.
        let by_value = PartialMerkleTree::build(&tree, &[a.clone()]).unwrap();
        assert_eq!(by_value.included_leaves(), vec![&a, &a]);

        for index in [0, 2] {
            let proof = PartialMerkleTree::build_at(&tree, &[index]).unwrap();
            assert_eq!(proof.included_leaves(), vec![&a]);
            assert!(proof
                .verify(tree.root(), std::slice::from_ref(&a), &StandardDigests)
                .is_ok());
        }
        assert_eq!(
            PartialMerkleTree::build_at(&tree, &[3]),
            Err(Error::LeafIndexOutOfRange { index: 3, leaves: 3 })
        );
    }

    #[test]
    fn wrong_root_rejected() {
        let l = leaves(4);
        let tree = MerkleTree::build(l.clone(), &StandardDigests).unwrap();
        let proof = PartialMerkleTree::build(&tree, &l[..1]).unwrap();
        assert_eq!(
            proof.verify(&Hash::sha256(b"other"), &l[..1], &StandardDigests),
            Err(Error::ProofVerificationFailed)
        );
    }

    #[test]
    fn deep_forged_proof_is_bounded() {
        let mut node = PartialNode::Included(Hash::sha256(b"x"));
        for _ in 0..100 {
            node = PartialNode::Lone(Box::new(node));
        }
        let proof = PartialMerkleTree { root: node };
        assert!(matches!(
            proof.verify(&Hash::sha256(b"x"), &[Hash::sha256(b"x")], &StandardDigests),
            Err(Error::StructureTooLarge { .. })
        ));
    }

    proptest! {
        /// Any disclosed subset of positions verifies, also when leaf values repeat, and
        /// flipping one bit of one disclosed leaf breaks it.
        #[test]
        fn disclosure_soundness(
            values in prop::collection::vec(0u8..4, 1..40),
            picks in prop::collection::btree_set(0usize..40, 1..6),
            flip in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let l: Vec<Hash> = values.iter().map(|v| Hash::sha256(&[*v])).collect();
            let tree = MerkleTree::build(l.clone(), &StandardDigests).unwrap();
            let positions: Vec<usize> = picks.into_iter().filter(|i| *i < l.len()).collect();
            prop_assume!(!positions.is_empty());
            let chosen: Vec<Hash> = positions.iter().map(|i| l[*i].clone()).collect();

            let proof = PartialMerkleTree::build_at(&tree, &positions).unwrap();
            prop_assert_eq!(proof.included_leaves().len(), positions.len());
            prop_assert!(proof.verify(tree.root(), &chosen, &StandardDigests).is_ok());

            let mut tampered = chosen.clone();
            let at = flip.index(tampered.len());
            let mut bytes = tampered[at].as_bytes().to_vec();
            bytes[0] ^= 1 << bit;
            tampered[at] = Hash::new("SHA-256", bytes).unwrap();
            prop_assert!(proof.verify(tree.root(), &tampered, &StandardDigests).is_err());
        }
    }
}
