//! Signing many items with one signature over a Merkle root.
use crate::common::Hash;
use crate::composite_signature::DigitalSignature;
use crate::config::Limits;
use crate::errors::Error;
use crate::merkle::MerkleTree;
use crate::partial::PartialMerkleTree;
use crate::traits::{DigestService, SignatureVerifier, Signer};

#[cfg(feature = "serde_enabled")]
use serde::{Deserialize, Serialize};

/// Signs batches of item hashes with a single signature each.
///
/// # Example
/// ```
/// use composite_keys::batch::BatchSigner;
/// use composite_keys::common::{Hash, StandardDigests};
/// use composite_keys::ed25519::{Ed25519Signer, Ed25519Verifier};
///
/// let signer = Ed25519Signer::keygen(&mut [5u8; 32]);
/// let items: Vec<_> = ["tx1", "tx2", "tx3"].iter().map(|s| Hash::sha256(s.as_bytes())).collect();
///
/// let batch = BatchSigner::new(&signer, &StandardDigests)
///     .sign_batch(items.clone())
///     .unwrap();
/// let proof = batch.proof_for(&items[1]).unwrap();
///
/// assert!(proof.verify(&items[1], &Ed25519Verifier, &StandardDigests).is_ok());
/// assert!(proof.verify(&items[0], &Ed25519Verifier, &StandardDigests).is_err());
/// ```
#[derive(Debug)]
pub struct BatchSigner<'a, S: ?Sized, D: ?Sized> {
    signer: &'a S,
    digest: &'a D,
    limits: Limits,
}

impl<'a, S, D> BatchSigner<'a, S, D>
where
    S: Signer + ?Sized,
    D: DigestService + ?Sized,
{
    /// Batch signer using the default [`Limits`].
    pub fn new(signer: &'a S, digest: &'a D) -> Self {
        BatchSigner {
            signer,
            digest,
            limits: Limits::default(),
        }
    }

    /// Replace the limits applied to each batch.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Build a Merkle tree over `items` and sign its root.
    ///
    /// # Errors
    /// Fails like [`MerkleTree::build_with`].
    pub fn sign_batch(&self, items: Vec<Hash>) -> Result<SignedBatch, Error> {
        let tree = MerkleTree::build_with(items, self.digest, &self.limits)?;
        let signature = DigitalSignature::sign(self.signer, tree.root().as_bytes());
        tracing::debug!(
            items = tree.leaves().len(),
            root = %tree.root(),
            signer = %signature.by(),
            "batch signed"
        );
        Ok(SignedBatch { tree, signature })
    }
}

/// The outcome of [`BatchSigner::sign_batch`]: the full tree and the root signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBatch {
    tree: MerkleTree,
    signature: DigitalSignature,
}

impl SignedBatch {
    /// The signed root.
    pub fn root(&self) -> &Hash {
        self.tree.root()
    }

    /// The Merkle tree over the items.
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Signature over the root bytes.
    pub fn signature(&self) -> &DigitalSignature {
        &self.signature
    }

    /// Inclusion proof for `item`, at its first position in the batch.
    ///
    /// # Errors
    /// Returns `Error::LeafNotFound` if `item` was not part of the batch.
    pub fn proof_for(&self, item: &Hash) -> Result<BatchSignatureProof, Error> {
        let index = self
            .tree
            .leaf_index(item)
            .ok_or_else(|| Error::LeafNotFound(item.clone()))?;
        self.proof_at(index)
    }

    /// Inclusion proof for the item at position `index`.
    ///
    /// # Errors
    /// Returns `Error::LeafIndexOutOfRange` if the batch has no item at `index`.
    pub fn proof_at(&self, index: usize) -> Result<BatchSignatureProof, Error> {
        Ok(BatchSignatureProof {
            signature: self.signature.clone(),
            root: self.tree.root().clone(),
            proof: PartialMerkleTree::build_at(&self.tree, &[index])?,
        })
    }

    /// One proof per item, in item order.
    pub fn proofs(&self) -> Result<Vec<BatchSignatureProof>, Error> {
        (0..self.tree.leaves().len())
            .map(|index| self.proof_at(index))
            .collect()
    }
}

/// Proof that one item belongs to a signed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub struct BatchSignatureProof {
    signature: DigitalSignature,
    root: Hash,
    proof: PartialMerkleTree,
}

impl BatchSignatureProof {
    /// Reassemble a proof received in parts.
    pub fn new(signature: DigitalSignature, root: Hash, proof: PartialMerkleTree) -> Self {
        BatchSignatureProof {
            signature,
            root,
            proof,
        }
    }

    /// Signature over the root.
    pub fn signature(&self) -> &DigitalSignature {
        &self.signature
    }

    /// Root the item is proven against.
    pub fn root(&self) -> &Hash {
        &self.root
    }

    /// Inclusion proof of the item.
    pub fn partial_tree(&self) -> &PartialMerkleTree {
        &self.proof
    }

    /// Check the root signature, then the inclusion of `item` under that root.
    ///
    /// # Errors
    /// `SignatureVerificationFailed` (or another verifier error) when the signature is bad,
    /// `ProofVerificationFailed` when `item` is not proven under the root.
    pub fn verify<V, D>(&self, item: &Hash, verifier: &V, digest: &D) -> Result<(), Error>
    where
        V: SignatureVerifier + ?Sized,
        D: DigestService + ?Sized,
    {
        self.signature.verify(self.root.as_bytes(), verifier)?;
        self.proof
            .verify(&self.root, std::slice::from_ref(item), digest)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::StandardDigests;
    use crate::ed25519::{Ed25519Signer, Ed25519Verifier};

    fn items(n: usize) -> Vec<Hash> {
        (0..n)
            .map(|i| Hash::sha256(format!("tx-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn every_item_proves() {
        let signer = Ed25519Signer::keygen(&mut [6u8; 32]);
        let items = items(7);
        let batch = BatchSigner::new(&signer, &StandardDigests)
            .sign_batch(items.clone())
            .unwrap();
        let proofs = batch.proofs().unwrap();
        assert_eq!(proofs.len(), 7);
        for (item, proof) in items.iter().zip(&proofs) {
            assert!(proof
                .verify(item, &Ed25519Verifier, &StandardDigests)
                .is_ok());
            assert_eq!(proof.root(), batch.root());
        }
        assert_eq!(
            proofs[0].verify(&items[1], &Ed25519Verifier, &StandardDigests),
            Err(Error::ProofVerificationFailed)
        );
    }

    #[test]
    fn forged_root_fails_signature() {
        let signer = Ed25519Signer::keygen(&mut [6u8; 32]);
        let batch = BatchSigner::new(&signer, &StandardDigests)
            .sign_batch(items(4))
            .unwrap();
        let honest = batch.proof_for(&items(4)[0]).unwrap();

        let other = MerkleTree::build(items(3), &StandardDigests).unwrap();
        let forged = BatchSignatureProof::new(
            honest.signature().clone(),
            other.root().clone(),
            PartialMerkleTree::build(&other, &items(3)[..1]).unwrap(),
        );
        assert!(matches!(
            forged.verify(&items(3)[0], &Ed25519Verifier, &StandardDigests),
            Err(Error::SignatureVerificationFailed(_))
        ));
    }

    #[test]
    fn unknown_item_has_no_proof() {
        let signer = Ed25519Signer::keygen(&mut [6u8; 32]);
        let batch = BatchSigner::new(&signer, &StandardDigests)
            .sign_batch(items(2))
            .unwrap();
        assert!(matches!(
            batch.proof_for(&Hash::sha256(b"nope")),
            Err(Error::LeafNotFound(_))
        ));
    }

    #[test]
    fn repeated_items_prove() {
        let signer = Ed25519Signer::keygen(&mut [6u8; 32]);
        let (a, b) = (Hash::sha256(b"a"), Hash::sha256(b"b"));
        let items = vec![a.clone(), b.clone(), a.clone()];
        let batch = BatchSigner::new(&signer, &StandardDigests)
            .sign_batch(items.clone())
            .unwrap();

        let proof = batch.proof_for(&a).unwrap();
        assert_eq!(proof.partial_tree().included_leaves(), vec![&a]);
        assert!(proof.verify(&a, &Ed25519Verifier, &StandardDigests).is_ok());

        let proofs = batch.proofs().unwrap();
        assert_eq!(proofs.len(), 3);
        for (item, proof) in items.iter().zip(&proofs) {
            assert!(proof
                .verify(item, &Ed25519Verifier, &StandardDigests)
                .is_ok());
        }
        assert_ne!(proofs[0], proofs[2]);
        assert!(matches!(
            batch.proof_at(3),
            Err(Error::LeafIndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn batch_size_bounded() {
        let signer = Ed25519Signer::keygen(&mut [6u8; 32]);
        let limits = Limits::default().with_max_merkle_leaves(3);
        assert!(matches!(
            BatchSigner::new(&signer, &StandardDigests)
                .with_limits(limits)
                .sign_batch(items(4)),
            Err(Error::StructureTooLarge { .. })
        ));
    }
}
