//! Traits for the external collaborators: digests, signing and key ownership.
use crate::common::{Hash, PublicKey};
use crate::errors::Error;
use std::collections::{BTreeSet, HashSet};

/// Digest provider consumed by Merkle trees.
pub trait DigestService {
    /// Hash `bytes` with the algorithm named `algorithm`.
    fn hash(&self, bytes: &[u8], algorithm: &str) -> Result<Hash, Error>;
    /// Output length of `algorithm` in bytes.
    fn digest_length(&self, algorithm: &str) -> Result<usize, Error>;
}

/// Holder of a private key able to produce raw signatures.
pub trait Signer {
    /// Public half of the key.
    fn public_key(&self) -> PublicKey;
    /// Sign `clear` with the private key.
    fn sign(&self, clear: &[u8]) -> Vec<u8>;
}

/// Raw signature verification, dispatched on the scheme of the key.
///
/// # Example
/// ```
/// use composite_keys::ed25519::{Ed25519Signer, Ed25519Verifier};
/// use composite_keys::traits::{SignatureVerifier, Signer};
///
/// let signer = Ed25519Signer::keygen(&mut [0u8; 32]);
/// let message = b"tilin";
/// let signature = signer.sign(message);
///
/// assert!(Ed25519Verifier
///     .verify(&signer.public_key(), &signature, message)
///     .is_ok());
/// ```
pub trait SignatureVerifier {
    /// Verify `signature` over `clear` under `key`.
    ///
    /// # Errors
    /// Returns `Error::SignatureVerificationFailed` when the check fails.
    fn verify(&self, key: &PublicKey, signature: &[u8], clear: &[u8]) -> Result<(), Error>;
}

/// Oracle answering whether the private half of a leaf key is held locally.
pub trait KeyOwnership {
    /// `true` if this party can sign with `key`.
    fn owns(&self, key: &PublicKey) -> bool;
}

impl KeyOwnership for BTreeSet<PublicKey> {
    fn owns(&self, key: &PublicKey) -> bool {
        self.contains(key)
    }
}

impl KeyOwnership for HashSet<PublicKey> {
    fn owns(&self, key: &PublicKey) -> bool {
        self.contains(key)
    }
}

impl<F> KeyOwnership for F
where
    F: Fn(&PublicKey) -> bool,
{
    fn owns(&self, key: &PublicKey) -> bool {
        self(key)
    }
}
