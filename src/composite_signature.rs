//! Raw signatures tagged with their signer, and verification of a set of them against a
//! (possibly composite) key.
use crate::common::PublicKey;
use crate::composite::Key;
use crate::errors::Error;
use crate::key_utils::is_key_fulfilled_by;
use crate::traits::{SignatureVerifier, Signer};
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serde_enabled")]
use serde::{Deserialize, Serialize};

/// A raw signature together with the leaf key that produced it.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub struct DigitalSignature {
    by: PublicKey,
    bytes: Vec<u8>,
}

impl DigitalSignature {
    /// Tag `bytes` as produced by `by`. Nothing is checked.
    pub fn new(by: PublicKey, bytes: Vec<u8>) -> Self {
        DigitalSignature { by, bytes }
    }

    /// Sign `clear` with `signer`.
    pub fn sign<S: Signer + ?Sized>(signer: &S, clear: &[u8]) -> Self {
        DigitalSignature {
            by: signer.public_key(),
            bytes: signer.sign(clear),
        }
    }

    /// The claimed signer.
    pub fn by(&self) -> &PublicKey {
        &self.by
    }

    /// Return `Self` as its byte representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verify the signature over `clear` under its signer.
    pub fn verify<V: SignatureVerifier + ?Sized>(
        &self,
        clear: &[u8],
        verifier: &V,
    ) -> Result<(), Error> {
        verifier.verify(&self.by, &self.bytes, clear)
    }
}

impl fmt::Debug for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigitalSignature({} by {})", hex::encode(&self.bytes), self.by)
    }
}

/// Verify that `signatures` over `clear` satisfy `key`.
///
/// Every signature is checked, so a single bad signature fails the whole set even when the
/// remaining ones would be enough.
///
/// # Errors
/// * `SignatureVerificationFailed` if a signer is not a leaf of `key`, or a signature is
///   invalid
/// * `DuplicateKey` if two signatures claim the same signer
/// * `ThresholdNotMet` if every signature is valid but together they do not fulfil `key`
///
/// # Example
/// ```
/// use composite_keys::composite::{Key, Builder};
/// use composite_keys::composite_signature::{verify_composite, DigitalSignature};
/// use composite_keys::ed25519::{Ed25519Signer, Ed25519Verifier};
/// use composite_keys::traits::Signer;
///
/// let signers: Vec<_> = (1u8..=3).map(|i| Ed25519Signer::keygen(&mut [i; 32])).collect();
/// let key = Key::from(
///     Builder::new()
///         .add_keys(signers.iter().map(|s| s.public_key()))
///         .build_with_threshold(2)
///         .unwrap(),
/// );
///
/// let message = b"transfer 10 coins";
/// let signatures: Vec<_> = signers[..2]
///     .iter()
///     .map(|s| DigitalSignature::sign(s, message))
///     .collect();
/// assert!(verify_composite(&key, &signatures, message, &Ed25519Verifier).is_ok());
/// assert!(verify_composite(&key, &signatures[..1], message, &Ed25519Verifier).is_err());
/// ```
pub fn verify_composite<V>(
    key: &Key,
    signatures: &[DigitalSignature],
    clear: &[u8],
    verifier: &V,
) -> Result<(), Error>
where
    V: SignatureVerifier + ?Sized,
{
    let leaves = key.leaf_keys();
    let mut signers: BTreeSet<&PublicKey> = BTreeSet::new();
    for signature in signatures {
        if !leaves.contains(signature.by()) {
            tracing::warn!(signer = %signature.by(), "signature by a key outside the requirement");
            return Err(Error::SignatureVerificationFailed(format!(
                "{} is not part of the key",
                signature.by()
            )));
        }
        if !signers.insert(signature.by()) {
            return Err(Error::DuplicateKey(signature.by().clone()));
        }
        signature.verify(clear, verifier)?;
    }

    if is_key_fulfilled_by(key, signers.iter().copied()) {
        Ok(())
    } else {
        tracing::debug!(signers = signers.len(), "valid signatures do not fulfil the key");
        Err(Error::ThresholdNotMet)
    }
}
