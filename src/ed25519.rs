//! Implementation of the base signature used for leaf keys and batch signatures. The
//! composite machinery is agnostic of the signature scheme; this module provides the
//! ed25519 instance of the [`Signer`] and [`SignatureVerifier`] collaborators.
use crate::common::{KeyScheme, PublicKey, ED25519_SIGNATURE_SIZE};
use crate::errors::Error;
use crate::traits::{SignatureVerifier, Signer};
use ed25519_dalek::{
    Signature as EdSignature, Signer as _, SigningKey as EdSigningKey, SECRET_KEY_LENGTH,
};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

#[derive(Clone, Zeroize)]
#[zeroize(drop)]
/// Ed25519 signing key, which is a wrapper over its 32 byte seed.
pub struct Ed25519Signer([u8; SECRET_KEY_LENGTH]);

impl Ed25519Signer {
    /// Size of the secret key
    pub const SIZE: usize = SECRET_KEY_LENGTH;

    /// Key generation from a seed. The seed is overwritten with zeroes.
    ///
    /// # Panics
    /// Panics if `master_seed.len() != Self::SIZE`.
    pub fn keygen(master_seed: &mut [u8]) -> Self {
        assert_eq!(
            master_seed.len(),
            Self::SIZE,
            "Size of the seed is incorrect."
        );
        let mut secret = [0u8; Self::SIZE];
        secret.copy_from_slice(master_seed);
        master_seed.copy_from_slice(&[0u8; SECRET_KEY_LENGTH]);
        Ed25519Signer(secret)
    }

    /// Fresh key from a cryptographic RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; Self::SIZE];
        rng.fill_bytes(&mut seed);
        Self::keygen(&mut seed)
    }

    /// Convert a byte array into a key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::SIZE {
            return Err(Error::InvalidSecretKeySize(bytes.len()));
        }

        let mut key = [0u8; Self::SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Return the current key as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn signing_key(&self) -> EdSigningKey {
        EdSigningKey::from_bytes(&self.0)
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Ed25519Signer")
            .field(&self.public_key())
            .finish()
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> PublicKey {
        PublicKey::from_ed25519_publickey(&self.signing_key().verifying_key())
    }

    fn sign(&self, clear: &[u8]) -> Vec<u8> {
        self.signing_key().sign(clear).to_bytes().to_vec()
    }
}

/// Strict ed25519 verification of raw signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, key: &PublicKey, signature: &[u8], clear: &[u8]) -> Result<(), Error> {
        if key.scheme() != KeyScheme::Ed25519 {
            return Err(Error::UnsupportedScheme);
        }
        if signature.len() != ED25519_SIGNATURE_SIZE {
            return Err(Error::InvalidSignatureSize(signature.len()));
        }
        let ed_pk = key.to_ed25519()?;
        let sigma = EdSignature::from_slice(signature)?;
        ed_pk.verify_strict(clear, &sigma).map_err(|e| {
            tracing::warn!(signer = %key, "ed25519 signature rejected");
            Error::from(e)
        })
    }
}
