//! Errors specific to composite keys and Merkle proofs
use crate::common::{Hash, PublicKey};
use ed25519_dalek as ed25519;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
/// Enum of errors associated with composite keys, Merkle trees and batch signatures.
pub enum Error {
    /// A composite key level was built without any children.
    #[error("composite key level has no children")]
    NoChildren,
    /// A child weight is not positive.
    #[error("invalid weight {0}, weights must be positive")]
    InvalidWeight(u32),
    /// The sum of the weights at one level does not fit in the threshold domain.
    #[error("sum of child weights exceeds {}", u32::MAX)]
    WeightOverflow,
    /// The threshold lies outside `[1, total weight]`.
    #[error("threshold {threshold} outside of [1, {total}]")]
    InvalidThreshold {
        /// Requested threshold.
        threshold: u32,
        /// Sum of the child weights at that level.
        total: u64,
    },
    /// Two leaf children at the same level are equal.
    #[error("duplicate key {0} at the same composite key level")]
    DuplicateKey(PublicKey),
    /// A node was reached from one of its own descendants.
    #[error("cycle detected in composite key")]
    CycleDetected,
    /// A fan-out, depth or size bound was exceeded.
    #[error("{what} exceeds the limit of {limit}")]
    StructureTooLarge {
        /// The bound that was exceeded.
        what: &'static str,
        /// Configured value of that bound.
        limit: usize,
    },
    /// A base signature failed its cryptographic check.
    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),
    /// A recomputed Merkle root did not match the expected root.
    #[error("Merkle proof verification failed")]
    ProofVerificationFailed,
    /// A set of valid signatures does not satisfy a composite key.
    #[error("signers do not fulfil the composite key")]
    ThresholdNotMet,
    /// A Merkle tree was requested over no leaves.
    #[error("cannot build a Merkle tree without leaves")]
    EmptyLeaves,
    /// Two hashes that must share an algorithm do not.
    #[error("hash algorithm mismatch: expected {expected}, found {found}")]
    AlgorithmMismatch {
        /// Algorithm in use.
        expected: String,
        /// Offending algorithm.
        found: String,
    },
    /// The digest provider does not know this algorithm.
    #[error("unsupported hash algorithm {0}")]
    UnsupportedAlgorithm(String),
    /// The digest length does not match its algorithm.
    #[error("invalid hash length: expected {expected}, found {found}")]
    InvalidHashLength {
        /// Length of the algorithm's digest.
        expected: usize,
        /// Length supplied.
        found: usize,
    },
    /// A string is not of the form `ALGORITHM:HEX`.
    #[error("invalid hash format: {0}")]
    InvalidHashFormat(String),
    /// A hash to disclose is not a leaf of the tree.
    #[error("leaf {0} is not part of the Merkle tree")]
    LeafNotFound(Hash),
    /// A leaf position to disclose lies past the last leaf.
    #[error("leaf position {index} out of range for {leaves} leaves")]
    LeafIndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of leaves in the tree.
        leaves: usize,
    },
    /// Error occurs when the size of the secret key is not the expected.
    #[error("invalid secret key size {0}")]
    InvalidSecretKeySize(usize),
    /// Error occurs when the size of the public key is not the expected.
    #[error("invalid public key size {0}")]
    InvalidPublicKeySize(usize),
    /// Error occurs when the size of the signature is not the expected.
    #[error("invalid signature size {0}")]
    InvalidSignatureSize(usize),
    /// A key scheme that the verifier cannot handle.
    #[error("unsupported key scheme")]
    UnsupportedScheme,
    /// Bytes could not be decoded into the expected structure.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

impl From<ed25519::SignatureError> for Error {
    fn from(sig: ed25519::SignatureError) -> Error {
        Error::SignatureVerificationFailed(format!("{:?}", sig))
    }
}

impl From<simple_asn1::ASN1DecodeErr> for Error {
    fn from(err: simple_asn1::ASN1DecodeErr) -> Error {
        Error::InvalidEncoding(err.to_string())
    }
}

impl From<simple_asn1::ASN1EncodeErr> for Error {
    fn from(err: simple_asn1::ASN1EncodeErr) -> Error {
        Error::InvalidEncoding(err.to_string())
    }
}
