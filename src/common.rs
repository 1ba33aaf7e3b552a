//! Structures shared by composite keys and Merkle trees: digests, hashes and leaf keys.
use crate::errors::Error;
use crate::traits::DigestService;
use ed25519_dalek as ed25519;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde_enabled")]
use {
    serde::{Deserialize, Serialize},
    serde_with::{DeserializeFromStr, SerializeDisplay},
};

/// ED25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = ed25519::PUBLIC_KEY_LENGTH;
/// ED25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = ed25519::SIGNATURE_LENGTH;

/// Digest algorithms known to [`StandardDigests`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-256, 32 byte output.
    Sha256,
    /// SHA-384, 48 byte output.
    Sha384,
    /// SHA-512, 64 byte output.
    Sha512,
    /// Blake2b with a 32 byte output.
    Blake2b256,
}

impl DigestAlgorithm {
    /// Canonical (upper case) name of the algorithm.
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
            DigestAlgorithm::Blake2b256 => "BLAKE2B-256",
        }
    }

    /// Output length in bytes.
    pub fn digest_length(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 | DigestAlgorithm::Blake2b256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Hash `bytes` with this algorithm.
    pub fn digest(self, bytes: &[u8]) -> Hash {
        let output = match self {
            DigestAlgorithm::Sha256 => sha2_digest::<sha2::Sha256>(bytes),
            DigestAlgorithm::Sha384 => sha2_digest::<sha2::Sha384>(bytes),
            DigestAlgorithm::Sha512 => sha2_digest::<sha2::Sha512>(bytes),
            DigestAlgorithm::Blake2b256 => blake2b_256(bytes),
        };
        Hash {
            algorithm: self.name().to_string(),
            bytes: output,
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "SHA-256" | "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA-384" | "SHA384" => Ok(DigestAlgorithm::Sha384),
            "SHA-512" | "SHA512" => Ok(DigestAlgorithm::Sha512),
            "BLAKE2B-256" | "BLAKE2B256" => Ok(DigestAlgorithm::Blake2b256),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn sha2_digest<D: sha2::Digest>(bytes: &[u8]) -> Vec<u8> {
    D::digest(bytes).to_vec()
}

fn blake2b_256(bytes: &[u8]) -> Vec<u8> {
    use blake2::digest::{Update, VariableOutput};
    use blake2::VarBlake2b;

    let mut out = vec![0u8; 32];
    // 32 is within blake2b's 1..=64 output range.
    if let Ok(mut h) = VarBlake2b::new(32) {
        h.update(bytes);
        h.finalize_variable(|res| out.copy_from_slice(res));
    }
    out
}

/// The digest provider backed by the `sha2` and `blake2` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDigests;

impl DigestService for StandardDigests {
    fn hash(&self, bytes: &[u8], algorithm: &str) -> Result<Hash, Error> {
        Ok(algorithm.parse::<DigestAlgorithm>()?.digest(bytes))
    }

    fn digest_length(&self, algorithm: &str) -> Result<usize, Error> {
        Ok(algorithm.parse::<DigestAlgorithm>()?.digest_length())
    }
}

/// A digest value tagged with the algorithm that produced it.
///
/// The algorithm name is stored in upper case, so equality is case-insensitive on the
/// algorithm and exact on the bytes. Ordering compares the bytes lexicographically (a
/// shorter common prefix sorts first) and only falls back to the algorithm on a tie.
/// The canonical text form is `ALGORITHM:HEX` with upper case hex.
#[derive(Clone, PartialEq, Eq, std::hash::Hash)]
#[cfg_attr(feature = "serde_enabled", derive(SerializeDisplay, DeserializeFromStr))]
pub struct Hash {
    algorithm: String,
    bytes: Vec<u8>,
}

impl Hash {
    /// Build a hash from its parts.
    ///
    /// # Errors
    /// The function fails if
    /// * `algorithm` is empty or contains `:`
    /// * `bytes` is empty, or its length differs from the digest length of a known algorithm
    pub fn new(algorithm: &str, bytes: Vec<u8>) -> Result<Self, Error> {
        if algorithm.is_empty() || algorithm.contains(':') {
            return Err(Error::InvalidHashFormat(algorithm.to_string()));
        }
        let expected = match algorithm.parse::<DigestAlgorithm>() {
            Ok(known) => known.digest_length(),
            Err(_) => bytes.len().max(1),
        };
        if bytes.len() != expected {
            return Err(Error::InvalidHashLength {
                expected,
                found: bytes.len(),
            });
        }
        Ok(Hash {
            algorithm: algorithm.to_ascii_uppercase(),
            bytes,
        })
    }

    /// SHA-256 of `bytes`.
    pub fn sha256(bytes: &[u8]) -> Self {
        DigestAlgorithm::Sha256.digest(bytes)
    }

    /// Upper case algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Return `Self` as its byte representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hash `self || other` with the algorithm both share.
    pub fn concatenate<D: DigestService + ?Sized>(
        &self,
        other: &Hash,
        digest: &D,
    ) -> Result<Hash, Error> {
        if self.algorithm != other.algorithm {
            return Err(Error::AlgorithmMismatch {
                expected: self.algorithm.clone(),
                found: other.algorithm.clone(),
            });
        }
        let mut data = Vec::with_capacity(self.bytes.len() + other.bytes.len());
        data.extend_from_slice(&self.bytes);
        data.extend_from_slice(&other.bytes);
        digest.hash(&data, &self.algorithm)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes
            .cmp(&other.bytes)
            .then_with(|| self.algorithm.cmp(&other.algorithm))
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, hex::encode_upper(&self.bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (algorithm, hex_part) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidHashFormat(s.to_string()))?;
        let bytes = hex::decode(hex_part).map_err(|_| Error::InvalidHashFormat(s.to_string()))?;
        Hash::new(algorithm, bytes)
    }
}

/// Signature schemes a leaf key may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum KeyScheme {
    /// EdDSA over curve25519.
    Ed25519,
}

impl KeyScheme {
    /// Name used in the text form of keys.
    pub fn name(self) -> &'static str {
        match self {
            KeyScheme::Ed25519 => "ED25519",
        }
    }

    /// Expected size of a public key of this scheme.
    pub fn public_key_size(self) -> usize {
        match self {
            KeyScheme::Ed25519 => ED25519_PUBLIC_KEY_SIZE,
        }
    }
}

/// Opaque handle to a leaf public key. Two handles are equal when their scheme and
/// encoded bytes are equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub struct PublicKey {
    scheme: KeyScheme,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Tries to build a key of `scheme` from its encoded `bytes`.
    ///
    /// # Errors
    /// This function returns an error if the length of `bytes` does not match the scheme.
    pub fn from_bytes(scheme: KeyScheme, bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != scheme.public_key_size() {
            return Err(Error::InvalidPublicKeySize(bytes.len()));
        }
        Ok(PublicKey {
            scheme,
            bytes: bytes.to_vec(),
        })
    }

    /// Wrap an ed25519 verifying key.
    pub fn from_ed25519_publickey(public: &ed25519::VerifyingKey) -> Self {
        PublicKey {
            scheme: KeyScheme::Ed25519,
            bytes: public.to_bytes().to_vec(),
        }
    }

    pub(crate) fn to_ed25519(&self) -> Result<ed25519::VerifyingKey, Error> {
        if self.scheme != KeyScheme::Ed25519 {
            return Err(Error::UnsupportedScheme);
        }
        let bytes: [u8; ED25519_PUBLIC_KEY_SIZE] = self
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidPublicKeySize(self.bytes.len()))?;
        Ok(ed25519::VerifyingKey::from_bytes(&bytes)?)
    }

    /// Scheme of the key.
    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    /// Return `Self` as its byte representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme.name(), hex::encode(&self.bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_text_form() {
        let h = Hash::sha256(b"d");
        let text = h.to_string();
        assert_eq!(
            text,
            "SHA-256:18AC3E7343F016890C510E93F935261169D9E3F565436429830FAF0934F4F8E4"
        );
        assert_eq!(text.parse::<Hash>().unwrap(), h);
        assert_eq!(text.to_lowercase().parse::<Hash>().unwrap(), h);
    }

    #[test]
    fn hash_rejects_malformed_text() {
        assert!(matches!(
            "SHA-256".parse::<Hash>(),
            Err(Error::InvalidHashFormat(_))
        ));
        assert!(matches!(
            "SHA-256:ZZ".parse::<Hash>(),
            Err(Error::InvalidHashFormat(_))
        ));
        assert!(matches!(
            "SHA-256:ABCD".parse::<Hash>(),
            Err(Error::InvalidHashLength {
                expected: 32,
                found: 2
            })
        ));
    }

    #[test]
    fn hash_equality_ignores_algorithm_case() {
        let bytes = Hash::sha256(b"x").as_bytes().to_vec();
        let upper = Hash::new("SHA-256", bytes.clone()).unwrap();
        let lower = Hash::new("sha-256", bytes).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn hash_ordering_is_bytewise() {
        let short = Hash::new("CUSTOM", vec![1, 2]).unwrap();
        let long = Hash::new("CUSTOM", vec![1, 2, 0]).unwrap();
        let bigger = Hash::new("CUSTOM", vec![2]).unwrap();
        assert!(short < long);
        assert!(long < bigger);
    }

    #[test]
    fn digest_lengths() {
        let digests = StandardDigests;
        for (name, len) in [
            ("SHA-256", 32),
            ("SHA-384", 48),
            ("SHA-512", 64),
            ("blake2b-256", 32),
        ] {
            assert_eq!(digests.digest_length(name).unwrap(), len);
            assert_eq!(digests.hash(b"tilin", name).unwrap().as_bytes().len(), len);
        }
        assert!(matches!(
            digests.hash(b"tilin", "MD5"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn concatenate_requires_same_algorithm() {
        let a = Hash::sha256(b"a");
        let b = DigestAlgorithm::Blake2b256.digest(b"b");
        assert!(matches!(
            a.concatenate(&b, &StandardDigests),
            Err(Error::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn public_key_size_is_checked() {
        assert!(matches!(
            PublicKey::from_bytes(KeyScheme::Ed25519, &[0u8; 31]),
            Err(Error::InvalidPublicKeySize(31))
        ));
        assert!(PublicKey::from_bytes(KeyScheme::Ed25519, &[7u8; 32]).is_ok());
    }
}
