//! DER encoding of keys as X.509 `SubjectPublicKeyInfo`.
//!
//! Ed25519 leaves follow RFC 8410. A composite key uses [`composite_key_oid`] as its
//! algorithm and carries, in the BIT STRING,
//!
//! ```text
//! CompositeKey ::= SEQUENCE {
//!     threshold INTEGER,
//!     children  SEQUENCE OF SEQUENCE {
//!         key    SubjectPublicKeyInfo,
//!         weight INTEGER
//!     }
//! }
//! ```
//!
//! Decoding bounds depth, fan-out and node count before descending and re-validates every
//! level through [`CompositeKey::create_with`].
use crate::common::{KeyScheme, PublicKey};
use crate::composite::{CompositeKey, Key};
use crate::config::{Limits, MAX_NESTING_DEPTH};
use crate::errors::Error;
use crate::validation::{CHILDREN_BOUND, DEPTH_BOUND, NODES_BOUND};
use simple_asn1::ASN1Block::{BitString, Boolean, Integer, Null, ObjectIdentifier, OctetString, Sequence};
use simple_asn1::{from_der, oid, to_der, ASN1Block, BigInt, BigUint, OID};

/// Constructed DER elements allowed inside one SPKI or composite body.
const MAX_DER_NESTING: usize = 8;

/// Object identifier of composite keys, both as SPKI algorithm and as certificate
/// extension.
pub fn composite_key_oid() -> OID {
    OID::new(vec![
        BigUint::from(2u32),
        BigUint::from(25u32),
        BigUint::from(30_086_077_608_615_255_153_862_931_087_626_791_001u128),
    ])
}

/// OID for Ed25519 is 1.3.101.112, see <https://tools.ietf.org/html/rfc8410>
pub fn ed25519_oid() -> OID {
    oid!(1, 3, 101, 112)
}

impl Key {
    /// Encode as a DER `SubjectPublicKeyInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        Ok(to_der(&encode_key(self, 1)?)?)
    }

    /// Decode a DER `SubjectPublicKeyInfo` under the default [`Limits`].
    pub fn from_der(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_der_with(bytes, &Limits::default())
    }

    /// Decode a DER `SubjectPublicKeyInfo` under `limits`.
    ///
    /// # Errors
    /// `InvalidEncoding` for malformed DER, `UnsupportedScheme` for an unknown algorithm,
    /// `StructureTooLarge` when a bound is exceeded, and any construction error of
    /// [`CompositeKey::create`] for an invalid level.
    pub fn from_der_with(bytes: &[u8], limits: &Limits) -> Result<Self, Error> {
        let mut decoder = Decoder { limits, nodes: 0 };
        parse(bytes)
            .and_then(|spki| decoder.key(&spki, 1))
            .map_err(|e| {
                tracing::debug!(error = %e, len = bytes.len(), "DER key rejected");
                e
            })
    }
}

impl CompositeKey {
    /// Encode as a DER `SubjectPublicKeyInfo`.
    ///
    /// # Example
    /// ```
    /// use composite_keys::composite::{CompositeKey, Key};
    /// use composite_keys::ed25519::Ed25519Signer;
    /// use composite_keys::traits::Signer;
    ///
    /// let a = Ed25519Signer::keygen(&mut [1u8; 32]).public_key();
    /// let b = Ed25519Signer::keygen(&mut [2u8; 32]).public_key();
    /// let tree = CompositeKey::create(vec![(a.into(), 1), (b.into(), 1)], Some(1)).unwrap();
    ///
    /// let der = tree.to_der().unwrap();
    /// assert_eq!(CompositeKey::from_der(&der).unwrap(), tree);
    /// ```
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        Ok(to_der(&spki(composite_key_oid(), encode_body(self, 1)?))?)
    }

    /// Decode a composite key under the default [`Limits`].
    pub fn from_der(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_der_with(bytes, &Limits::default())
    }

    /// Decode a composite key under `limits`. A plain key is rejected.
    pub fn from_der_with(bytes: &[u8], limits: &Limits) -> Result<Self, Error> {
        match Key::from_der_with(bytes, limits)? {
            Key::Composite(tree) => Ok(tree),
            Key::Leaf(_) => Err(Error::InvalidEncoding(
                "expected a composite key, found a plain key".to_string(),
            )),
        }
    }

    /// Encode as an X.509 `Extension` identified by [`composite_key_oid`], with the DER
    /// `SubjectPublicKeyInfo` as `extnValue`. The extension is not marked critical.
    pub fn to_extension(&self) -> Result<Vec<u8>, Error> {
        let extension = Sequence(
            0,
            vec![
                ObjectIdentifier(0, composite_key_oid()),
                OctetString(0, self.to_der()?),
            ],
        );
        Ok(to_der(&extension)?)
    }

    /// Decode an X.509 `Extension` under the default [`Limits`].
    pub fn from_extension(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_extension_with(bytes, &Limits::default())
    }

    /// Decode an X.509 `Extension` under `limits`. The `critical` flag is accepted but
    /// ignored; the `extnID` must be [`composite_key_oid`].
    pub fn from_extension_with(bytes: &[u8], limits: &Limits) -> Result<Self, Error> {
        let extension = parse(bytes)?;
        let parts = match &extension {
            Sequence(_, parts) => parts.as_slice(),
            _ => return Err(malformed("extension is not a SEQUENCE")),
        };
        match parts {
            [ObjectIdentifier(_, id), OctetString(_, value)]
            | [ObjectIdentifier(_, id), Boolean(_, _), OctetString(_, value)] => {
                if *id != composite_key_oid() {
                    return Err(malformed("extension is not a composite key"));
                }
                Self::from_der_with(value, limits)
            }
            _ => Err(malformed("unexpected extension layout")),
        }
    }
}

fn malformed(what: &str) -> Error {
    Error::InvalidEncoding(what.to_string())
}

fn spki(algorithm: OID, key: Vec<u8>) -> ASN1Block {
    let algorithm = Sequence(0, vec![ObjectIdentifier(0, algorithm)]);
    let bits = BitString(0, key.len() * 8, key);
    Sequence(0, vec![algorithm, bits])
}

fn encode_key(key: &Key, depth: usize) -> Result<ASN1Block, Error> {
    match key {
        Key::Leaf(leaf) => match leaf.scheme() {
            KeyScheme::Ed25519 => Ok(spki(ed25519_oid(), leaf.as_bytes().to_vec())),
        },
        Key::Composite(tree) => Ok(spki(composite_key_oid(), encode_body(tree, depth)?)),
    }
}

fn encode_body(tree: &CompositeKey, depth: usize) -> Result<Vec<u8>, Error> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::StructureTooLarge {
            what: DEPTH_BOUND,
            limit: MAX_NESTING_DEPTH,
        });
    }
    let children = tree
        .children()
        .iter()
        .map(|child| {
            Ok(Sequence(
                0,
                vec![
                    encode_key(child.node(), depth + 1)?,
                    Integer(0, BigInt::from(child.weight())),
                ],
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let body = Sequence(
        0,
        vec![Integer(0, BigInt::from(tree.threshold())), Sequence(0, children)],
    );
    Ok(to_der(&body)?)
}

/// Parse exactly one DER element, after checking its nesting without recursion.
fn parse(bytes: &[u8]) -> Result<ASN1Block, Error> {
    check_nesting(bytes, MAX_DER_NESTING)?;
    let mut blocks = from_der(bytes)?;
    match (blocks.pop(), blocks.is_empty()) {
        (Some(block), true) => Ok(block),
        _ => Err(malformed("expected exactly one DER element")),
    }
}

/// Walk the TLV headers of `bytes` and reject constructed elements nested deeper than
/// `max`.
fn check_nesting(bytes: &[u8], max: usize) -> Result<(), Error> {
    let truncated = || malformed("truncated DER element");
    let mut ends: Vec<usize> = Vec::new();
    let mut pos = 0usize;
    loop {
        while ends.last().map_or(false, |end| *end <= pos) {
            ends.pop();
        }
        if pos >= bytes.len() {
            return Ok(());
        }

        let tag = bytes[pos];
        pos += 1;
        if tag & 0x1f == 0x1f {
            while *bytes.get(pos).ok_or_else(truncated)? & 0x80 != 0 {
                pos += 1;
            }
            pos += 1;
        }

        let first = *bytes.get(pos).ok_or_else(truncated)?;
        pos += 1;
        let len = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let count = usize::from(first & 0x7f);
            if count == 0 || count > 4 {
                return Err(malformed("unsupported DER length"));
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | usize::from(*bytes.get(pos).ok_or_else(truncated)?);
                pos += 1;
            }
            len
        };
        let end = pos
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(truncated)?;

        if tag & 0x20 != 0 {
            ends.push(end);
            if ends.len() > max {
                tracing::warn!(limit = max, "DER nesting too deep");
                return Err(Error::StructureTooLarge {
                    what: "DER nesting",
                    limit: max,
                });
            }
        } else {
            pos = end;
        }
    }
}

fn to_u32(value: &BigInt, what: &str) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::InvalidEncoding(format!("{} out of range", what)))
}

struct Decoder<'l> {
    limits: &'l Limits,
    nodes: usize,
}

impl Decoder<'_> {
    fn key(&mut self, spki: &ASN1Block, depth: usize) -> Result<Key, Error> {
        let (algorithm, key) = split_spki(spki)?;
        if *algorithm == ed25519_oid() {
            Ok(Key::Leaf(PublicKey::from_bytes(KeyScheme::Ed25519, key)?))
        } else if *algorithm == composite_key_oid() {
            Ok(Key::Composite(self.composite(key, depth)?))
        } else {
            Err(Error::UnsupportedScheme)
        }
    }

    fn composite(&mut self, body: &[u8], depth: usize) -> Result<CompositeKey, Error> {
        let max_depth = self.limits.effective_max_depth();
        if depth > max_depth {
            return Err(Error::StructureTooLarge {
                what: DEPTH_BOUND,
                limit: max_depth,
            });
        }
        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            return Err(Error::StructureTooLarge {
                what: NODES_BOUND,
                limit: self.limits.max_nodes,
            });
        }

        let body = parse(body)?;
        let (threshold, entries) = match &body {
            Sequence(_, parts) => match parts.as_slice() {
                [Integer(_, threshold), Sequence(_, entries)] => (threshold, entries),
                _ => return Err(malformed("unexpected composite key layout")),
            },
            _ => return Err(malformed("composite key is not a SEQUENCE")),
        };
        if entries.len() > self.limits.max_children {
            return Err(Error::StructureTooLarge {
                what: CHILDREN_BOUND,
                limit: self.limits.max_children,
            });
        }

        let threshold = to_u32(threshold, "threshold")?;
        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Sequence(_, pair) => match pair.as_slice() {
                    [spki, Integer(_, weight)] => {
                        let weight = to_u32(weight, "weight")?;
                        children.push((self.key(spki, depth + 1)?, weight));
                    }
                    _ => return Err(malformed("unexpected child layout")),
                },
                _ => return Err(malformed("child is not a SEQUENCE")),
            }
        }
        CompositeKey::create_with(children, Some(threshold), self.limits)
    }
}

fn split_spki(spki: &ASN1Block) -> Result<(&OID, &[u8]), Error> {
    let parts = match spki {
        Sequence(_, parts) => parts.as_slice(),
        _ => return Err(malformed("SubjectPublicKeyInfo is not a SEQUENCE")),
    };
    match parts {
        [Sequence(_, algorithm), BitString(_, bits, key)] if *bits == key.len() * 8 => {
            match algorithm.as_slice() {
                [ObjectIdentifier(_, id)] | [ObjectIdentifier(_, id), Null(_)] => {
                    Ok((id, key.as_slice()))
                }
                _ => Err(malformed("unexpected AlgorithmIdentifier")),
            }
        }
        _ => Err(malformed("unexpected SubjectPublicKeyInfo layout")),
    }
}
