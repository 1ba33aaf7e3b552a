//! Weighted threshold composite keys and Merkle batch signatures.
//!
//! A [`CompositeKey`] expresses a signing requirement such as "Alice AND Bob" or
//! "2 of 3 assistants OR the CEO" as an immutable tree of weighted children with a
//! threshold per level. It is validated once when built, can be used anywhere a plain
//! key is expected through [`Key`], and is evaluated against a set of signers with
//! [`CompositeKey::is_fulfilled_by`].
//!
//! A [`MerkleTree`] commits to an ordered list of hashes. A [`PartialMerkleTree`]
//! discloses a subset of its leaves, and a [`BatchSignatureProof`] couples one signature
//! over the root with the inclusion proof of a single item, so that a batch of items is
//! signed once.
//!
//! Structures received from a peer are bounded by [`Limits`] and re-validated on decode.
#![warn(missing_docs, rust_2018_idioms)]

pub mod batch;
pub mod codec;
pub mod common;
pub mod composite;
pub mod composite_signature;
pub mod config;
pub mod der;
pub mod ed25519;
pub mod errors;
pub mod key_utils;
pub mod merkle;
pub mod partial;
pub mod traits;
mod validation;

pub use batch::{BatchSignatureProof, BatchSigner, SignedBatch};
pub use common::{DigestAlgorithm, Hash, KeyScheme, PublicKey, StandardDigests};
pub use composite::{Builder, CompositeKey, Key, WeightedChild};
pub use composite_signature::{verify_composite, DigitalSignature};
pub use config::Limits;
pub use errors::Error;
pub use merkle::MerkleTree;
pub use partial::{PartialMerkleTree, PartialNode};
