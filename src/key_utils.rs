//! Helpers that treat plain and composite keys uniformly.
use crate::common::PublicKey;
use crate::composite::Key;
use crate::config::Limits;
use crate::errors::Error;
use crate::traits::KeyOwnership;
use std::collections::{BTreeMap, BTreeSet};

/// Membership, not fulfilment: `true` if any of `others` is `key` or, for a composite
/// key, one of its leaves. Thresholds and weights are ignored.
pub fn is_key_in_set<'a, I>(key: &Key, others: I) -> bool
where
    I: IntoIterator<Item = &'a PublicKey>,
{
    match key {
        Key::Leaf(leaf) => others.into_iter().any(|other| other == leaf),
        Key::Composite(tree) => {
            let leaves = tree.leaf_keys();
            others.into_iter().any(|other| leaves.contains(other))
        }
    }
}

/// `true` if `others` satisfies `key`: threshold evaluation for a composite key,
/// plain membership otherwise.
pub fn is_key_fulfilled_by<'a, I>(key: &Key, others: I) -> bool
where
    I: IntoIterator<Item = &'a PublicKey>,
{
    match key {
        Key::Leaf(leaf) => others.into_iter().any(|other| other == leaf),
        Key::Composite(tree) => tree.is_fulfilled_by(others),
    }
}

/// Resolve which of `candidates` this party can sign for, under the default [`Limits`].
///
/// A plain key maps to itself when owned. A composite key maps to its first owned leaf in
/// leaf key order. Keys with nothing owned map to `None`.
///
/// # Example
/// ```
/// use composite_keys::composite::{CompositeKey, Key};
/// use composite_keys::ed25519::Ed25519Signer;
/// use composite_keys::key_utils::find_my_signing_keys;
/// use composite_keys::traits::Signer;
/// use std::collections::BTreeSet;
///
/// let mine = Ed25519Signer::keygen(&mut [1u8; 32]).public_key();
/// let theirs = Ed25519Signer::keygen(&mut [2u8; 32]).public_key();
/// let shared = Key::from(
///     CompositeKey::create(vec![(mine.clone().into(), 1), (theirs.clone().into(), 1)], None)
///         .unwrap(),
/// );
///
/// let owned: BTreeSet<_> = [mine.clone()].into_iter().collect();
/// let found = find_my_signing_keys(&[shared.clone(), theirs.clone().into()], &owned).unwrap();
/// assert_eq!(found[&shared], Some(mine));
/// assert_eq!(found[&Key::from(theirs)], None);
/// ```
pub fn find_my_signing_keys<O>(
    candidates: &[Key],
    ownership: &O,
) -> Result<BTreeMap<Key, Option<PublicKey>>, Error>
where
    O: KeyOwnership + ?Sized,
{
    find_my_signing_keys_with(candidates, ownership, &Limits::default())
}

/// Same as [`find_my_signing_keys`] under explicit `limits`.
///
/// # Errors
/// Returns `Error::StructureTooLarge` when the candidates hold more distinct leaf keys
/// together than `limits.max_ownership_keys`; nothing is inspected in that case.
pub fn find_my_signing_keys_with<O>(
    candidates: &[Key],
    ownership: &O,
    limits: &Limits,
) -> Result<BTreeMap<Key, Option<PublicKey>>, Error>
where
    O: KeyOwnership + ?Sized,
{
    let leaves: Vec<BTreeSet<&PublicKey>> = candidates.iter().map(Key::leaf_keys).collect();
    let inspected = leaves.iter().flatten().collect::<BTreeSet<_>>().len();
    if inspected > limits.max_ownership_keys {
        tracing::warn!(
            inspected,
            limit = limits.max_ownership_keys,
            "ownership lookup too large"
        );
        return Err(Error::StructureTooLarge {
            what: "keys in one ownership lookup",
            limit: limits.max_ownership_keys,
        });
    }

    Ok(candidates
        .iter()
        .zip(leaves)
        .map(|(candidate, leaves)| {
            let owned = leaves
                .into_iter()
                .find(|leaf| ownership.owns(leaf))
                .cloned();
            (candidate.clone(), owned)
        })
        .collect())
}
