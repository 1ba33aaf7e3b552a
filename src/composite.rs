//! Composite keys: immutable weighted threshold trees over leaf public keys.
//!
//! A composite key is a value, its children are owned by their parent, so a tree built
//! through [`CompositeKey::create`] can never contain itself. Construction validates the
//! whole tree once; afterwards only read-only queries are offered. Trees that arrive
//! through a path that bypasses the constructor (serde, hand-built wire data) must be
//! checked with [`CompositeKey::check_validity`] before use.
use crate::common::PublicKey;
use crate::config::{Limits, MAX_NESTING_DEPTH};
use crate::errors::Error;
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[cfg(feature = "serde_enabled")]
use serde::{Deserialize, Serialize};

/// A key usable wherever a signer is expected: either a single leaf key or a composite
/// requirement over several keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub enum Key {
    /// A plain public key.
    Leaf(PublicKey),
    /// A nested threshold requirement.
    Composite(CompositeKey),
}

impl Key {
    /// All leaf keys reachable from `self`, deduplicated by equality.
    pub fn leaf_keys(&self) -> BTreeSet<&PublicKey> {
        match self {
            Key::Leaf(key) => std::iter::once(key).collect(),
            Key::Composite(tree) => tree.leaf_keys(),
        }
    }

    /// `true` for [`Key::Composite`].
    pub fn is_composite(&self) -> bool {
        matches!(self, Key::Composite(_))
    }
}

impl From<PublicKey> for Key {
    fn from(key: PublicKey) -> Self {
        Key::Leaf(key)
    }
}

impl From<CompositeKey> for Key {
    fn from(tree: CompositeKey) -> Self {
        Key::Composite(tree)
    }
}

/// A child of a composite key level together with its weight.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub struct WeightedChild {
    pub(crate) node: Key,
    pub(crate) weight: u32,
}

impl WeightedChild {
    /// Pair `node` with `weight`.
    ///
    /// # Errors
    /// Returns `Error::InvalidWeight` if `weight` is zero.
    pub fn new(node: impl Into<Key>, weight: u32) -> Result<Self, Error> {
        if weight == 0 {
            return Err(Error::InvalidWeight(weight));
        }
        Ok(WeightedChild {
            node: node.into(),
            weight,
        })
    }

    /// The child key.
    pub fn node(&self) -> &Key {
        &self.node
    }

    /// The weight it contributes when satisfied.
    pub fn weight(&self) -> u32 {
        self.weight
    }
}

/// Canonical child order: heavier children first, then by key.
pub(crate) fn canonical_order(a: &WeightedChild, b: &WeightedChild) -> Ordering {
    b.weight
        .cmp(&a.weight)
        .then_with(|| a.node.cmp(&b.node))
}

/// A weighted threshold tree over leaf keys.
///
/// # Example
/// ```
/// use composite_keys::composite::{CompositeKey, Key};
/// use composite_keys::ed25519::Ed25519Signer;
/// use composite_keys::traits::Signer;
///
/// let alice = Ed25519Signer::keygen(&mut [1u8; 32]).public_key();
/// let bob = Ed25519Signer::keygen(&mut [2u8; 32]).public_key();
/// let ceo = Ed25519Signer::keygen(&mut [3u8; 32]).public_key();
///
/// // Alice AND Bob
/// let assistants = CompositeKey::create(
///     vec![(Key::from(alice.clone()), 1), (Key::from(bob.clone()), 1)],
///     None,
/// )
/// .unwrap();
/// // (Alice AND Bob) OR the CEO
/// let policy = CompositeKey::create(
///     vec![(Key::from(assistants), 1), (Key::from(ceo.clone()), 1)],
///     Some(1),
/// )
/// .unwrap();
///
/// assert!(policy.is_fulfilled_by([&ceo]));
/// assert!(policy.is_fulfilled_by([&alice, &bob]));
/// assert!(!policy.is_fulfilled_by([&alice]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
pub struct CompositeKey {
    pub(crate) threshold: u32,
    pub(crate) children: Vec<WeightedChild>,
}

impl CompositeKey {
    /// Build and validate a composite key under the default [`Limits`].
    ///
    /// A missing `threshold` defaults to the sum of the weights, i.e. every child is required.
    ///
    /// # Errors
    /// The function fails if
    /// * `children` is empty (`NoChildren`) or larger than the fan-out bound
    ///   (`StructureTooLarge`)
    /// * a weight is zero (`InvalidWeight`) or the weights overflow (`WeightOverflow`)
    /// * the threshold is outside `[1, sum]` (`InvalidThreshold`)
    /// * two leaves at the same level are equal (`DuplicateKey`)
    /// * a nested child is itself invalid, or the tree is too deep or too large
    pub fn create(children: Vec<(Key, u32)>, threshold: Option<u32>) -> Result<Self, Error> {
        Self::create_with(children, threshold, &Limits::default())
    }

    /// Same as [`CompositeKey::create`] under explicit `limits`.
    pub fn create_with(
        children: Vec<(Key, u32)>,
        threshold: Option<u32>,
        limits: &Limits,
    ) -> Result<Self, Error> {
        Self::assemble(children, threshold, limits).map_err(|e| {
            tracing::debug!(error = %e, "composite key construction rejected");
            e
        })
    }

    fn assemble(
        children: Vec<(Key, u32)>,
        threshold: Option<u32>,
        limits: &Limits,
    ) -> Result<Self, Error> {
        if children.len() > limits.max_children {
            return Err(Error::StructureTooLarge {
                what: crate::validation::CHILDREN_BOUND,
                limit: limits.max_children,
            });
        }
        let mut children = children
            .into_iter()
            .map(|(node, weight)| WeightedChild::new(node, weight))
            .collect::<Result<Vec<_>, _>>()?;

        let total = crate::validation::total_weight(&children)?;
        // `total_weight` guarantees the sum fits in the threshold domain.
        let threshold = threshold.unwrap_or(total as u32);

        children.sort_by(canonical_order);
        let key = CompositeKey {
            threshold,
            children,
        };
        key.check_validity_with(limits)?;
        Ok(key)
    }

    /// Minimum satisfied weight required at the root level.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Children of the root level in canonical order.
    pub fn children(&self) -> &[WeightedChild] {
        &self.children
    }

    /// Sum of the weights of the root level.
    pub fn total_weight(&self) -> u64 {
        self.children.iter().map(|c| u64::from(c.weight)).sum()
    }

    /// All leaf keys at every level, deduplicated by equality.
    pub fn leaf_keys(&self) -> BTreeSet<&PublicKey> {
        let mut keys = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            for child in &tree.children {
                match &child.node {
                    Key::Leaf(key) => {
                        keys.insert(key);
                    }
                    Key::Composite(sub) => stack.push(sub),
                }
            }
        }
        keys
    }

    /// Whether the keys in `presented` satisfy this requirement.
    ///
    /// A leaf child contributes its weight when it is presented; a nested child contributes
    /// when it is itself fulfilled. Adding keys never turns a fulfilled key into an
    /// unfulfilled one. Trees nested deeper than [`MAX_NESTING_DEPTH`] are never fulfilled.
    pub fn is_fulfilled_by<'a, I>(&self, presented: I) -> bool
    where
        I: IntoIterator<Item = &'a PublicKey>,
    {
        let presented: BTreeSet<&PublicKey> = presented.into_iter().collect();
        self.fulfilled(&presented, 1)
    }

    /// Whether the single `key` satisfies this requirement.
    pub fn is_fulfilled_by_key(&self, key: &PublicKey) -> bool {
        self.is_fulfilled_by(std::iter::once(key))
    }

    fn fulfilled(&self, presented: &BTreeSet<&PublicKey>, depth: usize) -> bool {
        if depth > MAX_NESTING_DEPTH || self.threshold == 0 {
            return false;
        }
        let threshold = u64::from(self.threshold);
        let mut satisfied = 0u64;
        for child in &self.children {
            let met = match &child.node {
                Key::Leaf(key) => presented.contains(key),
                Key::Composite(sub) => sub.fulfilled(presented, depth + 1),
            };
            if met {
                satisfied = satisfied.saturating_add(u64::from(child.weight));
                if satisfied >= threshold {
                    return true;
                }
            }
        }
        false
    }
}

/// Incremental construction of a [`CompositeKey`].
///
/// # Example
/// ```
/// use composite_keys::composite::Builder;
/// use composite_keys::ed25519::Ed25519Signer;
/// use composite_keys::traits::Signer;
///
/// let keys: Vec<_> = (1u8..=3)
///     .map(|i| Ed25519Signer::keygen(&mut [i; 32]).public_key())
///     .collect();
/// let two_of_three = Builder::new()
///     .add_keys(keys.iter().cloned())
///     .build_with_threshold(2)
///     .unwrap();
///
/// assert!(two_of_three.is_fulfilled_by(&keys[1..]));
/// assert!(!two_of_three.is_fulfilled_by(&keys[..1]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    children: Vec<(Key, u32)>,
    limits: Limits,
}

impl Builder {
    /// Empty builder using the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty builder checking against `limits`.
    pub fn with_limits(limits: Limits) -> Self {
        Builder {
            children: Vec::new(),
            limits,
        }
    }

    /// Add `key` with `weight`.
    pub fn add_key(mut self, key: impl Into<Key>, weight: u32) -> Self {
        self.children.push((key.into(), weight));
        self
    }

    /// Add every key in `keys` with weight 1.
    pub fn add_keys<K, I>(mut self, keys: I) -> Self
    where
        K: Into<Key>,
        I: IntoIterator<Item = K>,
    {
        self.children
            .extend(keys.into_iter().map(|k| (k.into(), 1)));
        self
    }

    /// Add an already weighted child.
    pub fn add_weighted(mut self, child: WeightedChild) -> Self {
        self.children.push((child.node, child.weight));
        self
    }

    /// Build requiring every child.
    pub fn build(self) -> Result<CompositeKey, Error> {
        CompositeKey::create_with(self.children, None, &self.limits)
    }

    /// Build with an explicit threshold.
    pub fn build_with_threshold(self, threshold: u32) -> Result<CompositeKey, Error> {
        CompositeKey::create_with(self.children, Some(threshold), &self.limits)
    }
}
