//! Resource bounds applied to composite keys, ownership lookups and Merkle trees that may
//! come from an untrusted peer.
#[cfg(feature = "serde_enabled")]
use serde::{Deserialize, Serialize};

/// Nesting depth that no configuration can exceed. Recursive evaluation relies on it to
/// keep stack usage bounded.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Bounds checked before trusting a structure.
///
/// # Example
/// ```
/// use composite_keys::config::Limits;
///
/// let limits = Limits::default().with_max_children(32);
/// assert_eq!(limits.max_children, 32);
/// assert_eq!(limits.max_ownership_keys, 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde_enabled", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde_enabled", serde(default))]
pub struct Limits {
    /// Children allowed at a single composite key level.
    pub max_children: usize,
    /// Composite levels allowed from the root to the deepest leaf.
    pub max_depth: usize,
    /// Composite nodes allowed in one tree, counting repeated sub-trees once per occurrence.
    pub max_nodes: usize,
    /// Leaf keys inspected in one ownership lookup.
    pub max_ownership_keys: usize,
    /// Leaves allowed in one Merkle tree.
    pub max_merkle_leaves: usize,
}

impl Limits {
    /// Default children per level.
    pub const DEFAULT_MAX_CHILDREN: usize = 10;
    /// Default nesting depth.
    pub const DEFAULT_MAX_DEPTH: usize = 16;
    /// Default composite node count.
    pub const DEFAULT_MAX_NODES: usize = 256;
    /// Default ownership lookup size.
    pub const DEFAULT_MAX_OWNERSHIP_KEYS: usize = 20;
    /// Default Merkle leaf count.
    pub const DEFAULT_MAX_MERKLE_LEAVES: usize = 1 << 20;

    /// Replace the fan-out bound.
    pub fn with_max_children(mut self, max_children: usize) -> Self {
        self.max_children = max_children;
        self
    }

    /// Replace the depth bound. Values above [`MAX_NESTING_DEPTH`] are clamped.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Replace the node count bound.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Replace the ownership lookup bound.
    pub fn with_max_ownership_keys(mut self, max_ownership_keys: usize) -> Self {
        self.max_ownership_keys = max_ownership_keys;
        self
    }

    /// Replace the Merkle leaf bound.
    pub fn with_max_merkle_leaves(mut self, max_merkle_leaves: usize) -> Self {
        self.max_merkle_leaves = max_merkle_leaves;
        self
    }

    /// Depth bound actually enforced.
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.min(MAX_NESTING_DEPTH)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_children: Self::DEFAULT_MAX_CHILDREN,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            max_nodes: Self::DEFAULT_MAX_NODES,
            max_ownership_keys: Self::DEFAULT_MAX_OWNERSHIP_KEYS,
            max_merkle_leaves: Self::DEFAULT_MAX_MERKLE_LEAVES,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn depth_is_clamped() {
        let limits = Limits::default().with_max_depth(1_000);
        assert_eq!(limits.effective_max_depth(), MAX_NESTING_DEPTH);
        assert_eq!(Limits::default().effective_max_depth(), 16);
    }

    #[cfg(feature = "serde_enabled")]
    #[test]
    fn partial_config_uses_defaults() {
        let limits: Limits = serde_json::from_str(r#"{"max_children": 4}"#).unwrap();
        assert_eq!(limits, Limits::default().with_max_children(4));
    }
}
