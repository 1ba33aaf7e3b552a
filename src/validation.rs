//! Structural validation of composite keys.
//!
//! The walk is iterative and keeps the chain of ancestors of the node being visited, not a
//! global visited set: identical sub-trees in different branches are legitimate, a node
//! met again on its own ancestor chain is not.
use crate::common::PublicKey;
use crate::composite::{CompositeKey, Key, WeightedChild};
use crate::config::Limits;
use crate::errors::Error;
use std::collections::BTreeSet;

pub(crate) const CHILDREN_BOUND: &str = "children per composite key level";
pub(crate) const DEPTH_BOUND: &str = "composite key depth";
pub(crate) const NODES_BOUND: &str = "composite key node count";

/// Sum the weights of one level, rejecting zero weights and sums beyond `u32::MAX`.
pub(crate) fn total_weight(children: &[WeightedChild]) -> Result<u64, Error> {
    if children.is_empty() {
        return Err(Error::NoChildren);
    }
    let mut total = 0u64;
    for child in children {
        if child.weight == 0 {
            return Err(Error::InvalidWeight(child.weight));
        }
        total = total
            .checked_add(u64::from(child.weight))
            .filter(|sum| *sum <= u64::from(u32::MAX))
            .ok_or(Error::WeightOverflow)?;
    }
    Ok(total)
}

fn check_level(key: &CompositeKey, limits: &Limits) -> Result<(), Error> {
    if key.children.len() > limits.max_children {
        return Err(Error::StructureTooLarge {
            what: CHILDREN_BOUND,
            limit: limits.max_children,
        });
    }
    let total = total_weight(&key.children)?;
    if key.threshold == 0 || u64::from(key.threshold) > total {
        return Err(Error::InvalidThreshold {
            threshold: key.threshold,
            total,
        });
    }
    let mut seen: BTreeSet<&PublicKey> = BTreeSet::new();
    for child in &key.children {
        if let Key::Leaf(leaf) = &child.node {
            if !seen.insert(leaf) {
                return Err(Error::DuplicateKey(leaf.clone()));
            }
        }
    }
    Ok(())
}

enum Visit<'a> {
    Enter(&'a CompositeKey, usize),
    Exit,
}

impl CompositeKey {
    /// Re-check every structural invariant under the default [`Limits`].
    ///
    /// Must be called on any key obtained without going through [`CompositeKey::create`],
    /// such as one produced by serde. Keys returned by the constructor or the decoders of
    /// this crate are already valid.
    pub fn check_validity(&self) -> Result<(), Error> {
        self.check_validity_with(&Limits::default())
    }

    /// Same as [`CompositeKey::check_validity`] under explicit `limits`.
    ///
    /// The ancestor check compares nodes by address. An owned `CompositeKey` cannot
    /// contain itself, so it only guards hand-assembled values; cycles in received bytes
    /// are rejected while decoding by [`CompositeKey::from_node_table`].
    pub fn check_validity_with(&self, limits: &Limits) -> Result<(), Error> {
        let max_depth = limits.effective_max_depth();
        let mut ancestors: Vec<&CompositeKey> = Vec::new();
        let mut stack = vec![Visit::Enter(self, 1)];
        let mut nodes = 0usize;

        while let Some(visit) = stack.pop() {
            let (node, depth) = match visit {
                Visit::Exit => {
                    ancestors.pop();
                    continue;
                }
                Visit::Enter(node, depth) => (node, depth),
            };
            if ancestors.iter().any(|a| std::ptr::eq(*a, node)) {
                tracing::warn!(depth, "composite key refers to one of its ancestors");
                return Err(Error::CycleDetected);
            }
            if depth > max_depth {
                return Err(Error::StructureTooLarge {
                    what: DEPTH_BOUND,
                    limit: max_depth,
                });
            }
            nodes += 1;
            if nodes > limits.max_nodes {
                return Err(Error::StructureTooLarge {
                    what: NODES_BOUND,
                    limit: limits.max_nodes,
                });
            }
            check_level(node, limits)?;

            ancestors.push(node);
            stack.push(Visit::Exit);
            for child in node.children.iter().rev() {
                if let Key::Composite(sub) = &child.node {
                    stack.push(Visit::Enter(sub, depth + 1));
                }
            }
        }
        Ok(())
    }
}
