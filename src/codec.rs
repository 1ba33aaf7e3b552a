//! Compact node-table encoding of composite keys.
//!
//! Identical sub-trees are written once and referenced by index, so the table of a tree
//! with repeated branches is a DAG. The decoder therefore has to treat references as
//! untrusted: a reference back to a node on the current path is a cycle, and repeated
//! references are expanded under a node budget.
//!
//! # Format
//! All integers are big endian.
//!
//! ```text
//! table  := "CKT1" count:u32 node{count}         node 0 is the root
//! node   := threshold:u32 children:u8 child{children}
//! child  := weight:u32 (0x00 leaf | 0x01 index:u32)
//! leaf   := scheme:u8 length:u16 bytes{length}    scheme 0x00 is Ed25519
//! ```
use crate::common::{KeyScheme, PublicKey};
use crate::composite::{CompositeKey, Key};
use crate::config::{Limits, MAX_NESTING_DEPTH};
use crate::errors::Error;
use crate::validation::{CHILDREN_BOUND, DEPTH_BOUND, NODES_BOUND};
use std::collections::{BTreeMap, VecDeque};

const MAGIC: &[u8; 4] = b"CKT1";
const TAG_LEAF: u8 = 0;
const TAG_REF: u8 = 1;
const SCHEME_ED25519: u8 = 0;

impl CompositeKey {
    /// Encode as a node table, sharing identical sub-trees.
    ///
    /// # Errors
    /// The tree is re-validated first: a tree with a level wider than 255 children, nested
    /// deeper than [`MAX_NESTING_DEPTH`] or otherwise invalid cannot be encoded.
    ///
    /// # Example
    /// ```
    /// use composite_keys::composite::CompositeKey;
    /// use composite_keys::ed25519::Ed25519Signer;
    /// use composite_keys::traits::Signer;
    ///
    /// let a = Ed25519Signer::keygen(&mut [1u8; 32]).public_key();
    /// let b = Ed25519Signer::keygen(&mut [2u8; 32]).public_key();
    /// let either = CompositeKey::create(vec![(a.into(), 1), (b.into(), 1)], Some(1)).unwrap();
    /// let twice = CompositeKey::create(
    ///     vec![(either.clone().into(), 1), (either.into(), 1)],
    ///     None,
    /// )
    /// .unwrap();
    ///
    /// let table = twice.to_node_table().unwrap();
    /// assert_eq!(CompositeKey::from_node_table(&table).unwrap(), twice);
    /// ```
    pub fn to_node_table(&self) -> Result<Vec<u8>, Error> {
        let encodable = Limits::default()
            .with_max_children(usize::from(u8::MAX))
            .with_max_depth(MAX_NESTING_DEPTH)
            .with_max_nodes(usize::MAX);
        self.check_validity_with(&encodable)?;

        // Breadth-first numbering, the root gets 0.
        let mut index: BTreeMap<&CompositeKey, u32> = BTreeMap::new();
        let mut order: Vec<&CompositeKey> = vec![self];
        let mut queue: VecDeque<&CompositeKey> = VecDeque::from(vec![self]);
        index.insert(self, 0);
        while let Some(node) = queue.pop_front() {
            for child in node.children() {
                if let Key::Composite(sub) = child.node() {
                    if !index.contains_key(sub) {
                        let next = u32::try_from(order.len())
                            .map_err(|_| Error::InvalidEncoding("too many nodes".to_string()))?;
                        index.insert(sub, next);
                        order.push(sub);
                        queue.push_back(sub);
                    }
                }
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        put_u32(&mut out, order.len() as u32);
        for node in order {
            put_u32(&mut out, node.threshold());
            out.push(node.children().len() as u8);
            for child in node.children() {
                put_u32(&mut out, child.weight());
                match child.node() {
                    Key::Leaf(leaf) => {
                        out.push(TAG_LEAF);
                        out.push(match leaf.scheme() {
                            KeyScheme::Ed25519 => SCHEME_ED25519,
                        });
                        let bytes = leaf.as_bytes();
                        let len = u16::try_from(bytes.len())
                            .map_err(|_| Error::InvalidPublicKeySize(bytes.len()))?;
                        out.extend_from_slice(&len.to_be_bytes());
                        out.extend_from_slice(bytes);
                    }
                    Key::Composite(sub) => {
                        out.push(TAG_REF);
                        // Every composite child was numbered above.
                        put_u32(&mut out, index.get(sub).copied().unwrap_or_default());
                    }
                }
            }
        }
        Ok(out)
    }

    /// Decode a node table under the default [`Limits`].
    pub fn from_node_table(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_node_table_with(bytes, &Limits::default())
    }

    /// Decode a node table under `limits`.
    ///
    /// # Errors
    /// * `InvalidEncoding` for truncated input, trailing bytes, dangling or unused nodes
    /// * `CycleDetected` when a node refers to one of its ancestors
    /// * `StructureTooLarge` when the table or its expansion exceeds `limits`
    /// * any construction error of [`CompositeKey::create`] for an invalid level
    pub fn from_node_table_with(bytes: &[u8], limits: &Limits) -> Result<Self, Error> {
        decode(bytes, limits).map_err(|e| {
            tracing::debug!(error = %e, len = bytes.len(), "node table rejected");
            e
        })
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::InvalidEncoding("truncated node table".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_be_bytes(buf))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }
}

enum Entry {
    Leaf(PublicKey),
    Ref(usize),
}

struct RawNode {
    threshold: u32,
    children: Vec<(Entry, u32)>,
}

fn decode(bytes: &[u8], limits: &Limits) -> Result<CompositeKey, Error> {
    let mut reader = Reader { bytes, pos: 0 };
    if reader.take(MAGIC.len())? != MAGIC {
        return Err(Error::InvalidEncoding("not a node table".to_string()));
    }
    let count = reader.u32()? as usize;
    if count == 0 {
        return Err(Error::InvalidEncoding("empty node table".to_string()));
    }
    if count > limits.max_nodes {
        return Err(Error::StructureTooLarge {
            what: NODES_BOUND,
            limit: limits.max_nodes,
        });
    }

    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let threshold = reader.u32()?;
        let width = usize::from(reader.u8()?);
        if width > limits.max_children {
            return Err(Error::StructureTooLarge {
                what: CHILDREN_BOUND,
                limit: limits.max_children,
            });
        }
        let mut children = Vec::with_capacity(width);
        for _ in 0..width {
            let weight = reader.u32()?;
            let entry = match reader.u8()? {
                TAG_LEAF => {
                    let scheme = match reader.u8()? {
                        SCHEME_ED25519 => KeyScheme::Ed25519,
                        _ => return Err(Error::UnsupportedScheme),
                    };
                    let len = usize::from(reader.u16()?);
                    Entry::Leaf(PublicKey::from_bytes(scheme, reader.take(len)?)?)
                }
                TAG_REF => {
                    let target = reader.u32()? as usize;
                    if target >= count {
                        return Err(Error::InvalidEncoding(format!(
                            "reference to missing node {}",
                            target
                        )));
                    }
                    Entry::Ref(target)
                }
                tag => {
                    return Err(Error::InvalidEncoding(format!("unknown child tag {}", tag)))
                }
            };
            children.push((entry, weight));
        }
        nodes.push(RawNode {
            threshold,
            children,
        });
    }
    if reader.pos != bytes.len() {
        return Err(Error::InvalidEncoding("trailing bytes after node table".to_string()));
    }

    let mut builder = Materializer {
        nodes: &nodes,
        limits,
        on_path: vec![false; count],
        reached: vec![false; count],
        expanded: 0,
    };
    let root = builder.node(0, 1)?;
    if builder.reached.iter().any(|r| !r) {
        return Err(Error::InvalidEncoding("unreferenced node in table".to_string()));
    }
    Ok(root)
}

struct Materializer<'a> {
    nodes: &'a [RawNode],
    limits: &'a Limits,
    on_path: Vec<bool>,
    reached: Vec<bool>,
    expanded: usize,
}

impl Materializer<'_> {
    fn node(&mut self, index: usize, depth: usize) -> Result<CompositeKey, Error> {
        if self.on_path[index] {
            tracing::warn!(index, depth, "node table refers back to an ancestor");
            return Err(Error::CycleDetected);
        }
        let max_depth = self.limits.effective_max_depth();
        if depth > max_depth {
            return Err(Error::StructureTooLarge {
                what: DEPTH_BOUND,
                limit: max_depth,
            });
        }
        self.expanded += 1;
        if self.expanded > self.limits.max_nodes {
            tracing::warn!(limit = self.limits.max_nodes, "node table expands too far");
            return Err(Error::StructureTooLarge {
                what: NODES_BOUND,
                limit: self.limits.max_nodes,
            });
        }

        self.on_path[index] = true;
        self.reached[index] = true;
        let raw = &self.nodes[index];
        let mut children = Vec::with_capacity(raw.children.len());
        for (entry, weight) in &raw.children {
            let key = match entry {
                Entry::Leaf(leaf) => Key::Leaf(leaf.clone()),
                Entry::Ref(target) => Key::Composite(self.node(*target, depth + 1)?),
            };
            children.push((key, *weight));
        }
        self.on_path[index] = false;

        CompositeKey::create_with(children, Some(raw.threshold), self.limits)
    }
}
