//! A binary patricia trie over 256-bit keys, used by [`crate::snapshot`] to
//! track the live UTXO set and expose a single `assets_root` hash.
//!
//! Unlike [`crate::merkle`]'s fixed-shape tree over an ordered sequence,
//! this tree's shape is determined by the keys themselves: each internal
//! node branches at the first bit position where the keys below it
//! diverge, so two tries built from the same key set always end up with
//! the same shape and the same root hash regardless of insertion order.
//! Nodes are reference-counted so `Clone` is O(1) and structural sharing
//! does all the work a copy-on-write snapshot needs.

use shared::Hash;
use std::sync::Arc;

const LEAF_TAG: u8 = 0x02;
const NODE_TAG: u8 = 0x03;

#[derive(Debug, Clone)]
enum Node {
    Leaf(Hash),
    Branch { bit: u32, left: Arc<Node>, right: Arc<Node> },
}

fn bit_at(key: &Hash, bit: u32) -> bool {
    let byte = key.as_bytes()[(bit / 8) as usize];
    (byte >> (7 - bit % 8)) & 1 == 1
}

/// First bit position (0 = most significant bit of byte 0) at which `a`
/// and `b` differ. Panics if `a == b`; callers never call this on equal
/// keys because every insertion path rules that case out first.
fn first_diff_bit(a: &Hash, b: &Hash) -> u32 {
    for (i, (x, y)) in a.as_bytes().iter().zip(b.as_bytes().iter()).enumerate() {
        if x != y {
            let diff = x ^ y;
            return (i as u32) * 8 + u32::from(diff.leading_zeros());
        }
    }
    unreachable!("first_diff_bit called on equal keys")
}

fn representative_key(node: &Node) -> Hash {
    match node {
        Node::Leaf(k) => *k,
        Node::Branch { left, .. } => representative_key(left),
    }
}

fn leaf_hash(key: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(33);
    buf.push(LEAF_TAG);
    buf.extend_from_slice(key.as_bytes());
    Hash::sha3_256(&buf)
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(65);
    buf.push(NODE_TAG);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    Hash::sha3_256(&buf)
}

fn hash_of(node: &Node) -> Hash {
    match node {
        Node::Leaf(k) => leaf_hash(k),
        Node::Branch { left, right, .. } => node_hash(&hash_of(left), &hash_of(right)),
    }
}

fn insert(node: &Arc<Node>, key: Hash) -> Option<Arc<Node>> {
    match &**node {
        Node::Leaf(k) => {
            if *k == key {
                return None;
            }
            let diff = first_diff_bit(k, &key);
            let existing = node.clone();
            let incoming = Arc::new(Node::Leaf(key));
            Some(if bit_at(&key, diff) {
                Arc::new(Node::Branch { bit: diff, left: existing, right: incoming })
            } else {
                Arc::new(Node::Branch { bit: diff, left: incoming, right: existing })
            })
        }
        Node::Branch { bit, left, right } => {
            let rep = representative_key(node);
            let diff = first_diff_bit(&rep, &key);
            if diff < *bit {
                let existing = node.clone();
                let incoming = Arc::new(Node::Leaf(key));
                Some(if bit_at(&key, diff) {
                    Arc::new(Node::Branch { bit: diff, left: existing, right: incoming })
                } else {
                    Arc::new(Node::Branch { bit: diff, left: incoming, right: existing })
                })
            } else if bit_at(&key, *bit) {
                let new_right = insert(right, key)?;
                Some(Arc::new(Node::Branch { bit: *bit, left: left.clone(), right: new_right }))
            } else {
                let new_left = insert(left, key)?;
                Some(Arc::new(Node::Branch { bit: *bit, left: new_left, right: right.clone() }))
            }
        }
    }
}

fn delete(node: &Arc<Node>, key: &Hash) -> Result<Option<Arc<Node>>, ()> {
    match &**node {
        Node::Leaf(k) => {
            if k == key {
                Ok(None)
            } else {
                Err(())
            }
        }
        Node::Branch { bit, left, right } => {
            if bit_at(key, *bit) {
                match delete(right, key)? {
                    None => Ok(Some(left.clone())),
                    Some(new_right) => Ok(Some(Arc::new(Node::Branch { bit: *bit, left: left.clone(), right: new_right }))),
                }
            } else {
                match delete(left, key)? {
                    None => Ok(Some(right.clone())),
                    Some(new_left) => Ok(Some(Arc::new(Node::Branch { bit: *bit, left: new_left, right: right.clone() }))),
                }
            }
        }
    }
}

fn contains(node: &Node, key: &Hash) -> bool {
    match node {
        Node::Leaf(k) => k == key,
        Node::Branch { bit, left, right } => {
            if bit_at(key, *bit) {
                contains(right, key)
            } else {
                contains(left, key)
            }
        }
    }
}

/// A set of 256-bit keys, shaped as a patricia trie so its root hash is
/// insertion-order independent. `Clone` is O(1): unchanged subtrees are
/// shared via `Arc` between the old and new versions after a mutation.
#[derive(Debug, Clone, Default)]
pub struct PatriciaTrie {
    root: Option<Arc<Node>>,
}

impl PatriciaTrie {
    #[must_use]
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Inserts `key`. Returns `false` if it was already present, in which
    /// case the trie is left unchanged.
    pub fn insert(&mut self, key: Hash) -> bool {
        match &self.root {
            None => {
                self.root = Some(Arc::new(Node::Leaf(key)));
                true
            }
            Some(root) => match insert(root, key) {
                Some(new_root) => {
                    self.root = Some(new_root);
                    true
                }
                None => false,
            },
        }
    }

    /// Removes `key`. Returns `false` if it was not present, in which
    /// case the trie is left unchanged.
    pub fn remove(&mut self, key: &Hash) -> bool {
        let Some(root) = &self.root else {
            return false;
        };
        match delete(root, key) {
            Ok(new_root) => {
                self.root = new_root;
                true
            }
            Err(()) => false,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &Hash) -> bool {
        self.root.as_ref().is_some_and(|r| contains(r, key))
    }

    /// The root hash of this trie's contents: `Hash::zero()` when empty,
    /// otherwise insertion-order independent.
    #[must_use]
    pub fn root_hash(&self) -> Hash {
        self.root.as_ref().map_or(Hash::zero(), |r| hash_of(r))
    }
}
