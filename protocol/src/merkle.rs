//! Binary merkle root over an ordered sequence of transaction ids, and a
//! reusable pool of SHA3-256 hasher state for the entry encoder.
//!
//! Leaves are tagged `0x00` and internal nodes `0x01` before hashing, so a
//! leaf hash can never be replayed as an internal node's hash (the classic
//! second-preimage attack on untagged Merkle trees).

use crossbeam::queue::ArrayQueue;
use sha3::{Digest, Sha3_256};
use shared::Hash;

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

/// Computes the merkle root over `tx_ids` in the order given. An empty
/// slice roots to the zero hash; odd levels duplicate the last node.
#[must_use]
pub fn merkle_root(tx_ids: &[Hash]) -> Hash {
    if tx_ids.is_empty() {
        return Hash::zero();
    }
    if tx_ids.len() == 1 {
        return leaf_hash(&tx_ids[0]);
    }

    let mut level: Vec<Hash> = tx_ids.iter().map(leaf_hash).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            next.push(node_hash(&left, &right));
        }
        level = next;
    }
    level[0]
}

fn leaf_hash(id: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(33);
    buf.push(LEAF_TAG);
    buf.extend_from_slice(id.as_bytes());
    Hash::sha3_256(&buf)
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(65);
    buf.push(NODE_TAG);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    Hash::sha3_256(&buf)
}

/// A lock-free pool of reusable SHA3-256 hasher state, so the entry
/// encoder does not allocate a fresh hasher for every `EntryID`
/// computation under the per-tx parallel well-formedness pass.
pub struct HasherPool {
    idle: ArrayQueue<Sha3_256>,
}

impl HasherPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let idle = ArrayQueue::new(capacity.max(1));
        for _ in 0..capacity {
            let _ = idle.push(Sha3_256::new());
        }
        Self { idle }
    }

    /// Hashes `data`, borrowing a hasher from the pool when one is idle
    /// and falling back to a fresh one under contention.
    pub fn hash(&self, data: &[u8]) -> Hash {
        let mut hasher = self.idle.pop().unwrap_or_default();
        hasher.update(data);
        let digest = hasher.finalize_reset();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        let _ = self.idle.push(hasher);
        Hash::from_bytes(out)
    }
}

impl Default for HasherPool {
    fn default() -> Self {
        Self::new(num_cpus())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
