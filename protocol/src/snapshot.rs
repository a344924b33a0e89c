//! Chain state: the live UTXO set and the set of nonces anchoring
//! nonce-protected issuances, bundled as the `Snapshot` the validator
//! checks transactions against and mutates as it applies them.

use crate::error::TxError;
use crate::trie::PatriciaTrie;
use shared::Hash;
use std::collections::HashMap;

/// Chain state as of some block height: which outputs are unspent, and
/// which nonces are still live. Cheap to `clone()` — the utxo trie shares
/// unchanged subtrees via `Arc`, so only the nonce map costs O(n).
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    utxos: PatriciaTrie,
    nonces: HashMap<Hash, u64>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a nonce as spent, expiring at `expiry_ms`.
    ///
    /// # Errors
    /// Returns [`TxError::DuplicateNonce`] if `id` is already recorded.
    pub fn add_nonce(&mut self, id: Hash, expiry_ms: u64) -> Result<(), TxError> {
        if self.nonces.contains_key(&id) {
            return Err(TxError::DuplicateNonce);
        }
        self.nonces.insert(id, expiry_ms);
        Ok(())
    }

    #[must_use]
    pub fn nonces_contains(&self, id: Hash) -> bool {
        self.nonces.contains_key(&id)
    }

    /// Drops every nonce whose expiry is strictly before `t_ms`.
    pub fn prune_nonces(&mut self, t_ms: u64) {
        self.nonces.retain(|_, &mut expiry| expiry >= t_ms);
    }

    /// Adds a freshly created output to the live set.
    ///
    /// # Errors
    /// Returns [`TxError::DuplicateOutput`] if `id` is already present.
    /// Content-addressed output ids make this only reachable via a
    /// hash collision or a caller bug.
    pub fn add_output(&mut self, id: Hash) -> Result<(), TxError> {
        if self.utxos.insert(id) {
            Ok(())
        } else {
            Err(TxError::DuplicateOutput)
        }
    }

    /// Removes a spent output from the live set.
    ///
    /// # Errors
    /// Returns [`TxError::InvalidOutput`] if `id` is not present.
    pub fn delete_spent_output(&mut self, id: Hash) -> Result<(), TxError> {
        if self.utxos.remove(&id) {
            Ok(())
        } else {
            Err(TxError::InvalidOutput)
        }
    }

    #[must_use]
    pub fn contains_output(&self, id: Hash) -> bool {
        self.utxos.contains(&id)
    }

    /// Root hash of the live UTXO set, as committed in a block header.
    #[must_use]
    pub fn assets_root(&self) -> Hash {
        self.utxos.root_hash()
    }

    /// A value copy of this snapshot, safe to mutate speculatively and
    /// discard without disturbing the original.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(b: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[31] = b;
        Hash::from_bytes(bytes)
    }

    #[test]
    fn add_then_contains_output() {
        let mut snap = Snapshot::new();
        snap.add_output(hash(1)).unwrap();
        assert!(snap.contains_output(hash(1)));
        assert!(!snap.contains_output(hash(2)));
    }

    #[test]
    fn duplicate_output_is_rejected() {
        let mut snap = Snapshot::new();
        snap.add_output(hash(1)).unwrap();
        assert_eq!(snap.add_output(hash(1)), Err(TxError::DuplicateOutput));
    }

    #[test]
    fn deleting_missing_output_is_rejected() {
        let mut snap = Snapshot::new();
        assert_eq!(snap.delete_spent_output(hash(1)), Err(TxError::InvalidOutput));
    }

    #[test]
    fn spend_removes_output_and_changes_assets_root() {
        let mut snap = Snapshot::new();
        snap.add_output(hash(1)).unwrap();
        let root_with = snap.assets_root();
        snap.delete_spent_output(hash(1)).unwrap();
        assert!(!snap.contains_output(hash(1)));
        assert_ne!(snap.assets_root(), root_with);
        assert_eq!(snap.assets_root(), Hash::zero());
    }

    #[test]
    fn duplicate_nonce_is_rejected() {
        let mut snap = Snapshot::new();
        snap.add_nonce(hash(1), 1_000).unwrap();
        assert_eq!(snap.add_nonce(hash(1), 2_000), Err(TxError::DuplicateNonce));
    }

    #[test]
    fn prune_nonces_drops_expired_but_keeps_live() {
        let mut snap = Snapshot::new();
        snap.add_nonce(hash(1), 1_000).unwrap();
        snap.add_nonce(hash(2), 5_000).unwrap();
        snap.prune_nonces(2_000);
        assert!(!snap.nonces_contains(hash(1)));
        assert!(snap.nonces_contains(hash(2)));
    }

    #[test]
    fn prune_nonces_keeps_a_nonce_expiring_exactly_at_t() {
        let mut snap = Snapshot::new();
        snap.add_nonce(hash(1), 2_000).unwrap();
        snap.prune_nonces(2_000);
        assert!(snap.nonces_contains(hash(1)));
    }

    #[test]
    fn copy_is_independent_of_the_original() {
        let mut snap = Snapshot::new();
        snap.add_output(hash(1)).unwrap();
        let mut copied = snap.copy();
        copied.add_output(hash(2)).unwrap();
        assert!(!snap.contains_output(hash(2)));
        assert!(copied.contains_output(hash(2)));
    }
}
