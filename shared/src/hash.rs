use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::cmp::Ordering;
use std::fmt;

/// 256-bit opaque identifier used throughout the entry graph: entry IDs,
/// asset IDs, block IDs. Ordered lexicographically by its raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The distinguished zero value (genesis previous-block-id, unset ext-hash, ...).
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Computes the SHA3-256 digest of `data`.
    #[must_use]
    pub fn sha3_256(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = crate::BlockchainError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != 32 {
            return Err(crate::BlockchainError::InvalidKeySize {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_all_zero_bytes() {
        assert_eq!(Hash::zero().as_bytes(), &[0u8; 32]);
        assert!(Hash::zero().is_zero());
    }

    #[test]
    fn sha3_256_is_deterministic_and_nonzero() {
        let a = Hash::sha3_256(b"entry body bytes");
        let b = Hash::sha3_256(b"entry body bytes");
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn ordering_is_lexicographic_on_bytes() {
        let low = Hash::from_bytes([0u8; 32]);
        let mut high_bytes = [0u8; 32];
        high_bytes[31] = 1;
        let high = Hash::from_bytes(high_bytes);
        assert!(low < high);
    }

    #[test]
    fn distinct_inputs_yield_distinct_hashes() {
        assert_ne!(Hash::sha3_256(b"a"), Hash::sha3_256(b"b"));
    }
}
