//! Ed25519 signing primitives backing the verification VM's `CHECKSIG` and
//! `CHECKMULTISIG` opcodes: 32-byte public keys, 64-byte signatures.

use crate::{BlockchainError, Hash, Result};
use ed25519_dalek::{Keypair as DalekKeypair, PublicKey as DalekPublicKey, Signature as DalekSignature, Signer, Verifier};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Ed25519,
}

/// A 32-byte Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: [u8; PUBLIC_KEY_LEN],
}

/// A 32-byte Ed25519 secret key, zeroized on drop.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key_data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// A 64-byte Ed25519 signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    data: [u8; SIGNATURE_LEN],
}

impl PublicKey {
    /// # Errors
    /// Returns an error if `bytes` is not exactly [`PUBLIC_KEY_LEN`] bytes
    /// or does not decode to a valid Ed25519 point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(BlockchainError::InvalidKeySize {
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        DalekPublicKey::from_bytes(bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let mut key_data = [0u8; PUBLIC_KEY_LEN];
        key_data.copy_from_slice(bytes);
        Ok(Self { key_data })
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn to_dalek(&self) -> std::result::Result<DalekPublicKey, BlockchainError> {
        DalekPublicKey::from_bytes(&self.key_data)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }

    /// Verifies a 64-byte signature over `message`. Returns `Ok(false)`
    /// rather than an error when the signature is well-formed but does
    /// not verify, so callers in the VM can treat a bad signature as a
    /// `false` result instead of aborting script execution.
    ///
    /// # Errors
    /// Returns an error only if the public key or signature bytes are
    /// malformed.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<bool> {
        let dalek_key = self.to_dalek()?;
        let dalek_sig = DalekSignature::from_bytes(&signature.data)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(dalek_key.verify(message, &dalek_sig).is_ok())
    }
}

impl PrivateKey {
    /// # Errors
    /// Returns an error if `bytes` is not exactly 32 bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(BlockchainError::InvalidKeySize {
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self { key_data: bytes })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }
}

impl KeyPair {
    /// Generates a new Ed25519 keypair using the operating system's CSPRNG.
    ///
    /// # Errors
    /// Returns an error if key construction fails.
    pub fn generate() -> Result<Self> {
        let mut csprng = rand::rngs::OsRng;
        let dalek_pair = DalekKeypair::generate(&mut csprng);
        let public_key = PublicKey::from_bytes(dalek_pair.public.as_bytes())?;
        let private_key = PrivateKey::from_bytes(dalek_pair.secret.as_bytes().to_vec())?;
        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// # Errors
    /// Returns an error if the stored key bytes no longer form a valid
    /// Ed25519 keypair.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let secret = ed25519_dalek::SecretKey::from_bytes(&self.private_key.key_data)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let public = DalekPublicKey::from(&secret);
        let dalek_pair = DalekKeypair { secret, public };
        let sig = dalek_pair.sign(message);
        let mut data = [0u8; SIGNATURE_LEN];
        data.copy_from_slice(&sig.to_bytes());
        Ok(Signature { data })
    }
}

impl Signature {
    /// # Errors
    /// Returns an error if `bytes` is not exactly [`SIGNATURE_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(BlockchainError::InvalidKeySize {
                expected: SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }
        let mut data = [0u8; SIGNATURE_LEN];
        data.copy_from_slice(bytes);
        Ok(Self { data })
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.data
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.key_data.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Signs an entry's sighash with the given keypair.
///
/// # Errors
/// Returns an error if signing fails.
pub fn sign_hash(hash: &Hash, keypair: &KeyPair) -> Result<Signature> {
    keypair.sign(hash.as_bytes())
}

/// Verifies a signature against an entry's sighash.
///
/// # Errors
/// Returns an error only if the key or signature bytes are malformed.
pub fn verify_hash_signature(hash: &Hash, public_key: &PublicKey, signature: &Signature) -> Result<bool> {
    public_key.verify(hash.as_bytes(), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = KeyPair::generate().unwrap();
        let hash = Hash::sha3_256(b"sighash payload");
        let sig = sign_hash(&hash, &keypair).unwrap();
        assert!(verify_hash_signature(&hash, &keypair.public_key, &sig).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let keypair = KeyPair::generate().unwrap();
        let sig = sign_hash(&Hash::sha3_256(b"a"), &keypair).unwrap();
        let wrong = Hash::sha3_256(b"b");
        assert!(!verify_hash_signature(&wrong, &keypair.public_key, &sig).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signer = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let hash = Hash::sha3_256(b"payload");
        let sig = sign_hash(&hash, &signer).unwrap();
        assert!(!verify_hash_signature(&hash, &other.public_key, &sig).unwrap());
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        assert!(PublicKey::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn signature_round_trips_through_bytes() {
        let keypair = KeyPair::generate().unwrap();
        let sig = sign_hash(&Hash::sha3_256(b"x"), &keypair).unwrap();
        let rebuilt = Signature::from_bytes(sig.as_bytes()).unwrap();
        assert_eq!(sig.as_bytes(), rebuilt.as_bytes());
    }
}
