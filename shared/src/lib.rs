pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{
    sign_hash, verify_hash_signature, KeyPair, PrivateKey, PublicKey, Signature,
    SignatureAlgorithm, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};
pub use error::BlockchainError;
pub use hash::Hash;
pub use types::{AssetId, Amount, BlockHeight, EntryId, Program, TimestampMs};

pub type Result<T> = std::result::Result<T, BlockchainError>;
