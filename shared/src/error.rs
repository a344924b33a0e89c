use thiserror::Error;

/// Errors surfaced by the shared primitives: hashing, signatures, raw-byte
/// parsing. Higher layers (`protocol`) define their own per-layer error
/// enums and wrap these with `#[from]` where a primitive operation fails.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("invalid hash")]
    InvalidHash,

    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}
