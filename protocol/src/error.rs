//! Error taxonomy for the entry graph, the verification VM, and the
//! block/tx validator, grouped by layer as in the design notes.

use thiserror::Error;

/// Errors raised while walking the entry graph itself: malformed bodies,
/// broken back-references, unbalanced value flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("tx header time range is backwards")]
    BadTimeRange,
    #[error("tx header has no results")]
    EmptyResults,
    #[error("ext-hash must be zero at schema version 1")]
    NonemptyExtHash,
    #[error("entry resolved to the wrong kind: expected {expected}, got {actual}")]
    EntryType { expected: &'static str, actual: &'static str },
    #[error("cross-edge position mismatch: expected {expected}, got {actual}")]
    Position { expected: u64, actual: u64 },
    #[error("cross-edge reference mismatch")]
    MismatchedReference,
    #[error("cross-edge value mismatch")]
    MismatchedValue,
    #[error("mux has a destination asset with no matching source")]
    NoSource,
    #[error("mux sources and destinations do not balance")]
    Unbalanced,
    #[error("value arithmetic overflowed")]
    Overflow,
    #[error("nonce's time range has a zero bound")]
    ZeroTime,
    #[error("recomputed asset id does not match the issuance body")]
    MismatchedAssetID,
    #[error("asset definition names a different chain")]
    WrongBlockchain,
    #[error("nonce-less issuance in a transaction with no spends")]
    NoAnchorForNoncelessIssuance,
}

/// Errors raised by the stack-based verification VM.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("data stack underflow")]
    DataStackUnderflow,
    #[error("bad value on the stack")]
    BadValue,
    #[error("run limit exceeded")]
    RunLimitExceeded,
    #[error("query unavailable in this vm context")]
    WrongContext,
    #[error("program did not halt with a single truthy value")]
    FalseResult,
}

/// Errors raised while confirming a single transaction against a block
/// and a snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error("tx version {version} outside block's allowed range (1..={max})")]
    TxVersion { version: u64, max: u64 },
    #[error("block timestamp is before the tx's minimum time")]
    NotYet,
    #[error("block timestamp is after the tx's maximum time")]
    TooLate,
    #[error("transaction is not timely for this block")]
    UntimelyTransaction,
    #[error("issuance's time window falls outside the block timestamp")]
    IssuanceTime,
    #[error("nonce id already present in the snapshot")]
    DuplicateNonce,
    #[error("spent output id is not present in the utxo set")]
    InvalidOutput,
    #[error("output id already present in the utxo set")]
    DuplicateOutput,
}

/// Errors raised while validating a block header or orchestrating its
/// transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error("block height is out of sequence")]
    MisorderedBlockHeight,
    #[error("block timestamp does not strictly increase")]
    MisorderedBlockTime,
    #[error("no previous block supplied for a non-genesis height")]
    NoPrevBlock,
    #[error("block version regressed relative to the previous block")]
    VersionRegression,
    #[error("block id does not match the previous block's hash")]
    MismatchedBlock,
    #[error("transaction merkle root does not match the block header")]
    BadTxRoot,
    #[error("asset (utxo) merkle root does not match the block header")]
    BadStateRoot,
    #[error("block merkle root mismatch")]
    MismatchedMerkleRoot,
    #[error("next consensus program is unspendable")]
    BadScript,
    #[error("block validation was cancelled")]
    Cancelled,
}

/// The top-level error returned by this crate's public entry points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Block(#[from] BlockError),
    /// Free-text diagnostic context, attached by an inner caller: which
    /// entry, which input, which transaction failed. Never matched on
    /// for control flow.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Extension trait mirroring `anyhow`-style `.context()` without pulling
/// in another error crate, since the error type here is already closed
/// and typed.
pub trait ResultExt<T> {
    fn ctx(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ValidationError>,
{
    fn ctx(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}
