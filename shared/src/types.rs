//! Primitive type aliases shared across the entry graph, VM, and validator.

/// Every entry in the graph (transaction components and block headers
/// alike) is identified by the same 256-bit hash space.
pub type EntryId = crate::Hash;

/// Asset IDs live in the same hash space as entry IDs (an asset ID is
/// computed from an issuance program and the chain's initial block ID).
pub type AssetId = crate::Hash;

/// A value amount attached to a source or destination. Always
/// non-negative on the wire; signed accumulation happens internally
/// when checking per-asset conservation.
pub type Amount = u64;

/// Unix time in milliseconds, matching the entry graph's `TimeRange` and
/// block header timestamp fields.
pub type TimestampMs = u64;

/// Block height, starting at 1 for the block following genesis.
pub type BlockHeight = u64;

/// A raw, unparsed VM program: a `CHECKSIG`-style control program, an
/// issuance program, or a block's consensus program.
pub type Program = Vec<u8>;
