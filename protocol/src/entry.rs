//! The transaction entry graph: typed, content-addressed nodes whose
//! identity is a hash of their `Body` only. `Witness` fields (signatures,
//! resolved back-references) can be filled in or mutated after an entry
//! is built without changing its `EntryID`.

use crate::encode::{entry_id, Encoder};
use serde::{Deserialize, Serialize};
use shared::{AssetId, Hash};
use std::collections::HashMap;

/// `(AssetID, amount)`, attached to every value source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub asset_id: AssetId,
    pub amount: u64,
}

impl AssetAmount {
    fn encode(&self, enc: &mut Encoder) {
        enc.push_hash(&self.asset_id);
        enc.push_u64(self.amount);
    }
}

/// A VM program: a version tag plus the bytecode itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub vm_version: u64,
    pub code: Vec<u8>,
}

impl Program {
    fn encode(&self, enc: &mut Encoder) {
        enc.push_u64(self.vm_version);
        enc.push_bytes(&self.code);
    }
}

/// The producer side of a value edge: an Issuance, Spend, or Mux
/// describing where a unit of value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSource {
    pub reference: Hash,
    pub value: AssetAmount,
    pub position: u64,
}

impl ValueSource {
    fn encode(&self, enc: &mut Encoder) {
        enc.push_hash(&self.reference);
        self.value.encode(enc);
        enc.push_u64(self.position);
    }
}

/// The consumer side of a value edge: an Output, Retirement, or Mux
/// describing where a unit of value is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueDestination {
    pub reference: Hash,
    pub value: AssetAmount,
    pub position: u64,
}

impl ValueDestination {
    fn encode(&self, enc: &mut Encoder) {
        enc.push_hash(&self.reference);
        self.value.encode(enc);
        enc.push_u64(self.position);
    }
}

/// Identifies the issuance program + chain an asset was defined under.
/// `compute_asset_id` recomputes the asset id the same way entry bodies
/// are hashed, so an Issuance's claimed asset id can be checked for
/// equality against it (§4.3 `MismatchedAssetID`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDefinition {
    pub initial_block_id: Hash,
    pub issuance_program: Program,
    pub definition_data_hash: Hash,
}

impl AssetDefinition {
    #[must_use]
    pub fn compute_asset_id(&self) -> AssetId {
        let mut enc = Encoder::new();
        enc.push_hash(&self.initial_block_id);
        self.issuance_program.encode(&mut enc);
        enc.push_hash(&self.definition_data_hash);
        entry_id("assetdefinition1", &enc.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHeaderBody {
    pub version: u64,
    pub result_ids: Vec<Hash>,
    pub data_hash: Hash,
    pub min_time_ms: u64,
    pub max_time_ms: u64,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHeader {
    pub id: Hash,
    pub body: TxHeaderBody,
}

impl TxHeader {
    #[must_use]
    pub fn new(body: TxHeaderBody) -> Self {
        let mut enc = Encoder::new();
        enc.push_u64(body.version);
        enc.push_collection(&body.result_ids, |e, id| {
            e.push_hash(id);
        });
        enc.push_hash(&body.data_hash);
        enc.push_u64(body.min_time_ms);
        enc.push_u64(body.max_time_ms);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("txheader", &enc.finish());
        Self { id, body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceBody {
    pub anchor_id: Hash,
    pub value: AssetAmount,
    pub data_hash: Hash,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceWitness {
    pub destination: ValueDestination,
    pub asset_definition: AssetDefinition,
    pub arguments: Vec<Vec<u8>>,
    /// Set only if another entry anchors itself to this issuance.
    pub anchored_id: Option<Hash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    pub id: Hash,
    pub body: IssuanceBody,
    pub witness: IssuanceWitness,
    /// Input position; drives this issuance's destination position in
    /// the mux. Not part of identity.
    pub ordinal: u64,
}

impl Issuance {
    #[must_use]
    pub fn new(body: IssuanceBody, witness: IssuanceWitness, ordinal: u64) -> Self {
        let mut enc = Encoder::new();
        enc.push_hash(&body.anchor_id);
        body.value.encode(&mut enc);
        enc.push_hash(&body.data_hash);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("issuance1", &enc.finish());
        Self { id, body, witness, ordinal }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendBody {
    pub spent_output_id: Hash,
    pub data_hash: Hash,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendWitness {
    pub destination: ValueDestination,
    pub arguments: Vec<Vec<u8>>,
    pub anchored_id: Option<Hash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spend {
    pub id: Hash,
    pub body: SpendBody,
    pub witness: SpendWitness,
    /// Input position; drives this spend's destination position in the
    /// mux. Not part of identity.
    pub ordinal: u64,
    /// The synthesized Output this spend consumes. Resolved at lift
    /// time and kept alongside the spend since the legacy builder never
    /// inserts synthesized prevouts into the transaction arena.
    pub spent_output: Box<Output>,
}

impl Spend {
    #[must_use]
    pub fn new(body: SpendBody, witness: SpendWitness, ordinal: u64, spent_output: Output) -> Self {
        let mut enc = Encoder::new();
        enc.push_hash(&body.spent_output_id);
        enc.push_hash(&body.data_hash);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("spend1", &enc.finish());
        Self {
            id,
            body,
            witness,
            ordinal,
            spent_output: Box::new(spent_output),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBody {
    pub source: ValueSource,
    pub control_program: Program,
    pub data_hash: Hash,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub id: Hash,
    pub body: OutputBody,
    /// Input-position bookkeeping; not part of identity.
    pub ordinal: u64,
}

impl Output {
    #[must_use]
    pub fn new(body: OutputBody, ordinal: u64) -> Self {
        let mut enc = Encoder::new();
        body.source.encode(&mut enc);
        body.control_program.encode(&mut enc);
        enc.push_hash(&body.data_hash);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("output1", &enc.finish());
        Self { id, body, ordinal }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetirementBody {
    pub source: ValueSource,
    pub data_hash: Hash,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retirement {
    pub id: Hash,
    pub body: RetirementBody,
    pub ordinal: u64,
}

impl Retirement {
    #[must_use]
    pub fn new(body: RetirementBody, ordinal: u64) -> Self {
        let mut enc = Encoder::new();
        body.source.encode(&mut enc);
        enc.push_hash(&body.data_hash);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("retirement1", &enc.finish());
        Self { id, body, ordinal }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxBody {
    pub sources: Vec<ValueSource>,
    pub program: Program,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MuxWitness {
    pub destinations: Vec<ValueDestination>,
    pub arguments: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mux {
    pub id: Hash,
    pub body: MuxBody,
    pub witness: MuxWitness,
}

impl Mux {
    #[must_use]
    pub fn new(body: MuxBody, witness: MuxWitness) -> Self {
        let mut enc = Encoder::new();
        enc.push_collection(&body.sources, |e, s| s.encode(e));
        body.program.encode(&mut enc);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("mux1", &enc.finish());
        Self { id, body, witness }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceBody {
    pub program: Program,
    pub time_range_id: Hash,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NonceWitness {
    pub arguments: Vec<Vec<u8>>,
    pub anchored_id: Option<Hash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    pub id: Hash,
    pub body: NonceBody,
    pub witness: NonceWitness,
}

impl Nonce {
    #[must_use]
    pub fn new(body: NonceBody, witness: NonceWitness) -> Self {
        let mut enc = Encoder::new();
        body.program.encode(&mut enc);
        enc.push_hash(&body.time_range_id);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("nonce1", &enc.finish());
        Self { id, body, witness }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRangeBody {
    pub min_time_ms: u64,
    pub max_time_ms: u64,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub id: Hash,
    pub body: TimeRangeBody,
}

impl TimeRange {
    #[must_use]
    pub fn new(body: TimeRangeBody) -> Self {
        let mut enc = Encoder::new();
        enc.push_u64(body.min_time_ms);
        enc.push_u64(body.max_time_ms);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("timerange1", &enc.finish());
        Self { id, body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderBody {
    pub version: u64,
    pub height: u64,
    pub previous_block_id: Hash,
    pub timestamp_ms: u64,
    pub transactions_root: Hash,
    pub assets_root: Hash,
    pub next_consensus_program: Program,
    pub ext_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockHeaderWitness {
    pub arguments: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: Hash,
    pub body: BlockHeaderBody,
    pub witness: BlockHeaderWitness,
}

impl BlockHeader {
    #[must_use]
    pub fn new(body: BlockHeaderBody, witness: BlockHeaderWitness) -> Self {
        let mut enc = Encoder::new();
        enc.push_u64(body.version);
        enc.push_u64(body.height);
        enc.push_hash(&body.previous_block_id);
        enc.push_u64(body.timestamp_ms);
        enc.push_hash(&body.transactions_root);
        enc.push_hash(&body.assets_root);
        body.next_consensus_program.encode(&mut enc);
        enc.push_hash(&body.ext_hash);
        let id = entry_id("blockheader", &enc.finish());
        Self { id, body, witness }
    }

    /// Serializes this header for the wire. Convenience only: the
    /// header's identity (`id`) is always the canonical encoding above,
    /// never this JSON form.
    ///
    /// # Errors
    /// Returns [`shared::BlockchainError::SerializationError`] if
    /// serialization fails.
    pub fn to_json(&self) -> Result<String, shared::BlockchainError> {
        serde_json::to_string(self).map_err(|e| shared::BlockchainError::SerializationError(e.to_string()))
    }

    /// Parses a header previously produced by [`Self::to_json`].
    ///
    /// # Errors
    /// Returns [`shared::BlockchainError::SerializationError`] if
    /// parsing fails.
    pub fn from_json(s: &str) -> Result<Self, shared::BlockchainError> {
        serde_json::from_str(s).map_err(|e| shared::BlockchainError::SerializationError(e.to_string()))
    }
}

/// The closed set of node kinds in the entry graph. Modeled as an
/// exhaustively-matched sum type rather than dynamic dispatch, since the
/// set of kinds is small and fixed (design note: dynamic dispatch across
/// entry kinds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    TxHeader(TxHeader),
    Issuance(Issuance),
    Spend(Spend),
    Output(Output),
    Retirement(Retirement),
    Mux(Mux),
    Nonce(Nonce),
    TimeRange(TimeRange),
    BlockHeader(BlockHeader),
}

impl Entry {
    #[must_use]
    pub const fn id(&self) -> Hash {
        match self {
            Self::TxHeader(e) => e.id,
            Self::Issuance(e) => e.id,
            Self::Spend(e) => e.id,
            Self::Output(e) => e.id,
            Self::Retirement(e) => e.id,
            Self::Mux(e) => e.id,
            Self::Nonce(e) => e.id,
            Self::TimeRange(e) => e.id,
            Self::BlockHeader(e) => e.id,
        }
    }

    /// The input/output position for entries that carry one (Spend,
    /// Issuance, Output, Retirement). Used to compute `TxSigHash` and
    /// `DestPos`; `None` for entries with no notion of ordinal.
    #[must_use]
    pub const fn ordinal(&self) -> Option<u64> {
        match self {
            Self::Spend(e) => Some(e.ordinal),
            Self::Issuance(e) => Some(e.ordinal),
            Self::Output(e) => Some(e.ordinal),
            Self::Retirement(e) => Some(e.ordinal),
            _ => None,
        }
    }

    /// The entry's own `data_hash` Body field, for entries that carry
    /// one (Issuance, Spend, Output, Retirement).
    #[must_use]
    pub fn data_hash(&self) -> Option<Hash> {
        match self {
            Self::Issuance(e) => Some(e.body.data_hash),
            Self::Spend(e) => Some(e.body.data_hash),
            Self::Output(e) => Some(e.body.data_hash),
            Self::Retirement(e) => Some(e.body.data_hash),
            _ => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TxHeader(_) => "txheader",
            Self::Issuance(_) => "issuance1",
            Self::Spend(_) => "spend1",
            Self::Output(_) => "output1",
            Self::Retirement(_) => "retirement1",
            Self::Mux(_) => "mux1",
            Self::Nonce(_) => "nonce1",
            Self::TimeRange(_) => "timerange1",
            Self::BlockHeader(_) => "blockheader",
        }
    }
}

/// The per-transaction arena: every entry reachable from the header,
/// keyed by `EntryID`. This is how the graph resolves `Hash`
/// back-references without literal pointer cycles (design note: arena
/// and index).
#[derive(Debug, Clone, Default)]
pub struct TxEntries {
    pub header_id: Hash,
    pub entries: HashMap<Hash, Entry>,
}

impl TxEntries {
    #[must_use]
    pub fn header(&self) -> &TxHeader {
        match self.entries.get(&self.header_id) {
            Some(Entry::TxHeader(h)) => h,
            _ => panic!("TxEntries invariant violated: header_id does not resolve to a TxHeader"),
        }
    }

    #[must_use]
    pub fn get(&self, id: &Hash) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, entry: Entry) -> Hash {
        let id = entry.id();
        self.entries.insert(id, entry);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_amount() -> AssetAmount {
        AssetAmount {
            asset_id: Hash::zero(),
            amount: 0,
        }
    }

    #[test]
    fn entry_id_ignores_witness_fields() {
        let body = SpendBody {
            spent_output_id: Hash::sha3_256(b"out"),
            data_hash: Hash::zero(),
            ext_hash: Hash::zero(),
        };
        let w1 = SpendWitness {
            destination: ValueDestination {
                reference: Hash::zero(),
                value: zero_amount(),
                position: 0,
            },
            arguments: vec![vec![1]],
            anchored_id: None,
        };
        let w2 = SpendWitness {
            destination: ValueDestination {
                reference: Hash::sha3_256(b"different"),
                value: zero_amount(),
                position: 7,
            },
            arguments: vec![],
            anchored_id: Some(Hash::sha3_256(b"anchored")),
        };
        let prevout = Output::new(
            OutputBody {
                source: ValueSource {
                    reference: Hash::zero(),
                    value: zero_amount(),
                    position: 0,
                },
                control_program: Program { vm_version: 1, code: vec![] },
                data_hash: Hash::zero(),
                ext_hash: Hash::zero(),
            },
            0,
        );
        let s1 = Spend::new(body.clone(), w1, 0, prevout.clone());
        let s2 = Spend::new(body, w2, 0, prevout);
        assert_eq!(s1.id, s2.id);
    }

    #[test]
    fn entry_id_changes_with_body() {
        let body1 = TimeRangeBody {
            min_time_ms: 1,
            max_time_ms: 2,
            ext_hash: Hash::zero(),
        };
        let body2 = TimeRangeBody {
            min_time_ms: 1,
            max_time_ms: 3,
            ext_hash: Hash::zero(),
        };
        assert_ne!(TimeRange::new(body1).id, TimeRange::new(body2).id);
    }

    #[test]
    fn asset_definition_id_is_deterministic() {
        let def = AssetDefinition {
            initial_block_id: Hash::zero(),
            issuance_program: Program {
                vm_version: 1,
                code: vec![0x51],
            },
            definition_data_hash: Hash::zero(),
        };
        assert_eq!(def.compute_asset_id(), def.compute_asset_id());
    }

    #[test]
    fn different_entry_kinds_with_same_field_bytes_diverge() {
        let zero = Hash::zero();
        let nonce = Nonce::new(
            NonceBody {
                program: Program { vm_version: 1, code: vec![] },
                time_range_id: zero,
                ext_hash: zero,
            },
            NonceWitness::default(),
        );
        let tx_header = TxHeader::new(TxHeaderBody {
            version: 1,
            result_ids: vec![],
            data_hash: zero,
            min_time_ms: 0,
            max_time_ms: 0,
            ext_hash: zero,
        });
        assert_ne!(nonce.id, tx_header.id);
    }

    #[test]
    fn block_header_json_round_trips() {
        let header = BlockHeader::new(
            BlockHeaderBody {
                version: 1,
                height: 1,
                previous_block_id: Hash::zero(),
                timestamp_ms: 1_000,
                transactions_root: Hash::zero(),
                assets_root: Hash::zero(),
                next_consensus_program: Program { vm_version: 1, code: vec![0x51] },
                ext_hash: Hash::zero(),
            },
            BlockHeaderWitness::default(),
        );
        let json = header.to_json().unwrap();
        let parsed = BlockHeader::from_json(&json).unwrap();
        assert_eq!(header, parsed);
    }
}
