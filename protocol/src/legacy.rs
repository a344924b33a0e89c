//! Deterministic lift of a legacy flat transaction into the entry graph
//! (`compute_tx_entries`, §4.2 of the design). Two passes over the
//! inputs: spends first (so the first spend is available as an anchor
//! for nonce-less issuances), then issuances.

use crate::entry::{
    AssetAmount, AssetDefinition, Entry, Issuance, IssuanceBody, IssuanceWitness, Mux, MuxBody,
    MuxWitness, Nonce, NonceBody, NonceWitness, Output, OutputBody, Program, Retirement,
    RetirementBody, Spend, SpendBody, SpendWitness, TimeRange, TimeRangeBody, TxEntries, TxHeader,
    TxHeaderBody, ValueDestination, ValueSource,
};
use crate::error::{EntryError, ResultExt, ValidationError};
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Hash};

/// `OP_FAIL`: a control program starting with this byte is unspendable;
/// its value can only flow to a `Retirement`.
const OP_FAIL: u8 = 0x6a;
const OP_TRUE: u8 = 0x51;
const OP_DROP: u8 = 0x75;
const OP_ASSET: u8 = 0xc2;
const OP_EQUAL: u8 = 0x87;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacySpendInput {
    /// The id of whatever originally produced the output being spent
    /// (its source's own source, i.e. the producer one edge further
    /// back in the graph).
    pub source_id: Hash,
    pub source_position: u64,
    pub asset_amount: AssetAmount,
    pub vm_version: u64,
    pub control_program: Vec<u8>,
    /// Already-hashed reference data for the *historical* output being
    /// reconstructed, not this input's own annotation.
    pub source_ref_data_hash: Hash,
    pub reference_data: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyIssuanceInput {
    pub nonce_bytes: Vec<u8>,
    pub initial_block: Hash,
    pub vm_version: u64,
    pub issuance_program: Vec<u8>,
    pub asset_definition_data: Vec<u8>,
    pub amount: u64,
    pub reference_data: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LegacyInput {
    Spend(LegacySpendInput),
    Issuance(LegacyIssuanceInput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyOutput {
    pub asset_amount: AssetAmount,
    pub vm_version: u64,
    pub control_program: Vec<u8>,
    pub reference_data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyTx {
    pub version: u64,
    pub min_time_ms: u64,
    pub max_time_ms: u64,
    pub reference_data: Vec<u8>,
    pub inputs: Vec<LegacyInput>,
    pub outputs: Vec<LegacyOutput>,
}

impl LegacyTx {
    /// Serializes this transaction for the wire. Never used for the
    /// entry graph's canonical hashing, which goes through
    /// [`crate::encode`] instead.
    ///
    /// # Errors
    /// Returns [`BlockchainError::SerializationError`] if serialization
    /// fails.
    pub fn to_json(&self) -> Result<String, BlockchainError> {
        serde_json::to_string(self).map_err(|e| BlockchainError::SerializationError(e.to_string()))
    }

    /// Parses a transaction previously produced by [`Self::to_json`].
    ///
    /// # Errors
    /// Returns [`BlockchainError::SerializationError`] if parsing fails.
    pub fn from_json(s: &str) -> Result<Self, BlockchainError> {
        serde_json::from_str(s).map_err(|e| BlockchainError::SerializationError(e.to_string()))
    }
}

fn hash_data(data: &[u8]) -> Hash {
    Hash::sha3_256(data)
}

fn is_unspendable(control_program: &[u8]) -> bool {
    control_program.first() == Some(&OP_FAIL)
}

/// Encodes `n` with the PUSHDATA size rules: `n==0` pushes nothing via a
/// single `0x00`, `n<=75` is a literal one-byte length opcode, and
/// larger sizes use the `PUSHDATA1`/`PUSHDATA2`/`PUSHDATA4` prefixes.
fn pushdata_prefix(n: usize) -> Vec<u8> {
    match n {
        0 => vec![0x00],
        1..=75 => vec![n as u8],
        76..=255 => vec![0x4c, n as u8],
        256..=65535 => {
            let mut v = vec![0x4d];
            v.extend_from_slice(&(n as u16).to_le_bytes());
            v
        }
        _ => {
            let mut v = vec![0x4e];
            v.extend_from_slice(&(n as u32).to_le_bytes());
            v
        }
    }
}

fn synthesize_nonce_program(nonce_bytes: &[u8], asset_id: &Hash) -> Vec<u8> {
    let mut code = pushdata_prefix(nonce_bytes.len());
    code.extend_from_slice(nonce_bytes);
    code.push(OP_DROP);
    code.push(OP_ASSET);
    code.extend_from_slice(&pushdata_prefix(32));
    code.extend_from_slice(asset_id.as_bytes());
    code.push(OP_EQUAL);
    code
}

/// Lifts a legacy flat transaction into its entry graph. Deterministic:
/// equal input produces a byte-identical header id and entry map.
///
/// # Errors
/// Returns [`EntryError::NoAnchorForNoncelessIssuance`] if a nonce-less
/// issuance appears in a transaction with no spends.
pub fn compute_tx_entries(tx: &LegacyTx) -> Result<TxEntries, ValidationError> {
    let mut entries = TxEntries::default();
    let mut mux_sources: Vec<Option<ValueSource>> = vec![None; tx.inputs.len()];
    let mut first_spend_id: Option<Hash> = None;
    let mut spend_ids: Vec<Hash> = Vec::new();
    let mut issuance_ids: Vec<Hash> = Vec::new();

    // Pass 1: spends.
    for (i, input) in tx.inputs.iter().enumerate() {
        let LegacyInput::Spend(sp_in) = input else {
            continue;
        };
        let prog = Program {
            vm_version: sp_in.vm_version,
            code: sp_in.control_program.clone(),
        };
        let src = ValueSource {
            reference: sp_in.source_id,
            value: sp_in.asset_amount,
            position: sp_in.source_position,
        };
        let synthesized_output = Output::new(
            OutputBody {
                source: src,
                control_program: prog,
                data_hash: sp_in.source_ref_data_hash,
                ext_hash: Hash::zero(),
            },
            0,
        );

        let spend = Spend::new(
            SpendBody {
                spent_output_id: synthesized_output.id,
                data_hash: hash_data(&sp_in.reference_data),
                ext_hash: Hash::zero(),
            },
            SpendWitness {
                destination: ValueDestination {
                    reference: Hash::zero(),
                    value: sp_in.asset_amount,
                    position: 0,
                },
                arguments: sp_in.arguments.clone(),
                anchored_id: None,
            },
            i as u64,
            synthesized_output,
        );
        let spend_id = spend.id;
        first_spend_id.get_or_insert(spend_id);
        spend_ids.push(spend_id);
        mux_sources[i] = Some(ValueSource {
            reference: spend_id,
            value: sp_in.asset_amount,
            position: 0,
        });
        entries.entries.insert(spend_id, Entry::Spend(spend));
    }

    // Pass 2: issuances.
    for (i, input) in tx.inputs.iter().enumerate() {
        let LegacyInput::Issuance(iss_in) = input else {
            continue;
        };
        let asset_definition = AssetDefinition {
            initial_block_id: iss_in.initial_block,
            issuance_program: Program {
                vm_version: iss_in.vm_version,
                code: iss_in.issuance_program.clone(),
            },
            definition_data_hash: hash_data(&iss_in.asset_definition_data),
        };
        let asset_id = asset_definition.compute_asset_id();
        let value = AssetAmount {
            asset_id,
            amount: iss_in.amount,
        };

        let anchor_id = if iss_in.nonce_bytes.is_empty() {
            first_spend_id
                .ok_or(EntryError::NoAnchorForNoncelessIssuance)
                .ctx(format!("issuance input {i}"))?
        } else {
            let time_range = TimeRange::new(TimeRangeBody {
                min_time_ms: tx.min_time_ms,
                max_time_ms: tx.max_time_ms,
                ext_hash: Hash::zero(),
            });
            let time_range_id = time_range.id;
            entries
                .entries
                .insert(time_range_id, Entry::TimeRange(time_range));

            let code = synthesize_nonce_program(&iss_in.nonce_bytes, &asset_id);
            let nonce = Nonce::new(
                NonceBody {
                    program: Program {
                        vm_version: 1,
                        code,
                    },
                    time_range_id,
                    ext_hash: Hash::zero(),
                },
                NonceWitness::default(),
            );
            let nonce_id = nonce.id;
            entries.entries.insert(nonce_id, Entry::Nonce(nonce));
            nonce_id
        };

        let issuance = Issuance::new(
            IssuanceBody {
                anchor_id,
                value,
                data_hash: hash_data(&iss_in.reference_data),
                ext_hash: Hash::zero(),
            },
            IssuanceWitness {
                destination: ValueDestination {
                    reference: Hash::zero(),
                    value,
                    position: 0,
                },
                asset_definition,
                arguments: iss_in.arguments.clone(),
                anchored_id: None,
            },
            i as u64,
        );
        let issuance_id = issuance.id;

        set_anchored(&mut entries, &anchor_id, issuance_id);

        issuance_ids.push(issuance_id);
        mux_sources[i] = Some(ValueSource {
            reference: issuance_id,
            value,
            position: 0,
        });
        entries
            .entries
            .insert(issuance_id, Entry::Issuance(issuance));
    }

    let sources: Vec<ValueSource> = mux_sources
        .into_iter()
        .map(|s| s.expect("every legacy input is either a spend or an issuance"))
        .collect();

    let mux = Mux::new(
        MuxBody {
            sources,
            program: Program {
                vm_version: 1,
                code: vec![OP_TRUE],
            },
            ext_hash: Hash::zero(),
        },
        MuxWitness::default(),
    );
    let mux_id = mux.id;
    entries.entries.insert(mux_id, Entry::Mux(mux));

    for spend_id in &spend_ids {
        if let Some(Entry::Spend(sp)) = entries.entries.get_mut(spend_id) {
            sp.witness.destination = ValueDestination {
                reference: mux_id,
                value: sp.witness.destination.value,
                position: sp.ordinal,
            };
        }
    }
    for issuance_id in &issuance_ids {
        if let Some(Entry::Issuance(iss)) = entries.entries.get_mut(issuance_id) {
            iss.witness.destination = ValueDestination {
                reference: mux_id,
                value: iss.witness.destination.value,
                position: iss.ordinal,
            };
        }
    }

    let mut result_ids = Vec::with_capacity(tx.outputs.len());
    let mut mux_destinations = Vec::with_capacity(tx.outputs.len());
    for (i, out) in tx.outputs.iter().enumerate() {
        let src = ValueSource {
            reference: mux_id,
            value: out.asset_amount,
            position: i as u64,
        };
        let (result_id, dest) = if is_unspendable(&out.control_program) {
            let retirement = Retirement::new(
                RetirementBody {
                    source: src,
                    data_hash: hash_data(&out.reference_data),
                    ext_hash: Hash::zero(),
                },
                i as u64,
            );
            let id = retirement.id;
            entries.entries.insert(id, Entry::Retirement(retirement));
            (
                id,
                ValueDestination {
                    reference: id,
                    value: out.asset_amount,
                    position: 0,
                },
            )
        } else {
            let output = Output::new(
                OutputBody {
                    source: src,
                    control_program: Program {
                        vm_version: out.vm_version,
                        code: out.control_program.clone(),
                    },
                    data_hash: hash_data(&out.reference_data),
                    ext_hash: Hash::zero(),
                },
                i as u64,
            );
            let id = output.id;
            entries.entries.insert(id, Entry::Output(output));
            (
                id,
                ValueDestination {
                    reference: id,
                    value: out.asset_amount,
                    position: 0,
                },
            )
        };
        result_ids.push(result_id);
        mux_destinations.push(dest);
    }

    if let Some(Entry::Mux(mux)) = entries.entries.get_mut(&mux_id) {
        mux.witness.destinations = mux_destinations;
    }

    let header = TxHeader::new(TxHeaderBody {
        version: tx.version,
        result_ids,
        data_hash: hash_data(&tx.reference_data),
        min_time_ms: tx.min_time_ms,
        max_time_ms: tx.max_time_ms,
        ext_hash: Hash::zero(),
    });
    entries.header_id = header.id;
    entries.entries.insert(header.id, Entry::TxHeader(header));

    Ok(entries)
}

fn set_anchored(entries: &mut TxEntries, anchor_id: &Hash, issuance_id: Hash) {
    match entries.entries.get_mut(anchor_id) {
        Some(Entry::Spend(sp)) => sp.witness.anchored_id = Some(issuance_id),
        Some(Entry::Nonce(n)) => n.witness.anchored_id = Some(issuance_id),
        Some(Entry::Issuance(i)) => i.witness.anchored_id = Some(issuance_id),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spend_input(source_id: Hash, amount: u64) -> LegacySpendInput {
        LegacySpendInput {
            source_id,
            source_position: 0,
            asset_amount: AssetAmount {
                asset_id: Hash::sha3_256(b"asset-a"),
                amount,
            },
            vm_version: 1,
            control_program: vec![OP_TRUE],
            source_ref_data_hash: Hash::zero(),
            reference_data: vec![],
            arguments: vec![],
        }
    }

    fn sample_tx() -> LegacyTx {
        LegacyTx {
            version: 1,
            min_time_ms: 0,
            max_time_ms: 0,
            reference_data: vec![],
            inputs: vec![LegacyInput::Spend(sample_spend_input(
                Hash::sha3_256(b"prior-mux"),
                5,
            ))],
            outputs: vec![LegacyOutput {
                asset_amount: AssetAmount {
                    asset_id: Hash::sha3_256(b"asset-a"),
                    amount: 5,
                },
                vm_version: 1,
                control_program: vec![OP_TRUE],
                reference_data: vec![],
            }],
        }
    }

    #[test]
    fn legacy_tx_json_round_trips_and_still_lifts() {
        let tx = sample_tx();
        let json = tx.to_json().unwrap();
        let parsed = LegacyTx::from_json(&json).unwrap();
        assert_eq!(
            compute_tx_entries(&tx).unwrap().header_id,
            compute_tx_entries(&parsed).unwrap().header_id
        );
    }

    #[test]
    fn lift_is_deterministic() {
        let tx = sample_tx();
        let a = compute_tx_entries(&tx).unwrap();
        let b = compute_tx_entries(&tx).unwrap();
        assert_eq!(a.header_id, b.header_id);
        assert_eq!(a.entries.len(), b.entries.len());
    }

    #[test]
    fn spend_only_single_output_produces_nine_fewer_entries_than_inputs_plus_outputs() {
        // header, spend, synthesized-output-is-not-stored-in-arena, mux, output
        let tx = sample_tx();
        let result = compute_tx_entries(&tx).unwrap();
        // header + spend + mux + output == 4
        assert_eq!(result.entries.len(), 4);
    }

    #[test]
    fn unspendable_output_becomes_a_retirement() {
        let mut tx = sample_tx();
        tx.outputs[0].control_program = vec![OP_FAIL];
        let result = compute_tx_entries(&tx).unwrap();
        let header = result.header();
        let result_id = header.body.result_ids[0];
        assert!(matches!(result.get(&result_id), Some(Entry::Retirement(_))));
    }

    #[test]
    fn nonceless_issuance_without_a_spend_is_rejected() {
        let tx = LegacyTx {
            version: 1,
            min_time_ms: 0,
            max_time_ms: 0,
            reference_data: vec![],
            inputs: vec![LegacyInput::Issuance(LegacyIssuanceInput {
                nonce_bytes: vec![],
                initial_block: Hash::zero(),
                vm_version: 1,
                issuance_program: vec![OP_TRUE],
                asset_definition_data: vec![],
                amount: 5,
                reference_data: vec![],
                arguments: vec![],
            })],
            outputs: vec![],
        };
        let err = compute_tx_entries(&tx).unwrap_err();
        let ValidationError::WithContext { context, source } = err else {
            panic!("expected a context-wrapped error, got a bare one");
        };
        assert_eq!(context, "issuance input 0");
        assert_eq!(*source, ValidationError::Entry(EntryError::NoAnchorForNoncelessIssuance));
    }

    #[test]
    fn nonced_issuance_anchors_to_a_synthesized_nonce() {
        let tx = LegacyTx {
            version: 1,
            min_time_ms: 10,
            max_time_ms: 20,
            reference_data: vec![],
            inputs: vec![LegacyInput::Issuance(LegacyIssuanceInput {
                nonce_bytes: vec![1, 2, 3],
                initial_block: Hash::zero(),
                vm_version: 1,
                issuance_program: vec![OP_TRUE],
                asset_definition_data: vec![],
                amount: 5,
                reference_data: vec![],
                arguments: vec![],
            })],
            outputs: vec![LegacyOutput {
                asset_amount: AssetAmount {
                    asset_id: AssetDefinition {
                        initial_block_id: Hash::zero(),
                        issuance_program: Program {
                            vm_version: 1,
                            code: vec![OP_TRUE],
                        },
                        definition_data_hash: hash_data(&[]),
                    }
                    .compute_asset_id(),
                    amount: 5,
                },
                vm_version: 1,
                control_program: vec![OP_TRUE],
                reference_data: vec![],
            }],
        };
        let result = compute_tx_entries(&tx).unwrap();
        let nonce_count = result
            .entries
            .values()
            .filter(|e| matches!(e, Entry::Nonce(_)))
            .count();
        assert_eq!(nonce_count, 1);
    }
}
