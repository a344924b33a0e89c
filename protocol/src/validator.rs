//! Recursive entry-graph validation (§4.3): `check_valid(entry, ctx)`
//! walks an entry and everything it references, threading an immutable
//! [`Ctx`] down to each recursive call rather than mutating shared
//! state. Each call constructs its child `Ctx` fresh; siblings never see
//! each other's context.

use crate::entry::{
    Entry, Issuance, Mux, Nonce, Output, Program, Retirement, Spend, TimeRange, TxEntries,
    TxHeader, ValueDestination, ValueSource,
};
use crate::error::{EntryError, Result, ValidationError, VmError};
use crate::vm::TxVmContext;
use shared::Hash;
use std::collections::HashMap;

/// Conservative per-program budget for the entry validator's own VM
/// runs. Block-level orchestration may thread a consensus-parameterized
/// limit instead; nothing in the graph invariants depends on the exact
/// number.
const DEFAULT_RUN_LIMIT: i64 = 10_000;

/// Functionally-threaded validation context (§4.3). Copy rather than
/// mutated: every recursive call derives a new `Ctx` from its parent.
#[derive(Debug, Clone, Copy)]
pub struct Ctx<'a> {
    pub initial_block_id: Hash,
    pub current_tx: &'a TxEntries,
    pub current_entry_id: Hash,
    pub source_position: Option<u64>,
    pub dest_position: Option<u64>,
}

impl<'a> Ctx<'a> {
    #[must_use]
    pub fn new(current_tx: &'a TxEntries, initial_block_id: Hash) -> Self {
        Self {
            initial_block_id,
            current_tx,
            current_entry_id: current_tx.header_id,
            source_position: None,
            dest_position: None,
        }
    }

    fn for_entry(&self, entry_id: Hash) -> Self {
        Self {
            current_entry_id: entry_id,
            ..*self
        }
    }

    fn with_source_position(&self, pos: u64) -> Self {
        Self {
            source_position: Some(pos),
            ..*self
        }
    }

    fn with_dest_position(&self, pos: u64) -> Self {
        Self {
            dest_position: Some(pos),
            ..*self
        }
    }

    fn resolve(&self, id: Hash) -> Result<&'a Entry> {
        self.current_tx
            .get(&id)
            .ok_or_else(|| ValidationError::from(EntryError::MismatchedReference))
    }
}

/// Validates an entire transaction starting from its header.
///
/// # Errors
/// Propagates whatever the first failing sub-entry returns.
pub fn check_valid_tx(tx: &TxEntries, initial_block_id: Hash) -> Result<()> {
    let ctx = Ctx::new(tx, initial_block_id);
    let header_entry = ctx.resolve(tx.header_id)?;
    check_valid(header_entry, &ctx)
}

/// Validates `entry` against `ctx`, recursing into whatever it
/// references.
///
/// # Errors
/// Returns the first invariant violation encountered anywhere in the
/// reachable subgraph.
pub fn check_valid(entry: &Entry, ctx: &Ctx) -> Result<()> {
    match entry {
        Entry::TxHeader(h) => check_tx_header(h, ctx),
        Entry::Output(o) => check_output(o, ctx),
        Entry::Retirement(r) => check_retirement(r, ctx),
        Entry::Mux(m) => check_mux(entry, m, ctx),
        Entry::Spend(s) => check_spend(entry, s, ctx),
        Entry::Issuance(i) => check_issuance(entry, i, ctx),
        Entry::Nonce(n) => check_nonce(entry, n, ctx),
        Entry::TimeRange(t) => check_time_range(t, ctx),
        // A BlockHeader never appears inside a transaction's own arena;
        // its checks are the block validator's responsibility (§4.5).
        Entry::BlockHeader(_) => Ok(()),
    }
}

fn check_tx_header(h: &TxHeader, ctx: &Ctx) -> Result<()> {
    if h.body.max_time_ms > 0 && h.body.max_time_ms < h.body.min_time_ms {
        return Err(EntryError::BadTimeRange.into());
    }

    for &result_id in &h.body.result_ids {
        let result_entry = ctx.resolve(result_id)?;
        check_valid(result_entry, &ctx.for_entry(result_id))?;
    }

    if h.body.version == 1 {
        if h.body.result_ids.is_empty() {
            return Err(EntryError::EmptyResults.into());
        }
        if !h.body.ext_hash.is_zero() {
            return Err(EntryError::NonemptyExtHash.into());
        }
    }
    Ok(())
}

fn check_output(o: &Output, ctx: &Ctx) -> Result<()> {
    check_value_source(&o.body.source, &ctx.with_source_position(0))?;
    if ctx.current_tx.header().body.version == 1 && !o.body.ext_hash.is_zero() {
        return Err(EntryError::NonemptyExtHash.into());
    }
    Ok(())
}

fn check_retirement(r: &Retirement, ctx: &Ctx) -> Result<()> {
    check_value_source(&r.body.source, &ctx.with_source_position(0))?;
    if ctx.current_tx.header().body.version == 1 && !r.body.ext_hash.is_zero() {
        return Err(EntryError::NonemptyExtHash.into());
    }
    Ok(())
}

fn check_mux(entry: &Entry, m: &Mux, ctx: &Ctx) -> Result<()> {
    run_vm(entry, ctx.current_tx, &m.body.program, &m.witness.arguments)?;

    for (i, src) in m.body.sources.iter().enumerate() {
        check_value_source(src, &ctx.with_source_position(i as u64))?;
    }
    for (i, dest) in m.witness.destinations.iter().enumerate() {
        check_value_destination(dest, &ctx.with_dest_position(i as u64))?;
    }

    let mut parity: HashMap<Hash, i64> = HashMap::new();
    for src in &m.body.sources {
        let amount = i64::try_from(src.value.amount).map_err(|_| EntryError::Overflow)?;
        let balance = parity.entry(src.value.asset_id).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(EntryError::Overflow)?;
    }
    for dest in &m.witness.destinations {
        let amount = i64::try_from(dest.value.amount).map_err(|_| EntryError::Overflow)?;
        let balance = parity.get_mut(&dest.value.asset_id).ok_or(EntryError::NoSource)?;
        *balance = balance.checked_sub(amount).ok_or(EntryError::Overflow)?;
    }
    if parity.values().any(|&v| v != 0) {
        return Err(EntryError::Unbalanced.into());
    }

    if ctx.current_tx.header().body.version == 1 && !m.body.ext_hash.is_zero() {
        return Err(EntryError::NonemptyExtHash.into());
    }
    Ok(())
}

fn check_spend(entry: &Entry, s: &Spend, ctx: &Ctx) -> Result<()> {
    run_vm(
        entry,
        ctx.current_tx,
        &s.spent_output.body.control_program,
        &s.witness.arguments,
    )?;

    if s.spent_output.body.source.value != s.witness.destination.value {
        return Err(EntryError::MismatchedValue.into());
    }

    check_value_destination(&s.witness.destination, &ctx.with_dest_position(0))?;

    if ctx.current_tx.header().body.version == 1 && !s.body.ext_hash.is_zero() {
        return Err(EntryError::NonemptyExtHash.into());
    }
    Ok(())
}

fn check_issuance(entry: &Entry, iss: &Issuance, ctx: &Ctx) -> Result<()> {
    if iss.witness.asset_definition.initial_block_id != ctx.initial_block_id {
        return Err(EntryError::WrongBlockchain.into());
    }

    let computed_asset_id = iss.witness.asset_definition.compute_asset_id();
    if computed_asset_id != iss.body.value.asset_id {
        return Err(EntryError::MismatchedAssetID.into());
    }

    run_vm(
        entry,
        ctx.current_tx,
        &iss.witness.asset_definition.issuance_program,
        &iss.witness.arguments,
    )?;

    let anchor_entry = ctx.resolve(iss.body.anchor_id)?;
    let anchored_id = match anchor_entry {
        Entry::Nonce(n) => n.witness.anchored_id,
        Entry::Spend(sp) => sp.witness.anchored_id,
        Entry::Issuance(i2) => i2.witness.anchored_id,
        _ => {
            return Err(EntryError::EntryType {
                expected: "nonce1, spend1, or issuance1",
                actual: anchor_entry.kind(),
            }
            .into())
        }
    };
    if anchored_id != Some(ctx.current_entry_id) {
        return Err(EntryError::MismatchedReference.into());
    }
    check_valid(anchor_entry, &ctx.for_entry(iss.body.anchor_id))?;

    check_value_destination(&iss.witness.destination, &ctx.with_dest_position(0))?;

    if ctx.current_tx.header().body.version == 1 && !iss.body.ext_hash.is_zero() {
        return Err(EntryError::NonemptyExtHash.into());
    }
    Ok(())
}

fn check_nonce(entry: &Entry, n: &Nonce, ctx: &Ctx) -> Result<()> {
    run_vm(entry, ctx.current_tx, &n.body.program, &n.witness.arguments)?;

    let tr_entry = ctx.resolve(n.body.time_range_id)?;
    let Entry::TimeRange(tr) = tr_entry else {
        return Err(EntryError::EntryType {
            expected: "timerange1",
            actual: tr_entry.kind(),
        }
        .into());
    };
    if tr.body.min_time_ms == 0 || tr.body.max_time_ms == 0 {
        return Err(EntryError::ZeroTime.into());
    }
    check_valid(tr_entry, &ctx.for_entry(n.body.time_range_id))?;

    if ctx.current_tx.header().body.version == 1 && !n.body.ext_hash.is_zero() {
        return Err(EntryError::NonemptyExtHash.into());
    }
    Ok(())
}

fn check_time_range(tr: &TimeRange, ctx: &Ctx) -> Result<()> {
    let header = ctx.current_tx.header();
    if header.body.min_time_ms < tr.body.min_time_ms {
        return Err(EntryError::BadTimeRange.into());
    }
    if tr.body.max_time_ms > 0 && header.body.max_time_ms > tr.body.max_time_ms {
        return Err(EntryError::BadTimeRange.into());
    }
    Ok(())
}

/// Resolves the producer side of a value edge and cross-checks the
/// back-reference it carries. Recursion here runs *upward* toward
/// producers (Issuance/Spend/Mux) and always terminates since that side
/// of the graph is acyclic.
fn check_value_source(vs: &ValueSource, ctx: &Ctx) -> Result<()> {
    let ref_entry = ctx.resolve(vs.reference)?;
    check_valid(ref_entry, &ctx.for_entry(vs.reference))?;

    let dest = match ref_entry {
        Entry::Issuance(iss) => {
            if vs.position != 0 {
                return Err(EntryError::Position {
                    expected: 0,
                    actual: vs.position,
                }
                .into());
            }
            iss.witness.destination
        }
        Entry::Spend(sp) => {
            if vs.position != 0 {
                return Err(EntryError::Position {
                    expected: 0,
                    actual: vs.position,
                }
                .into());
            }
            sp.witness.destination
        }
        Entry::Mux(mux) => *mux
            .witness
            .destinations
            .get(vs.position as usize)
            .ok_or(EntryError::Position {
                expected: mux.witness.destinations.len() as u64,
                actual: vs.position,
            })?,
        _ => {
            return Err(EntryError::EntryType {
                expected: "issuance1, spend1, or mux1",
                actual: ref_entry.kind(),
            }
            .into())
        }
    };

    if dest.reference != ctx.current_entry_id {
        return Err(EntryError::MismatchedReference.into());
    }
    let expected_pos = ctx.source_position.unwrap_or(0);
    if dest.position != expected_pos {
        return Err(EntryError::Position {
            expected: expected_pos,
            actual: dest.position,
        }
        .into());
    }
    if dest.value != vs.value {
        return Err(EntryError::MismatchedValue.into());
    }
    Ok(())
}

/// Resolves the consumer side of a value edge and cross-checks the
/// back-reference it carries. Deliberately does *not* recurse into the
/// consumer's own `check_valid`: a Mux's destination can be an Output
/// whose source points straight back at that same Mux, so recursing
/// here would loop forever. The consumer is validated through its own
/// reachability path instead (a TxHeader result, or another Mux's
/// source).
fn check_value_destination(vd: &ValueDestination, ctx: &Ctx) -> Result<()> {
    let ref_entry = ctx.resolve(vd.reference)?;

    let src = match ref_entry {
        Entry::Output(o) => {
            if vd.position != 0 {
                return Err(EntryError::Position {
                    expected: 0,
                    actual: vd.position,
                }
                .into());
            }
            o.body.source
        }
        Entry::Retirement(r) => {
            if vd.position != 0 {
                return Err(EntryError::Position {
                    expected: 0,
                    actual: vd.position,
                }
                .into());
            }
            r.body.source
        }
        Entry::Mux(mux) => *mux
            .body
            .sources
            .get(vd.position as usize)
            .ok_or(EntryError::Position {
                expected: mux.body.sources.len() as u64,
                actual: vd.position,
            })?,
        _ => {
            return Err(EntryError::EntryType {
                expected: "output1, retirement1, or mux1",
                actual: ref_entry.kind(),
            }
            .into())
        }
    };

    if src.reference != ctx.current_entry_id {
        return Err(EntryError::MismatchedReference.into());
    }
    let expected_pos = ctx.dest_position.unwrap_or(0);
    if src.position != expected_pos {
        return Err(EntryError::Position {
            expected: expected_pos,
            actual: src.position,
        }
        .into());
    }
    if src.value != vd.value {
        return Err(EntryError::MismatchedValue.into());
    }
    Ok(())
}

fn run_vm(entry: &Entry, tx: &TxEntries, program: &Program, args: &[Vec<u8>]) -> Result<()> {
    let vm_ctx = TxVmContext {
        program,
        args,
        tx,
        entry,
    };
    let result = crate::vm::run_program(&program.code, args, DEFAULT_RUN_LIMIT, &vm_ctx)?;
    if !result.success {
        return Err(VmError::FalseResult.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AssetAmount;
    use crate::legacy::{compute_tx_entries, LegacyInput, LegacyIssuanceInput, LegacyOutput, LegacySpendInput, LegacyTx};

    const OP_TRUE: u8 = 0x51;

    fn sample_spend_tx() -> LegacyTx {
        LegacyTx {
            version: 1,
            min_time_ms: 0,
            max_time_ms: 0,
            reference_data: vec![],
            inputs: vec![LegacyInput::Spend(LegacySpendInput {
                source_id: Hash::sha3_256(b"prior-mux"),
                source_position: 0,
                asset_amount: AssetAmount {
                    asset_id: Hash::sha3_256(b"asset-a"),
                    amount: 5,
                },
                vm_version: 1,
                control_program: vec![OP_TRUE],
                source_ref_data_hash: Hash::zero(),
                reference_data: vec![],
                arguments: vec![],
            })],
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
    fn well_formed_spend_and_output_passes() {
        let tx = sample_spend_tx();
        let entries = compute_tx_entries(&tx).unwrap();
        check_valid_tx(&entries, Hash::zero()).unwrap();
    }

    #[test]
    fn tampered_spend_destination_value_is_rejected() {
        let tx = sample_spend_tx();
        let mut entries = compute_tx_entries(&tx).unwrap();
        for entry in entries.entries.values_mut() {
            if let Entry::Spend(sp) = entry {
                sp.witness.destination.value.amount = 999;
            }
        }
        let err = check_valid_tx(&entries, Hash::zero()).unwrap_err();
        assert_eq!(err, ValidationError::Entry(EntryError::MismatchedValue));
    }

    #[test]
    fn issuance_on_wrong_chain_is_rejected() {
        let tx = LegacyTx {
            version: 1,
            min_time_ms: 10,
            max_time_ms: 20,
            reference_data: vec![],
            inputs: vec![LegacyInput::Issuance(LegacyIssuanceInput {
                nonce_bytes: vec![1, 2, 3],
                initial_block: Hash::sha3_256(b"some-other-chain"),
                vm_version: 1,
                issuance_program: vec![OP_TRUE],
                asset_definition_data: vec![],
                amount: 5,
                reference_data: vec![],
                arguments: vec![],
            })],
            outputs: vec![LegacyOutput {
                asset_amount: AssetAmount {
                    asset_id: crate::entry::AssetDefinition {
                        initial_block_id: Hash::sha3_256(b"some-other-chain"),
                        issuance_program: Program {
                            vm_version: 1,
                            code: vec![OP_TRUE],
                        },
                        definition_data_hash: Hash::sha3_256(&[]),
                    }
                    .compute_asset_id(),
                    amount: 5,
                },
                vm_version: 1,
                control_program: vec![OP_TRUE],
                reference_data: vec![],
            }],
        };
        let entries = compute_tx_entries(&tx).unwrap();
        let err = check_valid_tx(&entries, Hash::zero()).unwrap_err();
        assert_eq!(err, ValidationError::Entry(EntryError::WrongBlockchain));
    }
}
