//! Confirmation, application, and block-level orchestration (§4.5):
//! ties header checks, per-tx well-formedness, per-tx confirmation
//! against a snapshot, and the merkle-root comparisons together into
//! `validate_block`.

use crate::entry::{BlockHeader, Entry, TxEntries};
use crate::error::{BlockError, EntryError, Result, ResultExt, TxError, ValidationError, VmError};
use crate::merkle::merkle_root;
use crate::snapshot::Snapshot;
use crate::validator::check_valid_tx;
use crate::vm::BlockVmContext;
use rayon::prelude::*;
use shared::Hash;
use tracing::{instrument, warn};

const CONSENSUS_PROGRAM_RUN_LIMIT: i64 = 10_000;
const OP_FAIL: u8 = 0x6a;

/// A candidate block: header plus its transactions, each already lifted
/// to its entry graph.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<TxEntries>,
}

/// Stateless checks on a single transaction: entry-graph well-formedness
/// (§4.3, recursive) plus the version and timeliness bounds a block
/// imposes. Reads no snapshot, so callers fan this out across a worker
/// pool (§4.5 step 3 / §5).
///
/// # Errors
/// The first structural or timeliness violation found.
#[instrument(skip_all, fields(tx = %tx.header_id))]
pub fn validate_tx(tx: &TxEntries, block_version: u64, initial_block_id: Hash, block_timestamp_ms: u64) -> Result<()> {
    check_valid_tx(tx, initial_block_id).ctx(format!("tx {} well-formedness", tx.header_id))?;

    let header = &tx.header().body;
    if header.version < 1 || header.version > block_version {
        return Err(TxError::TxVersion { version: header.version, max: block_version }.into());
    }
    if block_timestamp_ms < header.min_time_ms {
        return Err(TxError::NotYet.into());
    }
    if header.max_time_ms > 0 && block_timestamp_ms > header.max_time_ms {
        return Err(TxError::TooLate.into());
    }
    Ok(())
}

/// Checks `tx` against `snapshot` without mutating it: every spend's
/// output must be live, every issuance's nonce must be unused.
///
/// # Errors
/// `InvalidOutput`, `DuplicateNonce`, `WrongBlockchain`, or
/// `IssuanceTime` on the first input that fails.
#[instrument(skip_all, fields(tx = %tx.header_id))]
pub fn confirm_tx(snapshot: &Snapshot, initial_block_id: Hash, block_ts_ms: u64, tx: &TxEntries) -> Result<()> {
    let header = &tx.header().body;
    for entry in tx.entries.values() {
        match entry {
            Entry::Issuance(iss) => {
                if iss.witness.asset_definition.initial_block_id != initial_block_id {
                    return Err(EntryError::WrongBlockchain.into());
                }
                let in_window = block_ts_ms >= header.min_time_ms
                    && (header.max_time_ms == 0 || block_ts_ms <= header.max_time_ms);
                if !in_window {
                    return Err(TxError::IssuanceTime.into());
                }
                if snapshot.nonces_contains(iss.id) {
                    return Err(TxError::DuplicateNonce.into());
                }
            }
            Entry::Spend(s) => {
                if !snapshot.contains_output(s.body.spent_output_id) {
                    return Err(TxError::InvalidOutput.into());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Applies an already-confirmed `tx` to `snapshot`: deletes spent
/// outputs, inserts new outputs (not retirements), records issuance
/// nonces with an expiry of the transaction's max time.
///
/// # Errors
/// Propagates a snapshot mutation failure (only reachable if `tx` was
/// not actually confirmed against this snapshot first).
pub fn apply_tx(snapshot: &mut Snapshot, tx: &TxEntries) -> Result<()> {
    let max_time_ms = tx.header().body.max_time_ms;
    for entry in tx.entries.values() {
        match entry {
            Entry::Issuance(iss) => {
                snapshot.add_nonce(iss.id, max_time_ms)?;
            }
            Entry::Spend(s) => {
                snapshot.delete_spent_output(s.body.spent_output_id)?;
            }
            Entry::Output(o) => {
                snapshot.add_output(o.id)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_header_against_prev(prev: Option<&BlockHeader>, block: &BlockHeader) -> Result<()> {
    let Some(prev) = prev else {
        if block.body.height != 1 {
            return Err(BlockError::NoPrevBlock.into());
        }
        return Ok(());
    };

    if block.body.version < prev.body.version {
        return Err(BlockError::VersionRegression.into());
    }
    if block.body.height != prev.body.height + 1 {
        return Err(BlockError::MisorderedBlockHeight.into());
    }
    if block.body.previous_block_id != prev.id {
        return Err(BlockError::MismatchedBlock.into());
    }
    if block.body.timestamp_ms <= prev.body.timestamp_ms {
        return Err(BlockError::MisorderedBlockTime.into());
    }

    let vm_ctx = BlockVmContext {
        program: &prev.body.next_consensus_program,
        args: &block.witness.arguments,
        block_id: block.id,
        block_time_ms: block.body.timestamp_ms,
        next_consensus_program: &block.body.next_consensus_program.code,
    };
    let result = crate::vm::run_program(
        &prev.body.next_consensus_program.code,
        &block.witness.arguments,
        CONSENSUS_PROGRAM_RUN_LIMIT,
        &vm_ctx,
    )?;
    if !result.success {
        return Err(VmError::FalseResult.into());
    }
    Ok(())
}

/// Validates `block` against `prev` and `snapshot_in`, returning the
/// next committed snapshot on success (§4.5). Leaves `snapshot_in`
/// untouched on any failure.
///
/// # Errors
/// The first header, well-formedness, confirmation, merkle-root, or
/// script-sanity violation encountered.
#[instrument(skip_all, fields(height = block.header.body.height))]
pub fn validate_block(
    snapshot_in: &Snapshot,
    initial_block_id: Hash,
    prev: Option<&BlockHeader>,
    block: &Block,
) -> Result<Snapshot> {
    check_header_against_prev(prev, &block.header)?;

    let mut working = snapshot_in.copy();
    working.prune_nonces(block.header.body.timestamp_ms);

    let block_version = block.header.body.version;
    let block_ts_ms = block.header.body.timestamp_ms;

    block
        .transactions
        .par_iter()
        .try_for_each(|tx| validate_tx(tx, block_version, initial_block_id, block_ts_ms))
        .map_err(|e| {
            warn!(error = %e, "transaction failed well-formedness");
            e
        })?;

    for tx in &block.transactions {
        confirm_tx(&working, initial_block_id, block_ts_ms, tx)
            .ctx(format!("tx {} confirmation", tx.header_id))
            .map_err(|e| {
                warn!(error = %e, tx = %tx.header_id, "transaction failed confirmation");
                e
            })?;
        apply_tx(&mut working, tx)?;
    }

    let tx_ids: Vec<Hash> = block.transactions.iter().map(|tx| tx.header_id).collect();
    if merkle_root(&tx_ids) != block.header.body.transactions_root {
        return Err(BlockError::BadTxRoot.into());
    }
    if working.assets_root() != block.header.body.assets_root {
        return Err(BlockError::BadStateRoot.into());
    }

    if block.header.body.next_consensus_program.code.first() == Some(&OP_FAIL) {
        return Err(BlockError::BadScript.into());
    }

    Ok(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AssetAmount, BlockHeaderBody, BlockHeaderWitness, Program};
    use crate::legacy::{compute_tx_entries, LegacyInput, LegacyOutput, LegacySpendInput, LegacyTx};

    const OP_TRUE: u8 = 0x51;

    fn spend_tx(source_id: Hash, asset: Hash, amount: u64) -> TxEntries {
        let tx = LegacyTx {
            version: 1,
            min_time_ms: 0,
            max_time_ms: 0,
            reference_data: vec![],
            inputs: vec![LegacyInput::Spend(LegacySpendInput {
                source_id,
                source_position: 0,
                asset_amount: AssetAmount { asset_id: asset, amount },
                vm_version: 1,
                control_program: vec![OP_TRUE],
                source_ref_data_hash: Hash::zero(),
                reference_data: vec![],
                arguments: vec![],
            })],
            outputs: vec![LegacyOutput {
                asset_amount: AssetAmount { asset_id: asset, amount },
                vm_version: 1,
                control_program: vec![OP_TRUE],
                reference_data: vec![],
            }],
        };
        compute_tx_entries(&tx).unwrap()
    }

    fn spent_output_id(tx: &TxEntries) -> Hash {
        tx.entries
            .values()
            .find_map(|e| match e {
                Entry::Spend(s) => Some(s.body.spent_output_id),
                _ => None,
            })
            .unwrap()
    }

    fn result_output_id(tx: &TxEntries) -> Hash {
        tx.entries
            .values()
            .find_map(|e| match e {
                Entry::Output(o) => Some(o.id),
                _ => None,
            })
            .unwrap()
    }

    fn genesis_header(height: u64, tx_root: Hash, assets_root: Hash) -> BlockHeader {
        BlockHeader::new(
            BlockHeaderBody {
                version: 1,
                height,
                previous_block_id: Hash::zero(),
                timestamp_ms: 1_000,
                transactions_root: tx_root,
                assets_root,
                next_consensus_program: Program { vm_version: 1, code: vec![OP_TRUE] },
                ext_hash: Hash::zero(),
            },
            BlockHeaderWitness::default(),
        )
    }

    #[test]
    fn valid_single_tx_block_commits_and_updates_assets_root() {
        let asset = Hash::sha3_256(b"asset-a");
        let prior_output = Hash::sha3_256(b"prior-output");
        let mut snapshot = Snapshot::new();
        snapshot.add_output(prior_output).unwrap();

        let tx = spend_tx(prior_output, asset, 5);
        assert_eq!(spent_output_id(&tx), prior_output);
        let new_output = result_output_id(&tx);

        let tx_root = merkle_root(&[tx.header_id]);
        let mut expected = Snapshot::new();
        expected.add_output(new_output).unwrap();
        let block = Block {
            header: genesis_header(1, tx_root, expected.assets_root()),
            transactions: vec![tx],
        };

        let out = validate_block(&snapshot, Hash::zero(), None, &block).unwrap();
        assert!(!out.contains_output(prior_output));
        assert!(out.contains_output(new_output));
    }

    #[test]
    fn double_spend_across_transactions_is_rejected_and_snapshot_is_unchanged() {
        let asset = Hash::sha3_256(b"asset-a");
        let prior_output = Hash::sha3_256(b"prior-output");
        let mut snapshot = Snapshot::new();
        snapshot.add_output(prior_output).unwrap();

        let tx_a = spend_tx(prior_output, asset, 5);
        let tx_b = spend_tx(prior_output, asset, 5);
        let tx_root = merkle_root(&[tx_a.header_id, tx_b.header_id]);
        let block = Block {
            header: genesis_header(1, tx_root, Hash::zero()),
            transactions: vec![tx_a, tx_b],
        };

        let err = validate_block(&snapshot, Hash::zero(), None, &block).unwrap_err();
        let ValidationError::WithContext { context, source } = err else {
            panic!("expected a context-wrapped error, got a bare one");
        };
        assert!(context.contains("confirmation"));
        assert_eq!(*source, ValidationError::Tx(TxError::InvalidOutput));
        assert!(snapshot.contains_output(prior_output));
    }

    #[test]
    fn missing_genesis_with_height_other_than_one_is_rejected() {
        let block = Block {
            header: genesis_header(2, Hash::zero(), Hash::zero()),
            transactions: vec![],
        };
        let err = validate_block(&Snapshot::new(), Hash::zero(), None, &block).unwrap_err();
        assert_eq!(err, ValidationError::Block(BlockError::NoPrevBlock));
    }

    #[test]
    fn version_regression_against_prev_is_rejected() {
        let prev = BlockHeader::new(
            BlockHeaderBody {
                version: 2,
                height: 1,
                previous_block_id: Hash::zero(),
                timestamp_ms: 1_000,
                transactions_root: merkle_root(&[]),
                assets_root: Hash::zero(),
                next_consensus_program: Program { vm_version: 1, code: vec![OP_TRUE] },
                ext_hash: Hash::zero(),
            },
            BlockHeaderWitness::default(),
        );
        let mut next = genesis_header(2, merkle_root(&[]), Hash::zero());
        next.body.version = 1;
        next.body.previous_block_id = prev.id;
        next.body.timestamp_ms = 2_000;
        let block = Block { header: next, transactions: vec![] };

        let err = validate_block(&Snapshot::new(), Hash::zero(), Some(&prev), &block).unwrap_err();
        assert_eq!(err, ValidationError::Block(BlockError::VersionRegression));
    }

    #[test]
    fn unspendable_next_consensus_program_is_rejected() {
        let mut header = genesis_header(1, merkle_root(&[]), Hash::zero());
        header.body.next_consensus_program = Program { vm_version: 1, code: vec![OP_FAIL] };
        let block = Block { header, transactions: vec![] };

        let err = validate_block(&Snapshot::new(), Hash::zero(), None, &block).unwrap_err();
        assert_eq!(err, ValidationError::Block(BlockError::BadScript));
    }
}
