//! Property tests for value conservation and reference integrity
//! across the legacy-tx-to-entry-graph lift (spec items 3-5).

use protocol::entry::{AssetAmount, Entry};
use protocol::legacy::{compute_tx_entries, LegacyInput, LegacyOutput, LegacySpendInput, LegacyTx};
use protocol::validator::check_valid_tx;
use protocol::{EntryError, ValidationError};
use proptest::prelude::*;
use shared::Hash;

const OP_TRUE: u8 = 0x51;

fn spend_to_output_tx(amount: u64) -> LegacyTx {
    let asset = Hash::sha3_256(b"asset-a");
    LegacyTx {
        version: 1,
        min_time_ms: 0,
        max_time_ms: 0,
        reference_data: vec![],
        inputs: vec![LegacyInput::Spend(LegacySpendInput {
            source_id: Hash::sha3_256(b"prior-output"),
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
    }
}

proptest! {
    /// A balanced spend-to-output transaction is always well-formed,
    /// whatever the (nonzero) amount.
    #[test]
    fn balanced_tx_is_always_valid(amount in 1u64..1_000_000) {
        let tx = compute_tx_entries(&spend_to_output_tx(amount)).unwrap();
        prop_assert!(check_valid_tx(&tx, Hash::zero()).is_ok());
    }

    /// Perturbing the output amount away from the spent amount always
    /// yields `Unbalanced`.
    #[test]
    fn perturbed_output_amount_is_unbalanced(amount in 1u64..1_000_000, delta in 1u64..1_000) {
        let mut raw = spend_to_output_tx(amount);
        raw.outputs[0].asset_amount.amount = amount + delta;
        let tx = compute_tx_entries(&raw).unwrap();
        let err = check_valid_tx(&tx, Hash::zero()).unwrap_err();
        prop_assert_eq!(err, ValidationError::Entry(EntryError::Unbalanced));
    }

    /// The lift is deterministic: running it twice on the same input
    /// always produces the same header id and the same entry count.
    #[test]
    fn lift_is_deterministic(amount in 1u64..1_000_000) {
        let raw = spend_to_output_tx(amount);
        let a = compute_tx_entries(&raw).unwrap();
        let b = compute_tx_entries(&raw).unwrap();
        prop_assert_eq!(a.header_id, b.header_id);
        prop_assert_eq!(a.entries.len(), b.entries.len());
    }
}

#[test]
fn output_source_matches_mux_destination_by_position() {
    let tx = compute_tx_entries(&spend_to_output_tx(7)).unwrap();
    let output = tx
        .entries
        .values()
        .find_map(|e| match e {
            Entry::Output(o) => Some(o),
            _ => None,
        })
        .unwrap();
    let mux = tx
        .entries
        .values()
        .find_map(|e| match e {
            Entry::Mux(m) => Some(m),
            _ => None,
        })
        .unwrap();
    let dest = &mux.witness.destinations[output.ordinal as usize];
    assert_eq!(dest.reference, output.id);
    assert_eq!(dest.value, output.body.source.value);
}
