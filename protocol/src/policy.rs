//! Policy knobs external collaborators (a mempool, a block assembler)
//! may apply before handing a transaction to `validate_tx`/`confirm_tx`.
//! Nothing here is a protocol invariant: `check_valid` never calls into
//! this module.

use crate::entry::TxEntries;
use crate::error::TxError;
use crate::Entry;

/// Rejects a transaction whose issuance inputs span a time window wider
/// than `max_window_ms`. A `max_window_ms` of zero disables the check,
/// matching the upstream network default of "unconfigured".
///
/// # Errors
/// Returns [`TxError::IssuanceTime`] if `tx` has at least one issuance
/// input and `tx.max_time_ms - tx.min_time_ms > max_window_ms`.
pub fn max_issuance_window(tx: &TxEntries, max_window_ms: u64) -> Result<(), TxError> {
    if max_window_ms == 0 {
        return Ok(());
    }
    let has_issuance = tx.entries.values().any(|e| matches!(e, Entry::Issuance(_)));
    if !has_issuance {
        return Ok(());
    }
    let header = &tx.header().body;
    if header.min_time_ms + max_window_ms < header.max_time_ms {
        return Err(TxError::IssuanceTime);
    }
    Ok(())
}
