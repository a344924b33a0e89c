//! Opaque context the VM consults for introspection opcodes
//! (`TXSIGHASH`, `BLOCKHASH`, `ASSET`, `AMOUNT`, ...). Modeled as a sum
//! type with two variants rather than a trait object, since block
//! programs and transaction programs are the only two shapes the VM
//! ever runs against (design note: only the VMContext is legitimately
//! polymorphic).

use crate::entry::{Entry, Program, TxEntries};
use crate::error::VmError;
use shared::Hash;

pub trait VmContext {
    fn vm_version(&self) -> u64;
    fn code(&self) -> &[u8];
    fn arguments(&self) -> &[Vec<u8>];

    fn tx_version(&self) -> Option<u64>;
    fn block_hash(&self) -> Result<Hash, VmError>;
    fn block_time_ms(&self) -> Result<u64, VmError>;
    fn next_consensus_program(&self) -> Result<&[u8], VmError>;

    fn tx_sig_hash(&self) -> Result<Hash, VmError>;
    fn num_results(&self) -> Result<u64, VmError>;
    fn asset_id(&self) -> Result<Hash, VmError>;
    fn amount(&self) -> Result<u64, VmError>;
    fn min_time_ms(&self) -> Result<u64, VmError>;
    fn max_time_ms(&self) -> Result<u64, VmError>;
    fn entry_data(&self) -> Result<Hash, VmError>;
    fn tx_data(&self) -> Result<Hash, VmError>;
    fn dest_pos(&self) -> Result<u64, VmError>;
    fn anchor_id(&self) -> Result<Hash, VmError>;
    fn spent_output_id(&self) -> Result<Hash, VmError>;

    /// `CHECKOUTPUT`: checks that a referenced result entry matches the
    /// given program, amount, asset id, and (optionally) data hash.
    #[allow(clippy::too_many_arguments)]
    fn check_output(
        &self,
        index: u64,
        data: &[u8],
        amount: u64,
        asset_id: &Hash,
        vm_version: u64,
        code: &[u8],
    ) -> Result<bool, VmError>;
}

/// Runs a block's consensus program. Only `BLOCKHASH`, block timestamp,
/// and the next consensus program are available.
pub struct BlockVmContext<'a> {
    pub program: &'a Program,
    pub args: &'a [Vec<u8>],
    pub block_id: Hash,
    pub block_time_ms: u64,
    pub next_consensus_program: &'a [u8],
}

impl<'a> VmContext for BlockVmContext<'a> {
    fn vm_version(&self) -> u64 {
        self.program.vm_version
    }
    fn code(&self) -> &[u8] {
        &self.program.code
    }
    fn arguments(&self) -> &[Vec<u8>] {
        self.args
    }
    fn tx_version(&self) -> Option<u64> {
        None
    }
    fn block_hash(&self) -> Result<Hash, VmError> {
        Ok(self.block_id)
    }
    fn block_time_ms(&self) -> Result<u64, VmError> {
        Ok(self.block_time_ms)
    }
    fn next_consensus_program(&self) -> Result<&[u8], VmError> {
        Ok(self.next_consensus_program)
    }
    fn tx_sig_hash(&self) -> Result<Hash, VmError> {
        Err(VmError::WrongContext)
    }
    fn num_results(&self) -> Result<u64, VmError> {
        Err(VmError::WrongContext)
    }
    fn asset_id(&self) -> Result<Hash, VmError> {
        Err(VmError::WrongContext)
    }
    fn amount(&self) -> Result<u64, VmError> {
        Err(VmError::WrongContext)
    }
    fn min_time_ms(&self) -> Result<u64, VmError> {
        Err(VmError::WrongContext)
    }
    fn max_time_ms(&self) -> Result<u64, VmError> {
        Err(VmError::WrongContext)
    }
    fn entry_data(&self) -> Result<Hash, VmError> {
        Err(VmError::WrongContext)
    }
    fn tx_data(&self) -> Result<Hash, VmError> {
        Err(VmError::WrongContext)
    }
    fn dest_pos(&self) -> Result<u64, VmError> {
        Err(VmError::WrongContext)
    }
    fn anchor_id(&self) -> Result<Hash, VmError> {
        Err(VmError::WrongContext)
    }
    fn spent_output_id(&self) -> Result<Hash, VmError> {
        Err(VmError::WrongContext)
    }
    fn check_output(
        &self,
        _index: u64,
        _data: &[u8],
        _amount: u64,
        _asset_id: &Hash,
        _vm_version: u64,
        _code: &[u8],
    ) -> Result<bool, VmError> {
        Err(VmError::WrongContext)
    }
}

/// Runs a control, issuance, or nonce program belonging to one entry of
/// one transaction.
pub struct TxVmContext<'a> {
    pub program: &'a Program,
    pub args: &'a [Vec<u8>],
    pub tx: &'a TxEntries,
    pub entry: &'a Entry,
}

impl<'a> TxVmContext<'a> {
    fn resolved_destination(&self) -> Option<(Hash, u64)> {
        match self.entry {
            Entry::Spend(s) => Some((s.witness.destination.reference, s.witness.destination.position)),
            Entry::Issuance(i) => Some((i.witness.destination.reference, i.witness.destination.position)),
            _ => None,
        }
    }

    fn check_entry(
        entry: &Entry,
        vm_version: u64,
        code: &[u8],
        amount: u64,
        asset_id: &Hash,
        data: &[u8],
    ) -> bool {
        let (prog_version, prog_code, value, data_hash) = match entry {
            Entry::Output(o) => (
                o.body.control_program.vm_version,
                o.body.control_program.code.as_slice(),
                o.body.source.value,
                o.body.data_hash,
            ),
            Entry::Retirement(r) => (0, &[] as &[u8], r.body.source.value, r.body.data_hash),
            _ => return false,
        };
        prog_version == vm_version
            && prog_code == code
            && value.asset_id == *asset_id
            && value.amount == amount
            && (data.is_empty() || data_hash.as_bytes() == data)
    }

    fn check_mux(
        &self,
        mux_id: Hash,
        index: u64,
        vm_version: u64,
        code: &[u8],
        amount: u64,
        asset_id: &Hash,
        data: &[u8],
    ) -> Result<bool, VmError> {
        let Some(Entry::Mux(mux)) = self.tx.get(&mux_id) else {
            return Err(VmError::WrongContext);
        };
        let dest = mux
            .witness
            .destinations
            .get(index as usize)
            .ok_or(VmError::BadValue)?;
        let Some(result_entry) = self.tx.get(&dest.reference) else {
            return Err(VmError::WrongContext);
        };
        Ok(Self::check_entry(result_entry, vm_version, code, amount, asset_id, data))
    }
}

impl<'a> VmContext for TxVmContext<'a> {
    fn vm_version(&self) -> u64 {
        self.program.vm_version
    }
    fn code(&self) -> &[u8] {
        &self.program.code
    }
    fn arguments(&self) -> &[Vec<u8>] {
        self.args
    }
    fn tx_version(&self) -> Option<u64> {
        Some(self.tx.header().body.version)
    }
    fn block_hash(&self) -> Result<Hash, VmError> {
        Err(VmError::WrongContext)
    }
    fn block_time_ms(&self) -> Result<u64, VmError> {
        Err(VmError::WrongContext)
    }
    fn next_consensus_program(&self) -> Result<&[u8], VmError> {
        Err(VmError::WrongContext)
    }
    fn tx_sig_hash(&self) -> Result<Hash, VmError> {
        let _ordinal = self.entry.ordinal().ok_or(VmError::WrongContext)?;
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(self.entry.id().as_bytes());
        buf.extend_from_slice(self.tx.header_id.as_bytes());
        Ok(Hash::sha3_256(&buf))
    }
    fn num_results(&self) -> Result<u64, VmError> {
        Ok(self.tx.header().body.result_ids.len() as u64)
    }
    fn asset_id(&self) -> Result<Hash, VmError> {
        match self.entry {
            Entry::Nonce(n) => match n.witness.anchored_id.and_then(|id| self.tx.get(&id)) {
                Some(Entry::Issuance(iss)) => Ok(iss.body.value.asset_id),
                _ => Err(VmError::WrongContext),
            },
            Entry::Issuance(i) => Ok(i.body.value.asset_id),
            Entry::Spend(s) => Ok(s.spent_output.body.source.value.asset_id),
            _ => Err(VmError::WrongContext),
        }
    }
    fn amount(&self) -> Result<u64, VmError> {
        match self.entry {
            Entry::Nonce(n) => match n.witness.anchored_id.and_then(|id| self.tx.get(&id)) {
                Some(Entry::Issuance(iss)) => Ok(iss.body.value.amount),
                _ => Err(VmError::WrongContext),
            },
            Entry::Issuance(i) => Ok(i.body.value.amount),
            Entry::Spend(s) => Ok(s.spent_output.body.source.value.amount),
            _ => Err(VmError::WrongContext),
        }
    }
    fn min_time_ms(&self) -> Result<u64, VmError> {
        Ok(self.tx.header().body.min_time_ms)
    }
    fn max_time_ms(&self) -> Result<u64, VmError> {
        Ok(self.tx.header().body.max_time_ms)
    }
    fn entry_data(&self) -> Result<Hash, VmError> {
        self.entry.data_hash().ok_or(VmError::WrongContext)
    }
    fn tx_data(&self) -> Result<Hash, VmError> {
        Ok(self.tx.header().body.data_hash)
    }
    fn dest_pos(&self) -> Result<u64, VmError> {
        self.resolved_destination()
            .map(|(_, pos)| pos)
            .ok_or(VmError::WrongContext)
    }
    fn anchor_id(&self) -> Result<Hash, VmError> {
        match self.entry {
            Entry::Issuance(i) => Ok(i.body.anchor_id),
            _ => Err(VmError::WrongContext),
        }
    }
    fn spent_output_id(&self) -> Result<Hash, VmError> {
        match self.entry {
            Entry::Spend(s) => Ok(s.body.spent_output_id),
            _ => Err(VmError::WrongContext),
        }
    }
    fn check_output(
        &self,
        index: u64,
        data: &[u8],
        amount: u64,
        asset_id: &Hash,
        vm_version: u64,
        code: &[u8],
    ) -> Result<bool, VmError> {
        match self.entry {
            Entry::Mux(mux) => self.check_mux(mux.id, index, vm_version, code, amount, asset_id, data),
            Entry::Issuance(_) | Entry::Spend(_) => {
                let (dest_ref, _) = self.resolved_destination().ok_or(VmError::WrongContext)?;
                if let Some(Entry::Mux(_)) = self.tx.get(&dest_ref) {
                    return self.check_mux(dest_ref, index, vm_version, code, amount, asset_id, data);
                }
                if index != 0 {
                    return Err(VmError::BadValue);
                }
                let Some(result_entry) = self.tx.get(&dest_ref) else {
                    return Err(VmError::WrongContext);
                };
                Ok(Self::check_entry(result_entry, vm_version, code, amount, asset_id, data))
            }
            _ => Err(VmError::WrongContext),
        }
    }
}
