//! The stack-based bytecode interpreter: pushdata, stack manipulation,
//! arithmetic, control flow, hashing, signature checks, and the
//! introspection opcodes that consult a [`VmContext`].

use super::context::VmContext;
use crate::error::VmError;
use shared::{Hash, PublicKey, Signature};

const OP_PUSH1: u8 = 0x4c;
const OP_PUSH2: u8 = 0x4d;
const OP_PUSH4: u8 = 0x4e;
const OP_TRUE: u8 = 0x51;
const OP_FAIL: u8 = 0x6a;
const OP_TOALTSTACK: u8 = 0x6b;
const OP_FROMALTSTACK: u8 = 0x6c;
const OP_JUMPIF: u8 = 0x63;
const OP_DROP: u8 = 0x75;
const OP_DUP: u8 = 0x76;
const OP_SWAP: u8 = 0x77;
const OP_ADD: u8 = 0x93;
const OP_EQUAL: u8 = 0x87;
const OP_SHA256: u8 = 0xa8;
const OP_SHA3: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_TXSIGHASH: u8 = 0xc0;
const OP_BLOCKHASH: u8 = 0xc1;
const OP_ASSET: u8 = 0xc2;
const OP_AMOUNT: u8 = 0xc3;
const OP_MINTIME: u8 = 0xc4;
const OP_MAXTIME: u8 = 0xc5;
const OP_TXDATA: u8 = 0xc6;
const OP_ENTRYDATA: u8 = 0xc7;
const OP_DESTPOS: u8 = 0xc8;
const OP_CHECKOUTPUT: u8 = 0xc9;
const OP_ANCHOR: u8 = 0xca;
const OP_SPENTOUTPUT: u8 = 0xcb;

const BASE_OP_COST: i64 = 1;
const PUSH_BYTE_COST: i64 = 1;
const HASH_BASE_COST: i64 = 4;
const HASH_BYTE_COST: i64 = 1;
const SIG_CHECK_COST: i64 = 64;

/// The outcome of a completed VM run: only the final truthy/falsy
/// determination matters to callers; the cost accounting is exposed so
/// validators can log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
    pub run_limit_consumed: i64,
}

struct Machine<'a> {
    program: &'a [u8],
    pc: usize,
    data_stack: Vec<Vec<u8>>,
    alt_stack: Vec<Vec<u8>>,
    run_limit: i64,
    deferred_cost: i64,
}

fn is_truthy(v: &[u8]) -> bool {
    !v.is_empty() && v.iter().any(|&b| b != 0)
}

fn bool_bytes(b: bool) -> Vec<u8> {
    if b {
        vec![1]
    } else {
        vec![]
    }
}

fn i64_from_bytes(bytes: &[u8]) -> Result<i64, VmError> {
    if bytes.len() > 8 {
        return Err(VmError::BadValue);
    }
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

impl<'a> Machine<'a> {
    fn new(program: &'a [u8], run_limit: i64) -> Self {
        Self {
            program,
            pc: 0,
            data_stack: Vec::new(),
            alt_stack: Vec::new(),
            run_limit,
            deferred_cost: 0,
        }
    }

    fn charge(&mut self, cost: i64) -> Result<(), VmError> {
        self.run_limit -= cost;
        if self.run_limit < 0 {
            return Err(VmError::RunLimitExceeded);
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Vec<u8>, VmError> {
        let v = self.data_stack.pop().ok_or(VmError::DataStackUnderflow)?;
        self.deferred_cost += v.len() as i64;
        Ok(v)
    }

    fn push(&mut self, v: Vec<u8>) -> Result<(), VmError> {
        self.charge(PUSH_BYTE_COST * v.len() as i64)?;
        self.data_stack.push(v);
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, VmError> {
        let b = *self.program.get(self.pc).ok_or(VmError::BadValue)?;
        self.pc += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], VmError> {
        let end = self.pc.checked_add(n).ok_or(VmError::BadValue)?;
        let slice = self.program.get(self.pc..end).ok_or(VmError::BadValue)?;
        self.pc = end;
        Ok(slice)
    }

    fn read_u16_le(&mut self) -> Result<u16, VmError> {
        Ok(u16::from_le_bytes(self.read_bytes(2)?.try_into().unwrap()))
    }

    fn read_u32_le(&mut self) -> Result<u32, VmError> {
        Ok(u32::from_le_bytes(self.read_bytes(4)?.try_into().unwrap()))
    }
}

/// Runs `program` with `args` pre-loaded on the data stack (first
/// argument deepest), consulting `ctx` for introspection opcodes.
///
/// # Errors
/// Returns a [`VmError`] if the program underflows the stack, exceeds
/// `run_limit`, references a context query unavailable to `ctx`, or
/// contains a malformed instruction.
pub fn run_program(
    program: &[u8],
    args: &[Vec<u8>],
    run_limit: i64,
    ctx: &dyn VmContext,
) -> Result<RunResult, VmError> {
    let mut vm = Machine::new(program, run_limit);
    for arg in args {
        vm.push(arg.clone())?;
    }

    while vm.pc < vm.program.len() {
        vm.charge(BASE_OP_COST)?;
        let op = vm.read_u8()?;
        step(&mut vm, op, ctx)?;
    }

    let success = matches!(vm.data_stack.last(), Some(top) if is_truthy(top)) && vm.data_stack.len() == 1;
    Ok(RunResult {
        success,
        run_limit_consumed: run_limit - vm.run_limit + vm.deferred_cost,
    })
}

fn step(vm: &mut Machine, op: u8, ctx: &dyn VmContext) -> Result<(), VmError> {
    match op {
        OP_FAIL => Err(VmError::BadValue),
        0x00..=0x4b => {
            let n = op as usize;
            let bytes = vm.read_bytes(n)?.to_vec();
            vm.push(bytes)
        }
        OP_PUSH1 => {
            let n = vm.read_u8()? as usize;
            let bytes = vm.read_bytes(n)?.to_vec();
            vm.push(bytes)
        }
        OP_PUSH2 => {
            let n = vm.read_u16_le()? as usize;
            let bytes = vm.read_bytes(n)?.to_vec();
            vm.push(bytes)
        }
        OP_PUSH4 => {
            let n = vm.read_u32_le()? as usize;
            let bytes = vm.read_bytes(n)?.to_vec();
            vm.push(bytes)
        }
        OP_TRUE => vm.push(vec![1]),
        OP_TOALTSTACK => {
            let v = vm.pop()?;
            vm.alt_stack.push(v);
            Ok(())
        }
        OP_FROMALTSTACK => {
            let v = vm.alt_stack.pop().ok_or(VmError::DataStackUnderflow)?;
            vm.push(v)
        }
        OP_DROP => {
            vm.pop()?;
            Ok(())
        }
        OP_DUP => {
            let v = vm.pop()?;
            vm.push(v.clone())?;
            vm.push(v)
        }
        OP_SWAP => {
            let b = vm.pop()?;
            let a = vm.pop()?;
            vm.push(b)?;
            vm.push(a)
        }
        OP_EQUAL => {
            let b = vm.pop()?;
            let a = vm.pop()?;
            vm.push(bool_bytes(a == b))
        }
        OP_ADD => {
            let b = i64_from_bytes(&vm.pop()?)?;
            let a = i64_from_bytes(&vm.pop()?)?;
            let sum = a.checked_add(b).ok_or(VmError::BadValue)?;
            vm.push(sum.to_le_bytes().to_vec())
        }
        OP_JUMPIF => {
            let target = vm.read_u32_le()? as usize;
            let cond = vm.pop()?;
            if is_truthy(&cond) {
                if target > vm.program.len() {
                    return Err(VmError::BadValue);
                }
                vm.pc = target;
            }
            Ok(())
        }
        OP_SHA256 => {
            vm.charge(HASH_BASE_COST)?;
            let data = vm.pop()?;
            vm.charge(HASH_BYTE_COST * data.len() as i64)?;
            vm.push(sha256(&data))
        }
        OP_SHA3 => {
            vm.charge(HASH_BASE_COST)?;
            let data = vm.pop()?;
            vm.charge(HASH_BYTE_COST * data.len() as i64)?;
            vm.push(Hash::sha3_256(&data).as_bytes().to_vec())
        }
        OP_CHECKSIG => {
            vm.charge(SIG_CHECK_COST)?;
            let pubkey_bytes = vm.pop()?;
            let sig_bytes = vm.pop()?;
            let msg = vm.pop()?;
            if msg.len() != 32 {
                return Err(VmError::BadValue);
            }
            vm.push(bool_bytes(checksig(&msg, &sig_bytes, &pubkey_bytes)))
        }
        OP_CHECKMULTISIG => {
            vm.charge(SIG_CHECK_COST)?;
            let n = i64_from_bytes(&vm.pop()?)? as usize;
            let mut pubkeys = Vec::with_capacity(n);
            for _ in 0..n {
                pubkeys.push(vm.pop()?);
            }
            let m = i64_from_bytes(&vm.pop()?)? as usize;
            let mut sigs = Vec::with_capacity(m);
            for _ in 0..m {
                sigs.push(vm.pop()?);
            }
            let msg = vm.pop()?;
            if msg.len() != 32 || m > n {
                return Err(VmError::BadValue);
            }
            vm.push(bool_bytes(checkmultisig(&msg, &sigs, &pubkeys)))
        }
        OP_TXSIGHASH => {
            let h = ctx.tx_sig_hash()?;
            vm.push(h.as_bytes().to_vec())
        }
        OP_BLOCKHASH => {
            let h = ctx.block_hash()?;
            vm.push(h.as_bytes().to_vec())
        }
        OP_ASSET => {
            let h = ctx.asset_id()?;
            vm.push(h.as_bytes().to_vec())
        }
        OP_AMOUNT => {
            let a = ctx.amount()?;
            vm.push(a.to_le_bytes().to_vec())
        }
        OP_MINTIME => {
            let t = ctx.min_time_ms()?;
            vm.push(t.to_le_bytes().to_vec())
        }
        OP_MAXTIME => {
            let t = ctx.max_time_ms()?;
            vm.push(t.to_le_bytes().to_vec())
        }
        OP_TXDATA => {
            let h = ctx.tx_data()?;
            vm.push(h.as_bytes().to_vec())
        }
        OP_ENTRYDATA => {
            let h = ctx.entry_data()?;
            vm.push(h.as_bytes().to_vec())
        }
        OP_DESTPOS => {
            let p = ctx.dest_pos()?;
            vm.push(p.to_le_bytes().to_vec())
        }
        OP_ANCHOR => {
            let h = ctx.anchor_id()?;
            vm.push(h.as_bytes().to_vec())
        }
        OP_SPENTOUTPUT => {
            let h = ctx.spent_output_id()?;
            vm.push(h.as_bytes().to_vec())
        }
        OP_CHECKOUTPUT => {
            let code = vm.pop()?;
            let vm_version = i64_from_bytes(&vm.pop()?)? as u64;
            let asset_id_bytes = vm.pop()?;
            let amount = i64_from_bytes(&vm.pop()?)? as u64;
            let data = vm.pop()?;
            let index = i64_from_bytes(&vm.pop()?)? as u64;
            let asset_id = Hash::try_from(asset_id_bytes.as_slice()).map_err(|_| VmError::BadValue)?;
            let ok = ctx.check_output(index, &data, amount, &asset_id, vm_version, &code)?;
            vm.push(bool_bytes(ok))
        }
        _ => Err(VmError::BadValue),
    }
}

fn sha256(data: &[u8]) -> Vec<u8> {
    use sha2::Digest;
    sha2::Sha256::digest(data).to_vec()
}

fn checksig(msg: &[u8], sig_bytes: &[u8], pubkey_bytes: &[u8]) -> bool {
    let (Ok(pubkey), Ok(sig)) = (PublicKey::from_bytes(pubkey_bytes), Signature::from_bytes(sig_bytes)) else {
        return false;
    };
    let Ok(hash) = Hash::try_from(msg) else {
        return false;
    };
    shared::verify_hash_signature(&hash, &pubkey, &sig).unwrap_or(false)
}

fn checkmultisig(msg: &[u8], sigs: &[Vec<u8>], pubkeys: &[Vec<u8>]) -> bool {
    let Ok(hash) = Hash::try_from(msg) else {
        return false;
    };
    let mut remaining_keys = pubkeys.iter();
    'sigs: for sig_bytes in sigs {
        let Ok(sig) = Signature::from_bytes(sig_bytes) else {
            return false;
        };
        for key_bytes in remaining_keys.by_ref() {
            let Ok(pubkey) = PublicKey::from_bytes(key_bytes) else {
                continue;
            };
            if shared::verify_hash_signature(&hash, &pubkey, &sig).unwrap_or(false) {
                continue 'sigs;
            }
        }
        return false;
    }
    true
}
