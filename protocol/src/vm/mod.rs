//! The stack-based verification VM: opcode engine plus the context
//! interface it consults for transaction/block introspection queries.

pub mod context;
pub mod engine;

pub use context::{BlockVmContext, TxVmContext, VmContext};
pub use engine::{run_program, RunResult};
