pub mod confirm;
pub mod encode;
pub mod entry;
pub mod error;
pub mod legacy;
pub mod merkle;
pub mod policy;
pub mod snapshot;
pub mod trie;
pub mod validator;
pub mod vm;

pub use confirm::{apply_tx, confirm_tx, validate_block, validate_tx, Block};
pub use entry::{Entry, TxEntries};
pub use error::{BlockError, EntryError, ResultExt, TxError, ValidationError, VmError};
pub use legacy::{compute_tx_entries, LegacyInput, LegacyIssuanceInput, LegacyOutput, LegacySpendInput, LegacyTx};
pub use merkle::{merkle_root, HasherPool};
pub use snapshot::Snapshot;
pub use trie::PatriciaTrie;
pub use validator::{check_valid, check_valid_tx, Ctx};
pub use vm::{run_program, BlockVmContext, RunResult, TxVmContext, VmContext};

pub use shared::{BlockchainError, Hash, Result as SharedResult};
