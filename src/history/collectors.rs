//! Capability-set collaborators for the history-commitment provider (spec
//! §4.2, §9 design note: total, fallible trait methods with no leaked
//! default state).

use async_trait::async_trait;

use super::HistoryProviderError;
use crate::hashing::H256;

/// Returns the canonical state hash at a given message/block height for a
/// given batch.
#[async_trait]
pub trait MessageStateCollector: Send + Sync {
    async fn state_hash_at(&self, batch: u64, height: u64) -> Result<H256, HistoryProviderError>;
}

/// Returns a trajectory of per-opcode machine-step hashes from a specific
/// machine start up to a requested step.
#[async_trait]
pub trait MachineHashCollector: Send + Sync {
    /// Returns up to `num_hashes` consecutive per-opcode machine state
    /// hashes, starting at absolute opcode offset `from_step` from a
    /// machine built at `wasm_root` positioned at block `block_height`.
    ///
    /// Returns fewer than `num_hashes` entries iff the machine halts
    /// first; the provider applies the zero-padding rule (spec §4.2) on
    /// top of whatever is returned here.
    async fn machine_hashes(
        &self,
        wasm_root: H256,
        block_height: u64,
        from_step: u64,
        num_hashes: u64,
    ) -> Result<Vec<H256>, HistoryProviderError>;
}
