//! Execution state and its canonical hash (spec §3, §6).

use crate::hashing::{keccak_concat, H256};
use serde::{Deserialize, Serialize};

/// The portion of execution state that is visible to the inbox/outbox —
/// the rollup's view of "where in the input sequence are we".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub block_hash: H256,
    pub send_root: H256,
    pub batch: u64,
    pub pos_in_batch: u64,
}

impl GlobalState {
    /// `keccak(block_hash ‖ send_root ‖ batch_be8 ‖ pos_in_batch_be8)` (spec §6).
    pub fn hash(&self) -> H256 {
        keccak_concat(&[
            self.block_hash.as_bytes(),
            self.send_root.as_bytes(),
            &self.batch.to_be_bytes(),
            &self.pos_in_batch.to_be_bytes(),
        ])
    }
}

/// Status of the machine that produced a given `ExecutionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MachineStatus {
    Running = 0,
    Finished = 1,
    Errored = 2,
}

/// A single point in the execution trajectory (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub global_state: GlobalState,
    pub machine_status: MachineStatus,
}

impl ExecutionState {
    /// `state_hash(s, inbox_max_count) = keccak(0x01 ‖ global_state_hash ‖
    /// machine_status ‖ inbox_max_count_be32)` (spec §3, §6). Per the
    /// `be<N>` convention used in this preimage, `be32` is a 32-byte
    /// big-endian word (an EVM `uint256`), matching the on-chain
    /// contract's encoding of the field, not 4 bytes.
    pub fn state_hash(&self, inbox_max_count: u32) -> H256 {
        let mut inbox_max_count_be32 = [0u8; 32];
        inbox_max_count_be32[28..].copy_from_slice(&inbox_max_count.to_be_bytes());
        keccak_concat(&[
            &[0x01u8],
            self.global_state.hash().as_bytes(),
            &[self.machine_status as u8],
            &inbox_max_count_be32,
        ])
    }
}
