//! Observed on-chain events (spec §6, contract → engine).

use serde::{Deserialize, Serialize};

use crate::hashing::H256;
use crate::tree::{Commit, EdgeId, Level};

/// `(block_number, tx_index, log_index)` — the total order mutations to
/// the challenge tree are replayed in (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ordinal {
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAdded {
    pub id: EdgeId,
    pub origin_id: H256,
    pub start: Commit,
    pub end: Commit,
    pub level: Level,
    pub claim_id: Option<EdgeId>,
    pub created_at_block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeBisected {
    pub parent_id: EdgeId,
    pub lower_id: EdgeId,
    pub upper_id: EdgeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfirmed {
    pub id: EdgeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionCreated {
    pub hash: H256,
    pub parent_hash: H256,
    pub after_state: H256,
    pub inbox_max_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEventKind {
    EdgeAdded(EdgeAdded),
    EdgeBisected(EdgeBisected),
    EdgeConfirmed(EdgeConfirmed),
    AssertionCreated(AssertionCreated),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub ordinal: Ordinal,
    pub kind: ChainEventKind,
}

impl ChainEvent {
    /// Sort key enforcing spec §4.5's ordering rule: events apply in
    /// block-sequence order, and within a block, additions and
    /// bisections precede confirmations regardless of their relative
    /// `tx_index`/`log_index` — the phase dominates the natural log
    /// order within a single block.
    pub fn ordering_key(&self) -> (u64, u8, u64, u64) {
        let phase = match &self.kind {
            ChainEventKind::AssertionCreated(_) => 0,
            ChainEventKind::EdgeAdded(_) => 1,
            ChainEventKind::EdgeBisected(_) => 2,
            ChainEventKind::EdgeConfirmed(_) => 3,
        };
        (
            self.ordinal.block_number,
            phase,
            self.ordinal.tx_index,
            self.ordinal.log_index,
        )
    }
}
