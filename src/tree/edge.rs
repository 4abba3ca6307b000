//! [`Edge`] and its content-derived identifiers (spec §3, §6).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hashing::{keccak_concat, H256};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub H256);

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({:?})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutualId(pub H256);

impl fmt::Debug for MutualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutualId({:?})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Block = 0,
    BigStep = 1,
    SmallStep = 2,
}

impl Level {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    Pending,
    Confirmed,
}

/// An endpoint of an edge: a history-commitment height plus its Merkle
/// root (spec §3 `start_commit`/`end_commit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub height: u64,
    pub merkle: H256,
}

/// The elementary bisection-game claim (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub origin_id: H256,
    pub level: Level,
    pub start_commit: Commit,
    pub end_commit: Commit,
    pub created_at_block: u64,
    pub lower_child_id: Option<EdgeId>,
    pub upper_child_id: Option<EdgeId>,
    pub claim_id: Option<EdgeId>,
    pub mutual_id: MutualId,
    pub status: EdgeStatus,
}

impl Edge {
    /// Builds a new edge, deriving `id` and `mutual_id` from the other
    /// fields per §6's hashing scheme. `claim_id` is `Some` only for a
    /// level-zero subchallenge edge.
    pub fn new(
        origin_id: H256,
        level: Level,
        start_commit: Commit,
        end_commit: Commit,
        created_at_block: u64,
        claim_id: Option<EdgeId>,
    ) -> Self {
        let id = compute_id(origin_id, &start_commit, &end_commit, level);
        let mutual_id = compute_mutual_id(origin_id, level, &start_commit, end_commit.height);
        Edge {
            id,
            origin_id,
            level,
            start_commit,
            end_commit,
            created_at_block,
            lower_child_id: None,
            upper_child_id: None,
            claim_id,
            mutual_id,
            status: EdgeStatus::Pending,
        }
    }

    pub fn is_level_zero(&self) -> bool {
        self.claim_id.is_some()
    }

    pub fn has_children(&self) -> bool {
        self.lower_child_id.is_some() || self.upper_child_id.is_some()
    }
}

/// `keccak(origin_id ‖ start_merkle ‖ start_height_be8 ‖ end_merkle ‖
/// end_height_be8 ‖ level_u8)` (spec §6).
pub fn compute_id(origin_id: H256, start: &Commit, end: &Commit, level: Level) -> EdgeId {
    let level_byte = [level.as_u8()];
    EdgeId(keccak_concat(&[
        origin_id.as_bytes(),
        start.merkle.as_bytes(),
        &start.height.to_be_bytes(),
        end.merkle.as_bytes(),
        &end.height.to_be_bytes(),
        &level_byte,
    ]))
}

/// `keccak(origin_id ‖ level_u8 ‖ start_height_be8 ‖ end_height_be8 ‖
/// start_merkle)` (spec §6). Two edges share a mutual id iff they are
/// rivals: same origin, level, and span, but a different end merkle.
pub fn compute_mutual_id(origin_id: H256, level: Level, start: &Commit, end_height: u64) -> MutualId {
    let level_byte = [level.as_u8()];
    MutualId(keccak_concat(&[
        origin_id.as_bytes(),
        &level_byte,
        &start.height.to_be_bytes(),
        &end_height.to_be_bytes(),
        start.merkle.as_bytes(),
    ]))
}
