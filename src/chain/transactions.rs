//! Submitted transactions (spec §6, engine → contract).

use crate::commitment::PrefixProof;
use crate::hashing::H256;
use crate::history::HistoryCommitment;
use crate::tree::{Commit, EdgeId, Level};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddBlockChallengeLevelZeroEdge {
    pub assertion_hash: H256,
    pub start: Commit,
    pub end: Commit,
    pub end_commitment_proof: PrefixProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSubChallengeLevelZeroEdge {
    pub claim_id: EdgeId,
    pub level: Level,
    pub start: Commit,
    pub end: Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bisect {
    pub edge_id: EdgeId,
    pub bisection_commitment: HistoryCommitment,
    /// Proves the bisection point's commitment extends to the edge's own
    /// end commitment (spec §4.4: "a prefix proof from `mid` to
    /// `end_height`").
    pub proof: PrefixProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    pub edge_id: EdgeId,
    pub existing_edge_id: EdgeId,
    pub bisection_commitment: HistoryCommitment,
    pub proof: PrefixProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSubChallenge {
    pub edge_id: EdgeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneStepProveAndConfirm {
    pub edge_id: EdgeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmByTimer {
    pub edge_id: EdgeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmByChildren {
    pub edge_id: EdgeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    AddBlockChallengeLevelZeroEdge(AddBlockChallengeLevelZeroEdge),
    AddSubChallengeLevelZeroEdge(AddSubChallengeLevelZeroEdge),
    Bisect(Bisect),
    Merge(Merge),
    OpenSubChallenge(OpenSubChallenge),
    OneStepProveAndConfirm(OneStepProveAndConfirm),
    ConfirmByTimer(ConfirmByTimer),
    ConfirmByChildren(ConfirmByChildren),
}
