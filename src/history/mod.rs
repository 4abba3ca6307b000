//! History-Commitment Provider (spec §4.2).
//!
//! Polymorphic over two collaborators — a message-state collector and a
//! machine-hash collector — plus a pre-configured vector of per-level leaf
//! heights. Produces [`HistoryCommitment`]s and prefix proofs at all three
//! challenge levels (block / big-step / small-step).

mod collectors;
mod provider;

pub use collectors::{MachineHashCollector, MessageStateCollector};
pub use provider::{ChallengeLevel, HistoryCommitmentProvider, HistoryProviderError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commitment::PrefixProof;
use crate::hashing::H256;

/// `{ height, merkle, first_leaf, last_leaf, last_leaf_proof }` (spec §3).
///
/// Invariant: `first_leaf = hash(s_0)`, `last_leaf = hash(s_height)`, and
/// `last_leaf_proof` verifies `last_leaf` at position `height` against
/// `merkle`.
///
/// The expansion underlying a history commitment is a sparse MMR, not a
/// dense binary tree, so a bare sibling-hash list cannot self-verify the
/// last leaf's position: the verifier also needs the pre-leaf expansion
/// those siblings were folded against. `last_leaf_proof` is therefore the
/// same two-part wire encoding as any other prefix proof (spec §6),
/// specialized to the single-leaf step from `height - 1` to `height`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCommitment {
    pub height: u64,
    pub merkle: H256,
    pub first_leaf: H256,
    pub last_leaf: H256,
    pub last_leaf_proof: PrefixProof,
}

/// Object-safe facade over [`HistoryCommitmentProvider`] so the tracker,
/// watcher, and manager can hold a commitment source without becoming
/// generic over its two collaborator types.
#[async_trait]
pub trait HistoryCommitmentSource: Send + Sync {
    async fn history_commitment(
        &self,
        wasm_root: H256,
        batch: u64,
        start_heights: &[u64],
        up_to: Option<u64>,
    ) -> Result<HistoryCommitment, HistoryProviderError>;

    async fn prefix_proof(
        &self,
        wasm_root: H256,
        batch: u64,
        start_heights: &[u64],
        pre_height: u64,
        post_height: u64,
    ) -> Result<PrefixProof, HistoryProviderError>;
}

#[async_trait]
impl<M, S> HistoryCommitmentSource for HistoryCommitmentProvider<M, S>
where
    M: MachineHashCollector,
    S: MessageStateCollector,
{
    async fn history_commitment(
        &self,
        wasm_root: H256,
        batch: u64,
        start_heights: &[u64],
        up_to: Option<u64>,
    ) -> Result<HistoryCommitment, HistoryProviderError> {
        HistoryCommitmentProvider::history_commitment(self, wasm_root, batch, start_heights, up_to)
            .await
    }

    async fn prefix_proof(
        &self,
        wasm_root: H256,
        batch: u64,
        start_heights: &[u64],
        pre_height: u64,
        post_height: u64,
    ) -> Result<PrefixProof, HistoryProviderError> {
        HistoryCommitmentProvider::prefix_proof(
            self,
            wasm_root,
            batch,
            start_heights,
            pre_height,
            post_height,
        )
        .await
    }
}
