//! Challenge Manager (spec §4.6): starts challenges on conflicting
//! assertions, dedups tracker lifecycle, and owns the tracked-edge set.

use std::sync::Arc;

use backoff::future::retry;
use backoff::{Error as BackoffError, ExponentialBackoff};
use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::chain::{AddBlockChallengeLevelZeroEdge, ChainAdapter, ChainError, Transaction};
use crate::hashing::H256;
use crate::history::{HistoryCommitmentSource, HistoryProviderError};
use crate::logging::{self, EventCategory, LogEvent, LogLevel};
use crate::tracker::{EdgeTracker, TrackerConfig, TrackerError};
use crate::tree::{ChallengeTree, Commit, Edge, EdgeId, Level, TreeError};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("history provider error: {0}")]
    History(#[from] HistoryProviderError),
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

impl From<ChainError> for ManagerError {
    fn from(e: ChainError) -> Self {
        ManagerError::TransportError(e.to_string())
    }
}

/// The finishing assertion state a level-zero block edge's `start`
/// endpoint is measured against (spec §4.6: "prefix proof against the
/// parent assertion's finishing state").
#[derive(Debug, Clone, Copy)]
pub struct AssertionContext {
    pub assertion_hash: H256,
    pub origin_id: H256,
}

/// Coordinates challenge lifecycle: opens level-zero edges on conflicting
/// assertions and spawns/dedups per-edge trackers. The tracked-id set and
/// the assertion-height cache are lock-free concurrent maps (`dashmap`),
/// matching spec §5's requirement that the tracked-edge set support
/// CAS-style add without a held lock across an `.await`.
pub struct ChallengeManager {
    tree: ChallengeTree,
    chain: Arc<dyn ChainAdapter>,
    history: Arc<dyn HistoryCommitmentSource>,
    wasm_root: H256,
    batch: u64,
    challenge_leaf_heights: [u64; 3],
    challenge_period_blocks: u64,
    tracked: DashSet<EdgeId>,
    assertion_heights: DashMap<H256, u64>,
    spawned: mpsc::UnboundedSender<EdgeTracker>,
}

impl ChallengeManager {
    pub fn new(
        tree: ChallengeTree,
        chain: Arc<dyn ChainAdapter>,
        history: Arc<dyn HistoryCommitmentSource>,
        wasm_root: H256,
        batch: u64,
        challenge_leaf_heights: [u64; 3],
        challenge_period_blocks: u64,
    ) -> (Self, mpsc::UnboundedReceiver<EdgeTracker>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChallengeManager {
                tree,
                chain,
                history,
                wasm_root,
                batch,
                challenge_leaf_heights,
                challenge_period_blocks,
                tracked: DashSet::new(),
                assertion_heights: DashMap::new(),
                spawned: tx,
            },
            rx,
        )
    }

    pub fn is_tracking(&self, id: EdgeId) -> bool {
        self.tracked.contains(&id)
    }

    pub fn mark_tracked(&self, id: EdgeId) {
        self.tracked.insert(id);
    }

    /// Opens the level-zero block-challenge edge for a freshly observed
    /// assertion conflict and spawns its tracker.
    pub async fn challenge_assertion(
        &self,
        ctx: AssertionContext,
        now_block: u64,
    ) -> Result<EdgeId, ManagerError> {
        logging::emit(
            LogEvent::new(LogLevel::Info, EventCategory::Manager, "opening challenge")
                .with_data(serde_json::json!({ "assertion_hash": format!("{:?}", ctx.assertion_hash) })),
        );
        let start_heights = vec![0u64];
        let h0 = self.challenge_leaf_heights[0];

        let start_commitment = until_succeeds(|| {
            self.history
                .history_commitment(self.wasm_root, self.batch, &start_heights, Some(0))
        })
        .await?;
        let end_commitment = until_succeeds(|| {
            self.history
                .history_commitment(self.wasm_root, self.batch, &start_heights, Some(h0))
        })
        .await?;
        let proof = until_succeeds(|| {
            self.history
                .prefix_proof(self.wasm_root, self.batch, &start_heights, 0, h0)
        })
        .await?;

        let start = Commit {
            height: 0,
            merkle: start_commitment.merkle,
        };
        let end = Commit {
            height: h0,
            merkle: end_commitment.merkle,
        };
        let edge = Edge::new(ctx.origin_id, Level::Block, start, end, now_block, None);

        self.tree.insert_edge(edge.clone()).await?;
        self.tree.mark_honest(edge.id).await?;

        until_succeeds(|| {
            self.chain.submit(Transaction::AddBlockChallengeLevelZeroEdge(
                AddBlockChallengeLevelZeroEdge {
                    assertion_hash: ctx.assertion_hash,
                    start,
                    end,
                    end_commitment_proof: proof.clone(),
                },
            ))
        })
        .await?;

        self.assertion_heights.insert(ctx.assertion_hash, h0);
        self.track_edge(edge, start_heights).await?;
        logging::emit(
            LogEvent::new(LogLevel::Info, EventCategory::Manager, "challenge opened")
                .with_edge_id(format!("{:?}", edge.id)),
        );
        Ok(edge.id)
    }

    /// Idempotent: spawns a tracker for `edge` unless one is already
    /// tracking it.
    pub async fn track_edge(
        &self,
        edge: Edge,
        start_heights_prefix: Vec<u64>,
    ) -> Result<(), ManagerError> {
        if self.is_tracking(edge.id) {
            return Ok(());
        }
        self.mark_tracked(edge.id);

        let config = TrackerConfig {
            wasm_root: self.wasm_root,
            batch: self.batch,
            start_heights_prefix,
            challenge_period_blocks: self.challenge_period_blocks,
        };
        let tracker = EdgeTracker::new(
            edge.id,
            config,
            self.tree.clone(),
            Arc::clone(&self.chain),
            Arc::clone(&self.history),
        )?;
        // A closed receiver means whatever drove the tracker pool has shut
        // down; the manager still records the edge as tracked above.
        let _ = self.spawned.send(tracker);
        Ok(())
    }
}

/// Wraps chain-adapter reads performed during tracker construction in a
/// bounded exponential backoff with jitter (spec §4.6, §7 `TransportError`).
async fn until_succeeds<F, Fut, T, E>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let backoff = ExponentialBackoff::default();
    retry(backoff, || async { op().await.map_err(BackoffError::transient) }).await
}
