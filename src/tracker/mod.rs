//! Edge Tracker FSM (spec §4.4): one tracker per contested edge, driving
//! it from creation through bisection, sub-challenge opening, one-step
//! proof, and confirmation.

mod fsm;

pub use fsm::{Event, GuardContext, State, TransitionTable};

use std::sync::Arc;
use thiserror::Error;

use crate::chain::{
    AddSubChallengeLevelZeroEdge, Bisect, ChainAdapter, ChainError, ConfirmByTimer, Merge,
    OneStepProveAndConfirm, OpenSubChallenge, Transaction,
};
use crate::commitment::{bisection_point, CommitmentError};
use crate::hashing::H256;
use crate::history::{HistoryCommitmentSource, HistoryProviderError};
use crate::logging::{self, EventCategory, LogEvent, LogLevel};
use crate::tree::{ChallengeTree, Edge, EdgeId, Level, TreeError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("edge is not in the expected state: {0}")]
    WrongState(String),
    #[error("path timer has not yet exceeded the challenge period")]
    PsTimerNotYet,
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("commitment error: {0}")]
    Commitment(#[from] CommitmentError),
    #[error("history provider error: {0}")]
    History(#[from] HistoryProviderError),
    #[error("tracker invariant violated: {0}")]
    Fatal(String),
}

impl From<ChainError> for TrackerError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::AlreadyExists(msg) => TrackerError::AlreadyExists(msg),
            ChainError::WrongState(msg) => TrackerError::WrongState(msg),
            ChainError::PsTimerNotYet => TrackerError::PsTimerNotYet,
            ChainError::NotFound(msg) => TrackerError::WrongState(msg),
            ChainError::Transport(msg) => TrackerError::TransportError(msg),
        }
    }
}

/// Configuration a tracker needs to act: the `wasm_root` and `batch`
/// identifying the machine trajectory, and the per-level `start_heights`
/// prefix (spec §4.2) that, together with the edge's own span, fully
/// addresses its position in the trajectory.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub wasm_root: H256,
    pub batch: u64,
    pub start_heights_prefix: Vec<u64>,
    pub challenge_period_blocks: u64,
}

/// Per-edge structure `{ edge_id, fsm_state, config }` (spec §3).
pub struct EdgeTracker {
    pub edge_id: EdgeId,
    fsm_state: State,
    config: TrackerConfig,
    table: TransitionTable,
    tree: ChallengeTree,
    chain: Arc<dyn ChainAdapter>,
    history: Arc<dyn HistoryCommitmentSource>,
}

impl EdgeTracker {
    pub fn new(
        edge_id: EdgeId,
        config: TrackerConfig,
        tree: ChallengeTree,
        chain: Arc<dyn ChainAdapter>,
        history: Arc<dyn HistoryCommitmentSource>,
    ) -> Result<Self, TrackerError> {
        Ok(EdgeTracker {
            edge_id,
            fsm_state: State::Started,
            config,
            table: TransitionTable::standard()?,
            tree,
            chain,
            history,
        })
    }

    pub fn state(&self) -> State {
        self.fsm_state
    }

    /// Before acting: exit if the edge is already confirmed, a
    /// confirmation is in flight, or a rival in its mutual bucket has
    /// been confirmed (spec §3 "destroyed when ... a confirmed sibling
    /// is observed", §4.4 "completion check").
    async fn is_complete(&self, edge: &Edge) -> Result<bool, TrackerError> {
        if edge.status == crate::tree::EdgeStatus::Confirmed {
            return Ok(true);
        }
        if matches!(self.fsm_state, State::Confirming) {
            return Ok(true);
        }
        Ok(self.tree.any_rival_confirmed(edge.id).await?)
    }

    /// The absolute positional context for this edge's level (spec
    /// §4.2): fixed for every edge descended from the same level-zero
    /// edge, since `start_commit.height`/`end_commit.height` are
    /// themselves absolute offsets into that one trajectory.
    fn start_heights(&self, _edge: &Edge) -> Vec<u64> {
        self.config.start_heights_prefix.clone()
    }

    /// Runs one FSM step. Returns `Ok(true)` if the tracker is finished
    /// (terminal state reached or completion check tripped) and should
    /// be dropped by its owner.
    pub async fn tick(&mut self, now_block: u64) -> Result<bool, TrackerError> {
        let edge = self.tree.get(self.edge_id).await?;
        if self.is_complete(&edge).await? {
            return Ok(true);
        }

        let prior_state = self.fsm_state;
        let result = match prior_state {
            State::Started => self.tick_started(&edge, now_block).await,
            State::Presumptive => self.tick_presumptive(&edge).await,
            State::AtOneStepFork => self.tick_at_one_step_fork(&edge).await,
            State::Bisecting => self.tick_bisecting(&edge, now_block).await,
            State::Merging => self.tick_merging(&edge).await,
            State::OpeningSubchallenge => self.tick_opening_subchallenge(&edge).await,
            State::AddingSubchallengeLeaf => self.tick_adding_subchallenge_leaf(&edge).await,
            State::AwaitingSubchallengeResolution => Ok(true),
            State::AtOneStepProof => self.tick_at_one_step_proof(&edge).await,
            State::Confirming => Ok(true),
        };

        if self.fsm_state != prior_state {
            logging::emit(
                LogEvent::new(
                    LogLevel::Info,
                    EventCategory::Tracker,
                    format!("{:?} -> {:?}", prior_state, self.fsm_state),
                )
                .with_edge_id(format!("{:?}", self.edge_id)),
            );
        }

        result
    }

    async fn guard_context(&self, edge: &Edge) -> Result<GuardContext, TrackerError> {
        let has_rival = self.tree.has_rival(edge.id).await?;
        let is_presumptive_successor = self.is_presumptive_successor(edge).await?;
        Ok(GuardContext {
            is_presumptive_successor,
            has_rival,
            interval_len_one: edge.end_commit.height - edge.start_commit.height == 1,
            level: edge.level,
        })
    }

    /// An edge is the presumptive successor of its parent when it has no
    /// rival as of the parent edge's bisection and is unrivaled now.
    async fn is_presumptive_successor(&self, edge: &Edge) -> Result<bool, TrackerError> {
        Ok(!self.tree.has_rival(edge.id).await?)
    }

    async fn tick_started(&mut self, edge: &Edge, now_block: u64) -> Result<bool, TrackerError> {
        let ctx = self.guard_context(edge).await?;
        if let Ok(next) = self.table.apply(Event::IsPresumptive, self.fsm_state, &ctx) {
            self.fsm_state = next;
            return Ok(false);
        }
        if let Ok(next) = self.table.apply(Event::AtOneStepFork, self.fsm_state, &ctx) {
            self.fsm_state = next;
            return Ok(false);
        }
        let next = self.table.apply(Event::Bisect, self.fsm_state, &ctx)?;
        self.fsm_state = next;
        self.act_bisect(edge, now_block).await
    }

    async fn tick_presumptive(&mut self, edge: &Edge) -> Result<bool, TrackerError> {
        if self.tree.has_rival(edge.id).await? {
            let ctx = self.guard_context(edge).await?;
            self.fsm_state = self.table.apply(Event::LostPresumptive, self.fsm_state, &ctx)?;
        }
        Ok(false)
    }

    async fn tick_at_one_step_fork(&mut self, edge: &Edge) -> Result<bool, TrackerError> {
        let ctx = self.guard_context(edge).await?;
        if let Ok(next) = self.table.apply(Event::ActOneStepProof, self.fsm_state, &ctx) {
            self.fsm_state = next;
            self.chain
                .submit(Transaction::OneStepProveAndConfirm(OneStepProveAndConfirm {
                    edge_id: edge.id,
                }))
                .await?;
            return Ok(false);
        }
        let next = self.table.apply(Event::OpenSubchallenge, self.fsm_state, &ctx)?;
        self.fsm_state = next;
        Ok(false)
    }

    /// Bisection action (spec §4.4): `mid = bisection_point(start, end)`,
    /// request the commitment up to `mid`, a prefix proof from `mid` to
    /// `end`, and submit. `AlreadyExists` routes to `Merging` instead.
    async fn act_bisect(&mut self, edge: &Edge, _now_block: u64) -> Result<bool, TrackerError> {
        let mid = bisection_point(edge.start_commit.height, edge.end_commit.height)?;
        let start_heights = self.start_heights(edge);
        let bisection_commitment = self
            .history
            .history_commitment(self.config.wasm_root, self.config.batch, &start_heights, Some(mid))
            .await?;
        let proof = self
            .history
            .prefix_proof(
                self.config.wasm_root,
                self.config.batch,
                &start_heights,
                mid,
                edge.end_commit.height,
            )
            .await?;

        let result = self
            .chain
            .submit(Transaction::Bisect(Bisect {
                edge_id: edge.id,
                bisection_commitment: bisection_commitment.clone(),
                proof: proof.clone(),
            }))
            .await;

        match result {
            Ok(()) => {
                let ctx = self.guard_context(edge).await?;
                self.fsm_state = self.table.apply(Event::Success, State::Bisecting, &ctx)?;
                Ok(false)
            }
            Err(ChainError::AlreadyExists(_)) => {
                self.fsm_state = State::Merging;
                let existing_edge_id = crate::tree::compute_id(
                    edge.origin_id,
                    &edge.start_commit,
                    &crate::tree::Commit {
                        height: mid,
                        merkle: bisection_commitment.merkle,
                    },
                    edge.level,
                );
                self.act_merge(edge, existing_edge_id, bisection_commitment, proof)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn tick_bisecting(&mut self, edge: &Edge, now_block: u64) -> Result<bool, TrackerError> {
        self.act_bisect(edge, now_block).await
    }

    /// Merge action (spec §4.4/S5): `AlreadyExists` on bisect means the
    /// lower child we just computed is content-identical to a child some
    /// rival already added to the chain. `existing_edge_id` names that
    /// pre-existing child, derived the same way any edge id is derived
    /// (spec §6), not `edge.id` itself.
    async fn act_merge(
        &mut self,
        edge: &Edge,
        existing_edge_id: EdgeId,
        bisection_commitment: crate::history::HistoryCommitment,
        proof: crate::commitment::PrefixProof,
    ) -> Result<bool, TrackerError> {
        self.chain
            .submit(Transaction::Merge(Merge {
                edge_id: edge.id,
                existing_edge_id,
                bisection_commitment,
                proof,
            }))
            .await?;
        let ctx = self.guard_context(edge).await?;
        self.fsm_state = self.table.apply(Event::Success, State::Merging, &ctx)?;
        Ok(false)
    }

    async fn tick_merging(&mut self, edge: &Edge) -> Result<bool, TrackerError> {
        let ctx = self.guard_context(edge).await?;
        self.fsm_state = self.table.apply(Event::Success, self.fsm_state, &ctx)?;
        Ok(false)
    }

    /// Opens a sub-challenge on the parent edge, with first/last leaves
    /// equal to our start/end states (spec §4.2 enforcement property,
    /// checked by the history provider's leaf construction).
    async fn tick_opening_subchallenge(&mut self, edge: &Edge) -> Result<bool, TrackerError> {
        self.chain
            .submit(Transaction::OpenSubChallenge(OpenSubChallenge { edge_id: edge.id }))
            .await?;
        let ctx = self.guard_context(edge).await?;
        self.fsm_state = self
            .table
            .apply(Event::AddLeaf, self.fsm_state, &ctx)?;
        Ok(false)
    }

    async fn tick_adding_subchallenge_leaf(&mut self, edge: &Edge) -> Result<bool, TrackerError> {
        let sub_level = match edge.level {
            Level::Block => Level::BigStep,
            Level::BigStep => Level::SmallStep,
            Level::SmallStep => {
                return Err(TrackerError::Fatal(
                    "cannot open a sub-challenge below small-step".to_string(),
                ))
            }
        };
        self.chain
            .submit(Transaction::AddSubChallengeLevelZeroEdge(
                AddSubChallengeLevelZeroEdge {
                    claim_id: edge.id,
                    level: sub_level,
                    start: edge.start_commit,
                    end: edge.end_commit,
                },
            ))
            .await?;
        let ctx = self.guard_context(edge).await?;
        self.fsm_state = self.table.apply(Event::Await, self.fsm_state, &ctx)?;
        Ok(false)
    }

    async fn tick_at_one_step_proof(&mut self, edge: &Edge) -> Result<bool, TrackerError> {
        let ctx = self.guard_context(edge).await?;
        self.fsm_state = self.table.apply(Event::ConfirmWinner, self.fsm_state, &ctx)?;
        self.chain
            .submit(Transaction::ConfirmByTimer(ConfirmByTimer { edge_id: edge.id }))
            .await?;
        Ok(true)
    }

    /// Attempts confirm-by-timer outside the FSM's normal event path —
    /// any tracker, regardless of state, may win this way once its path
    /// timer exceeds the challenge period (spec §4.3's confirmation
    /// rule, independent of the transition table).
    pub async fn try_confirm_by_timer(&mut self, now_block: u64) -> Result<bool, TrackerError> {
        let eligible = self
            .tree
            .is_confirmable_by_timer(self.edge_id, now_block, self.config.challenge_period_blocks)
            .await?;
        if !eligible {
            return Err(TrackerError::PsTimerNotYet);
        }
        self.chain
            .submit(Transaction::ConfirmByTimer(ConfirmByTimer {
                edge_id: self.edge_id,
            }))
            .await?;
        self.fsm_state = State::Confirming;
        Ok(true)
    }
}
