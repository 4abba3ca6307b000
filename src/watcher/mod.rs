//! Chain Watcher (spec §4.5): reconstructs the challenge tree from
//! observed events and forwards honest edges to the challenge manager.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::chain::{ChainAdapter, ChainError, ChainEventKind};
use crate::hashing::H256;
use crate::history::{HistoryCommitmentSource, HistoryProviderError};
use crate::logging::{self, EventCategory, LogEvent, LogLevel};
use crate::tree::{ChallengeTree, Edge, EdgeId, EdgeStatus, Level, TreeError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatcherError {
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("history provider error: {0}")]
    History(#[from] HistoryProviderError),
    #[error("watcher invariant violated: {0}")]
    Fatal(String),
}

impl From<ChainError> for WatcherError {
    fn from(e: ChainError) -> Self {
        WatcherError::TransportError(e.to_string())
    }
}

/// Resolves the absolute `start_heights` context for an edge's challenge
/// level (spec §4.2) — fixed per level-zero edge and not reconstructible
/// from the edge's own fields alone, so the manager's assertion-height
/// cache (spec §4.6) supplies it.
#[async_trait]
pub trait StartHeightsResolver: Send + Sync {
    async fn start_heights_for(&self, edge: &Edge) -> Result<Vec<u64>, WatcherError>;
}

/// Polls a configured interval, applies ingested events to the
/// [`ChallengeTree`] in block-sequence order, and reports newly observed
/// honest edges on `honest_edges`.
pub struct ChainWatcher {
    tree: ChallengeTree,
    chain: Arc<dyn ChainAdapter>,
    history: Arc<dyn HistoryCommitmentSource>,
    resolver: Arc<dyn StartHeightsResolver>,
    wasm_root: H256,
    batch: u64,
    last_seen_block: u64,
    honest_edges: mpsc::UnboundedSender<EdgeId>,
}

impl ChainWatcher {
    pub fn new(
        tree: ChallengeTree,
        chain: Arc<dyn ChainAdapter>,
        history: Arc<dyn HistoryCommitmentSource>,
        resolver: Arc<dyn StartHeightsResolver>,
        wasm_root: H256,
        batch: u64,
    ) -> (Self, mpsc::UnboundedReceiver<EdgeId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChainWatcher {
                tree,
                chain,
                history,
                resolver,
                wasm_root,
                batch,
                last_seen_block: 0,
                honest_edges: tx,
            },
            rx,
        )
    }

    /// One polling iteration: snapshot the chain height, ingest deltas in
    /// block-sequence order, then classify and forward honest edges.
    pub async fn poll_once(&mut self) -> Result<(), WatcherError> {
        let mut events = self.chain.events_since(self.last_seen_block).await?;
        if events.is_empty() {
            return Ok(());
        }
        events.sort_by_key(|e| e.ordering_key());
        logging::emit(LogEvent::new(
            LogLevel::Debug,
            EventCategory::Watcher,
            format!("ingesting {} event(s) since block {}", events.len(), self.last_seen_block),
        ));

        let mut newly_added = Vec::new();
        let mut max_block = self.last_seen_block;
        for event in events {
            max_block = max_block.max(event.ordinal.block_number);
            match event.kind {
                ChainEventKind::EdgeAdded(added) => {
                    let edge = Edge::new(
                        added.origin_id,
                        added.level,
                        added.start,
                        added.end,
                        added.created_at_block,
                        added.claim_id,
                    );
                    if edge.id != added.id {
                        return Err(WatcherError::Fatal(format!(
                            "observed edge id {:?} does not match its content-derived id {:?}",
                            added.id, edge.id
                        )));
                    }
                    self.tree.insert_edge(edge.clone()).await?;
                    newly_added.push(edge);
                }
                ChainEventKind::EdgeBisected(bisected) => {
                    self.tree
                        .set_children(bisected.parent_id, bisected.lower_id, bisected.upper_id)
                        .await?;
                }
                ChainEventKind::EdgeConfirmed(confirmed) => {
                    self.tree.mark_confirmed(confirmed.id).await?;
                }
                ChainEventKind::AssertionCreated(_) => {}
            }
        }
        self.last_seen_block = max_block;

        for edge in newly_added {
            if self.is_honest(&edge).await? {
                self.tree.mark_honest(edge.id).await?;
                logging::emit(
                    LogEvent::new(LogLevel::Info, EventCategory::Watcher, "observed honest edge")
                        .with_edge_id(format!("{:?}", edge.id)),
                );
                // A closed receiver means the manager has shut down;
                // the watcher keeps ingesting regardless.
                let _ = self.honest_edges.send(edge.id);
            }
        }
        Ok(())
    }

    /// An edge is honest iff its `(level, start, end, merkle)` matches
    /// local truth, i.e. the history provider's own commitment over the
    /// same span (spec §4.5 point 5).
    async fn is_honest(&self, edge: &Edge) -> Result<bool, WatcherError> {
        if edge.status == EdgeStatus::Confirmed {
            return Ok(false);
        }
        let start_heights = self.resolver.start_heights_for(edge).await?;
        let span = edge.end_commit.height - edge.start_commit.height;
        let local = self
            .history
            .history_commitment(self.wasm_root, self.batch, &start_heights, Some(span))
            .await?;
        // Both sides of a rivalry share `(start, end)` and thus the same
        // start leaf by construction — only `end` can differ — so the
        // merkle-root comparison alone decides honesty.
        Ok(local.merkle == edge.end_commit.merkle)
    }

    pub async fn run(mut self, poll_interval: std::time::Duration) -> Result<(), WatcherError> {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            self.poll_once().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChainAdapter;
    use crate::chain::{ChainEvent, EdgeAdded, EdgeBisected, EdgeConfirmed, Ordinal};
    use crate::hashing::hash_leaf;
    use crate::history::{HistoryCommitmentProvider, MachineHashCollector, MessageStateCollector};
    use crate::tree::Commit;
    use async_trait::async_trait;

    struct FixedMessageState;

    #[async_trait]
    impl MessageStateCollector for FixedMessageState {
        async fn state_hash_at(
            &self,
            _batch: u64,
            height: u64,
        ) -> Result<H256, HistoryProviderError> {
            Ok(hash_leaf(&height.to_be_bytes()))
        }
    }

    struct EmptyMachine;

    #[async_trait]
    impl MachineHashCollector for EmptyMachine {
        async fn machine_hashes(
            &self,
            _wasm_root: H256,
            _block_height: u64,
            _from_step: u64,
            _num_hashes: u64,
        ) -> Result<Vec<H256>, HistoryProviderError> {
            Ok(vec![H256::ZERO])
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl StartHeightsResolver for FixedResolver {
        async fn start_heights_for(&self, _edge: &Edge) -> Result<Vec<u64>, WatcherError> {
            Ok(vec![0])
        }
    }

    fn commit(height: u64, byte: u8) -> Commit {
        Commit {
            height,
            merkle: H256([byte; 32]),
        }
    }

    fn new_watcher(chain: Arc<FakeChainAdapter>) -> (ChainWatcher, mpsc::UnboundedReceiver<EdgeId>) {
        let tree = ChallengeTree::new();
        let history: Arc<dyn HistoryCommitmentSource> = Arc::new(HistoryCommitmentProvider::new(
            EmptyMachine,
            FixedMessageState,
            [16, 16, 16],
            4,
        ));
        ChainWatcher::new(
            tree,
            chain,
            history,
            Arc::new(FixedResolver),
            H256::ZERO,
            0,
        )
    }

    #[tokio::test]
    async fn honest_edge_is_detected_and_forwarded() {
        let chain = Arc::new(FakeChainAdapter::new());
        let origin = H256([9u8; 32]);
        let honest_merkle = {
            let mut exp = crate::commitment::MerkleExpansion::empty();
            for i in 0..=7u64 {
                exp.append_leaf(hash_leaf(&i.to_be_bytes()).as_bytes()).unwrap();
            }
            exp.root()
        };
        chain.push_event(ChainEvent {
            ordinal: Ordinal {
                block_number: 1,
                tx_index: 0,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: crate::tree::compute_id(origin, &commit(0, 0), &commit(7, 0), Level::Block),
                origin_id: origin,
                start: commit(0, 0),
                end: Commit {
                    height: 7,
                    merkle: honest_merkle,
                },
                level: Level::Block,
                claim_id: None,
                created_at_block: 1,
            }),
        });

        let (mut watcher, mut rx) = new_watcher(chain);
        watcher.poll_once().await.unwrap();

        let forwarded = rx.try_recv().unwrap();
        let edge = watcher.tree.get(forwarded).await.unwrap();
        assert_eq!(edge.end_commit.height, 7);
        assert!(watcher.tree.is_honest(forwarded).await);
    }

    #[tokio::test]
    async fn evil_edge_is_ingested_but_not_forwarded() {
        let chain = Arc::new(FakeChainAdapter::new());
        let origin = H256([9u8; 32]);
        let evil_end = Commit {
            height: 7,
            merkle: H256([0xEEu8; 32]),
        };
        chain.push_event(ChainEvent {
            ordinal: Ordinal {
                block_number: 1,
                tx_index: 0,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: crate::tree::compute_id(origin, &commit(0, 0), &evil_end, Level::Block),
                origin_id: origin,
                start: commit(0, 0),
                end: evil_end,
                level: Level::Block,
                claim_id: None,
                created_at_block: 1,
            }),
        });

        let (mut watcher, mut rx) = new_watcher(chain);
        watcher.poll_once().await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bisections_apply_before_confirmations_within_a_block() {
        let chain = Arc::new(FakeChainAdapter::new());
        let origin = H256([5u8; 32]);
        let root_end = commit(7, 1);
        let root_id = crate::tree::compute_id(origin, &commit(0, 0), &root_end, Level::Block);
        let child_end = commit(4, 1);
        let child_id = crate::tree::compute_id(origin, &commit(0, 0), &child_end, Level::Block);

        chain.push_event(ChainEvent {
            ordinal: Ordinal {
                block_number: 1,
                tx_index: 0,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: root_id,
                origin_id: origin,
                start: commit(0, 0),
                end: root_end,
                level: Level::Block,
                claim_id: None,
                created_at_block: 1,
            }),
        });
        chain.push_event(ChainEvent {
            ordinal: Ordinal {
                block_number: 2,
                tx_index: 5,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeConfirmed(EdgeConfirmed { id: root_id }),
        });
        chain.push_event(ChainEvent {
            ordinal: Ordinal {
                block_number: 2,
                tx_index: 0,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: child_id,
                origin_id: origin,
                start: commit(0, 0),
                end: child_end,
                level: Level::Block,
                claim_id: None,
                created_at_block: 2,
            }),
        });
        chain.push_event(ChainEvent {
            ordinal: Ordinal {
                block_number: 2,
                tx_index: 1,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeBisected(EdgeBisected {
                parent_id: root_id,
                lower_id: child_id,
                upper_id: child_id,
            }),
        });

        let (mut watcher, _rx) = new_watcher(chain);
        watcher.poll_once().await.unwrap();

        let root = watcher.tree.get(root_id).await.unwrap();
        assert_eq!(root.status, EdgeStatus::Confirmed);
        assert_eq!(root.lower_child_id, Some(child_id));
    }

    /// S6 — a synthetic event log (one assertion, a bisected root/child
    /// pair, and a rival pair) replayed in two different intra-block
    /// event orderings (inter-block order held fixed) reaches the same
    /// tree state either way.
    #[tokio::test]
    async fn cold_start_replay_is_independent_of_intra_block_order() {
        let origin = H256([5u8; 32]);
        let root_end = commit(7, 1);
        let root_id = crate::tree::compute_id(origin, &commit(0, 0), &root_end, Level::Block);
        let child_end = commit(4, 1);
        let child_id = crate::tree::compute_id(origin, &commit(0, 0), &child_end, Level::Block);

        let rival_origin = H256([6u8; 32]);
        let a_end = commit(7, 2);
        let a_id = crate::tree::compute_id(rival_origin, &commit(0, 0), &a_end, Level::Block);
        let b_end = commit(7, 3);
        let b_id = crate::tree::compute_id(rival_origin, &commit(0, 0), &b_end, Level::Block);

        let assertion_event = ChainEvent {
            ordinal: Ordinal {
                block_number: 0,
                tx_index: 0,
                log_index: 0,
            },
            kind: ChainEventKind::AssertionCreated(crate::chain::AssertionCreated {
                hash: H256([1u8; 32]),
                parent_hash: H256::ZERO,
                after_state: H256([2u8; 32]),
                inbox_max_count: 1,
            }),
        };
        let root_added = ChainEvent {
            ordinal: Ordinal {
                block_number: 1,
                tx_index: 0,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: root_id,
                origin_id: origin,
                start: commit(0, 0),
                end: root_end,
                level: Level::Block,
                claim_id: None,
                created_at_block: 1,
            }),
        };
        let rival_a_added = ChainEvent {
            ordinal: Ordinal {
                block_number: 1,
                tx_index: 1,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: a_id,
                origin_id: rival_origin,
                start: commit(0, 0),
                end: a_end,
                level: Level::Block,
                claim_id: None,
                created_at_block: 1,
            }),
        };
        let confirm_root = ChainEvent {
            ordinal: Ordinal {
                block_number: 2,
                tx_index: 5,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeConfirmed(EdgeConfirmed { id: root_id }),
        };
        let child_added = ChainEvent {
            ordinal: Ordinal {
                block_number: 2,
                tx_index: 0,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: child_id,
                origin_id: origin,
                start: commit(0, 0),
                end: child_end,
                level: Level::Block,
                claim_id: None,
                created_at_block: 2,
            }),
        };
        let bisect_root = ChainEvent {
            ordinal: Ordinal {
                block_number: 2,
                tx_index: 1,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeBisected(EdgeBisected {
                parent_id: root_id,
                lower_id: child_id,
                upper_id: child_id,
            }),
        };
        let rival_b_added = ChainEvent {
            ordinal: Ordinal {
                block_number: 2,
                tx_index: 2,
                log_index: 0,
            },
            kind: ChainEventKind::EdgeAdded(EdgeAdded {
                id: b_id,
                origin_id: rival_origin,
                start: commit(0, 0),
                end: b_end,
                level: Level::Block,
                claim_id: None,
                created_at_block: 2,
            }),
        };

        let ordering_a = vec![
            assertion_event.clone(),
            root_added.clone(),
            rival_a_added.clone(),
            confirm_root.clone(),
            child_added.clone(),
            bisect_root.clone(),
            rival_b_added.clone(),
        ];
        // Same inter-block order, different intra-block order within
        // blocks 1 and 2.
        let ordering_b = vec![
            rival_a_added,
            assertion_event,
            bisect_root,
            rival_b_added,
            child_added,
            confirm_root,
            root_added,
        ];

        let edge_ids = [root_id, child_id, a_id, b_id];
        let mut final_states = Vec::new();
        for ordering in [ordering_a, ordering_b] {
            let chain = Arc::new(FakeChainAdapter::new());
            for event in ordering {
                chain.push_event(event);
            }
            let (mut watcher, _rx) = new_watcher(chain);
            watcher.poll_once().await.unwrap();

            let mut state = Vec::new();
            for id in edge_ids {
                let edge = watcher.tree.get(id).await.unwrap();
                state.push((
                    edge.status,
                    edge.lower_child_id,
                    edge.upper_child_id,
                    watcher.tree.has_rival(id).await.unwrap(),
                ));
            }
            final_states.push(state);
        }

        assert_eq!(final_states[0], final_states[1]);
    }
}
