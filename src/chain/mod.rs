//! Chain interfaces (spec §6): the `ChainAdapter` trait, observed events,
//! and submitted transactions. No concrete RPC client lives here — that
//! transport is out of scope (spec §1).

mod adapter;
mod events;
mod transactions;

pub use adapter::{ChainAdapter, ChainError};
pub use events::{AssertionCreated, ChainEvent, ChainEventKind, EdgeAdded, EdgeBisected, EdgeConfirmed, Ordinal};
pub use transactions::{
    AddBlockChallengeLevelZeroEdge, AddSubChallengeLevelZeroEdge, Bisect, ConfirmByChildren,
    ConfirmByTimer, Merge, OneStepProveAndConfirm, OpenSubChallenge, Transaction,
};

#[cfg(test)]
pub mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Lightweight in-memory stand-in for a real chain adapter, used by
    /// tracker/watcher/manager unit tests (spec §1: the full
    /// simulated-backend harness is out of scope, this is not it).
    #[derive(Default)]
    pub struct FakeChainAdapter {
        events: Mutex<Vec<ChainEvent>>,
        current_block: Mutex<u64>,
        submitted: Mutex<Vec<Transaction>>,
        submit_results: Mutex<VecDeque<Result<(), ChainError>>>,
    }

    impl FakeChainAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_event(&self, event: ChainEvent) {
            self.events.lock().unwrap().push(event);
        }

        pub fn set_current_block(&self, height: u64) {
            *self.current_block.lock().unwrap() = height;
        }

        /// Queues the result of the next N calls to `submit`, in order.
        pub fn queue_submit_result(&self, result: Result<(), ChainError>) {
            self.submit_results.lock().unwrap().push_back(result);
        }

        pub fn submitted_transactions(&self) -> Vec<Transaction> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainAdapter for FakeChainAdapter {
        async fn current_block(&self) -> Result<u64, ChainError> {
            Ok(*self.current_block.lock().unwrap())
        }

        async fn events_since(&self, from_block: u64) -> Result<Vec<ChainEvent>, ChainError> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.ordinal.block_number > from_block)
                .cloned()
                .collect())
        }

        async fn submit(&self, tx: Transaction) -> Result<(), ChainError> {
            self.submitted.lock().unwrap().push(tx);
            let queued = self.submit_results.lock().unwrap().pop_front();
            queued.unwrap_or(Ok(()))
        }
    }
}
