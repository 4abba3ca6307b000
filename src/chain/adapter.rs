//! The on-chain contract adapter boundary (spec §1 "out of scope",
//! §4.5/§4.6 callers). This crate defines the trait and a `#[cfg(test)]`
//! fake; a real JSON-RPC-backed implementation is outside this crate.

use async_trait::async_trait;
use thiserror::Error;

use super::events::ChainEvent;
use super::transactions::Transaction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("edge is not in the expected state: {0}")]
    WrongState(String),
    #[error("path timer has not yet exceeded the challenge period")]
    PsTimerNotYet,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Latest observed chain height.
    async fn current_block(&self) -> Result<u64, ChainError>;

    /// Events strictly after `from_block` up to and including the
    /// current height, in arbitrary intra-block order (the watcher is
    /// responsible for the replay order, spec §4.5).
    async fn events_since(&self, from_block: u64) -> Result<Vec<ChainEvent>, ChainError>;

    async fn submit(&self, tx: Transaction) -> Result<(), ChainError>;
}
