//! Crate-wide error taxonomy (spec §7).
//!
//! Every component has its own error enum so call sites can match on the
//! failure modes that are actually reachable from that component; this
//! top-level `EngineError` aggregates them for callers that only care about
//! the cross-cutting propagation policy (retry vs. terminate vs. fatal).

use thiserror::Error;

use crate::commitment::CommitmentError;
use crate::manager::ManagerError;
use crate::tracker::TrackerError;
use crate::tree::TreeError;
use crate::watcher::WatcherError;

/// Root error type for the challenge engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Precondition violations on pure functions (misaligned expansion,
    /// height ordering, empty history, etc).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Edge/vertex/assertion absent from tree or chain.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate insertion, duplicate on-chain vertex.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Confirmation attempt before path timer exceeds the challenge period.
    #[error("path timer has not yet exceeded the challenge period")]
    PsTimerNotYet,

    /// Edge not in the expected status for the attempted move.
    #[error("edge is not in the expected state: {0}")]
    WrongState(String),

    /// Chain adapter or state-provider failure.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Unrecoverable invariant violation.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    #[error("commitment error: {0}")]
    Commitment(#[from] CommitmentError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),
}

impl EngineError {
    /// Whether a tracker should recover from this error and retry on its
    /// next tick, per spec §7's propagation policy: `AlreadyExists`,
    /// `PsTimerNotYet`, `WrongState`, and `TransportError` are retried;
    /// everything else terminates the specific tracker (but not the
    /// manager), and `Fatal` terminates the whole engine.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyExists(_)
                | EngineError::PsTimerNotYet
                | EngineError::WrongState(_)
                | EngineError::TransportError(_)
        )
    }

    /// Whether this error should terminate the entire engine rather than
    /// just the tracker or watcher tick that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "INVALID_ARGUMENT",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::AlreadyExists(_) => "ALREADY_EXISTS",
            EngineError::PsTimerNotYet => "PS_TIMER_NOT_YET",
            EngineError::WrongState(_) => "WRONG_STATE",
            EngineError::TransportError(_) => "TRANSPORT_ERROR",
            EngineError::Fatal(_) => "FATAL",
            EngineError::Commitment(_) => "COMMITMENT_ERROR",
            EngineError::Tree(_) => "TREE_ERROR",
            EngineError::Tracker(_) => "TRACKER_ERROR",
            EngineError::Watcher(_) => "WATCHER_ERROR",
            EngineError::Manager(_) => "MANAGER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
