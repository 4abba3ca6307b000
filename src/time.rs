//! Time source capability (spec §9 design notes): injected rather than
//! read from a global clock, so trackers, the watcher, and the manager can
//! be driven by a deterministic virtual clock in tests instead of real
//! wall-clock sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::ChainAdapter;

#[async_trait]
pub trait Ticker: Send {
    /// Resolves once per period; real implementations wait out the
    /// remainder, virtual ones resolve immediately.
    async fn tick(&mut self);
}

#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn now_block(&self) -> u64;
    async fn sleep(&self, duration: Duration);
    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

pub struct TokioTicker {
    inner: tokio::time::Interval,
}

#[async_trait]
impl Ticker for TokioTicker {
    async fn tick(&mut self) {
        self.inner.tick().await;
    }
}

/// Reads block height from a [`ChainAdapter`] and sleeps/ticks in real
/// wall-clock time via `tokio::time`.
pub struct RealTimeSource {
    chain: Arc<dyn ChainAdapter>,
}

impl RealTimeSource {
    pub fn new(chain: Arc<dyn ChainAdapter>) -> Self {
        RealTimeSource { chain }
    }
}

#[async_trait]
impl TimeSource for RealTimeSource {
    async fn now_block(&self) -> u64 {
        self.chain.current_block().await.unwrap_or(0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(TokioTicker {
            inner: tokio::time::interval(period),
        })
    }
}

struct InstantTicker;

#[async_trait]
impl Ticker for InstantTicker {
    async fn tick(&mut self) {
        tokio::task::yield_now().await;
    }
}

/// Deterministic clock for tests: `now_block()` reads an atomic counter
/// that only moves when a test calls [`VirtualTimeSource::advance_blocks`];
/// `sleep` and ticker resolution never wait on real wall-clock time.
#[derive(Clone)]
pub struct VirtualTimeSource {
    block: Arc<AtomicU64>,
}

impl VirtualTimeSource {
    pub fn new(start_block: u64) -> Self {
        VirtualTimeSource {
            block: Arc::new(AtomicU64::new(start_block)),
        }
    }

    pub fn advance_blocks(&self, n: u64) {
        self.block.fetch_add(n, Ordering::SeqCst);
    }

    pub fn set_block(&self, block: u64) {
        self.block.store(block, Ordering::SeqCst);
    }
}

#[async_trait]
impl TimeSource for VirtualTimeSource {
    async fn now_block(&self) -> u64 {
        self.block.load(Ordering::SeqCst)
    }

    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }

    fn new_ticker(&self, _period: Duration) -> Box<dyn Ticker> {
        Box::new(InstantTicker)
    }
}
