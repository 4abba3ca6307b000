//! Challenge Tree (spec §4.3): the in-memory index of every edge observed
//! in the protocol, partitioned by mutual id, with recursive path-timer
//! computation for confirmation eligibility.

mod edge;

pub use edge::{compute_id, compute_mutual_id, Commit, Edge, EdgeId, EdgeStatus, Level, MutualId};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("edge not found: {0:?}")]
    NotFound(EdgeId),
    #[error("edge already exists: {0:?}")]
    AlreadyExists(EdgeId),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("tree invariant violated: {0}")]
    Fatal(String),
}

struct Inner {
    edges: HashMap<EdgeId, Edge>,
    mutual_index: HashMap<MutualId, HashMap<EdgeId, u64>>,
    honest_root_ids: HashSet<EdgeId>,
}

/// Single-writer, many-reader edge arena (spec §5). Cloned out from under
/// the lock before any `.await` at every read call site that feeds a
/// suspending operation.
#[derive(Clone)]
pub struct ChallengeTree {
    inner: Arc<RwLock<Inner>>,
}

impl Default for ChallengeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeTree {
    pub fn new() -> Self {
        ChallengeTree {
            inner: Arc::new(RwLock::new(Inner {
                edges: HashMap::new(),
                mutual_index: HashMap::new(),
                honest_root_ids: HashSet::new(),
            })),
        }
    }

    /// Idempotent by `id`. Registers the edge in its mutual bucket.
    /// Re-inserting an identical edge is a no-op; inserting a different
    /// edge under an id already present is a content-derived-id
    /// contradiction (spec I4) and is fatal.
    pub async fn insert_edge(&self, e: Edge) -> Result<(), TreeError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.edges.get(&e.id) {
            if *existing == e {
                return Ok(());
            }
            return Err(TreeError::Fatal(format!(
                "edge {:?} re-inserted with different content",
                e.id
            )));
        }
        inner
            .mutual_index
            .entry(e.mutual_id)
            .or_default()
            .insert(e.id, e.created_at_block);
        inner.edges.insert(e.id, e);
        Ok(())
    }

    /// Links `lower`/`upper` as `parent`'s children (atomic bisection,
    /// spec I2).
    pub async fn set_children(
        &self,
        parent: EdgeId,
        lower: EdgeId,
        upper: EdgeId,
    ) -> Result<(), TreeError> {
        let mut inner = self.inner.write().await;
        let edge = inner
            .edges
            .get_mut(&parent)
            .ok_or(TreeError::NotFound(parent))?;
        edge.lower_child_id = Some(lower);
        edge.upper_child_id = Some(upper);
        Ok(())
    }

    pub async fn mark_confirmed(&self, id: EdgeId) -> Result<(), TreeError> {
        let mut inner = self.inner.write().await;
        let edge = inner.edges.get_mut(&id).ok_or(TreeError::NotFound(id))?;
        edge.status = EdgeStatus::Confirmed;
        Ok(())
    }

    /// Records that `id` was produced by us, so challenge-manager logic
    /// can skip self-contradiction checks against it.
    pub async fn mark_honest(&self, id: EdgeId) -> Result<(), TreeError> {
        let mut inner = self.inner.write().await;
        if !inner.edges.contains_key(&id) {
            return Err(TreeError::NotFound(id));
        }
        inner.honest_root_ids.insert(id);
        Ok(())
    }

    pub async fn is_honest(&self, id: EdgeId) -> bool {
        self.inner.read().await.honest_root_ids.contains(&id)
    }

    pub async fn get(&self, id: EdgeId) -> Result<Edge, TreeError> {
        self.inner
            .read()
            .await
            .edges
            .get(&id)
            .cloned()
            .ok_or(TreeError::NotFound(id))
    }

    pub async fn has_rival(&self, id: EdgeId) -> Result<bool, TreeError> {
        let inner = self.inner.read().await;
        let edge = inner.edges.get(&id).ok_or(TreeError::NotFound(id))?;
        Ok(inner
            .mutual_index
            .get(&edge.mutual_id)
            .map(|bucket| bucket.len() >= 2)
            .unwrap_or(false))
    }

    /// True iff some other edge in `id`'s mutual bucket has been
    /// confirmed. A tracker loses as soon as any rival in its bucket
    /// wins, regardless of which one it is (spec §3, §4.4).
    pub async fn any_rival_confirmed(&self, id: EdgeId) -> Result<bool, TreeError> {
        let inner = self.inner.read().await;
        let edge = inner.edges.get(&id).ok_or(TreeError::NotFound(id))?;
        let bucket = match inner.mutual_index.get(&edge.mutual_id) {
            Some(b) => b,
            None => return Ok(false),
        };
        Ok(bucket.keys().any(|rival_id| {
            *rival_id != id
                && inner
                    .edges
                    .get(rival_id)
                    .map(|e| e.status == EdgeStatus::Confirmed)
                    .unwrap_or(false)
        }))
    }

    /// Minimum `created_at` over all siblings in the mutual bucket
    /// excluding `id`; `None` if unrivaled.
    pub async fn earliest_created_rival(&self, id: EdgeId) -> Result<Option<u64>, TreeError> {
        let inner = self.inner.read().await;
        let edge = inner.edges.get(&id).ok_or(TreeError::NotFound(id))?;
        let bucket = match inner.mutual_index.get(&edge.mutual_id) {
            Some(b) => b,
            None => return Ok(None),
        };
        Ok(bucket
            .iter()
            .filter(|(rival_id, _)| **rival_id != id)
            .map(|(_, created_at)| *created_at)
            .min())
    }

    /// True iff no rival existed at block `t`.
    pub async fn unrivaled_at_time(&self, id: EdgeId, t: u64) -> Result<bool, TreeError> {
        Ok(match self.earliest_created_rival(id).await? {
            None => true,
            Some(rival_created_at) => rival_created_at > t,
        })
    }

    /// Direct parents of `e`: the edge that bisected into `e` (matched by
    /// `lower_child_id`/`upper_child_id`), plus, when `e` is a level-zero
    /// edge, the higher-level edge referenced by `claim_id`. Recursing
    /// through this set (as `path_timer` does) walks the full ancestor
    /// chain up to a root edge.
    pub async fn ancestors(&self, id: EdgeId) -> Result<Vec<EdgeId>, TreeError> {
        let inner = self.inner.read().await;
        let edge = inner.edges.get(&id).ok_or(TreeError::NotFound(id))?;
        let mut out = Vec::new();
        for candidate in inner.edges.values() {
            if candidate.lower_child_id == Some(id) || candidate.upper_child_id == Some(id) {
                out.push(candidate.id);
            }
        }
        if let Some(claim_id) = edge.claim_id {
            out.push(claim_id);
        }
        Ok(out)
    }

    /// First of `candidates` whose `origin_id` matches `origin`.
    pub async fn find_origin_edge(
        &self,
        origin: crate::hashing::H256,
        candidates: &[EdgeId],
    ) -> Result<Option<EdgeId>, TreeError> {
        let inner = self.inner.read().await;
        for candidate in candidates {
            let edge = inner.edges.get(candidate).ok_or(TreeError::NotFound(*candidate))?;
            if edge.origin_id == origin {
                return Ok(Some(*candidate));
            }
        }
        Ok(None)
    }

    /// `0` if `t < e.created_at`; `t - e.created_at` if unrivaled at `t`;
    /// otherwise `min(t, earliest_rival.created_at) - e.created_at`.
    pub async fn local_timer(&self, id: EdgeId, t: u64) -> Result<u64, TreeError> {
        let edge = self.get(id).await?;
        if t < edge.created_at_block {
            return Ok(0);
        }
        let bound = match self.earliest_created_rival(id).await? {
            None => t,
            Some(rival_created_at) => t.min(rival_created_at),
        };
        Ok(bound - edge.created_at_block)
    }

    /// `local_timer(e, t) + max(path_timer(p, t) for p in ancestors(e))`,
    /// or just `local_timer(e, t)` with no ancestors. Memoized for the
    /// duration of one top-level call so that a shared-ancestor diamond
    /// is not recomputed exponentially; the cache is not retained across
    /// calls since a later `insert_edge` can introduce a new rival that
    /// would invalidate an earlier result for the same `t`.
    pub async fn path_timer(&self, id: EdgeId, t: u64) -> Result<u64, TreeError> {
        let mut cache = HashMap::new();
        self.path_timer_memoized(id, t, &mut cache).await
    }

    fn path_timer_memoized<'a>(
        &'a self,
        id: EdgeId,
        t: u64,
        cache: &'a mut HashMap<EdgeId, u64>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<u64, TreeError>> + Send + 'a>>
    {
        Box::pin(async move {
            if let Some(cached) = cache.get(&id) {
                return Ok(*cached);
            }
            let local = self.local_timer(id, t).await?;
            let parents = self.ancestors(id).await?;
            let mut best = 0u64;
            for parent in parents {
                let parent_timer = self.path_timer_memoized(parent, t, cache).await?;
                best = best.max(parent_timer);
            }
            let total = local + best;
            cache.insert(id, total);
            Ok(total)
        })
    }

    pub async fn is_confirmable_by_timer(
        &self,
        id: EdgeId,
        t: u64,
        challenge_period_blocks: u64,
    ) -> Result<bool, TreeError> {
        Ok(self.path_timer(id, t).await? > challenge_period_blocks)
    }
}
