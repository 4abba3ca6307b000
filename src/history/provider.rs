//! [`HistoryCommitmentProvider`]: turns the two collaborator traits into
//! concrete [`HistoryCommitment`]s at all three challenge levels (spec
//! §4.2).

use thiserror::Error;

use super::collectors::{MachineHashCollector, MessageStateCollector};
use super::HistoryCommitment;
use crate::commitment::{generate_prefix_proof, CommitmentError, MerkleExpansion};
use crate::hashing::H256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryProviderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("collector error: {0}")]
    Collector(String),
    #[error("commitment error: {0}")]
    Commitment(#[from] CommitmentError),
}

/// Which of the three challenge levels a `history_commitment` call targets,
/// inferred from `start_heights.len()` (spec §4.2): one coordinate names a
/// block, two name a big step within a block, three name a small step
/// within a big step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeLevel {
    Block,
    BigStep,
    SmallStep,
}

impl ChallengeLevel {
    fn from_start_heights(start_heights: &[u64]) -> Result<Self, HistoryProviderError> {
        match start_heights.len() {
            1 => Ok(ChallengeLevel::Block),
            2 => Ok(ChallengeLevel::BigStep),
            3 => Ok(ChallengeLevel::SmallStep),
            n => Err(HistoryProviderError::InvalidArgument(format!(
                "start_heights must have 1, 2, or 3 coordinates, got {n}"
            ))),
        }
    }

    fn index(self) -> usize {
        match self {
            ChallengeLevel::Block => 0,
            ChallengeLevel::BigStep => 1,
            ChallengeLevel::SmallStep => 2,
        }
    }
}

pub struct HistoryCommitmentProvider<M, S>
where
    M: MachineHashCollector,
    S: MessageStateCollector,
{
    machine: M,
    message_state: S,
    /// `[H0, H1, H2]` — the block / big-step / small-step leaf-height
    /// constants (spec §6 configuration table).
    challenge_leaf_heights: [u64; 3],
    /// Opcodes grouped into a single big step.
    opcodes_per_big_step: u64,
}

impl<M, S> HistoryCommitmentProvider<M, S>
where
    M: MachineHashCollector,
    S: MessageStateCollector,
{
    pub fn new(
        machine: M,
        message_state: S,
        challenge_leaf_heights: [u64; 3],
        opcodes_per_big_step: u64,
    ) -> Self {
        Self {
            machine,
            message_state,
            challenge_leaf_heights,
            opcodes_per_big_step,
        }
    }

    pub async fn history_commitment(
        &self,
        wasm_root: H256,
        batch: u64,
        start_heights: &[u64],
        up_to: Option<u64>,
    ) -> Result<HistoryCommitment, HistoryProviderError> {
        if start_heights.is_empty() {
            return Err(HistoryProviderError::InvalidArgument(
                "start_heights must not be empty".to_string(),
            ));
        }
        let level = ChallengeLevel::from_start_heights(start_heights)?;
        let max_height = self.challenge_leaf_heights[level.index()];
        let height = match up_to {
            Some(h) if h > max_height => {
                return Err(HistoryProviderError::InvalidArgument(format!(
                    "up_to {h} exceeds level leaf-count constant {max_height}"
                )))
            }
            Some(h) => h,
            None => max_height,
        };

        let leaves = match level {
            ChallengeLevel::Block => self.block_leaves(batch, start_heights[0], height).await?,
            ChallengeLevel::BigStep => {
                self.big_step_leaves(wasm_root, start_heights, height).await?
            }
            ChallengeLevel::SmallStep => {
                self.small_step_leaves(wasm_root, start_heights, height).await?
            }
        };

        self.commitment_from_leaves(height, &leaves)
    }

    /// Generates a prefix proof extending the commitment at `pre_height`
    /// to the commitment at `post_height` over the same `start_heights`
    /// (the bisection action of spec §4.4: "obtain a prefix proof from
    /// `mid` to `end_height`"). Re-derives the full leaf trajectory up to
    /// `post_height`, consistent with the provider being stateless and
    /// re-entrant (spec §5).
    pub async fn prefix_proof(
        &self,
        wasm_root: H256,
        batch: u64,
        start_heights: &[u64],
        pre_height: u64,
        post_height: u64,
    ) -> Result<crate::commitment::PrefixProof, HistoryProviderError> {
        if pre_height >= post_height {
            return Err(HistoryProviderError::InvalidArgument(format!(
                "pre_height {pre_height} must be less than post_height {post_height}"
            )));
        }
        let level = ChallengeLevel::from_start_heights(start_heights)?;
        let max_height = self.challenge_leaf_heights[level.index()];
        if post_height > max_height {
            return Err(HistoryProviderError::InvalidArgument(format!(
                "post_height {post_height} exceeds level leaf-count constant {max_height}"
            )));
        }

        let leaves = match level {
            ChallengeLevel::Block => {
                self.block_leaves(batch, start_heights[0], post_height).await?
            }
            ChallengeLevel::BigStep => {
                self.big_step_leaves(wasm_root, start_heights, post_height).await?
            }
            ChallengeLevel::SmallStep => {
                self.small_step_leaves(wasm_root, start_heights, post_height).await?
            }
        };

        let mut pre_expansion = MerkleExpansion::empty();
        for leaf in &leaves[..=pre_height as usize] {
            pre_expansion.append_leaf(leaf.as_bytes())?;
        }
        let suffix: Vec<H256> = leaves[pre_height as usize + 1..]
            .iter()
            .map(|l| crate::hashing::hash_leaf(l.as_bytes()))
            .collect();

        Ok(generate_prefix_proof(pre_height + 1, &pre_expansion, &suffix)?)
    }

    async fn block_leaves(
        &self,
        batch: u64,
        from_height: u64,
        height: u64,
    ) -> Result<Vec<H256>, HistoryProviderError> {
        let mut leaves = Vec::with_capacity(height as usize + 1);
        for i in 0..=height {
            leaves.push(
                self.message_state
                    .state_hash_at(batch, from_height + i)
                    .await?,
            );
        }
        Ok(leaves)
    }

    /// Requests `height * opcodes_per_big_step + 1` consecutive per-opcode
    /// hashes starting at the block's big-step offset, then subsamples
    /// every `opcodes_per_big_step`-th entry to form the `height + 1`
    /// big-step-granularity leaves. `start_heights[1]` is the starting
    /// big-step index within the block.
    async fn big_step_leaves(
        &self,
        wasm_root: H256,
        start_heights: &[u64],
        height: u64,
    ) -> Result<Vec<H256>, HistoryProviderError> {
        let k = self.opcodes_per_big_step;
        let from_step = start_heights[1] * k;
        let total_opcodes = height * k;
        let per_opcode = self
            .fetch_padded(wasm_root, start_heights[0], from_step, total_opcodes + 1)
            .await?;
        Ok((0..=height)
            .map(|i| per_opcode[(i * k) as usize])
            .collect())
    }

    /// Like [`Self::big_step_leaves`] but at single-opcode granularity:
    /// every requested hash is itself a leaf. `start_heights[1]` is the
    /// big step, `start_heights[2]` the opcode offset within it.
    async fn small_step_leaves(
        &self,
        wasm_root: H256,
        start_heights: &[u64],
        height: u64,
    ) -> Result<Vec<H256>, HistoryProviderError> {
        let k = self.opcodes_per_big_step;
        let from_step = start_heights[1] * k + start_heights[2];
        self.fetch_padded(wasm_root, start_heights[0], from_step, height + 1)
            .await
    }

    /// Calls the machine-hash collector and pads any shortfall (the
    /// machine halting before `num_hashes` steps) by replaying the final
    /// hash — required so two observers with different view depths still
    /// agree on the commitment past the halt point (spec §4.2).
    async fn fetch_padded(
        &self,
        wasm_root: H256,
        block_height: u64,
        from_step: u64,
        num_hashes: u64,
    ) -> Result<Vec<H256>, HistoryProviderError> {
        let mut hashes = self
            .machine
            .machine_hashes(wasm_root, block_height, from_step, num_hashes)
            .await?;
        let last = *hashes.last().ok_or_else(|| {
            HistoryProviderError::Collector(
                "machine-hash collector returned zero hashes".to_string(),
            )
        })?;
        while (hashes.len() as u64) < num_hashes {
            hashes.push(last);
        }
        Ok(hashes)
    }

    fn commitment_from_leaves(
        &self,
        height: u64,
        leaves: &[H256],
    ) -> Result<HistoryCommitment, HistoryProviderError> {
        let first_leaf = leaves[0];
        let last_leaf = *leaves.last().expect("leaves is never empty");

        let mut prefix_expansion = MerkleExpansion::empty();
        for leaf in &leaves[..leaves.len() - 1] {
            prefix_expansion.append_leaf(leaf.as_bytes())?;
        }
        let mut full_expansion = prefix_expansion.clone();
        full_expansion.append_leaf(last_leaf.as_bytes())?;
        let merkle = full_expansion.root();

        let last_leaf_proof =
            generate_prefix_proof(height, &prefix_expansion, &[crate::hashing::hash_leaf(
                last_leaf.as_bytes(),
            )])?;

        Ok(HistoryCommitment {
            height,
            merkle,
            first_leaf,
            last_leaf,
            last_leaf_proof,
        })
    }
}
