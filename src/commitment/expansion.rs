//! Merkle expansion: a sparse vector of per-level complete-subtree roots,
//! the binary-counter representation behind an append-only Merkle history
//! (spec §4.1). Slot `i` is occupied iff bit `i` of the committed size is 1.

use serde::{Deserialize, Serialize};

use super::CommitmentError;
use crate::hashing::{hash_leaf, hash_node, H256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MerkleExpansion {
    slots: Vec<Option<H256>>,
    size: u64,
}

impl MerkleExpansion {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bit-length of the committed size — the number of levels currently
    /// structurally valid to append at (spec: "current height").
    fn level_bound(&self) -> usize {
        (64 - self.size.leading_zeros()) as usize
    }

    /// Places `hash` at `level`, carrying upward through any occupied
    /// slots it collides with. Fails if `level` exceeds the current level
    /// bound, or if any slot below `level` is already occupied
    /// (misaligned — the expansion would no longer correspond to a valid
    /// append-only leaf sequence).
    pub fn append_complete_subtree(&mut self, level: usize, hash: H256) -> Result<(), CommitmentError> {
        if level > self.level_bound() {
            return Err(CommitmentError::InvalidLevel {
                level,
                size: self.size,
            });
        }
        for i in 0..level.min(self.slots.len()) {
            if self.slots[i].is_some() {
                return Err(CommitmentError::Misaligned { level });
            }
        }

        let mut lvl = level;
        let mut carry = hash;
        loop {
            if lvl >= self.slots.len() {
                self.slots.push(Some(carry));
                break;
            }
            match self.slots[lvl].take() {
                Some(existing) => {
                    carry = hash_node(&existing, &carry);
                    lvl += 1;
                }
                None => {
                    self.slots[lvl] = Some(carry);
                    break;
                }
            }
        }
        self.size += 1u64 << level;
        Ok(())
    }

    /// `append_complete_subtree(0, keccak(leaf))` — leaves are always
    /// re-hashed before inclusion so they can never collide with an
    /// interior node hash (spec §4.1, §6).
    pub fn append_leaf(&mut self, leaf: &[u8]) -> Result<(), CommitmentError> {
        self.append_complete_subtree(0, hash_leaf(leaf))
    }

    /// Left-fold the occupied slots bottom-up with keccak; an empty
    /// expansion roots to the zero hash.
    pub fn root(&self) -> H256 {
        let mut acc: Option<H256> = None;
        for slot in &self.slots {
            if let Some(h) = slot {
                acc = Some(match acc {
                    None => *h,
                    Some(prev) => hash_node(h, &prev),
                });
            }
        }
        acc.unwrap_or(H256::ZERO)
    }

    /// Dense serialization: the occupied hashes in ascending level order.
    /// Paired with `size()` this losslessly round-trips via
    /// [`MerkleExpansion::from_compact`].
    pub fn compact(&self) -> Vec<H256> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    /// Reconstructs a [`MerkleExpansion`] from a size and its compact
    /// hash list.
    pub fn from_compact(size: u64, hashes: &[H256]) -> Result<Self, CommitmentError> {
        let level_bound = if size == 0 {
            0
        } else {
            64 - size.leading_zeros()
        } as usize;
        let mut slots = vec![None; level_bound];
        let mut it = hashes.iter();
        for level in 0..level_bound {
            if (size >> level) & 1 == 1 {
                let h = it.next().ok_or_else(|| {
                    CommitmentError::InvalidArgument(
                        "compact hash list shorter than size's popcount".to_string(),
                    )
                })?;
                slots[level] = Some(*h);
            }
        }
        if it.next().is_some() {
            return Err(CommitmentError::InvalidArgument(
                "compact hash list longer than size's popcount".to_string(),
            ));
        }
        Ok(Self { slots, size })
    }
}

/// Computes the root of a complete subtree over exactly `leaves.len()`
/// already-hashed leaves. `leaves.len()` must be a power of two (including
/// one); used by prefix-proof generation to materialize the hash for each
/// complete-subtree chunk it appends.
pub(super) fn complete_subtree_root(leaves: &[H256]) -> Result<H256, CommitmentError> {
    if leaves.is_empty() || !leaves.len().is_power_of_two() {
        return Err(CommitmentError::InvalidArgument(format!(
            "complete subtree requires a power-of-two leaf count, got {}",
            leaves.len()
        )));
    }
    Ok(complete_subtree_root_unchecked(leaves))
}

fn complete_subtree_root_unchecked(leaves: &[H256]) -> H256 {
    if leaves.len() == 1 {
        return leaves[0];
    }
    let mid = leaves.len() / 2;
    hash_node(
        &complete_subtree_root_unchecked(&leaves[..mid]),
        &complete_subtree_root_unchecked(&leaves[mid..]),
    )
}
