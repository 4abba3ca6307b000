//! Prefix proofs: extending a Merkle expansion at height `pre` to the root
//! at height `post` over the same leaf prefix (spec §4.1, §6).

use serde::{Deserialize, Serialize};

use super::expansion::complete_subtree_root;
use super::{CommitmentError, MerkleExpansion};
use crate::hashing::H256;

/// Wire-encoded prefix proof: the caller's on-chain adapter re-encodes this
/// into the ABI tuple `(bytes32[] prefix_expansion, bytes32[] prefix_proof)`
/// (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixProof {
    /// `compact(pre_expansion)`.
    pub prefix_expansion: Vec<H256>,
    /// The complete-subtree roots that extend `pre` to `post`, in append
    /// order.
    pub prefix_proof: Vec<H256>,
}

/// The next level to append at when walking from `cur` to `end`: the
/// largest power-of-two-aligned chunk available at the current boundary,
/// capped by the remaining distance. `cur == 0` has no alignment
/// constraint of its own, so the cap alone decides; when `cur != 0`, the
/// step is the smaller of `cur`'s lowest set bit and the remaining
/// distance's highest set bit (spec §4.1).
fn next_subtree_level(cur: u64, end: u64) -> usize {
    let remaining = end - cur;
    let high_bit_remaining = 63 - remaining.leading_zeros();
    if cur == 0 {
        high_bit_remaining as usize
    } else {
        let low_bit_cur = cur.trailing_zeros();
        low_bit_cur.min(high_bit_remaining) as usize
    }
}

/// Generates a prefix proof from `pre_expansion` (at height `pre_height`)
/// to `pre_height + leaves.len()`, where `leaves` are the already-hashed
/// (`hash_leaf`-applied) leaves strictly after `pre_height`.
pub fn generate_prefix_proof(
    pre_height: u64,
    pre_expansion: &MerkleExpansion,
    leaves: &[H256],
) -> Result<PrefixProof, CommitmentError> {
    if pre_expansion.size() != pre_height {
        return Err(CommitmentError::InvalidArgument(format!(
            "pre_expansion size {} does not match pre_height {}",
            pre_expansion.size(),
            pre_height
        )));
    }
    if leaves.is_empty() {
        return Err(CommitmentError::InvalidHeight {
            pre: pre_height,
            post: pre_height,
        });
    }
    let post_height = pre_height + leaves.len() as u64;

    let mut working = pre_expansion.clone();
    let mut cur = pre_height;
    let mut offset = 0usize;
    let mut tail = Vec::new();

    while cur < post_height {
        let level = next_subtree_level(cur, post_height);
        let chunk_size = 1usize << level;
        let chunk = &leaves[offset..offset + chunk_size];
        let subtree_root = complete_subtree_root(chunk)?;
        working.append_complete_subtree(level, subtree_root)?;
        tail.push(subtree_root);
        cur += chunk_size as u64;
        offset += chunk_size;
    }

    Ok(PrefixProof {
        prefix_expansion: pre_expansion.compact(),
        prefix_proof: tail,
    })
}

/// Verifies that `proof` extends the expansion rooted at `pre_merkle`
/// (height `pre_height`) to `post_merkle` (height `post_height`).
///
/// Failure modes mirror spec §4.1: `InvalidHeight` (`pre >= post`),
/// `Misaligned`/`InvalidLevel` (malformed expansion reconstruction), and
/// `IncorrectProof` (the replayed root does not match `post_merkle`).
pub fn verify_prefix_proof(
    pre_height: u64,
    pre_merkle: H256,
    post_height: u64,
    post_merkle: H256,
    proof: &PrefixProof,
) -> Result<(), CommitmentError> {
    if pre_height >= post_height {
        return Err(CommitmentError::InvalidHeight {
            pre: pre_height,
            post: post_height,
        });
    }

    let mut working = MerkleExpansion::from_compact(pre_height, &proof.prefix_expansion)?;
    if working.root() != pre_merkle {
        return Err(CommitmentError::IncorrectProof);
    }

    let mut cur = pre_height;
    for subtree_root in &proof.prefix_proof {
        if cur >= post_height {
            return Err(CommitmentError::IncorrectProof);
        }
        let level = next_subtree_level(cur, post_height);
        working.append_complete_subtree(level, *subtree_root)?;
        cur += 1u64 << level;
    }

    if cur != post_height || working.root() != post_merkle {
        return Err(CommitmentError::IncorrectProof);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_leaf;
    use proptest::prelude::*;

    fn hashed_leaves(n: u64) -> Vec<H256> {
        (0..n).map(|i| hash_leaf(&i.to_be_bytes())).collect()
    }

    #[test]
    fn round_trips_for_a_range_of_pre_post_pairs() {
        let all_leaves = hashed_leaves(40);
        for (lo, hi) in [(0u64, 1u64), (0, 40), (3, 4), (1, 39), (17, 23), (0, 2)] {
            let mut pre_expansion = MerkleExpansion::empty();
            for leaf_hash in &all_leaves[..lo as usize] {
                pre_expansion
                    .append_complete_subtree(0, *leaf_hash)
                    .unwrap();
            }
            let pre_root = pre_expansion.root();

            let mut post_expansion = pre_expansion.clone();
            for leaf_hash in &all_leaves[lo as usize..hi as usize] {
                post_expansion
                    .append_complete_subtree(0, *leaf_hash)
                    .unwrap();
            }
            let post_root = post_expansion.root();

            let proof =
                generate_prefix_proof(lo, &pre_expansion, &all_leaves[lo as usize..hi as usize])
                    .unwrap();

            verify_prefix_proof(lo, pre_root, hi, post_root, &proof)
                .unwrap_or_else(|e| panic!("verification failed for ({lo},{hi}): {e:?}"));
        }
    }

    #[test]
    fn rejects_inverted_heights() {
        let exp = MerkleExpansion::empty();
        let proof = PrefixProof {
            prefix_expansion: vec![],
            prefix_proof: vec![],
        };
        let err = verify_prefix_proof(5, exp.root(), 5, exp.root(), &proof).unwrap_err();
        assert!(matches!(err, CommitmentError::InvalidHeight { .. }));
    }

    #[test]
    fn rejects_tampered_tail() {
        let all_leaves = hashed_leaves(8);
        let pre_expansion = MerkleExpansion::empty();
        let pre_root = pre_expansion.root();

        let mut post_expansion = pre_expansion.clone();
        for leaf_hash in &all_leaves {
            post_expansion.append_complete_subtree(0, *leaf_hash).unwrap();
        }
        let post_root = post_expansion.root();

        let mut proof = generate_prefix_proof(0, &pre_expansion, &all_leaves).unwrap();
        // Flip a byte in the tail to simulate a corrupted/forged proof.
        if let Some(first) = proof.prefix_proof.first_mut() {
            first.0[0] ^= 0xFF;
        }

        let err = verify_prefix_proof(0, pre_root, 8, post_root, &proof).unwrap_err();
        assert_eq!(err, CommitmentError::IncorrectProof);
    }

    proptest::proptest! {
        /// P2 (prefix-proof round-trip): for any `0 <= lo < hi <= n`, a
        /// generated proof from `lo` to `hi` verifies against the roots
        /// recomputed independently at those two heights.
        #[test]
        fn prefix_proof_round_trips_for_arbitrary_lo_hi(
            n in 1u64..48,
            lo_frac in 0.0f64..1.0,
            hi_frac in 0.0f64..1.0,
        ) {
            let all_leaves = hashed_leaves(n);
            let mut lo = (lo_frac * n as f64) as u64;
            let mut hi = (hi_frac * n as f64) as u64;
            if lo == hi {
                hi = (hi + 1).min(n);
            }
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            prop_assume!(lo < hi);

            let mut pre_expansion = MerkleExpansion::empty();
            for leaf_hash in &all_leaves[..lo as usize] {
                pre_expansion.append_complete_subtree(0, *leaf_hash).unwrap();
            }
            let pre_root = pre_expansion.root();

            let mut post_expansion = pre_expansion.clone();
            for leaf_hash in &all_leaves[lo as usize..hi as usize] {
                post_expansion.append_complete_subtree(0, *leaf_hash).unwrap();
            }
            let post_root = post_expansion.root();

            let proof =
                generate_prefix_proof(lo, &pre_expansion, &all_leaves[lo as usize..hi as usize]).unwrap();

            prop_assert!(verify_prefix_proof(lo, pre_root, hi, post_root, &proof).is_ok());
        }
    }
}
