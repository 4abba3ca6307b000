//! Keccak-256 hashing primitives shared by the commitment library, the
//! history-commitment provider, and the edge-id scheme (spec §6).

use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// A 32-byte digest. Used for Merkle roots, leaf hashes, state hashes, and
/// edge/mutual identifiers alike — the protocol never distinguishes these
/// at the type level, only by which hash function produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct H256(pub [u8; 32]);

impl H256 {
    pub const ZERO: H256 = H256([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", hex::encode(self.0))
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for H256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(H256(out))
    }
}

/// `keccak(left ‖ right)` — the internal-node hash used by the Merkle
/// expansion (spec §4.1, §6).
pub fn hash_node(left: &H256, right: &H256) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    H256(hasher.finalize().into())
}

/// `keccak(leaf_bytes)` — leaves are always re-hashed before inclusion so
/// they can never collide with an interior node hash (spec §4.1, §6).
pub fn hash_leaf(leaf: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(leaf);
    H256(hasher.finalize().into())
}

/// Generic keccak over an arbitrary sequence of byte slices, concatenated
/// in order. Used for the edge-id / mutual-id / state-hash schemes, each of
/// which hashes a fixed tuple of fields (spec §6).
pub fn keccak_concat(parts: &[&[u8]]) -> H256 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    H256(hasher.finalize().into())
}
