//! Note commitment tree hashing and witnesses
//!
//! The tree has depth 32, allowing for ~4 billion notes. Maintaining the
//! incremental tree is the wallet's job; this module only hashes nodes,
//! checks authentication paths, and builds witnesses for a fixed leaf set.

use std::sync::OnceLock;

use blake2s_simd::Params as Blake2sParams;
use borsh::{BorshDeserialize, BorshSerialize};

/// Depth of the commitment tree (2^32 = ~4 billion notes)
pub const TREE_DEPTH: usize = 32;

/// Value of an empty leaf
pub const EMPTY_LEAF: [u8; 32] = [0u8; 32];

static EMPTY_ROOTS: OnceLock<[[u8; 32]; TREE_DEPTH + 1]> = OnceLock::new();

/// Hash two children at `depth` (0 = leaves' parents)
pub fn merkle_hash(depth: usize, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    // Domain separation: include depth in personalization
    let mut personalization = [0u8; 8];
    personalization[..7].copy_from_slice(b"Zcash_M");
    personalization[7] = depth as u8;

    let hash = Blake2sParams::new()
        .hash_length(32)
        .personal(&personalization)
        .to_state()
        .update(left)
        .update(right)
        .finalize();

    let mut result = [0u8; 32];
    result.copy_from_slice(hash.as_bytes());
    result
}

/// Roots of empty subtrees, indexed by height
pub fn empty_roots() -> &'static [[u8; 32]; TREE_DEPTH + 1] {
    EMPTY_ROOTS.get_or_init(|| {
        let mut roots = [EMPTY_LEAF; TREE_DEPTH + 1];
        for i in 1..=TREE_DEPTH {
            roots[i] = merkle_hash(i - 1, &roots[i - 1], &roots[i - 1]);
        }
        roots
    })
}

/// Merkle authentication path for proving membership
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub auth_path: [[u8; 32]; TREE_DEPTH],
    /// Leaf position; bit i set means the node at depth i is a right child
    pub position: u64,
}

impl MerklePath {
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Root reached by hashing `leaf` up the path
    pub fn root(&self, leaf: &[u8; 32]) -> [u8; 32] {
        self.auth_path
            .iter()
            .enumerate()
            .fold(*leaf, |node, (depth, sibling)| {
                if (self.position >> depth) & 1 == 1 {
                    merkle_hash(depth, sibling, &node)
                } else {
                    merkle_hash(depth, &node, sibling)
                }
            })
    }
}

/// Fully materialized tree over a fixed set of leaves
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// levels[0] are the leaves, levels[TREE_DEPTH] holds the root
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[[u8; 32]]) -> Self {
        let empty = empty_roots();
        let mut levels = Vec::with_capacity(TREE_DEPTH + 1);
        levels.push(leaves.to_vec());

        for depth in 0..TREE_DEPTH {
            let below = &levels[depth];
            let above = below
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&empty[depth]);
                    merkle_hash(depth, &pair[0], right)
                })
                .collect();
            levels.push(above);
        }

        Self { levels }
    }

    pub fn size(&self) -> usize {
        self.levels[0].len()
    }

    /// The anchor
    pub fn root(&self) -> [u8; 32] {
        self.levels[TREE_DEPTH]
            .first()
            .copied()
            .unwrap_or(empty_roots()[TREE_DEPTH])
    }

    /// Authentication path for the leaf at `position`
    pub fn witness(&self, position: u64) -> Option<MerklePath> {
        let index = usize::try_from(position).ok()?;
        if index >= self.size() {
            return None;
        }

        let empty = empty_roots();
        let mut auth_path = [EMPTY_LEAF; TREE_DEPTH];
        for (depth, sibling) in auth_path.iter_mut().enumerate() {
            let sibling_index = (index >> depth) ^ 1;
            *sibling = self.levels[depth]
                .get(sibling_index)
                .copied()
                .unwrap_or(empty[depth]);
        }

        Some(MerklePath {
            auth_path,
            position,
        })
    }
}
