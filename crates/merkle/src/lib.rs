//! # Merkle - integrity tree over an ordered sequence of blobs
//!
//! A sorted run stores the root of a binary SHA-256 hash tree built over the
//! values of its records, in key order. Rebuilding the tree from the `.data`
//! file and comparing roots detects any change to the stored values.
//!
//! ## Construction
//!
//! ```text
//! level 0:  H(b0)   H(b1)   H(b2)   H(b2)'     <- odd count: last leaf duplicated
//!              \     /         \     /
//! level 1:   H(l0 ‖ l1)      H(l2 ‖ l2')
//!                   \           /
//! level 2:        H(n0 ‖ n1)  = root
//! ```
//!
//! Any level other than the root with an odd number of nodes has its last
//! node duplicated before pairing. The tree is kept as a flat vector of
//! levels; nodes refer to nothing but their digest, so there are no pointers
//! between them.
//!
//! Construction is a pure function of the blob sequence.

use sha2::{Digest as _, Sha256};

/// Width of a node digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 digest.
pub type Digest = [u8; DIGEST_LEN];

/// Binary hash tree, stored bottom-up: `levels[0]` are the leaves (padded to
/// an even count), the last level holds only the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Builds the tree over `blobs` in iteration order.
    ///
    /// An empty sequence yields a single-node tree whose root is the digest
    /// of the empty string.
    pub fn build<I, B>(blobs: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut leaves: Vec<Digest> = blobs
            .into_iter()
            .map(|b| hash_leaf(b.as_ref()))
            .collect();
        let leaf_count = leaves.len();

        if leaves.is_empty() {
            return Self {
                levels: vec![vec![hash_leaf(&[])]],
                leaf_count,
            };
        }

        pad_to_even(&mut leaves);
        let mut levels = vec![leaves];

        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let mut next: Vec<Digest> = current
                .chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            if next.len() > 1 {
                pad_to_even(&mut next);
            }
            levels.push(next);
        }

        Self { levels, leaf_count }
    }

    /// The root digest.
    #[must_use]
    pub fn root(&self) -> &Digest {
        // `levels` is never empty and its last level has exactly one node.
        &self.levels[self.levels.len() - 1][0]
    }

    /// Number of blobs the tree was built from (before padding).
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of levels, leaves and root included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Lowercase hex rendering of a digest, for logs and error messages.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hash_leaf(blob: &[u8]) -> Digest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&Sha256::digest(blob));
    out
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn pad_to_even(nodes: &mut Vec<Digest>) {
    if nodes.len() % 2 != 0 {
        if let Some(&last) = nodes.last() {
            nodes.push(last);
        }
    }
}
