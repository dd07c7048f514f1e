//! Merkle tree over a round's record hashes.
//!
//! Each round summary commits to the root of its records, so one record can
//! be proven part of a round without replaying the running-hash chain.
//! Levels with an odd number of nodes are padded with [`Hash::ZERO`]; inner
//! nodes are domain-separated from leaves.

use crate::Hash;
use serde::{Deserialize, Serialize};

const NODE_DOMAIN: &[u8] = b"concord/record-tree/node";

/// Inclusion proof: the sibling at every level from the leaf up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the leaf.
    pub leaf_index: u32,
    /// `siblings[0]` is the leaf's sibling; the last entry is a child of the root.
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    /// Whether `leaf` sits at `leaf_index` under `root`.
    pub fn verify(&self, leaf: &Hash, root: &Hash) -> bool {
        let folded = self
            .siblings
            .iter()
            .enumerate()
            .fold(*leaf, |current, (level, sibling)| {
                if (self.leaf_index >> level) & 1 == 0 {
                    parent(&current, sibling)
                } else {
                    parent(sibling, &current)
                }
            });
        folded == *root
    }

    /// Number of levels above the leaf.
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

fn parent(left: &Hash, right: &Hash) -> Hash {
    Hash::from_parts(&[NODE_DOMAIN, left.as_bytes(), right.as_bytes()])
}

/// Every level of the tree, leaves first, root last.
fn levels(leaves: &[Hash]) -> Vec<Vec<Hash>> {
    let mut levels = vec![leaves.to_vec()];
    while let Some(below) = levels.last().filter(|level| level.len() > 1) {
        let above = below
            .chunks(2)
            .map(|pair| parent(&pair[0], pair.get(1).unwrap_or(&Hash::ZERO)))
            .collect();
        levels.push(above);
    }
    levels
}

/// Root over `leaves` and a proof for each leaf, in input order.
///
/// No leaves give [`Hash::ZERO`] and no proofs.
pub fn build_merkle_tree_with_proofs(leaves: &[Hash]) -> (Hash, Vec<MerkleProof>) {
    if leaves.is_empty() {
        return (Hash::ZERO, Vec::new());
    }
    let levels = levels(leaves);
    let root = levels[levels.len() - 1][0];

    let proofs = (0..leaves.len())
        .map(|leaf_index| {
            let siblings = levels[..levels.len() - 1]
                .iter()
                .enumerate()
                .map(|(height, level)| {
                    let index = (leaf_index >> height) ^ 1;
                    level.get(index).copied().unwrap_or(Hash::ZERO)
                })
                .collect();
            MerkleProof {
                leaf_index: leaf_index as u32,
                siblings,
            }
        })
        .collect();
    (root, proofs)
}

/// Root over `leaves`, or [`Hash::ZERO`] when there are none.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    match leaves.len() {
        0 => Hash::ZERO,
        _ => {
            let levels = levels(leaves);
            levels[levels.len() - 1][0]
        }
    }
}
