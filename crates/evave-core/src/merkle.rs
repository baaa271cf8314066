//! Merkle log: commitments and inclusion proofs over ordered impressions.
//!
//! The tree follows the authority's tree-building rule:
//! - parents are `keccak256(left || right)`
//! - an unpaired node at the end of a level is promoted unchanged
//! - a single leaf is its own root
//! - an empty log commits to [`Hash32::ZERO`]
//!
//! Proofs list siblings from the leaf upward. Promoted levels contribute no
//! step, so proof length varies with the leaf's position.

use serde::{Deserialize, Serialize};

use crate::crypto::keccak256;
use crate::error::{CoreError, Result};
use crate::record::ImpressionRecord;
use crate::types::Hash32;

/// How sibling pairs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PairOrdering {
    /// `keccak256(left || right)` by tree position. Order-preserving.
    #[default]
    Positional,
    /// `keccak256(min || max)`. Proof directions are ignored.
    Sorted,
}

impl PairOrdering {
    fn combine(self, left: &Hash32, right: &Hash32) -> Hash32 {
        let (a, b) = match self {
            PairOrdering::Positional => (left, right),
            PairOrdering::Sorted if left <= right => (left, right),
            PairOrdering::Sorted => (right, left),
        };
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&a.0);
        buf[32..].copy_from_slice(&b.0);
        keccak256(&buf)
    }
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling node at this level.
    pub sibling: Hash32,
    /// Whether the sibling sits to the left of the running hash.
    pub is_left_sibling: bool,
}

/// An inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf the proof was generated for.
    pub index: usize,
    /// Sibling path from the leaf to the root.
    pub steps: Vec<ProofStep>,
}

/// A Merkle tree over an ordered sequence of leaf hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves; the last level holds the root.
    levels: Vec<Vec<Hash32>>,
    ordering: PairOrdering,
}

impl MerkleTree {
    /// Build a positional tree over `leaves`.
    pub fn build(leaves: &[Hash32]) -> Self {
        Self::build_with(leaves, PairOrdering::Positional)
    }

    /// Build a tree with an explicit pair ordering.
    pub fn build_with(leaves: &[Hash32], ordering: PairOrdering) -> Self {
        if leaves.is_empty() {
            return Self {
                levels: Vec::new(),
                ordering,
            };
        }

        let mut levels = vec![leaves.to_vec()];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next: Vec<Hash32> = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => ordering.combine(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels, ordering }
    }

    /// Build the tree committing to an impression log.
    pub fn from_impressions(impressions: &[ImpressionRecord]) -> Result<Self> {
        let leaves = impressions
            .iter()
            .map(ImpressionRecord::leaf_hash)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::build(&leaves))
    }

    /// The root commitment.
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(Hash32::ZERO)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The leaf hash at `index`.
    pub fn leaf(&self, index: usize) -> Option<Hash32> {
        self.levels.first().and_then(|l| l.get(index)).copied()
    }

    /// The pair ordering this tree was built with.
    pub fn ordering(&self) -> PairOrdering {
        self.ordering
    }

    /// The inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        if index >= self.len() {
            return Err(CoreError::InvalidProof(format!(
                "leaf index {} out of range for {} leaves",
                index,
                self.len()
            )));
        }

        let mut steps = Vec::new();
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = i ^ 1;
            if let Some(node) = level.get(sibling) {
                steps.push(ProofStep {
                    sibling: *node,
                    is_left_sibling: i % 2 == 1,
                });
            }
            i /= 2;
        }

        Ok(MerkleProof { index, steps })
    }
}

/// Commit to an impression log.
pub fn impression_log_root(impressions: &[ImpressionRecord]) -> Result<Hash32> {
    Ok(MerkleTree::from_impressions(impressions)?.root())
}

/// Verify a positional inclusion proof.
pub fn verify(root: &Hash32, leaf: &Hash32, proof: &MerkleProof) -> bool {
    verify_with(root, leaf, proof, PairOrdering::Positional)
}

/// Verify an inclusion proof with an explicit pair ordering.
pub fn verify_with(
    root: &Hash32,
    leaf: &Hash32,
    proof: &MerkleProof,
    ordering: PairOrdering,
) -> bool {
    let computed = proof.steps.iter().fold(*leaf, |acc, step| {
        if step.is_left_sibling {
            ordering.combine(&step.sibling, &acc)
        } else {
            ordering.combine(&acc, &step.sibling)
        }
    });
    computed == *root
}

/// Verify a positional proof against a tree of known size.
///
/// Directions are derived from `index` rather than trusted from the proof.
/// Returns `InvalidProof` if the index is out of range or the proof has the
/// wrong number of steps for that position.
pub fn verify_at(
    root: &Hash32,
    leaf: &Hash32,
    index: usize,
    leaf_count: usize,
    proof: &MerkleProof,
) -> Result<bool> {
    if index >= leaf_count {
        return Err(CoreError::InvalidProof(format!(
            "leaf index {} out of range for {} leaves",
            index, leaf_count
        )));
    }

    let directions = path_directions(index, leaf_count);
    if directions.len() != proof.steps.len() {
        return Err(CoreError::InvalidProof(format!(
            "expected {} proof steps, got {}",
            directions.len(),
            proof.steps.len()
        )));
    }

    let computed = proof
        .steps
        .iter()
        .zip(directions)
        .fold(*leaf, |acc, (step, is_left)| {
            if is_left {
                PairOrdering::Positional.combine(&step.sibling, &acc)
            } else {
                PairOrdering::Positional.combine(&acc, &step.sibling)
            }
        });
    Ok(computed == *root)
}

/// Sibling directions along the path of `index` in a tree of `leaf_count` leaves.
fn path_directions(mut index: usize, leaf_count: usize) -> Vec<bool> {
    let mut directions = Vec::new();
    let mut width = leaf_count;
    while width > 1 {
        if index ^ 1 < width {
            directions.push(index % 2 == 1);
        }
        index /= 2;
        width = (width + 1) / 2;
    }
    directions
}
