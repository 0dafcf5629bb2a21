//! Indexed Merkle Tree of Spent Nullifiers
//!
//! Leaves form a sorted linked list by value: each leaf points at the next
//! larger value (`next_value = 0` marks the list tail). Non-membership of a
//! target reduces to exhibiting the "low nullifier", the unique predecessor
//! leaf whose interval covers the target, together with its Merkle path.
//!
//! Leaf hash is `Poseidon₃(value, next_value, next_idx)`; inner nodes are
//! `Poseidon₂(left, right)`. Unpopulated subtrees use precomputed per-level
//! empty hashes, so the tree stays sparse at height 20.

use ark_ff::{PrimeField, Zero};
use std::collections::HashMap;

use crate::curve::{bn_scalar_to_bytes, BnFr};
use crate::errors::{HalpError, HalpResult};
use crate::poseidon;

/// Fixed registry tree height (≈ 10⁶ leaf capacity).
pub const TREE_HEIGHT: usize = 20;

/// `a < b` over the canonical integer representatives.
pub(crate) fn fr_lt(a: &BnFr, b: &BnFr) -> bool {
    a.into_bigint() < b.into_bigint()
}

/// One linked-list leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedMerkleLeaf {
    pub value: BnFr,
    pub next_value: BnFr,
    pub next_idx: u32,
}

impl IndexedMerkleLeaf {
    fn head() -> Self {
        Self {
            value: BnFr::zero(),
            next_value: BnFr::zero(),
            next_idx: 0,
        }
    }

    pub fn hash(&self) -> BnFr {
        poseidon::hash3(self.value, self.next_value, BnFr::from(self.next_idx as u64))
    }
}

/// Non-membership proof: the low nullifier plus its authentication path.
#[derive(Debug, Clone)]
pub struct NonMembershipProof {
    pub leaf_index: usize,
    pub low_value: BnFr,
    pub low_next_value: BnFr,
    pub low_next_idx: u32,
    pub siblings: Vec<BnFr>,
    /// Bit `i` is 1 when the path node at level `i` is a right child.
    pub path_indices: Vec<u8>,
    pub root: BnFr,
}

impl NonMembershipProof {
    /// The proof an empty registry yields for any nonzero target: the head
    /// leaf with every sibling taken from the empty-subtree hashes.
    pub fn empty_tree(height: usize) -> Self {
        let empty = empty_subtree_hashes(height);
        Self {
            leaf_index: 0,
            low_value: BnFr::zero(),
            low_next_value: BnFr::zero(),
            low_next_idx: 0,
            siblings: empty[..height].to_vec(),
            path_indices: vec![0; height],
            root: empty[height],
        }
    }
}

/// Per-level empty hashes: `E[0] = Poseidon₃(0,0,0)`, `E[l+1] = Poseidon₂(E[l], E[l])`.
pub fn empty_subtree_hashes(height: usize) -> Vec<BnFr> {
    let mut hashes = Vec::with_capacity(height + 1);
    hashes.push(IndexedMerkleLeaf::head().hash());
    for level in 0..height {
        let prev = hashes[level];
        hashes.push(poseidon::hash2(prev, prev));
    }
    hashes
}

/// The registry tree. Leaf 0 is the distinguished head of the linked list.
#[derive(Debug)]
pub struct IndexedMerkleTree {
    height: usize,
    leaves: Vec<IndexedMerkleLeaf>,
    index_of: HashMap<[u8; 32], usize>,
    empty: Vec<BnFr>,
}

impl IndexedMerkleTree {
    pub fn new(height: usize) -> Self {
        assert!(height > 0 && height <= 31, "unsupported tree height");
        Self {
            height,
            leaves: vec![IndexedMerkleLeaf::head()],
            index_of: HashMap::new(),
            empty: empty_subtree_hashes(height),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of leaves, including the head.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn contains(&self, value: &BnFr) -> bool {
        self.index_of.contains_key(&bn_scalar_to_bytes(value))
    }

    /// Index of the low nullifier for `value`: the unique leaf with
    /// `leaf.value < value` and (`next_value = 0` or `next_value > value`).
    /// Unique by the sorted-list invariant; only called for fresh values.
    fn low_index(&self, value: &BnFr) -> usize {
        self.leaves
            .iter()
            .position(|leaf| {
                fr_lt(&leaf.value, value)
                    && (leaf.next_value.is_zero() || fr_lt(value, &leaf.next_value))
            })
            .expect("sorted-list invariant guarantees a predecessor")
    }

    /// Insert a fresh nullifier, returning its leaf index.
    pub fn insert(&mut self, value: BnFr) -> HalpResult<usize> {
        if value.is_zero() {
            return Err(HalpError::invalid_input(
                "zero is reserved for the head leaf",
            ));
        }
        if self.contains(&value) {
            return Err(HalpError::already_exists("nullifier already in tree"));
        }
        if self.leaves.len() >= (1usize << self.height) {
            return Err(HalpError::internal("registry tree is full"));
        }

        let low = self.low_index(&value);
        let new_idx = self.leaves.len();
        let new_leaf = IndexedMerkleLeaf {
            value,
            next_value: self.leaves[low].next_value,
            next_idx: self.leaves[low].next_idx,
        };
        self.leaves.push(new_leaf);
        self.leaves[low].next_value = value;
        self.leaves[low].next_idx = new_idx as u32;
        self.index_of.insert(bn_scalar_to_bytes(&value), new_idx);
        Ok(new_idx)
    }

    /// All populated node levels, leaves first. Level `l+1` pairs level `l`
    /// nodes, substituting the empty hash for missing right siblings.
    fn levels(&self) -> Vec<Vec<BnFr>> {
        let mut levels = Vec::with_capacity(self.height + 1);
        levels.push(self.leaves.iter().map(IndexedMerkleLeaf::hash).collect::<Vec<_>>());
        for level in 0..self.height {
            let current = &levels[level];
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in 0..(current.len() + 1) / 2 {
                let left = current[2 * pair];
                let right = current
                    .get(2 * pair + 1)
                    .copied()
                    .unwrap_or(self.empty[level]);
                next.push(poseidon::hash2(left, right));
            }
            levels.push(next);
        }
        levels
    }

    /// Current root.
    pub fn root(&self) -> BnFr {
        self.levels()[self.height][0]
    }

    /// Build a non-membership proof for a value not yet in the tree.
    pub fn non_membership_proof(&self, value: &BnFr) -> HalpResult<NonMembershipProof> {
        if value.is_zero() {
            return Err(HalpError::invalid_input(
                "zero is reserved for the head leaf",
            ));
        }
        if self.contains(value) {
            return Err(HalpError::NullifierReused);
        }

        let low = self.low_index(value);
        let levels = self.levels();
        let mut siblings = Vec::with_capacity(self.height);
        let mut path_indices = Vec::with_capacity(self.height);
        let mut idx = low;
        for level in 0..self.height {
            let sibling = levels[level]
                .get(idx ^ 1)
                .copied()
                .unwrap_or(self.empty[level]);
            siblings.push(sibling);
            path_indices.push((idx & 1) as u8);
            idx >>= 1;
        }

        let low_leaf = &self.leaves[low];
        Ok(NonMembershipProof {
            leaf_index: low,
            low_value: low_leaf.value,
            low_next_value: low_leaf.next_value,
            low_next_idx: low_leaf.next_idx,
            siblings,
            path_indices,
            root: levels[self.height][0],
        })
    }
}

/// Check a non-membership proof for `value` against the root it carries.
///
/// Mirrors the in-circuit checks: interval ordering around the low
/// nullifier, then the Poseidon path fold.
pub fn verify_non_membership(value: &BnFr, proof: &NonMembershipProof) -> bool {
    if value.is_zero() {
        return false;
    }
    if proof.siblings.len() != proof.path_indices.len() {
        return false;
    }
    // Interval check; the head leaf (low_value = 0) covers targets below
    // every stored value.
    let low_ok = fr_lt(&proof.low_value, value);
    let next_ok = proof.low_next_value.is_zero() || fr_lt(value, &proof.low_next_value);
    if !low_ok || !next_ok {
        return false;
    }

    let low_leaf = IndexedMerkleLeaf {
        value: proof.low_value,
        next_value: proof.low_next_value,
        next_idx: proof.low_next_idx,
    };
    let mut node = low_leaf.hash();
    for (sibling, bit) in proof.siblings.iter().zip(proof.path_indices.iter()) {
        node = if *bit == 0 {
            poseidon::hash2(node, *sibling)
        } else {
            poseidon::hash2(*sibling, node)
        };
    }
    node == proof.root
}
