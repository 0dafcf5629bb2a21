//! Nullifier Registry
//!
//! Process-scoped registry over the indexed Merkle tree: write-once
//! nullifier records, a single-writer/many-reader locking discipline, and a
//! configurable recent-roots window for freshness checks. Inserts hold the
//! write lock across predecessor search, leaf append, and root recomputation;
//! readers always observe a state consistent with a published root.

pub mod tree;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::curve::{bn_scalar_from_hex, bn_scalar_to_hex, BnFr};
use crate::errors::{HalpError, HalpResult};
use crate::util::unix_millis;

pub use tree::{
    empty_subtree_hashes, verify_non_membership, IndexedMerkleLeaf, IndexedMerkleTree,
    NonMembershipProof, TREE_HEIGHT,
};

/// Registry construction options.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub height: usize,
    /// How many roots (including the current one) count as fresh.
    pub root_window: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            height: TREE_HEIGHT,
            root_window: 1,
        }
    }
}

/// Write-once record for a registered nullifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NullifierRecord {
    pub nullifier: String,
    pub domain: String,
    pub pseudonym: String,
    pub timestamp: u64,
    pub tree_index: u32,
}

/// `GET /root` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootInfo {
    pub root: String,
    pub height: usize,
    pub leaf_count: usize,
    pub updated_at: u64,
}

/// Non-membership proof as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonMembershipProofWire {
    pub leaf: String,
    pub root: String,
    pub siblings: Vec<String>,
    pub path_indices: Vec<u8>,
    pub leaf_index: usize,
    pub low_nullifier: String,
    pub low_nullifier_next_value: String,
    pub low_nullifier_next_idx: u32,
}

impl NonMembershipProofWire {
    pub fn from_proof(target: &BnFr, proof: &NonMembershipProof) -> Self {
        Self {
            leaf: bn_scalar_to_hex(target),
            root: bn_scalar_to_hex(&proof.root),
            siblings: proof.siblings.iter().map(bn_scalar_to_hex).collect(),
            path_indices: proof.path_indices.clone(),
            leaf_index: proof.leaf_index,
            low_nullifier: bn_scalar_to_hex(&proof.low_value),
            low_nullifier_next_value: bn_scalar_to_hex(&proof.low_next_value),
            low_nullifier_next_idx: proof.low_next_idx,
        }
    }

    pub fn to_proof(&self) -> HalpResult<(BnFr, NonMembershipProof)> {
        let target = bn_scalar_from_hex(&self.leaf)?;
        let proof = NonMembershipProof {
            leaf_index: self.leaf_index,
            low_value: bn_scalar_from_hex(&self.low_nullifier)?,
            low_next_value: bn_scalar_from_hex(&self.low_nullifier_next_value)?,
            low_next_idx: self.low_nullifier_next_idx,
            siblings: self
                .siblings
                .iter()
                .map(|s| bn_scalar_from_hex(s))
                .collect::<HalpResult<Vec<_>>>()?,
            path_indices: self.path_indices.clone(),
            root: bn_scalar_from_hex(&self.root)?,
        };
        Ok((target, proof))
    }
}

/// The orchestrator's view of a registry, local or remote.
///
/// The in-process registry implements it directly; an HTTP client backed by
/// the `/root` and `/proof` endpoints satisfies the same contract.
pub trait RegistryView: Send + Sync {
    fn current_root(&self) -> HalpResult<BnFr>;
    fn non_membership(&self, value: &BnFr) -> HalpResult<NonMembershipProof>;
}

struct RegistryInner {
    tree: IndexedMerkleTree,
    records: HashMap<String, NullifierRecord>,
    recent_roots: VecDeque<BnFr>,
    updated_at: u64,
}

/// Thread-safe nullifier registry.
pub struct NullifierRegistry {
    config: RegistryConfig,
    inner: RwLock<RegistryInner>,
}

impl NullifierRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let tree = IndexedMerkleTree::new(config.height);
        let root = tree.root();
        let mut recent_roots = VecDeque::with_capacity(config.root_window.max(1));
        recent_roots.push_back(root);
        Self {
            config,
            inner: RwLock::new(RegistryInner {
                tree,
                records: HashMap::new(),
                recent_roots,
                updated_at: unix_millis(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RegistryConfig::default())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().expect("registry lock poisoned")
    }

    /// Current tree root.
    pub fn root(&self) -> BnFr {
        self.read().tree.root()
    }

    /// `GET /root` payload.
    pub fn root_info(&self) -> RootInfo {
        let inner = self.read();
        RootInfo {
            root: bn_scalar_to_hex(&inner.tree.root()),
            height: inner.tree.height(),
            leaf_count: inner.tree.leaf_count(),
            updated_at: inner.updated_at,
        }
    }

    /// Whether a claimed root is the current one or within the window.
    pub fn is_fresh_root(&self, claimed: &BnFr) -> bool {
        self.read().recent_roots.iter().any(|r| r == claimed)
    }

    /// Look up a registered nullifier.
    pub fn check(&self, nullifier: &BnFr) -> Option<NullifierRecord> {
        self.read()
            .records
            .get(&bn_scalar_to_hex(nullifier))
            .cloned()
    }

    /// Register a spent nullifier. Exactly-once: a second registration of
    /// the same value fails with `NullifierReused`.
    pub fn register(
        &self,
        nullifier: &BnFr,
        domain: &str,
        pseudonym: &str,
        timestamp: u64,
    ) -> HalpResult<(u32, BnFr)> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let tree_index = match inner.tree.insert(*nullifier) {
            Ok(idx) => idx as u32,
            Err(HalpError::AlreadyExists { .. }) => return Err(HalpError::NullifierReused),
            Err(e) => return Err(e),
        };
        let new_root = inner.tree.root();
        inner.recent_roots.push_back(new_root);
        while inner.recent_roots.len() > self.config.root_window.max(1) {
            inner.recent_roots.pop_front();
        }
        let key = bn_scalar_to_hex(nullifier);
        inner.records.insert(
            key.clone(),
            NullifierRecord {
                nullifier: key,
                domain: domain.to_string(),
                pseudonym: pseudonym.to_string(),
                timestamp,
                tree_index,
            },
        );
        inner.updated_at = unix_millis();
        tracing::debug!(domain, tree_index, "nullifier registered");
        Ok((tree_index, new_root))
    }
}

impl RegistryView for NullifierRegistry {
    fn current_root(&self) -> HalpResult<BnFr> {
        Ok(self.root())
    }

    fn non_membership(&self, value: &BnFr) -> HalpResult<NonMembershipProof> {
        self.read().tree.non_membership_proof(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NullifierRegistry {
        NullifierRegistry::new(RegistryConfig {
            height: 8,
            root_window: 1,
        })
    }

    #[test]
    fn test_register_once() {
        let reg = registry();
        let nf = BnFr::from(77u64);
        let (idx, new_root) = reg.register(&nf, "example.com", "nym", 1).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(new_root, reg.root());

        let record = reg.check(&nf).unwrap();
        assert_eq!(record.domain, "example.com");
        assert_eq!(record.tree_index, 1);
    }

    #[test]
    fn test_register_twice_is_reuse() {
        let reg = registry();
        let nf = BnFr::from(77u64);
        reg.register(&nf, "example.com", "nym", 1).unwrap();
        assert!(matches!(
            reg.register(&nf, "example.com", "nym", 2).unwrap_err(),
            HalpError::NullifierReused
        ));
    }

    #[test]
    fn test_root_freshness_window() {
        let reg = NullifierRegistry::new(RegistryConfig {
            height: 8,
            root_window: 2,
        });
        let r0 = reg.root();
        reg.register(&BnFr::from(5u64), "d", "p", 1).unwrap();
        let r1 = reg.root();
        assert!(reg.is_fresh_root(&r0));
        assert!(reg.is_fresh_root(&r1));

        reg.register(&BnFr::from(6u64), "d", "p", 2).unwrap();
        assert!(!reg.is_fresh_root(&r0));
        assert!(reg.is_fresh_root(&r1));
        assert!(reg.is_fresh_root(&reg.root()));
    }

    #[test]
    fn test_exact_match_window_rejects_prior_root() {
        let reg = registry();
        let r0 = reg.root();
        reg.register(&BnFr::from(5u64), "d", "p", 1).unwrap();
        assert!(!reg.is_fresh_root(&r0));
    }

    #[test]
    fn test_wire_proof_roundtrip() {
        let reg = registry();
        reg.register(&BnFr::from(41u64), "d", "p", 1).unwrap();
        let target = BnFr::from(99u64);
        let proof = reg.non_membership(&target).unwrap();
        let wire = NonMembershipProofWire::from_proof(&target, &proof);
        let (decoded_target, decoded) = wire.to_proof().unwrap();
        assert_eq!(decoded_target, target);
        assert!(verify_non_membership(&decoded_target, &decoded));
        assert_eq!(decoded.root, reg.root());
    }
}
