//! Challenge Issuance and Lifecycle
//!
//! Fresh per-session challenges with a 5-minute TTL, held in a
//! mutex-guarded map. A challenge moves `created → consumed` on successful
//! verification (consumption is idempotent) or `expired → evicted` by the
//! periodic sweeper.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::curve::{bn_scalar_to_hex, random_scalar, scalar_to_hex, BnFr};
use crate::errors::{HalpError, HalpResult};
use crate::snark::CIRCUIT_ID;
use crate::util::{to_base36, unix_millis};

/// Challenge lifetime.
pub const CHALLENGE_TTL_MS: u64 = 5 * 60 * 1000;

/// Sweep cadence for expired challenges.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Domain used by the legacy parameterless challenge endpoint.
pub const DEFAULT_DOMAIN: &str = "default";

/// An issued challenge, also the `POST /challenge` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub challenge_id: String,
    /// Fresh BLS12-381 scalar, 64 hex chars.
    pub challenge: String,
    pub domain: String,
    /// Registry root snapshot at issuance, 64 hex chars.
    pub registry_root: String,
    pub circuit_id: String,
    pub created_at: u64,
    pub expires_at: u64,
}

struct StoredChallenge {
    challenge: Challenge,
    consumed: bool,
}

/// Process-local challenge map.
pub struct ChallengeStore {
    ttl_ms: u64,
    entries: Mutex<HashMap<String, StoredChallenge>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::with_ttl(CHALLENGE_TTL_MS)
    }

    pub fn with_ttl(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredChallenge>> {
        self.entries.lock().expect("challenge store poisoned")
    }

    /// Issue a challenge for `domain` against the current registry root.
    pub fn issue(&self, domain: &str, registry_root: &BnFr) -> Challenge {
        let now = unix_millis();
        let mut suffix = [0u8; 4];
        OsRng.fill_bytes(&mut suffix);
        let challenge = Challenge {
            challenge_id: format!("ch_{}_{}", to_base36(now), hex::encode(suffix)),
            challenge: scalar_to_hex(&random_scalar(&mut OsRng)),
            domain: domain.to_string(),
            registry_root: bn_scalar_to_hex(registry_root),
            circuit_id: CIRCUIT_ID.to_string(),
            created_at: now,
            expires_at: now + self.ttl_ms,
        };
        self.lock().insert(
            challenge.challenge_id.clone(),
            StoredChallenge {
                challenge: challenge.clone(),
                consumed: false,
            },
        );
        tracing::debug!(id = %challenge.challenge_id, domain, "challenge issued");
        challenge
    }

    /// Issue a default-domain challenge (legacy GET endpoint).
    pub fn issue_default(&self, registry_root: &BnFr) -> Challenge {
        self.issue(DEFAULT_DOMAIN, registry_root)
    }

    /// Look up a live challenge by id.
    pub fn get(&self, challenge_id: &str) -> Option<Challenge> {
        self.lock().get(challenge_id).map(|s| s.challenge.clone())
    }

    /// Whether the challenge was consumed by a successful verification.
    pub fn is_consumed(&self, challenge_id: &str) -> bool {
        self.lock()
            .get(challenge_id)
            .map(|s| s.consumed)
            .unwrap_or(false)
    }

    /// Validate id, value, and TTL; returns the stored challenge.
    ///
    /// A consumed challenge still validates within its TTL; replay of a
    /// full package is caught by nullifier freshness, which is the actual
    /// replay gate.
    pub fn validate(&self, challenge_id: &str, challenge_value: &str) -> HalpResult<Challenge> {
        let stored = self
            .get(challenge_id)
            .ok_or_else(|| HalpError::invalid_challenge(format!("unknown id {challenge_id:?}")))?;
        if stored.challenge != challenge_value {
            return Err(HalpError::invalid_challenge("challenge value mismatch"));
        }
        if unix_millis() >= stored.expires_at {
            return Err(HalpError::ChallengeExpired {
                expires_at: stored.expires_at,
            });
        }
        Ok(stored)
    }

    /// Mark a challenge consumed after successful verification. Idempotent;
    /// unknown ids are a no-op. The entry stays until its TTL eviction.
    pub fn consume(&self, challenge_id: &str) {
        if let Some(stored) = self.lock().get_mut(challenge_id) {
            stored.consumed = true;
        }
    }

    /// Evict expired challenges; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = unix_millis();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, s| s.challenge.expires_at > now);
        before - entries.len()
    }

    /// Fire-and-forget sweeper task.
    pub fn spawn_sweeper(store: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let evicted = store.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, "expired challenges evicted");
                }
            }
        })
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::Zero;

    #[test]
    fn test_issue_and_validate() {
        let store = ChallengeStore::new();
        let root = BnFr::zero();
        let challenge = store.issue("example.com", &root);
        assert!(challenge.challenge_id.starts_with("ch_"));
        assert_eq!(challenge.challenge.len(), 64);
        assert_eq!(challenge.circuit_id, CIRCUIT_ID);
        assert_eq!(challenge.expires_at - challenge.created_at, CHALLENGE_TTL_MS);

        let validated = store
            .validate(&challenge.challenge_id, &challenge.challenge)
            .unwrap();
        assert_eq!(validated.domain, "example.com");
    }

    #[test]
    fn test_unknown_id_rejected() {
        let store = ChallengeStore::new();
        assert!(matches!(
            store.validate("ch_missing", "00").unwrap_err(),
            HalpError::InvalidChallenge { .. }
        ));
    }

    #[test]
    fn test_value_mismatch_rejected() {
        let store = ChallengeStore::new();
        let challenge = store.issue("d", &BnFr::zero());
        assert!(matches!(
            store.validate(&challenge.challenge_id, "deadbeef").unwrap_err(),
            HalpError::InvalidChallenge { .. }
        ));
    }

    #[test]
    fn test_expired_challenge_rejected_and_swept() {
        let store = ChallengeStore::with_ttl(0);
        let challenge = store.issue("d", &BnFr::zero());
        assert!(matches!(
            store
                .validate(&challenge.challenge_id, &challenge.challenge)
                .unwrap_err(),
            HalpError::ChallengeExpired { .. }
        ));
        assert_eq!(store.sweep(), 1);
        assert!(store.get(&challenge.challenge_id).is_none());
    }

    #[test]
    fn test_consume_idempotent_and_still_validates() {
        let store = ChallengeStore::new();
        let challenge = store.issue("d", &BnFr::zero());
        store.consume(&challenge.challenge_id);
        assert!(store.is_consumed(&challenge.challenge_id));
        store.consume(&challenge.challenge_id);
        assert!(store.is_consumed(&challenge.challenge_id));
        // Still within TTL: replayed packages pass this gate and die on
        // nullifier freshness instead.
        assert!(store
            .validate(&challenge.challenge_id, &challenge.challenge)
            .is_ok());
    }

    #[test]
    fn test_legacy_default_domain_challenge() {
        let store = ChallengeStore::new();
        let challenge = store.issue_default(&BnFr::zero());
        assert_eq!(challenge.domain, DEFAULT_DOMAIN);
        assert!(store
            .validate(&challenge.challenge_id, &challenge.challenge)
            .is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let store = ChallengeStore::new();
        let a = store.issue("d", &BnFr::zero());
        let b = store.issue("d", &BnFr::zero());
        assert_ne!(a.challenge_id, b.challenge_id);
        assert_ne!(a.challenge, b.challenge);
    }
}
