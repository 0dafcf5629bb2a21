//! Master-Secret Vault
//!
//! Generates and guards the holder's master secret: a BLS12-381 scalar that
//! never leaves the process. At rest the scalar is wrapped in AES-256-GCM
//! (16-byte IV, detached 16-byte tag) and stored under the OS keychain entry
//! `ms:<holderId>` of service `halp-credential-system`.
//!
//! The storage backend is a trait so the production keychain and the test
//! in-memory store share one code path; swapping the vault key source (fixed
//! development material vs. an HSM-bound secret) never changes the envelope
//! format.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::curve::{
    self, g1_generator, point_mul, point_to_hex, random_scalar, scalar_from_bytes,
    scalar_to_bytes, BlsFr,
};
use crate::errors::{HalpError, HalpResult};
use crate::util::unix_millis;

/// OS keychain service name for all vault entries.
pub const VAULT_SERVICE: &str = "halp-credential-system";

/// Envelope format version.
pub const VAULT_VERSION: u32 = 1;

/// Hash-to-curve prefix for context-scoped pseudonym bases.
const PSEUDONYM_DST: &[u8] = b"BBS_PSEUDONYM_";

const IV_BYTES: usize = 16;
const TAG_BYTES: usize = 16;

/// AES-256-GCM with the 16-byte IV the envelope format mandates.
type VaultCipher = AesGcm<Aes256, U16>;

/// Non-secret metadata kept alongside the ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    pub pseudonym_hex: String,
    pub created_at: u64,
    pub version: u32,
}

/// On-disk envelope, serialized as JSON into the keychain password slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSecret {
    pub version: u32,
    pub iv: String,
    pub auth_tag: String,
    pub ciphertext: String,
    pub metadata: SecretMetadata,
}

/// A context-scoped pseudonym: `HashToCurve("BBS_PSEUDONYM_" ‖ context)^ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPseudonym {
    pub pseudonym_hex: String,
    pub context: String,
}

/// Backend holding one opaque string per account.
pub trait SecretStore: Send + Sync {
    fn read(&self, account: &str) -> HalpResult<Option<String>>;
    fn write(&self, account: &str, value: &str) -> HalpResult<()>;
    /// Returns true when an entry was present and removed.
    fn remove(&self, account: &str) -> HalpResult<bool>;
}

/// Production backend over the OS keychain.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: VAULT_SERVICE.to_string(),
        }
    }

    fn entry(&self, account: &str) -> HalpResult<keyring::Entry> {
        keyring::Entry::new(&self.service, account)
            .map_err(|e| HalpError::internal(format!("keyring entry: {e}")))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn read(&self, account: &str) -> HalpResult<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(HalpError::internal(format!("keyring read: {e}"))),
        }
    }

    fn write(&self, account: &str, value: &str) -> HalpResult<()> {
        self.entry(account)?
            .set_password(value)
            .map_err(|e| HalpError::internal(format!("keyring write: {e}")))
    }

    fn remove(&self, account: &str) -> HalpResult<bool> {
        match self.entry(account)?.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(HalpError::internal(format!("keyring delete: {e}"))),
        }
    }
}

/// In-memory backend for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn read(&self, account: &str) -> HalpResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("memory store poisoned")
            .get(account)
            .cloned())
    }

    fn write(&self, account: &str, value: &str) -> HalpResult<()> {
        self.entries
            .lock()
            .expect("memory store poisoned")
            .insert(account.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, account: &str) -> HalpResult<bool> {
        Ok(self
            .entries
            .lock()
            .expect("memory store poisoned")
            .remove(account)
            .is_some())
    }
}

/// Master-secret lifecycle: generate, retrieve, derive pseudonyms, delete.
pub struct MasterSecretVault {
    store: Box<dyn SecretStore>,
    key: [u8; 32],
}

impl MasterSecretVault {
    /// Build a vault over the given backend and 32-byte wrapping key.
    pub fn new(store: Box<dyn SecretStore>, key_material: [u8; 32]) -> Self {
        Self {
            store,
            key: key_material,
        }
    }

    /// Development configuration: OS keychain + fixed key material.
    pub fn with_default_key(store: Box<dyn SecretStore>) -> Self {
        Self::new(store, development_key_material())
    }

    fn account(holder: &str) -> String {
        format!("ms:{holder}")
    }

    /// Whether a master secret exists for this holder.
    pub fn has(&self, holder: &str) -> HalpResult<bool> {
        Ok(self.store.read(&Self::account(holder))?.is_some())
    }

    /// Sample and store a fresh master secret. At most one per holder.
    pub fn generate(&self, holder: &str) -> HalpResult<SecretMetadata> {
        let account = Self::account(holder);
        if self.store.read(&account)?.is_some() {
            return Err(HalpError::already_exists(format!(
                "master secret for holder '{holder}'"
            )));
        }

        let ms = random_scalar(&mut OsRng);
        let base_pseudonym = point_mul(&g1_generator(), &ms);
        let metadata = SecretMetadata {
            pseudonym_hex: point_to_hex(&base_pseudonym),
            created_at: unix_millis(),
            version: VAULT_VERSION,
        };

        let (iv, ciphertext, auth_tag) = self.seal(&scalar_to_bytes(&ms))?;
        let envelope = EncryptedSecret {
            version: VAULT_VERSION,
            iv: hex::encode(iv),
            auth_tag: hex::encode(auth_tag),
            ciphertext: hex::encode(ciphertext),
            metadata: metadata.clone(),
        };
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| HalpError::serialization(format!("vault envelope encode: {e}")))?;
        self.store.write(&account, &payload)?;

        tracing::debug!(holder, pseudonym = %metadata.pseudonym_hex, "master secret generated");
        Ok(metadata)
    }

    /// Decrypt and return the holder's master secret.
    pub fn get(&self, holder: &str) -> HalpResult<BlsFr> {
        let account = Self::account(holder);
        let payload = self
            .store
            .read(&account)?
            .ok_or_else(|| HalpError::not_found(format!("master secret for holder '{holder}'")))?;
        let envelope: EncryptedSecret = serde_json::from_str(&payload)
            .map_err(|e| HalpError::serialization(format!("vault envelope decode: {e}")))?;
        if envelope.version != VAULT_VERSION {
            return Err(HalpError::serialization(format!(
                "unsupported vault envelope version {}",
                envelope.version
            )));
        }

        let iv = hex::decode(&envelope.iv)
            .map_err(|e| HalpError::serialization(format!("vault iv: {e}")))?;
        let tag = hex::decode(&envelope.auth_tag)
            .map_err(|e| HalpError::serialization(format!("vault tag: {e}")))?;
        let ciphertext = hex::decode(&envelope.ciphertext)
            .map_err(|e| HalpError::serialization(format!("vault ciphertext: {e}")))?;
        let plaintext = self.open(&iv, &ciphertext, &tag)?;
        scalar_from_bytes(&plaintext)
    }

    /// Stored (non-secret) metadata for a holder, if present.
    pub fn metadata(&self, holder: &str) -> HalpResult<Option<SecretMetadata>> {
        match self.store.read(&Self::account(holder))? {
            None => Ok(None),
            Some(payload) => {
                let envelope: EncryptedSecret = serde_json::from_str(&payload)
                    .map_err(|e| HalpError::serialization(format!("vault envelope decode: {e}")))?;
                Ok(Some(envelope.metadata))
            }
        }
    }

    /// Derive the holder's pseudonym for a context string.
    ///
    /// `G_ctx = HashToCurve("BBS_PSEUDONYM_" ‖ context)`, returned point is
    /// `G_ctx^ms`. Deterministic per (holder, context); unlinkable across
    /// contexts.
    pub fn derive_context_pseudonym(
        &self,
        holder: &str,
        context: &str,
    ) -> HalpResult<ContextPseudonym> {
        let ms = self.get(holder)?;
        let base = curve::hash_to_curve(PSEUDONYM_DST, context.as_bytes())?;
        let pseudonym = point_mul(&base, &ms);
        Ok(ContextPseudonym {
            pseudonym_hex: point_to_hex(&pseudonym),
            context: context.to_string(),
        })
    }

    /// Remove the holder's master secret. Returns whether one existed.
    pub fn delete(&self, holder: &str) -> HalpResult<bool> {
        self.store.remove(&Self::account(holder))
    }

    fn seal(&self, plaintext: &[u8]) -> HalpResult<([u8; IV_BYTES], Vec<u8>, [u8; TAG_BYTES])> {
        let cipher = VaultCipher::new(Key::<VaultCipher>::from_slice(&self.key));
        let mut iv = [0u8; IV_BYTES];
        OsRng.fill_bytes(&mut iv);
        let mut sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext)
            .map_err(|_| HalpError::internal("AES-GCM encryption failed"))?;
        // RustCrypto appends the tag; the envelope stores it detached.
        let tag_start = sealed.len() - TAG_BYTES;
        let mut tag = [0u8; TAG_BYTES];
        tag.copy_from_slice(&sealed[tag_start..]);
        sealed.truncate(tag_start);
        Ok((iv, sealed, tag))
    }

    fn open(&self, iv: &[u8], ciphertext: &[u8], tag: &[u8]) -> HalpResult<Vec<u8>> {
        if iv.len() != IV_BYTES || tag.len() != TAG_BYTES {
            return Err(HalpError::decrypt("malformed iv or auth tag"));
        }
        let cipher = VaultCipher::new(Key::<VaultCipher>::from_slice(&self.key));
        let mut sealed = ciphertext.to_vec();
        sealed.extend_from_slice(tag);
        cipher
            .decrypt(Nonce::<U16>::from_slice(iv), sealed.as_slice())
            .map_err(|_| HalpError::decrypt("ciphertext authentication failed"))
    }
}

/// Fixed development key material. Production deployments inject HSM-bound
/// material through [`MasterSecretVault::new`] instead.
pub fn development_key_material() -> [u8; 32] {
    let digest = Sha256::digest(b"halp-core vault key material v1");
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}
