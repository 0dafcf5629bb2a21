//! Error Types for the halp-core Protocol Stack
//!
//! One taxonomy covers every subsystem: cryptographic parse failures,
//! proof rejections, challenge lifecycle errors, registry conflicts, and
//! vault conditions. The verification pipeline maps each variant to an
//! HTTP status so route handlers stay thin.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type HalpResult<T> = Result<T, HalpError>;

/// Unified error type for the credential core.
#[derive(Error, Debug)]
pub enum HalpError {
    /// Schema, size, or field-range violation at a boundary.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A curve point failed to deserialize or is not in the prime-order group.
    #[error("invalid point: {reason}")]
    InvalidPoint { reason: String },

    /// A scalar failed to parse or exceeds the field modulus.
    #[error("invalid scalar: {reason}")]
    InvalidScalar { reason: String },

    /// SNARK or BBS+ verification returned false.
    #[error("proof verification failed: {reason}")]
    InvalidProof { reason: String },

    /// Commitment disagreement between the SNARK, the BBS+ proof, and the package.
    #[error("commitment binding mismatch: {reason}")]
    BindingMismatch { reason: String },

    /// Unknown challenge id or challenge value mismatch.
    #[error("invalid challenge: {reason}")]
    InvalidChallenge { reason: String },

    /// Challenge exists but its TTL has elapsed.
    #[error("challenge expired at {expires_at}")]
    ChallengeExpired { expires_at: u64 },

    /// Claimed registry root is neither current nor within the accepted window.
    #[error("registry root mismatch: {reason}")]
    RegistryRootMismatch { reason: String },

    /// Nullifier already registered; the session was replayed.
    #[error("nullifier already registered")]
    NullifierReused,

    /// Vault entry already present for this holder.
    #[error("already exists: {reason}")]
    AlreadyExists { reason: String },

    /// Vault entry (or other required record) not found.
    #[error("not found: {reason}")]
    NotFound { reason: String },

    /// AES-GCM decryption failed; ciphertext was tampered with or the key is wrong.
    #[error("decryption failed: {reason}")]
    Decrypt { reason: String },

    /// Session-nonce resampling could not place the derived values below 2^252.
    #[error("witness out of range after {attempts} sampling attempts")]
    WitnessOutOfRange { attempts: u32 },

    /// A bounded-time operation exceeded its deadline.
    #[error("operation timed out: {reason}")]
    Timeout { reason: String },

    /// Encoding or decoding failure in a persisted or wire object.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// Anything else. No internal detail is leaked to callers.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl HalpError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        HalpError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn invalid_point(reason: impl Into<String>) -> Self {
        HalpError::InvalidPoint {
            reason: reason.into(),
        }
    }

    pub fn invalid_scalar(reason: impl Into<String>) -> Self {
        HalpError::InvalidScalar {
            reason: reason.into(),
        }
    }

    pub fn invalid_proof(reason: impl Into<String>) -> Self {
        HalpError::InvalidProof {
            reason: reason.into(),
        }
    }

    pub fn binding_mismatch(reason: impl Into<String>) -> Self {
        HalpError::BindingMismatch {
            reason: reason.into(),
        }
    }

    pub fn invalid_challenge(reason: impl Into<String>) -> Self {
        HalpError::InvalidChallenge {
            reason: reason.into(),
        }
    }

    pub fn registry_root_mismatch(reason: impl Into<String>) -> Self {
        HalpError::RegistryRootMismatch {
            reason: reason.into(),
        }
    }

    pub fn already_exists(reason: impl Into<String>) -> Self {
        HalpError::AlreadyExists {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        HalpError::NotFound {
            reason: reason.into(),
        }
    }

    pub fn decrypt(reason: impl Into<String>) -> Self {
        HalpError::Decrypt {
            reason: reason.into(),
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        HalpError::Timeout {
            reason: reason.into(),
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        HalpError::Serialization {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        HalpError::Internal {
            reason: reason.into(),
        }
    }

    /// HTTP status code a route handler should surface for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            HalpError::InvalidInput { .. }
            | HalpError::InvalidPoint { .. }
            | HalpError::InvalidScalar { .. } => 400,
            HalpError::InvalidProof { .. }
            | HalpError::BindingMismatch { .. }
            | HalpError::InvalidChallenge { .. }
            | HalpError::ChallengeExpired { .. }
            | HalpError::RegistryRootMismatch { .. } => 401,
            HalpError::NotFound { .. } => 404,
            HalpError::NullifierReused | HalpError::AlreadyExists { .. } => 409,
            HalpError::Timeout { .. } => 504,
            HalpError::Decrypt { .. }
            | HalpError::WitnessOutOfRange { .. }
            | HalpError::Serialization { .. }
            | HalpError::Internal { .. } => 500,
        }
    }
}
