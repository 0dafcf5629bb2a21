//! Hybrid Verification Pipeline
//!
//! Server-side verification of a [`HybridAuthPackage`], strictly ordered:
//! challenge validity, structural checks, SNARK, optional BBS+, commitment
//! binding, registry-root freshness, nullifier freshness, and finally
//! registration. Any failure short-circuits with a typed error; the
//! nullifier is inserted only after every check passes, so a rejected
//! request never burns state.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::bbs;
use crate::challenge::ChallengeStore;
use crate::curve::{bls_scalar_to_bn, scalar_from_hex, scalar_to_bytes};
use crate::errors::{HalpError, HalpResult};
use crate::hybrid::HybridAuthPackage;
use crate::registry::NullifierRegistry;
use crate::snark::AuthVerifier;
use crate::util::unix_millis;

/// Session lifetime granted on successful verification.
const SESSION_TTL_MS: u64 = 60 * 60 * 1000;

/// Per-check outcome flags, reported on success and failure alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetails {
    pub snark_valid: bool,
    pub bbs_valid: bool,
    pub binding_valid: bool,
    pub registry_root_valid: bool,
    pub nullifier_fresh: bool,
}

/// Pseudonymous record of a verified session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub pseudonym: String,
    pub domain: String,
    pub verified_at: u64,
}

/// Successful verification result, returned to the authenticating client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSession {
    pub valid: bool,
    pub session_token: String,
    pub expires_at: u64,
    pub pseudonym: String,
    pub domain: String,
    pub verification_details: VerificationDetails,
}

impl VerifiedSession {
    /// The pseudonymous session record to emit for the caller.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            pseudonym: self.pseudonym.clone(),
            domain: self.domain.clone(),
            verified_at: self.expires_at - SESSION_TTL_MS,
        }
    }
}

/// Server-side verifier owning the challenge store, registry, and SNARK key.
pub struct HybridVerifier {
    challenges: Arc<ChallengeStore>,
    registry: Arc<NullifierRegistry>,
    snark: Arc<AuthVerifier>,
}

impl HybridVerifier {
    pub fn new(
        challenges: Arc<ChallengeStore>,
        registry: Arc<NullifierRegistry>,
        snark: Arc<AuthVerifier>,
    ) -> Self {
        Self {
            challenges,
            registry,
            snark,
        }
    }

    /// Run the full pipeline. The details report how far the package got,
    /// on failure as well as on success.
    pub fn verify(&self, package: &HybridAuthPackage) -> (VerificationDetails, HalpResult<VerifiedSession>) {
        let mut details = VerificationDetails::default();
        let outcome = self.run(package, &mut details);
        (details, outcome)
    }

    fn run(
        &self,
        package: &HybridAuthPackage,
        details: &mut VerificationDetails,
    ) -> HalpResult<VerifiedSession> {
        // 1. Challenge validity.
        let challenge = self
            .challenges
            .validate(&package.challenge_id, &package.challenge)?;
        if challenge.domain != package.domain {
            return Err(HalpError::invalid_challenge("domain mismatch"));
        }
        let challenge_scalar = scalar_from_hex(&challenge.challenge)?;

        // 2. Structure: the Groth16 triple and every public signal must
        // decode, and the top-level fields must agree with the signals.
        let bundle = &package.hybrid_proof;
        bundle.snark_proof.validate_shape()?;
        let proof = bundle.snark_proof.to_proof()?;
        let public = bundle.public_inputs.to_inputs()?;
        if bundle.public_inputs.pseudonym != package.pseudonym
            || bundle.public_inputs.nullifier != package.nullifier
        {
            return Err(HalpError::invalid_input(
                "package pseudonym/nullifier disagree with public signals",
            ));
        }
        if public.challenge != bls_scalar_to_bn(&challenge_scalar) {
            return Err(HalpError::invalid_challenge(
                "proof is bound to a different challenge",
            ));
        }

        // 3. SNARK.
        details.snark_valid = self.snark.verify(&public, &proof)?;
        if !details.snark_valid {
            return Err(HalpError::invalid_proof("SNARK rejected"));
        }

        // 4. BBS+ (optional).
        if let Some(bbs_proof) = &bundle.bbs_proof {
            details.bbs_valid =
                bbs::verify_disclosure_proof(bbs_proof, &scalar_to_bytes(&challenge_scalar))?;
            if !details.bbs_valid {
                return Err(HalpError::invalid_proof("BBS+ proof rejected"));
            }
        }

        // 5. Binding: SNARK public commitment, package commitment, and (when
        // present) the revealed m₀ must be one value.
        if bundle.public_inputs.commitment_hash != bundle.commitment_hash {
            return Err(HalpError::binding_mismatch(
                "SNARK commitment differs from package commitment",
            ));
        }
        if let Some(bbs_proof) = &bundle.bbs_proof {
            match bbs_proof.revealed_message_hex(0) {
                Some(m0) if m0 == bundle.commitment_hash => {}
                Some(_) => {
                    return Err(HalpError::binding_mismatch(
                        "revealed commitment message differs from SNARK commitment",
                    ))
                }
                None => {
                    return Err(HalpError::binding_mismatch(
                        "disclosure proof does not reveal the commitment message",
                    ))
                }
            }
        }
        details.binding_valid = true;

        // 6. Registry-root freshness.
        details.registry_root_valid = self.registry.is_fresh_root(&public.registry_root);
        if !details.registry_root_valid {
            return Err(HalpError::registry_root_mismatch(
                "claimed root is not within the accepted window",
            ));
        }

        // 7. Nullifier freshness.
        if self.registry.check(&public.nullifier).is_some() {
            return Err(HalpError::NullifierReused);
        }
        details.nullifier_fresh = true;

        // 8. Register, consume, emit.
        self.registry.register(
            &public.nullifier,
            &package.domain,
            &package.pseudonym,
            package.timestamp,
        )?;
        self.challenges.consume(&package.challenge_id);

        let now = unix_millis();
        let mut token = [0u8; 32];
        OsRng.fill_bytes(&mut token);
        tracing::debug!(domain = %package.domain, "hybrid authentication verified");
        Ok(VerifiedSession {
            valid: true,
            session_token: hex::encode(token),
            expires_at: now + SESSION_TTL_MS,
            pseudonym: package.pseudonym.clone(),
            domain: package.domain.clone(),
            verification_details: VerificationDetails {
                snark_valid: details.snark_valid,
                bbs_valid: details.bbs_valid,
                binding_valid: details.binding_valid,
                registry_root_valid: details.registry_root_valid,
                nullifier_fresh: details.nullifier_fresh,
            },
        })
    }

    /// Async entry point: pairing checks and BBS+ verification run on a
    /// blocking worker under the caller's deadline.
    pub async fn verify_async(
        self: &Arc<Self>,
        package: HybridAuthPackage,
        deadline: Duration,
    ) -> (VerificationDetails, HalpResult<VerifiedSession>) {
        let this = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || this.verify(&package));
        match tokio::time::timeout(deadline, task).await {
            Err(_) => (
                VerificationDetails::default(),
                Err(HalpError::timeout("verification exceeded deadline")),
            ),
            Ok(Err(join)) => (
                VerificationDetails::default(),
                Err(HalpError::internal(format!("verify worker died: {join}"))),
            ),
            Ok(Ok(result)) => result,
        }
    }
}

// The pipeline is exercised end-to-end (scenarios 3-6 of the protocol test
// plan) in `tests/hybrid_auth.rs`, where a real Groth16 key exists.
