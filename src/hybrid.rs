//! Hybrid Authentication Proof Orchestrator
//!
//! Client-side assembly of one authentication session: derive the session
//! pseudonym and nullifier from the vaulted master secret, prove the
//! `halp-auth` relation against the registry root, and (optionally) attach a
//! BBS+ selective-disclosure proof whose revealed first message equals the
//! SNARK's public commitment hash.
//!
//! Proving is CPU-bound, so the async entry point runs the whole assembly on
//! a blocking worker under a caller deadline.

use ark_ff::UniformRand;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::bbs::{self, DisclosureProof};
use crate::challenge::Challenge;
use crate::credential::CredentialRecord;
use crate::curve::{
    bls_scalar_to_bn, bn_scalar_from_hex, bn_scalar_to_hex, fits_comparison_range,
    scalar_from_hex, scalar_to_bytes, BnFr,
};
use crate::errors::{HalpError, HalpResult};
use crate::poseidon;
use crate::registry::{NonMembershipProof, RegistryView};
use crate::snark::{
    derive_nullifier, derive_pseudonym, witness, AuthProver, PublicInputsWire, SnarkProofWire,
};
use crate::util::unix_millis;
use crate::vault::MasterSecretVault;

/// Resampling cap for the session nonce.
const NONCE_RETRY_CAP: u32 = 100;

/// The SNARK/BBS+ bundle inside an authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridProof {
    pub snark_proof: SnarkProofWire,
    pub public_inputs: PublicInputsWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbs_proof: Option<DisclosureProof>,
    pub commitment_hash: String,
}

/// Complete authentication package submitted to the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridAuthPackage {
    pub challenge_id: String,
    pub challenge: String,
    pub domain: String,
    pub timestamp: u64,
    pub pseudonym: String,
    pub nullifier: String,
    pub hybrid_proof: HybridProof,
}

/// Client-side orchestrator.
pub struct HybridProver {
    vault: Arc<MasterSecretVault>,
    prover: Arc<AuthProver>,
    registry: Arc<dyn RegistryView>,
}

impl HybridProver {
    pub fn new(
        vault: Arc<MasterSecretVault>,
        prover: Arc<AuthProver>,
        registry: Arc<dyn RegistryView>,
    ) -> Self {
        Self {
            vault,
            prover,
            registry,
        }
    }

    /// Assemble a [`HybridAuthPackage`] for one challenge.
    ///
    /// `revealed_indices` selects the BBS+ messages to disclose; empty means
    /// no BBS+ proof. When non-empty it must include index 0, the commitment
    /// message the verifier checks the binding against.
    pub fn generate(
        &self,
        holder_id: &str,
        credential: &CredentialRecord,
        challenge: &Challenge,
        revealed_indices: &[usize],
    ) -> HalpResult<HybridAuthPackage> {
        let master_secret = self.vault.get(holder_id)?;
        let ms_bn = bls_scalar_to_bn(&master_secret);

        let domain_hash = poseidon::hash_string(&challenge.domain);
        let credential_id_hash = poseidon::hash_string(&credential.id);

        // Resample the session nonce until both derived values clear the
        // circuit's comparison bound.
        let mut session = None;
        for _ in 0..NONCE_RETRY_CAP {
            let nonce = BnFr::rand(&mut OsRng);
            let pseudonym = derive_pseudonym(&ms_bn, &nonce, &domain_hash);
            let nullifier = derive_nullifier(&credential_id_hash, &nonce, &domain_hash);
            if fits_comparison_range(&pseudonym) && fits_comparison_range(&nullifier) {
                session = Some((nonce, pseudonym, nullifier));
                break;
            }
        }
        let Some((session_nonce, pseudonym, nullifier)) = session else {
            return Err(HalpError::WitnessOutOfRange {
                attempts: NONCE_RETRY_CAP,
            });
        };

        // The binding values were persisted at issuance; recheck them against
        // the vault so an inconsistent record fails loudly here instead of
        // surfacing as an unsatisfiable circuit.
        let blinding = bn_scalar_from_hex(&credential.blinding_factor)?;
        let commitment_hash = credential.commitment_hash_scalar()?;
        if poseidon::hash2(ms_bn, blinding) != commitment_hash {
            return Err(HalpError::invalid_input(
                "credential binding does not open under this holder's master secret",
            ));
        }

        let non_membership = self.fetch_non_membership(&nullifier)?;
        let challenge_scalar = scalar_from_hex(&challenge.challenge)?;
        let challenge_bn = bls_scalar_to_bn(&challenge_scalar);

        let (auth_witness, public) = witness::assemble(
            ms_bn,
            session_nonce,
            domain_hash,
            credential_id_hash,
            blinding,
            challenge_bn,
            &non_membership,
        )?;
        debug_assert_eq!(public.pseudonym, pseudonym);
        debug_assert_eq!(public.nullifier, nullifier);

        let proof = self
            .prover
            .prove(auth_witness, public.clone(), &mut OsRng)?;

        let bbs_proof = if revealed_indices.is_empty() {
            None
        } else {
            if !revealed_indices.contains(&0) {
                return Err(HalpError::invalid_input(
                    "selective disclosure must reveal the commitment message (index 0)",
                ));
            }
            let messages = credential.message_vector()?;
            let signature = credential.signature()?;
            let issuer_key = credential.issuer_key()?;
            Some(bbs::create_disclosure_proof(
                &mut OsRng,
                &signature,
                &issuer_key,
                &messages,
                revealed_indices,
                &scalar_to_bytes(&challenge_scalar),
            )?)
        };

        tracing::debug!(
            domain = %challenge.domain,
            challenge_id = %challenge.challenge_id,
            "hybrid auth package assembled"
        );
        Ok(HybridAuthPackage {
            challenge_id: challenge.challenge_id.clone(),
            challenge: challenge.challenge.clone(),
            domain: challenge.domain.clone(),
            timestamp: unix_millis(),
            pseudonym: bn_scalar_to_hex(&pseudonym),
            nullifier: bn_scalar_to_hex(&nullifier),
            hybrid_proof: HybridProof {
                snark_proof: SnarkProofWire::from_proof(&proof)?,
                public_inputs: PublicInputsWire::from_inputs(&public),
                bbs_proof,
                commitment_hash: credential.commitment_hash.clone(),
            },
        })
    }

    /// Async entry point: runs [`Self::generate`] on a blocking worker and
    /// fails with `Timeout` past the deadline.
    pub async fn generate_async(
        self: &Arc<Self>,
        holder_id: &str,
        credential: &CredentialRecord,
        challenge: &Challenge,
        revealed_indices: &[usize],
        deadline: Duration,
    ) -> HalpResult<HybridAuthPackage> {
        let this = Arc::clone(self);
        let holder_id = holder_id.to_string();
        let credential = credential.clone();
        let challenge = challenge.clone();
        let revealed = revealed_indices.to_vec();
        let task = tokio::task::spawn_blocking(move || {
            this.generate(&holder_id, &credential, &challenge, &revealed)
        });
        match tokio::time::timeout(deadline, task).await {
            Err(_) => Err(HalpError::timeout("proof generation exceeded deadline")),
            Ok(Err(join)) => Err(HalpError::internal(format!("proving worker died: {join}"))),
            Ok(Ok(result)) => result,
        }
    }

    /// Registry non-membership, falling back to the empty-tree proof when
    /// the registry is unreachable. An already-registered nullifier is a
    /// hard failure, not a fallback case.
    fn fetch_non_membership(&self, nullifier: &BnFr) -> HalpResult<NonMembershipProof> {
        match self.registry.non_membership(nullifier) {
            Ok(proof) => Ok(proof),
            Err(HalpError::NullifierReused) => Err(HalpError::NullifierReused),
            Err(e) => {
                tracing::warn!(error = %e, "registry unavailable, synthesizing empty-tree proof");
                Ok(NonMembershipProof::empty_tree(self.prover.height()))
            }
        }
    }
}
