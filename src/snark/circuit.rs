//! The halp-auth Constraint System
//!
//! Groth16 circuit over BN254 with five public inputs, in order:
//! `pseudonym, nullifier, commitmentHash, registryRoot, challenge`.
//!
//! Constraints:
//! 1. `pseudonym  = Poseidon₃(masterSecret, sessionNonce, domainHash)`
//! 2. `nullifier  = Poseidon₃(credentialIdHash, sessionNonce, domainHash)`
//! 3. `commitmentHash = Poseidon₂(masterSecret, blindingFactor)`
//! 4. Non-membership: `lowNullifier < nullifier`, the low leaf's interval
//!    covers the nullifier, and the leaf hashes up the supplied path to
//!    `registryRoot`.
//! 5. `challenge` participates in one multiplication so the proof is bound
//!    to the session without a semantic constraint.
//!
//! The Poseidon gadget consumes the same `PoseidonConfig` values as the
//! host hashes in [`crate::poseidon`]; comparison gadgets assume operands
//! below 2²⁵², which witness assembly enforces.

use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::boolean::Boolean;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::fields::FieldVar;
use ark_r1cs_std::select::CondSelectGadget;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use std::cmp::Ordering;

use crate::curve::BnFr;
use crate::poseidon::{POSEIDON_ARITY2, POSEIDON_ARITY3};

use super::witness::{AuthPublicInputs, AuthWitness};

/// Circuit instance. `public`/`witness` are `None` during key generation.
#[derive(Clone)]
pub struct AuthCircuit {
    pub height: usize,
    pub public: Option<AuthPublicInputs>,
    pub witness: Option<AuthWitness>,
}

impl AuthCircuit {
    /// Shape-only instance for `circuit_specific_setup`.
    pub fn blank(height: usize) -> Self {
        Self {
            height,
            public: None,
            witness: None,
        }
    }

    pub fn new(height: usize, witness: AuthWitness, public: AuthPublicInputs) -> Self {
        Self {
            height,
            public: Some(public),
            witness: Some(witness),
        }
    }
}

pub(crate) fn poseidon_var(
    cs: ConstraintSystemRef<BnFr>,
    config: &PoseidonConfig<BnFr>,
    inputs: &[FpVar<BnFr>],
) -> Result<FpVar<BnFr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, config);
    sponge.absorb(&inputs)?;
    let mut out = sponge.squeeze_field_elements(1)?;
    Ok(out.remove(0))
}

impl ConstraintSynthesizer<BnFr> for AuthCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<BnFr>) -> Result<(), SynthesisError> {
        let public = self.public;
        let witness = self.witness;
        let height = self.height;

        // Public inputs, allocation order is the verification order.
        let pseudonym = FpVar::new_input(cs.clone(), || {
            public
                .as_ref()
                .map(|p| p.pseudonym)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier = FpVar::new_input(cs.clone(), || {
            public
                .as_ref()
                .map(|p| p.nullifier)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let commitment_hash = FpVar::new_input(cs.clone(), || {
            public
                .as_ref()
                .map(|p| p.commitment_hash)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let registry_root = FpVar::new_input(cs.clone(), || {
            public
                .as_ref()
                .map(|p| p.registry_root)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let challenge = FpVar::new_input(cs.clone(), || {
            public
                .as_ref()
                .map(|p| p.challenge)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        // Private witness.
        let master_secret = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.master_secret)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let session_nonce = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.session_nonce)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let domain_hash = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.domain_hash)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let credential_id_hash = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.credential_id_hash)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let blinding_factor = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.blinding_factor)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let low_nullifier = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.low_nullifier)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let low_next_value = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.low_nullifier_next_value)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let low_next_idx = FpVar::new_witness(cs.clone(), || {
            witness
                .as_ref()
                .map(|w| w.low_nullifier_next_idx)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let mut siblings = Vec::with_capacity(height);
        let mut path_bits = Vec::with_capacity(height);
        for level in 0..height {
            siblings.push(FpVar::new_witness(cs.clone(), || {
                witness
                    .as_ref()
                    .and_then(|w| w.merkle_siblings.get(level).copied())
                    .ok_or(SynthesisError::AssignmentMissing)
            })?);
            path_bits.push(Boolean::new_witness(cs.clone(), || {
                witness
                    .as_ref()
                    .and_then(|w| w.merkle_path_indices.get(level).copied())
                    .ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        // 1. Session pseudonym.
        let derived_pseudonym = poseidon_var(
            cs.clone(),
            &POSEIDON_ARITY3,
            &[
                master_secret.clone(),
                session_nonce.clone(),
                domain_hash.clone(),
            ],
        )?;
        derived_pseudonym.enforce_equal(&pseudonym)?;

        // 2. Session nullifier.
        let derived_nullifier = poseidon_var(
            cs.clone(),
            &POSEIDON_ARITY3,
            &[credential_id_hash, session_nonce, domain_hash],
        )?;
        derived_nullifier.enforce_equal(&nullifier)?;

        // 3. Commitment opening.
        let derived_commitment = poseidon_var(
            cs.clone(),
            &POSEIDON_ARITY2,
            &[master_secret, blinding_factor],
        )?;
        derived_commitment.enforce_equal(&commitment_hash)?;

        // 4. Non-membership against the registry root.
        low_nullifier.enforce_cmp(&nullifier, Ordering::Less, false)?;
        let next_is_tail = low_next_value.is_eq(&FpVar::zero())?;
        let below_next = nullifier.is_cmp(&low_next_value, Ordering::Less, false)?;
        next_is_tail
            .or(&below_next)?
            .enforce_equal(&Boolean::TRUE)?;

        let low_leaf = poseidon_var(
            cs.clone(),
            &POSEIDON_ARITY3,
            &[low_nullifier, low_next_value, low_next_idx],
        )?;
        let mut node = low_leaf;
        for (sibling, bit) in siblings.iter().zip(path_bits.iter()) {
            let left = FpVar::conditionally_select(bit, sibling, &node)?;
            let right = FpVar::conditionally_select(bit, &node, sibling)?;
            node = poseidon_var(cs.clone(), &POSEIDON_ARITY2, &[left, right])?;
        }
        node.enforce_equal(&registry_root)?;

        // 5. Challenge binding: one multiplication, no semantic constraint.
        let challenge_sq = FpVar::new_witness(cs, || {
            public
                .as_ref()
                .map(|p| p.challenge * p.challenge)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        challenge.mul_equals(&challenge, &challenge_sq)?;

        Ok(())
    }
}
