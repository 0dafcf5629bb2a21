//! Witness Assembly for the halp-auth Circuit
//!
//! Mirrors the circuit's Poseidon constraints host-side so the prover can
//! compute public inputs, and re-checks the 252-bit comparison bound the
//! in-circuit comparators rely on. Everything here must stay in lockstep
//! with `circuit.rs`; the agreement is pinned by tests in `snark::tests`.

use crate::curve::{fits_comparison_range, BnFr};
use crate::errors::{HalpError, HalpResult};
use crate::poseidon;
use crate::registry::NonMembershipProof;

/// Public inputs, in the fixed order the verifier feeds them to Groth16.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPublicInputs {
    pub pseudonym: BnFr,
    pub nullifier: BnFr,
    pub commitment_hash: BnFr,
    pub registry_root: BnFr,
    pub challenge: BnFr,
}

impl AuthPublicInputs {
    /// The declared order: pseudonym, nullifier, commitmentHash,
    /// registryRoot, challenge.
    pub fn to_vec(&self) -> Vec<BnFr> {
        vec![
            self.pseudonym,
            self.nullifier,
            self.commitment_hash,
            self.registry_root,
            self.challenge,
        ]
    }
}

/// Private witness of one authentication session.
#[derive(Debug, Clone)]
pub struct AuthWitness {
    pub master_secret: BnFr,
    pub session_nonce: BnFr,
    pub domain_hash: BnFr,
    pub credential_id_hash: BnFr,
    pub blinding_factor: BnFr,
    pub low_nullifier: BnFr,
    pub low_nullifier_next_value: BnFr,
    pub low_nullifier_next_idx: BnFr,
    pub merkle_siblings: Vec<BnFr>,
    pub merkle_path_indices: Vec<bool>,
}

/// Derive the session pseudonym: `Poseidon₃(ms, sessionNonce, domainHash)`.
pub fn derive_pseudonym(master_secret: &BnFr, session_nonce: &BnFr, domain_hash: &BnFr) -> BnFr {
    poseidon::hash3(*master_secret, *session_nonce, *domain_hash)
}

/// Derive the session nullifier: `Poseidon₃(credIdHash, sessionNonce, domainHash)`.
pub fn derive_nullifier(
    credential_id_hash: &BnFr,
    session_nonce: &BnFr,
    domain_hash: &BnFr,
) -> BnFr {
    poseidon::hash3(*credential_id_hash, *session_nonce, *domain_hash)
}

/// Build the witness and matching public inputs from session secrets and a
/// registry non-membership proof.
///
/// Rejects any comparison-bearing value at or above 2^252; the caller is
/// expected to resample the session nonce and retry.
pub fn assemble(
    master_secret: BnFr,
    session_nonce: BnFr,
    domain_hash: BnFr,
    credential_id_hash: BnFr,
    blinding_factor: BnFr,
    challenge: BnFr,
    proof: &NonMembershipProof,
) -> HalpResult<(AuthWitness, AuthPublicInputs)> {
    let pseudonym = derive_pseudonym(&master_secret, &session_nonce, &domain_hash);
    let nullifier = derive_nullifier(&credential_id_hash, &session_nonce, &domain_hash);

    for (label, value) in [
        ("pseudonym", &pseudonym),
        ("nullifier", &nullifier),
        ("lowNullifier", &proof.low_value),
        ("lowNullifierNextValue", &proof.low_next_value),
    ] {
        if !fits_comparison_range(value) {
            return Err(HalpError::invalid_input(format!(
                "{label} exceeds the 252-bit comparison bound"
            )));
        }
    }
    if proof.siblings.len() != proof.path_indices.len() {
        return Err(HalpError::invalid_input(
            "merkle proof sibling/path length mismatch",
        ));
    }

    let commitment_hash = poseidon::hash2(master_secret, blinding_factor);
    let witness = AuthWitness {
        master_secret,
        session_nonce,
        domain_hash,
        credential_id_hash,
        blinding_factor,
        low_nullifier: proof.low_value,
        low_nullifier_next_value: proof.low_next_value,
        low_nullifier_next_idx: BnFr::from(proof.low_next_idx as u64),
        merkle_siblings: proof.siblings.clone(),
        merkle_path_indices: proof.path_indices.iter().map(|&b| b == 1).collect(),
    };
    let public = AuthPublicInputs {
        pseudonym,
        nullifier,
        commitment_hash,
        registry_root: proof.root,
        challenge,
    };
    Ok((witness, public))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tree::IndexedMerkleTree;

    #[test]
    fn test_public_inputs_match_host_poseidon() {
        let tree = IndexedMerkleTree::new(8);
        let (ms, domain, cred_id, blinding) = (
            BnFr::from(2u64),
            BnFr::from(5u64),
            BnFr::from(3u64),
            BnFr::from(6u64),
        );

        // Walk nonces until both derived values clear the 252-bit bound,
        // exactly as the orchestrator resamples.
        let mut chosen = None;
        for nonce in 0u64..200 {
            let nonce = BnFr::from(nonce);
            let nullifier = derive_nullifier(&cred_id, &nonce, &domain);
            let proof = tree.non_membership_proof(&nullifier).unwrap();
            match assemble(ms, nonce, domain, cred_id, blinding, BnFr::from(9u64), &proof) {
                Ok(built) => {
                    chosen = Some((nonce, nullifier, proof, built));
                    break;
                }
                Err(HalpError::InvalidInput { .. }) => continue,
                Err(e) => panic!("unexpected assembly error: {e}"),
            }
        }
        let (nonce, nullifier, proof, (witness, public)) =
            chosen.expect("some nonce below the bound within 200 draws");

        assert_eq!(public.pseudonym, poseidon::hash3(ms, nonce, domain));
        assert_eq!(public.nullifier, nullifier);
        assert_eq!(public.commitment_hash, poseidon::hash2(ms, blinding));
        assert_eq!(public.registry_root, proof.root);
        assert_eq!(witness.merkle_siblings.len(), 8);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        // Find a nonce whose pseudonym or nullifier lands above 2^252 and
        // check assembly refuses it.
        let tree = IndexedMerkleTree::new(8);
        let (ms, domain, cred_id) = (BnFr::from(2u64), BnFr::from(5u64), BnFr::from(3u64));
        for nonce in 0u64..200 {
            let nonce = BnFr::from(nonce);
            let pseudonym = derive_pseudonym(&ms, &nonce, &domain);
            let nullifier = derive_nullifier(&cred_id, &nonce, &domain);
            if crate::curve::fits_comparison_range(&pseudonym)
                && crate::curve::fits_comparison_range(&nullifier)
            {
                continue;
            }
            let proof = tree.non_membership_proof(&nullifier).unwrap();
            let result = assemble(
                ms,
                nonce,
                domain,
                cred_id,
                BnFr::from(6u64),
                BnFr::from(9u64),
                &proof,
            );
            assert!(matches!(result, Err(HalpError::InvalidInput { .. })));
            return;
        }
        panic!("expected at least one out-of-range draw in 200 nonces");
    }

    #[test]
    fn test_order_of_public_vector() {
        let p = AuthPublicInputs {
            pseudonym: BnFr::from(1u64),
            nullifier: BnFr::from(2u64),
            commitment_hash: BnFr::from(3u64),
            registry_root: BnFr::from(4u64),
            challenge: BnFr::from(5u64),
        };
        let v = p.to_vec();
        assert_eq!(v, vec![
            BnFr::from(1u64),
            BnFr::from(2u64),
            BnFr::from(3u64),
            BnFr::from(4u64),
            BnFr::from(5u64),
        ]);
    }
}
