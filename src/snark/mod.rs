//! Groth16 Bindings for the halp-auth Circuit
//!
//! Key generation, proving, and verification over BN254, plus versioned key
//! persistence so issuer and verifier processes can restart without a new
//! trusted setup. Proving is CPU-bound (tens of ms to seconds); callers that
//! need async entry points go through [`crate::hybrid`], which offloads to a
//! worker thread.

pub mod circuit;
pub mod wire;
pub mod witness;

use ark_bn254::Bn254;
use ark_groth16::{
    prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey,
};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use rand::{CryptoRng, RngCore};
use std::fs;
use std::path::Path;

use crate::errors::{HalpError, HalpResult};

pub use circuit::AuthCircuit;
pub use wire::{PublicInputsWire, SnarkProofWire};
pub use witness::{derive_nullifier, derive_pseudonym, AuthPublicInputs, AuthWitness};

/// Identifier of the deployed circuit; challenges carry it so clients prove
/// against the right key.
pub const CIRCUIT_ID: &str = "halp-auth-v1";

/// Run the circuit-specific trusted setup for a tree of the given height.
pub fn setup<R: RngCore + CryptoRng>(
    height: usize,
    rng: &mut R,
) -> HalpResult<(ProvingKey<Bn254>, VerifyingKey<Bn254>)> {
    Groth16::<Bn254>::circuit_specific_setup(AuthCircuit::blank(height), rng)
        .map_err(|e| HalpError::internal(format!("Groth16 setup failed: {e}")))
}

/// Holder-side prover.
pub struct AuthProver {
    proving_key: ProvingKey<Bn254>,
    height: usize,
}

impl AuthProver {
    pub fn new(proving_key: ProvingKey<Bn254>, height: usize) -> Self {
        Self { proving_key, height }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Produce a proof for an assembled witness and its public inputs.
    pub fn prove<R: RngCore + CryptoRng>(
        &self,
        witness: AuthWitness,
        public: AuthPublicInputs,
        rng: &mut R,
    ) -> HalpResult<Proof<Bn254>> {
        if witness.merkle_siblings.len() != self.height
            || witness.merkle_path_indices.len() != self.height
        {
            return Err(HalpError::invalid_input(format!(
                "witness path length {} does not match circuit height {}",
                witness.merkle_siblings.len(),
                self.height
            )));
        }
        let circuit = AuthCircuit::new(self.height, witness, public);
        Groth16::<Bn254>::prove(&self.proving_key, circuit, rng)
            .map_err(|e| HalpError::internal(format!("Groth16 proving failed: {e}")))
    }

    /// Persist the proving key.
    pub fn save(&self, path: &Path) -> HalpResult<()> {
        let mut bytes = Vec::new();
        self.proving_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| HalpError::serialization(format!("proving key encode: {e}")))?;
        fs::write(path, bytes).map_err(|e| HalpError::internal(format!("proving key write: {e}")))
    }

    /// Load a persisted proving key.
    pub fn load(path: &Path, height: usize) -> HalpResult<Self> {
        let bytes =
            fs::read(path).map_err(|e| HalpError::internal(format!("proving key read: {e}")))?;
        let proving_key = ProvingKey::deserialize_compressed(bytes.as_slice())
            .map_err(|e| HalpError::serialization(format!("proving key decode: {e}")))?;
        Ok(Self::new(proving_key, height))
    }
}

/// Verifier-side pairing check, with the verification key prepared once.
pub struct AuthVerifier {
    prepared_vk: PreparedVerifyingKey<Bn254>,
}

impl AuthVerifier {
    pub fn new(verifying_key: &VerifyingKey<Bn254>) -> Self {
        Self {
            prepared_vk: prepare_verifying_key(verifying_key),
        }
    }

    /// Verify a proof against public inputs in the declared order.
    pub fn verify(&self, public: &AuthPublicInputs, proof: &Proof<Bn254>) -> HalpResult<bool> {
        Groth16::<Bn254>::verify_with_processed_vk(&self.prepared_vk, &public.to_vec(), proof)
            .map_err(|e| HalpError::internal(format!("Groth16 verification failed: {e}")))
    }

    /// Load a persisted verification key.
    pub fn load(path: &Path) -> HalpResult<Self> {
        let bytes = fs::read(path)
            .map_err(|e| HalpError::internal(format!("verification key read: {e}")))?;
        let vk = VerifyingKey::deserialize_compressed(bytes.as_slice())
            .map_err(|e| HalpError::serialization(format!("verification key decode: {e}")))?;
        Ok(Self::new(&vk))
    }
}

/// Persist a verification key next to the proving key.
pub fn save_verifying_key(vk: &VerifyingKey<Bn254>, path: &Path) -> HalpResult<()> {
    let mut bytes = Vec::new();
    vk.serialize_compressed(&mut bytes)
        .map_err(|e| HalpError::serialization(format!("verification key encode: {e}")))?;
    fs::write(path, bytes).map_err(|e| HalpError::internal(format!("verification key write: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::BnFr;
    use crate::poseidon;
    use crate::registry::tree::IndexedMerkleTree;
    use ark_r1cs_std::alloc::AllocVar;
    use ark_r1cs_std::fields::fp::FpVar;
    use ark_r1cs_std::R1CSVar;
    use ark_relations::r1cs::ConstraintSystem;
    use rand::rngs::OsRng;

    const TEST_HEIGHT: usize = 8;

    #[test]
    fn test_gadget_matches_host_poseidon() {
        let cs = ConstraintSystem::<BnFr>::new_ref();
        let a = FpVar::new_witness(cs.clone(), || Ok(BnFr::from(7u64))).unwrap();
        let b = FpVar::new_witness(cs.clone(), || Ok(BnFr::from(11u64))).unwrap();
        let c = FpVar::new_witness(cs.clone(), || Ok(BnFr::from(13u64))).unwrap();

        let h2 = circuit::poseidon_var(
            cs.clone(),
            &poseidon::POSEIDON_ARITY2,
            &[a.clone(), b.clone()],
        )
        .unwrap();
        assert_eq!(
            h2.value().unwrap(),
            poseidon::hash2(BnFr::from(7u64), BnFr::from(11u64))
        );

        let h3 = circuit::poseidon_var(cs.clone(), &poseidon::POSEIDON_ARITY3, &[a, b, c]).unwrap();
        assert_eq!(
            h3.value().unwrap(),
            poseidon::hash3(BnFr::from(7u64), BnFr::from(11u64), BnFr::from(13u64))
        );
        assert!(cs.is_satisfied().unwrap());
    }

    fn sample_session(
        tree: &IndexedMerkleTree,
    ) -> (AuthWitness, AuthPublicInputs) {
        let (ms, domain, cred_id, blinding, challenge) = (
            BnFr::from(2u64),
            BnFr::from(5u64),
            BnFr::from(3u64),
            BnFr::from(6u64),
            BnFr::from(9u64),
        );
        for nonce in 0u64..500 {
            let nonce = BnFr::from(nonce);
            let nullifier = derive_nullifier(&cred_id, &nonce, &domain);
            let Ok(proof) = tree.non_membership_proof(&nullifier) else {
                continue;
            };
            if let Ok(built) =
                witness::assemble(ms, nonce, domain, cred_id, blinding, challenge, &proof)
            {
                return built;
            }
        }
        panic!("no in-range nonce found");
    }

    #[test]
    fn test_circuit_satisfied_by_valid_witness() {
        let mut tree = IndexedMerkleTree::new(TEST_HEIGHT);
        tree.insert(BnFr::from(1000u64)).unwrap();
        let (witness, public) = sample_session(&tree);

        let cs = ConstraintSystem::<BnFr>::new_ref();
        use ark_relations::r1cs::ConstraintSynthesizer;
        AuthCircuit::new(TEST_HEIGHT, witness, public)
            .generate_constraints(cs.clone())
            .unwrap();
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_circuit_rejects_wrong_pseudonym() {
        let tree = IndexedMerkleTree::new(TEST_HEIGHT);
        let (witness, mut public) = sample_session(&tree);
        public.pseudonym += BnFr::from(1u64);

        let cs = ConstraintSystem::<BnFr>::new_ref();
        use ark_relations::r1cs::ConstraintSynthesizer;
        AuthCircuit::new(TEST_HEIGHT, witness, public)
            .generate_constraints(cs.clone())
            .unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_prove_verify_roundtrip() {
        let mut tree = IndexedMerkleTree::new(TEST_HEIGHT);
        tree.insert(BnFr::from(1000u64)).unwrap();
        let (witness, public) = sample_session(&tree);

        let (pk, vk) = setup(TEST_HEIGHT, &mut OsRng).unwrap();
        let prover = AuthProver::new(pk, TEST_HEIGHT);
        let verifier = AuthVerifier::new(&vk);

        let proof = prover.prove(witness, public.clone(), &mut OsRng).unwrap();
        assert!(verifier.verify(&public, &proof).unwrap());

        let mut tampered = public.clone();
        tampered.nullifier += BnFr::from(1u64);
        assert!(!verifier.verify(&tampered, &proof).unwrap());
    }

    #[test]
    fn test_wire_roundtrip_preserves_validity() {
        let tree = IndexedMerkleTree::new(TEST_HEIGHT);
        let (witness, public) = sample_session(&tree);

        let (pk, vk) = setup(TEST_HEIGHT, &mut OsRng).unwrap();
        let prover = AuthProver::new(pk, TEST_HEIGHT);
        let verifier = AuthVerifier::new(&vk);

        let proof = prover.prove(witness, public.clone(), &mut OsRng).unwrap();
        let wire = SnarkProofWire::from_proof(&proof).unwrap();
        let signals = PublicInputsWire::from_inputs(&public);

        let decoded_proof = wire.to_proof().unwrap();
        let decoded_public = signals.to_inputs().unwrap();
        assert!(verifier.verify(&decoded_public, &decoded_proof).unwrap());
    }

    #[test]
    fn test_key_persistence_roundtrip() {
        let tree = IndexedMerkleTree::new(TEST_HEIGHT);
        let (witness_data, public) = sample_session(&tree);
        let (pk, vk) = setup(TEST_HEIGHT, &mut OsRng).unwrap();

        let dir = std::env::temp_dir().join("halp_snark_keys_test");
        std::fs::create_dir_all(&dir).unwrap();
        let pk_path = dir.join("auth.pk");
        let vk_path = dir.join("auth.vk");
        AuthProver::new(pk, TEST_HEIGHT).save(&pk_path).unwrap();
        save_verifying_key(&vk, &vk_path).unwrap();

        let prover = AuthProver::load(&pk_path, TEST_HEIGHT).unwrap();
        let verifier = AuthVerifier::load(&vk_path).unwrap();
        let proof = prover.prove(witness_data, public.clone(), &mut OsRng).unwrap();
        assert!(verifier.verify(&public, &proof).unwrap());

        std::fs::remove_file(&pk_path).ok();
        std::fs::remove_file(&vk_path).ok();
    }

    #[test]
    fn test_height_mismatch_rejected() {
        let tree = IndexedMerkleTree::new(TEST_HEIGHT);
        let (witness, public) = sample_session(&tree);
        let (pk, _vk) = setup(TEST_HEIGHT, &mut OsRng).unwrap();
        let prover = AuthProver::new(pk, TEST_HEIGHT + 1);
        assert!(prover.prove(witness, public, &mut OsRng).is_err());
    }
}
