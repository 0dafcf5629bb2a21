//! Pedersen Commitment and Schnorr Sigma Protocol
//!
//! Issuance-time binding of a credential to the holder's master secret:
//! the holder commits `C = G^ms · ∏ Hᵢ^aᵢ · Hᵣ^r` and proves knowledge of
//! every exponent with a Fiat–Shamir Schnorr proof over `(C, T, ctx, nonce)`.
//! The issuer learns `C` and the revealed attributes, nothing else.
//!
//! The Fiat–Shamir challenge is SHA-256 prefixed with the
//! `BBS_COMMITMENT_CHALLENGE_V1` tag, reduced into the BLS12-381 scalar
//! field. Response order is fixed: `[s_ms, s_a1, …, s_ak, s_r]`.

use ark_ff::{One, Zero};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::curve::{
    bls_scalar_to_bn, point_add, point_mul, point_neg, point_to_bytes, random_scalar,
    scalar_from_bytes_reduced, BlsFr, BnFr, G1Affine,
};
use crate::errors::{HalpError, HalpResult};
use crate::params::PublicParameters;
use crate::poseidon;

/// DST prepended to every Fiat–Shamir challenge input.
const CHALLENGE_DST: &[u8] = b"BBS_COMMITMENT_CHALLENGE_V1";

/// Typed attribute values with a stable field encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(u64),
    Flag(bool),
}

impl AttributeValue {
    /// Encode into the BLS scalar field.
    ///
    /// Strings hash through SHA-256 and reduce; integers cast directly;
    /// booleans map to {0, 1}. Issuer and holder must produce identical
    /// elements, so the encoding never depends on locale or platform.
    pub fn encode(&self) -> BlsFr {
        match self {
            AttributeValue::Text(s) => {
                scalar_from_bytes_reduced(&Sha256::digest(s.as_bytes()))
            }
            AttributeValue::Integer(n) => BlsFr::from(*n),
            AttributeValue::Flag(true) => BlsFr::one(),
            AttributeValue::Flag(false) => BlsFr::zero(),
        }
    }
}

/// Schnorr proof of knowledge of a commitment opening.
#[derive(Debug, Clone)]
pub struct SchnorrProof {
    pub commitment: G1Affine,
    pub t: G1Affine,
    pub challenge: BlsFr,
    /// `[s_ms, s_a1, …, s_ak, s_r]`.
    pub responses: Vec<BlsFr>,
    pub nonce: [u8; 32],
}

/// Compute `C = G^ms · ∏ Hᵢ^aᵢ · Hᵣ^r`, sampling `r` when not supplied.
pub fn create_commitment(
    params: &PublicParameters,
    master_secret: &BlsFr,
    attributes: &[BlsFr],
    blinding: Option<BlsFr>,
) -> HalpResult<(G1Affine, BlsFr)> {
    if attributes.len() > params.max_attributes {
        return Err(HalpError::invalid_input(format!(
            "{} attributes exceed the {}-slot parameter set",
            attributes.len(),
            params.max_attributes
        )));
    }
    let r = blinding.unwrap_or_else(|| random_scalar(&mut OsRng));
    let commitment = commit_linear(params, master_secret, attributes, &r);
    Ok((commitment, r))
}

fn commit_linear(
    params: &PublicParameters,
    ms_exp: &BlsFr,
    attr_exps: &[BlsFr],
    blind_exp: &BlsFr,
) -> G1Affine {
    let mut acc = point_mul(&params.g, ms_exp);
    for (value, generator) in attr_exps.iter().zip(params.h.iter()) {
        acc = point_add(&acc, &point_mul(generator, value));
    }
    point_add(&acc, &point_mul(&params.h_r, blind_exp))
}

fn fiat_shamir_challenge(
    commitment: &G1Affine,
    t: &G1Affine,
    context: &[u8],
    nonce: &[u8; 32],
) -> BlsFr {
    let mut hasher = Sha256::new();
    hasher.update(CHALLENGE_DST);
    hasher.update(point_to_bytes(commitment));
    hasher.update(point_to_bytes(t));
    hasher.update(context);
    hasher.update(nonce);
    scalar_from_bytes_reduced(&hasher.finalize())
}

/// Prove knowledge of `(ms, a₁…aₙ, r)` behind `commitment` under `context`,
/// sampling a fresh proof nonce.
pub fn generate_proof(
    params: &PublicParameters,
    master_secret: &BlsFr,
    attributes: &[BlsFr],
    blinding: &BlsFr,
    commitment: &G1Affine,
    context: &[u8],
) -> HalpResult<SchnorrProof> {
    let mut nonce = [0u8; 32];
    OsRng.fill_bytes(&mut nonce);
    generate_proof_with_nonce(
        params,
        master_secret,
        attributes,
        blinding,
        commitment,
        context,
        nonce,
    )
}

/// Prove with a caller-supplied nonce. Issuance uses this so the same nonce
/// can seed both the request context and the Fiat–Shamir transcript.
pub fn generate_proof_with_nonce(
    params: &PublicParameters,
    master_secret: &BlsFr,
    attributes: &[BlsFr],
    blinding: &BlsFr,
    commitment: &G1Affine,
    context: &[u8],
    nonce: [u8; 32],
) -> HalpResult<SchnorrProof> {
    if attributes.len() > params.max_attributes {
        return Err(HalpError::invalid_input(format!(
            "{} attributes exceed the {}-slot parameter set",
            attributes.len(),
            params.max_attributes
        )));
    }
    let mut rng = OsRng;
    let r_ms = random_scalar(&mut rng);
    let r_attrs: Vec<BlsFr> = (0..attributes.len())
        .map(|_| random_scalar(&mut rng))
        .collect();
    let r_blind = random_scalar(&mut rng);
    let t = commit_linear(params, &r_ms, &r_attrs, &r_blind);

    let challenge = fiat_shamir_challenge(commitment, &t, context, &nonce);

    let mut responses = Vec::with_capacity(attributes.len() + 2);
    responses.push(r_ms + challenge * master_secret);
    for (r_i, a_i) in r_attrs.iter().zip(attributes.iter()) {
        responses.push(*r_i + challenge * a_i);
    }
    responses.push(r_blind + challenge * blinding);

    Ok(SchnorrProof {
        commitment: *commitment,
        t,
        challenge,
        responses,
        nonce,
    })
}

/// Verify a Schnorr proof under `context` for a commitment over `num_attributes` slots.
pub fn verify_proof(
    params: &PublicParameters,
    proof: &SchnorrProof,
    context: &[u8],
    num_attributes: usize,
) -> HalpResult<bool> {
    if num_attributes > params.max_attributes {
        return Err(HalpError::invalid_input(format!(
            "{num_attributes} attributes exceed the {}-slot parameter set",
            params.max_attributes
        )));
    }
    if proof.responses.len() != num_attributes + 2 {
        return Ok(false);
    }

    // T' = G^s_ms · ∏ Hᵢ^sᵢ · Hᵣ^s_r · C^{-c}
    let s_ms = &proof.responses[0];
    let s_attrs = &proof.responses[1..1 + num_attributes];
    let s_blind = &proof.responses[1 + num_attributes];
    let lhs = commit_linear(params, s_ms, s_attrs, s_blind);
    let c_neg = point_mul(&point_neg(&proof.commitment), &proof.challenge);
    let t_prime = point_add(&lhs, &c_neg);

    let expected = fiat_shamir_challenge(&proof.commitment, &t_prime, context, &proof.nonce);
    Ok(scalars_ct_eq(&proof.challenge, &expected))
}

fn scalars_ct_eq(a: &BlsFr, b: &BlsFr) -> bool {
    let (a, b) = (
        crate::curve::scalar_to_bytes(a),
        crate::curve::scalar_to_bytes(b),
    );
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Issuance context: `SHA256(identity ‖ schema ‖ nonce)`.
///
/// Both sides derive this from request fields alone; a mismatch surfaces as
/// ordinary proof-verification failure.
pub fn issuance_context(identity: &str, schema: &str, nonce: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(schema.as_bytes());
    hasher.update(nonce);
    hasher.finalize().into()
}

/// The 32-byte binding value shared by the SNARK, the BBS+ `m₀`, and the
/// stored credential: `Poseidon₂(ms, blinding)` over BN254.
///
/// The blinding factor must come from [`crate::curve::random_bounded_scalar`]
/// so the same scalar is canonical in both fields.
pub fn binding_commitment_hash(master_secret: &BlsFr, blinding: &BlsFr) -> BnFr {
    poseidon::hash2(bls_scalar_to_bn(master_secret), bls_scalar_to_bn(blinding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{random_bounded_scalar, scalar_from_bytes};
    use rand::thread_rng;

    fn setup(num_attrs: usize) -> (PublicParameters, BlsFr, Vec<BlsFr>, BlsFr) {
        let params = PublicParameters::generate(4).unwrap();
        let mut rng = thread_rng();
        let ms = random_scalar(&mut rng);
        let attrs: Vec<BlsFr> = (0..num_attrs).map(|_| random_scalar(&mut rng)).collect();
        let blinding = scalar_from_bytes(&random_bounded_scalar(&mut rng)).unwrap();
        (params, ms, attrs, blinding)
    }

    #[test]
    fn test_prove_verify_roundtrip() {
        let (params, ms, attrs, blinding) = setup(3);
        let (commitment, r) =
            create_commitment(&params, &ms, &attrs, Some(blinding)).unwrap();
        assert_eq!(r, blinding);

        let ctx = issuance_context("did:example:alice", "credential:Student", b"nonce-1");
        let proof = generate_proof(&params, &ms, &attrs, &r, &commitment, &ctx).unwrap();
        assert_eq!(proof.responses.len(), attrs.len() + 2);
        assert!(verify_proof(&params, &proof, &ctx, attrs.len()).unwrap());
    }

    #[test]
    fn test_no_attribute_commitment() {
        let (params, ms, _, blinding) = setup(0);
        let (commitment, r) = create_commitment(&params, &ms, &[], Some(blinding)).unwrap();
        let ctx = issuance_context("did:example:alice", "credential:Student", b"n");
        let proof = generate_proof(&params, &ms, &[], &r, &commitment, &ctx).unwrap();
        assert_eq!(proof.responses.len(), 2);
        assert!(verify_proof(&params, &proof, &ctx, 0).unwrap());
    }

    #[test]
    fn test_context_mismatch_rejected() {
        let (params, ms, attrs, blinding) = setup(2);
        let (commitment, r) =
            create_commitment(&params, &ms, &attrs, Some(blinding)).unwrap();
        let ctx = issuance_context("did:example:alice", "credential:Student", b"n");
        let proof = generate_proof(&params, &ms, &attrs, &r, &commitment, &ctx).unwrap();

        let other = issuance_context("did:example:alice", "credential:Student", b"other");
        assert!(!verify_proof(&params, &proof, &other, attrs.len()).unwrap());
    }

    #[test]
    fn test_tampered_response_rejected() {
        let (params, ms, attrs, blinding) = setup(2);
        let (commitment, r) =
            create_commitment(&params, &ms, &attrs, Some(blinding)).unwrap();
        let ctx = issuance_context("did:example:alice", "credential:Student", b"n");
        let mut proof = generate_proof(&params, &ms, &attrs, &r, &commitment, &ctx).unwrap();

        // Off-by-one on any single response must fail the check.
        for i in 0..proof.responses.len() {
            proof.responses[i] += BlsFr::one();
            assert!(!verify_proof(&params, &proof, &ctx, attrs.len()).unwrap());
            proof.responses[i] -= BlsFr::one();
        }
        assert!(verify_proof(&params, &proof, &ctx, attrs.len()).unwrap());
    }

    #[test]
    fn test_wrong_response_count_rejected() {
        let (params, ms, attrs, blinding) = setup(2);
        let (commitment, r) =
            create_commitment(&params, &ms, &attrs, Some(blinding)).unwrap();
        let ctx = issuance_context("did:example:alice", "credential:Student", b"n");
        let mut proof = generate_proof(&params, &ms, &attrs, &r, &commitment, &ctx).unwrap();
        proof.responses.pop();
        assert!(!verify_proof(&params, &proof, &ctx, attrs.len()).unwrap());
    }

    #[test]
    fn test_too_many_attributes() {
        let (params, ms, _, _) = setup(0);
        let mut rng = thread_rng();
        let attrs: Vec<BlsFr> = (0..params.max_attributes + 1)
            .map(|_| random_scalar(&mut rng))
            .collect();
        assert!(matches!(
            create_commitment(&params, &ms, &attrs, None).unwrap_err(),
            HalpError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_attribute_encoding_stable() {
        assert_eq!(
            AttributeValue::Text("S-1".into()).encode(),
            AttributeValue::Text("S-1".into()).encode()
        );
        assert_eq!(AttributeValue::Integer(42).encode(), BlsFr::from(42u64));
        assert_eq!(AttributeValue::Flag(true).encode(), BlsFr::one());
        assert_eq!(AttributeValue::Flag(false).encode(), BlsFr::zero());
        assert_ne!(
            AttributeValue::Text("a".into()).encode(),
            AttributeValue::Text("b".into()).encode()
        );
    }

    #[test]
    fn test_binding_hash_deterministic() {
        let (_, ms, _, blinding) = setup(0);
        assert_eq!(
            binding_commitment_hash(&ms, &blinding),
            binding_commitment_hash(&ms, &blinding)
        );
    }
}
