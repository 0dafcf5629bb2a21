//! BBS+ Signing, Verification, and Selective Disclosure
//!
//! Issuer signatures over message vectors on BLS12-381, with bounded
//! proofs of knowledge that reveal an arbitrary subset of messages. The
//! disclosure challenge is bound to the session nonce, so a presentation
//! cannot be replayed under a different challenge.
//!
//! Message vectors are field elements; the canonical byte/string encoding
//! lives in [`crate::credential`]. Signature parameters are derived from a
//! fixed label per message count, which keeps one issuer key valid across
//! credentials of different widths.

use ark_bls12_381::Bls12_381;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bbs_plus::prelude::{
    KeypairG2, PoKOfSignatureG1Proof, PoKOfSignatureG1Protocol, PublicKeyG2, SecretKey,
    SignatureG1, SignatureParamsG1,
};
use dock_crypto_utils::signature::MessageOrBlinding;
use blake2::Blake2b512;
use rand::{CryptoRng, RngCore};
use schnorr_pok::compute_random_oracle_challenge;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::curve::{scalar_from_bytes, scalar_to_bytes, BlsFr};
use crate::errors::{HalpError, HalpResult};

/// Label from which all signature parameters derive.
pub const BBS_PARAMS_LABEL: &[u8] = b"HALP_BBS_SIG_PARAMS_V1";

pub type BbsSecretKey = SecretKey<BlsFr>;
pub type BbsPublicKey = PublicKeyG2<Bls12_381>;
pub type BbsKeypair = KeypairG2<Bls12_381>;
pub type BbsSignature = SignatureG1<Bls12_381>;

/// Selective-disclosure proof as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureProof {
    /// Proof of knowledge of the signature, base64.
    pub proof: String,
    pub revealed_indices: Vec<u32>,
    /// Revealed message scalars, hex, keyed by vector index.
    pub revealed_messages: BTreeMap<u32, String>,
    /// Issuer public key, base64.
    pub issuer_public_key: String,
    /// Session nonce the challenge was bound to, hex.
    pub nonce: String,
    /// Width of the signed message vector.
    pub message_count: u32,
}

/// Signature parameters for a vector of `message_count` messages.
pub fn signature_params(message_count: usize) -> SignatureParamsG1<Bls12_381> {
    SignatureParamsG1::new::<Blake2b512>(BBS_PARAMS_LABEL, message_count as u32)
}

/// Generate an issuer key pair.
///
/// The public key depends only on the parameter label, so it verifies
/// signatures made under any message count.
pub fn keygen<R: RngCore + CryptoRng>(rng: &mut R) -> BbsKeypair {
    KeypairG2::generate_using_rng(rng, &signature_params(1))
}

/// Sign a message vector.
pub fn sign<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret_key: &BbsSecretKey,
    messages: &[BlsFr],
) -> HalpResult<BbsSignature> {
    if messages.is_empty() {
        return Err(HalpError::invalid_input("empty message vector"));
    }
    SignatureG1::new(rng, messages, secret_key, &signature_params(messages.len()))
        .map_err(|e| HalpError::internal(format!("BBS+ signing failed: {e:?}")))
}

/// Verify a signature over the exact message vector it was made for.
pub fn verify(
    public_key: &BbsPublicKey,
    messages: &[BlsFr],
    signature: &BbsSignature,
) -> HalpResult<bool> {
    if messages.is_empty() {
        return Err(HalpError::invalid_input("empty message vector"));
    }
    Ok(signature
        .verify(
            messages,
            public_key.clone(),
            signature_params(messages.len()),
        )
        .is_ok())
}

/// Produce a selective-disclosure proof revealing `revealed_indices`.
///
/// The Fiat–Shamir challenge absorbs the proof transcript and the session
/// nonce, binding the presentation to one authentication session.
pub fn create_disclosure_proof<R: RngCore + CryptoRng>(
    rng: &mut R,
    signature: &BbsSignature,
    public_key: &BbsPublicKey,
    messages: &[BlsFr],
    revealed_indices: &[usize],
    nonce: &[u8],
) -> HalpResult<DisclosureProof> {
    let revealed: BTreeSet<usize> = revealed_indices.iter().copied().collect();
    if let Some(&out_of_range) = revealed.iter().find(|&&i| i >= messages.len()) {
        return Err(HalpError::invalid_input(format!(
            "revealed index {out_of_range} out of range for {} messages",
            messages.len()
        )));
    }
    let params = signature_params(messages.len());

    let protocol = PoKOfSignatureG1Protocol::init(
        rng,
        signature,
        &params,
        messages.iter().enumerate().map(|(i, message)| {
            if revealed.contains(&i) {
                MessageOrBlinding::RevealMessage(message)
            } else {
                MessageOrBlinding::BlindMessageRandomly(message)
            }
        }),
    )
    .map_err(|e| HalpError::internal(format!("BBS+ proof init failed: {e:?}")))?;

    let revealed_scalars: BTreeMap<usize, BlsFr> = revealed
        .iter()
        .map(|&i| (i, messages[i]))
        .collect();
    let mut challenge_bytes = Vec::new();
    protocol
        .challenge_contribution(&revealed_scalars, &params, &mut challenge_bytes)
        .map_err(|e| HalpError::internal(format!("BBS+ challenge contribution: {e:?}")))?;
    challenge_bytes.extend_from_slice(nonce);
    let challenge = compute_random_oracle_challenge::<BlsFr, Blake2b512>(&challenge_bytes);

    let proof = protocol
        .gen_proof(&challenge)
        .map_err(|e| HalpError::internal(format!("BBS+ proof generation: {e:?}")))?;

    Ok(DisclosureProof {
        proof: canonical_to_b64(&proof)?,
        revealed_indices: revealed.iter().map(|&i| i as u32).collect(),
        revealed_messages: revealed_scalars
            .iter()
            .map(|(&i, m)| (i as u32, hex::encode(scalar_to_bytes(m))))
            .collect(),
        issuer_public_key: public_key_to_b64(public_key)?,
        nonce: hex::encode(nonce),
        message_count: messages.len() as u32,
    })
}

/// Verify a selective-disclosure proof against the nonce the verifier issued.
pub fn verify_disclosure_proof(proof: &DisclosureProof, nonce: &[u8]) -> HalpResult<bool> {
    let public_key = public_key_from_b64(&proof.issuer_public_key)?;
    let pok: PoKOfSignatureG1Proof<Bls12_381> = canonical_from_b64(&proof.proof)?;
    let params = signature_params(proof.message_count as usize);

    let revealed_scalars = proof.revealed_scalars()?;
    let mut challenge_bytes = Vec::new();
    pok.challenge_contribution(&revealed_scalars, &params, &mut challenge_bytes)
        .map_err(|e| HalpError::invalid_proof(format!("BBS+ challenge contribution: {e:?}")))?;
    challenge_bytes.extend_from_slice(nonce);
    let challenge = compute_random_oracle_challenge::<BlsFr, Blake2b512>(&challenge_bytes);

    Ok(pok
        .verify(&revealed_scalars, &challenge, public_key, params)
        .is_ok())
}

impl DisclosureProof {
    /// Decode the revealed-message map back into scalars.
    pub fn revealed_scalars(&self) -> HalpResult<BTreeMap<usize, BlsFr>> {
        self.revealed_messages
            .iter()
            .map(|(&i, hex_value)| {
                let bytes = hex::decode(hex_value).map_err(|e| {
                    HalpError::invalid_scalar(format!("revealed message {i}: {e}"))
                })?;
                Ok((i as usize, scalar_from_bytes(&bytes)?))
            })
            .collect()
    }

    /// The revealed message at a vector index, as wire hex.
    pub fn revealed_message_hex(&self, index: u32) -> Option<&str> {
        self.revealed_messages.get(&index).map(String::as_str)
    }
}

/// Base64 for any arkworks canonical encoding.
pub(crate) fn canonical_to_b64<T: CanonicalSerialize>(value: &T) -> HalpResult<String> {
    let mut bytes = Vec::new();
    value
        .serialize_compressed(&mut bytes)
        .map_err(|e| HalpError::serialization(format!("canonical encode: {e}")))?;
    Ok(BASE64.encode(bytes))
}

pub(crate) fn canonical_from_b64<T: CanonicalDeserialize>(encoded: &str) -> HalpResult<T> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| HalpError::serialization(format!("base64 decode: {e}")))?;
    T::deserialize_compressed(bytes.as_slice())
        .map_err(|e| HalpError::serialization(format!("canonical decode: {e}")))
}

/// Export an issuer public key for the wire.
pub fn public_key_to_b64(public_key: &BbsPublicKey) -> HalpResult<String> {
    canonical_to_b64(public_key)
}

/// Parse an issuer public key from the wire.
pub fn public_key_from_b64(encoded: &str) -> HalpResult<BbsPublicKey> {
    canonical_from_b64(encoded)
}

/// Export a signature for persistence in a credential record.
pub fn signature_to_b64(signature: &BbsSignature) -> HalpResult<String> {
    canonical_to_b64(signature)
}

/// Parse a stored signature.
pub fn signature_from_b64(encoded: &str) -> HalpResult<BbsSignature> {
    canonical_from_b64(encoded)
}
