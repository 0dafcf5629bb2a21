//! Anonymous Credential Issuance
//!
//! The holder submits a Pedersen commitment, a Schnorr proof of its opening,
//! and an AES-GCM envelope of the claims; the issuer re-derives the proof
//! context from request fields, decrypts and re-hashes the claims, and on
//! acceptance signs a W3C credential whose first BBS+ message is the
//! holder's 32-byte binding commitment hash.
//!
//! The issuer never learns the holder's DID or master secret, only the
//! context pseudonym, the commitment, and the claims it is being asked to
//! certify.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;

use crate::bbs::{self, BbsKeypair};
use crate::commitment::{
    self, binding_commitment_hash, issuance_context, SchnorrProof,
};
use crate::credential::{build_message_vector, encode_message, CredentialRecord};
use crate::curve::{
    bn_scalar_from_hex, bn_scalar_to_hex, point_from_hex, point_to_bytes, point_to_hex,
    scalar_from_bytes, scalar_from_hex, scalar_to_hex, BlsFr,
};
use crate::errors::{HalpError, HalpResult};
use crate::params::{PublicParameters, COMMITMENT_DOMAIN_TAG};
use crate::util::{iso8601_utc, unix_millis};

type ClaimsCipher = AesGcm<Aes256, U16>;

const CLAIMS_IV_BYTES: usize = 16;
const CLAIMS_TAG_BYTES: usize = 16;

/// Schnorr proof as it appears inside the issuance request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentProofWire {
    /// Fiat–Shamir challenge, hex.
    pub challenge: String,
    /// Responses `[s_ms, s_a…, s_r]` as decimal strings.
    pub responses: Vec<String>,
    /// Commitment to the blinding scalars, hex.
    #[serde(rename = "T")]
    pub t: String,
}

/// The anonymous issuance request body as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceRequest {
    /// Context pseudonym of the requester, hex.
    pub pseudonym: String,
    /// Pedersen commitment, 96 hex chars.
    pub commitment: String,
    pub commitment_proof: CommitmentProofWire,
    pub credential_type: String,
    /// `iv:tag:ct` AES-256-GCM envelope, hex segments.
    pub encrypted_claims: String,
    /// SHA-256 of the serialized claims, hex.
    pub claims_hash: String,
    /// Proof nonce, hex.
    pub nonce: String,
    pub timestamp: u64,
    /// Binding value `Poseidon₂(ms, blinding)` the issuer signs as `m₀`, hex.
    pub commitment_hash: String,
}

/// Issuer response: the signed credential and everything the holder needs
/// to finish a [`CredentialRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceResponse {
    pub credential_id: String,
    pub vc_json: Value,
    pub bbs_signature: String,
    pub message_labels: Vec<String>,
    pub issuer_public_key: String,
}

/// Holder-retained issuance secrets, needed to finalize the record and to
/// open the commitment inside the SNARK later.
#[derive(Debug, Clone)]
pub struct HolderIssuanceState {
    pub blinding_hex: String,
    pub commitment_hash_hex: String,
}

/// Deterministic attribute encoding both sides derive from the claims
/// object: `"key:value"` per entry, in key order.
fn claim_attributes(claims: &Value) -> HalpResult<Vec<BlsFr>> {
    let object = claims
        .as_object()
        .ok_or_else(|| HalpError::invalid_input("claims must be a JSON object"))?;
    let mut attributes = Vec::with_capacity(object.len());
    for (key, value) in object {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other)
                .map_err(|e| HalpError::serialization(format!("claim '{key}': {e}")))?,
        };
        attributes.push(encode_message(&format!("{key}:{rendered}")));
    }
    Ok(attributes)
}

fn claims_digest(claims: &Value) -> HalpResult<(Vec<u8>, String)> {
    let bytes = serde_json::to_vec(claims)
        .map_err(|e| HalpError::serialization(format!("claims encode: {e}")))?;
    let digest = hex::encode(Sha256::digest(&bytes));
    Ok((bytes, digest))
}

/// Seal a claims object under a shared 32-byte key as `iv:tag:ct`.
pub fn seal_claims(key: &[u8; 32], claims: &Value) -> HalpResult<String> {
    let (plaintext, _) = claims_digest(claims)?;
    let cipher = ClaimsCipher::new(Key::<ClaimsCipher>::from_slice(key));
    let mut iv = [0u8; CLAIMS_IV_BYTES];
    OsRng.fill_bytes(&mut iv);
    let mut sealed = cipher
        .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_slice())
        .map_err(|_| HalpError::internal("claims encryption failed"))?;
    let tag_start = sealed.len() - CLAIMS_TAG_BYTES;
    let tag = sealed.split_off(tag_start);
    Ok(format!(
        "{}:{}:{}",
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(sealed)
    ))
}

/// Open an `iv:tag:ct` claims envelope.
pub fn open_claims(key: &[u8; 32], sealed: &str) -> HalpResult<Value> {
    let parts: Vec<&str> = sealed.split(':').collect();
    if parts.len() != 3 {
        return Err(HalpError::invalid_input(
            "claims envelope must be iv:tag:ct",
        ));
    }
    let iv = hex::decode(parts[0])
        .map_err(|e| HalpError::invalid_input(format!("claims iv: {e}")))?;
    let tag = hex::decode(parts[1])
        .map_err(|e| HalpError::invalid_input(format!("claims tag: {e}")))?;
    let ct = hex::decode(parts[2])
        .map_err(|e| HalpError::invalid_input(format!("claims ciphertext: {e}")))?;
    if iv.len() != CLAIMS_IV_BYTES || tag.len() != CLAIMS_TAG_BYTES {
        return Err(HalpError::invalid_input("malformed claims envelope"));
    }
    let cipher = ClaimsCipher::new(Key::<ClaimsCipher>::from_slice(key));
    let mut sealed_bytes = ct;
    sealed_bytes.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(Nonce::<U16>::from_slice(&iv), sealed_bytes.as_slice())
        .map_err(|_| HalpError::decrypt("claims authentication failed"))?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| HalpError::serialization(format!("claims decode: {e}")))
}

/// Credential id bound to the commitment: `urn:halp:cred:<digest>`.
fn credential_id(commitment_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(COMMITMENT_DOMAIN_TAG);
    hasher.update(commitment_bytes);
    format!("urn:halp:cred:{}", &hex::encode(hasher.finalize())[..32])
}

fn schema_for(credential_type: &str) -> String {
    format!("credential:{credential_type}")
}

/// Build the anonymous issuance request on the holder side.
///
/// Returns the wire request plus the secrets the holder must retain to
/// finalize the credential record.
pub fn prepare_request(
    params: &PublicParameters,
    master_secret: &BlsFr,
    pseudonym_hex: &str,
    credential_type: &str,
    claims: &Value,
    claims_key: &[u8; 32],
) -> HalpResult<(IssuanceRequest, HolderIssuanceState)> {
    let attributes = claim_attributes(claims)?;
    let blinding = scalar_from_bytes(&crate::curve::random_bounded_scalar(&mut OsRng))?;
    let (commitment, blinding) =
        commitment::create_commitment(params, master_secret, &attributes, Some(blinding))?;

    // One nonce seeds both the request context and the proof transcript.
    let mut nonce = [0u8; 32];
    OsRng.fill_bytes(&mut nonce);
    let context = issuance_context(pseudonym_hex, &schema_for(credential_type), &nonce);
    let proof = commitment::generate_proof_with_nonce(
        params,
        master_secret,
        &attributes,
        &blinding,
        &commitment,
        &context,
        nonce,
    )?;

    let (_, claims_hash) = claims_digest(claims)?;
    let commitment_hash = binding_commitment_hash(master_secret, &blinding);

    let request = IssuanceRequest {
        pseudonym: pseudonym_hex.to_string(),
        commitment: point_to_hex(&commitment),
        commitment_proof: CommitmentProofWire {
            challenge: scalar_to_hex(&proof.challenge),
            responses: proof.responses.iter().map(|s| s.to_string()).collect(),
            t: point_to_hex(&proof.t),
        },
        credential_type: credential_type.to_string(),
        encrypted_claims: seal_claims(claims_key, claims)?,
        claims_hash,
        nonce: hex::encode(proof.nonce),
        timestamp: unix_millis(),
        commitment_hash: bn_scalar_to_hex(&commitment_hash),
    };
    let state = HolderIssuanceState {
        blinding_hex: scalar_to_hex(&blinding),
        commitment_hash_hex: request.commitment_hash.clone(),
    };
    Ok((request, state))
}

/// The credential issuer.
pub struct Issuer {
    params: Arc<PublicParameters>,
    keypair: BbsKeypair,
    issuer_did: String,
    claims_key: [u8; 32],
}

impl Issuer {
    pub fn new(params: Arc<PublicParameters>, issuer_did: &str, claims_key: [u8; 32]) -> Self {
        Self {
            params,
            keypair: bbs::keygen(&mut OsRng),
            issuer_did: issuer_did.to_string(),
            claims_key,
        }
    }

    /// The issuer's public key, as placed in credential records.
    pub fn public_key_b64(&self) -> HalpResult<String> {
        bbs::public_key_to_b64(&self.keypair.public_key)
    }

    /// Validate an anonymous issuance request and sign the credential.
    pub fn process(&self, request: &IssuanceRequest) -> HalpResult<IssuanceResponse> {
        let commitment = point_from_hex(&request.commitment)?;
        let proof = parse_proof_wire(request, &commitment)?;

        let claims = open_claims(&self.claims_key, &request.encrypted_claims)?;
        let (_, recomputed_hash) = claims_digest(&claims)?;
        if recomputed_hash != request.claims_hash {
            return Err(HalpError::invalid_input("claims hash mismatch"));
        }

        let attributes = claim_attributes(&claims)?;
        let context = issuance_context(
            &request.pseudonym,
            &schema_for(&request.credential_type),
            &proof.nonce,
        );
        if !commitment::verify_proof(&self.params, &proof, &context, attributes.len())? {
            return Err(HalpError::invalid_proof("commitment proof rejected"));
        }

        let commitment_hash = bn_scalar_from_hex(&request.commitment_hash)?;
        let id = credential_id(&point_to_bytes(&commitment));
        let vc_json = json!({
            "@context": ["https://www.w3.org/ns/credentials/v2"],
            "id": id,
            "type": ["VerifiableCredential", request.credential_type],
            "issuer": self.issuer_did,
            "validFrom": iso8601_utc(unix_millis()),
            "credentialSubject": claims,
        });

        let (messages, labels) = build_message_vector(&vc_json, Some(&commitment_hash))?;
        let signature = bbs::sign(&mut OsRng, &self.keypair.secret_key, &messages)?;

        tracing::debug!(credential_type = %request.credential_type, id = %id, "credential issued");
        Ok(IssuanceResponse {
            credential_id: id,
            vc_json,
            bbs_signature: bbs::signature_to_b64(&signature)?,
            message_labels: labels,
            issuer_public_key: self.public_key_b64()?,
        })
    }
}

fn parse_proof_wire(
    request: &IssuanceRequest,
    commitment: &crate::curve::G1Affine,
) -> HalpResult<SchnorrProof> {
    let nonce_bytes = hex::decode(&request.nonce)
        .map_err(|e| HalpError::invalid_input(format!("proof nonce: {e}")))?;
    let nonce: [u8; 32] = {
        // Right-pad shorter nonces into the fixed transcript slot.
        let mut fixed = [0u8; 32];
        if nonce_bytes.len() > 32 {
            return Err(HalpError::invalid_input("proof nonce too long"));
        }
        fixed[..nonce_bytes.len()].copy_from_slice(&nonce_bytes);
        fixed
    };
    let responses = request
        .commitment_proof
        .responses
        .iter()
        .map(|s| {
            BlsFr::from_str(s)
                .map_err(|_| HalpError::invalid_scalar(format!("bad response decimal: {s:?}")))
        })
        .collect::<HalpResult<Vec<_>>>()?;
    Ok(SchnorrProof {
        commitment: *commitment,
        t: point_from_hex(&request.commitment_proof.t)?,
        challenge: scalar_from_hex(&request.commitment_proof.challenge)?,
        responses,
        nonce,
    })
}

/// Finish the holder-side record from the issuer's response.
pub fn finalize_credential(
    response: &IssuanceResponse,
    state: &HolderIssuanceState,
) -> HalpResult<CredentialRecord> {
    let record = CredentialRecord {
        id: response.credential_id.clone(),
        vc_json: response.vc_json.clone(),
        bbs_signature: response.bbs_signature.clone(),
        commitment_hash: state.commitment_hash_hex.clone(),
        blinding_factor: state.blinding_hex.clone(),
        issuer_public_key: response.issuer_public_key.clone(),
        message_labels: response.message_labels.clone(),
    };
    if !record.verify()? {
        return Err(HalpError::invalid_proof(
            "issued credential does not verify under the issuer key",
        ));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claims_envelope_roundtrip() {
        let key = [7u8; 32];
        let claims = json!({"studentId": "S-1", "year": 2026});
        let sealed = seal_claims(&key, &claims).unwrap();
        assert_eq!(sealed.split(':').count(), 3);
        assert_eq!(open_claims(&key, &sealed).unwrap(), claims);
    }

    #[test]
    fn test_claims_envelope_tamper_detected() {
        let key = [7u8; 32];
        let claims = json!({"studentId": "S-1"});
        let sealed = seal_claims(&key, &claims).unwrap();
        let mut parts: Vec<String> = sealed.split(':').map(String::from).collect();
        let mut ct = hex::decode(&parts[2]).unwrap();
        ct[0] ^= 1;
        parts[2] = hex::encode(ct);
        assert!(matches!(
            open_claims(&key, &parts.join(":")).unwrap_err(),
            HalpError::Decrypt { .. }
        ));
    }

    #[test]
    fn test_claims_envelope_wrong_key() {
        let claims = json!({"a": 1});
        let sealed = seal_claims(&[1u8; 32], &claims).unwrap();
        assert!(open_claims(&[2u8; 32], &sealed).is_err());
    }

    #[test]
    fn test_claim_attributes_deterministic_and_typed() {
        let claims = json!({"b": true, "a": "x", "n": 3});
        let first = claim_attributes(&claims).unwrap();
        let second = claim_attributes(&claims).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        // Key order is lexicographic: a, b, n.
        assert_eq!(first[0], encode_message("a:x"));
        assert_eq!(first[1], encode_message("b:true"));
        assert_eq!(first[2], encode_message("n:3"));
    }

    #[test]
    fn test_credential_id_stable() {
        let a = credential_id(b"commitment-bytes");
        let b = credential_id(b"commitment-bytes");
        assert_eq!(a, b);
        assert!(a.starts_with("urn:halp:cred:"));
        assert_ne!(a, credential_id(b"other"));
    }

    // Full request/process/finalize flow is covered in tests/issuance_flow.rs.
}
