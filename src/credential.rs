//! Credential Records and Canonical Message Vectors
//!
//! BBS+ signs a message vector derived from the W3C credential JSON. The
//! derivation must be bit-identical on both sides of the protocol:
//!
//! ```text
//! [ context_json, id, type_json, issuer_json, validFrom,
//!   (validUntil?), subject.id?, "key:value" for each subject key ≠ id ]
//! ```
//!
//! Subject keys enumerate in lexicographic order. For privacy-bound
//! credentials the 32-byte binding commitment hash is prepended as `m₀` and
//! `messageLabels` records the prepend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::bbs::{self, BbsPublicKey, BbsSignature};
use crate::curve::{bn_scalar_from_hex, bn_scalar_to_bls, scalar_from_bytes_reduced, BlsFr, BnFr};
use crate::errors::{HalpError, HalpResult};

/// Label given to the prepended commitment message.
pub const COMMITMENT_LABEL: &str = "commitment";

/// A holder-stored credential with everything needed to present it later.
///
/// The commitment hash and blinding factor are persisted at issuance time so
/// the SNARK witness and the BBS+ message vector can never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: String,
    pub vc_json: Value,
    /// BBS+ signature, base64.
    pub bbs_signature: String,
    /// Binding value `Poseidon₂(ms, blinding)`, hex.
    pub commitment_hash: String,
    /// Pedersen/Poseidon blinding factor, hex.
    pub blinding_factor: String,
    /// Issuer public key, base64.
    pub issuer_public_key: String,
    pub message_labels: Vec<String>,
}

/// Encode one canonical message string into the BLS scalar field.
pub fn encode_message(value: &str) -> BlsFr {
    scalar_from_bytes_reduced(&Sha256::digest(value.as_bytes()))
}

fn require_str<'a>(vc: &'a Value, field: &str) -> HalpResult<&'a str> {
    vc.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HalpError::invalid_input(format!("credential missing string field '{field}'")))
}

fn json_field(vc: &Value, field: &str) -> HalpResult<String> {
    let value = vc
        .get(field)
        .ok_or_else(|| HalpError::invalid_input(format!("credential missing field '{field}'")))?;
    serde_json::to_string(value)
        .map_err(|e| HalpError::serialization(format!("credential field '{field}': {e}")))
}

/// Derive the labeled canonical message strings from a credential JSON.
pub fn vc_message_strings(vc: &Value) -> HalpResult<(Vec<String>, Vec<String>)> {
    let mut labels = Vec::new();
    let mut values = Vec::new();

    labels.push("@context".to_string());
    values.push(json_field(vc, "@context")?);
    labels.push("id".to_string());
    values.push(require_str(vc, "id")?.to_string());
    labels.push("type".to_string());
    values.push(json_field(vc, "type")?);
    labels.push("issuer".to_string());
    values.push(json_field(vc, "issuer")?);
    labels.push("validFrom".to_string());
    values.push(require_str(vc, "validFrom")?.to_string());

    if let Some(valid_until) = vc.get("validUntil").and_then(Value::as_str) {
        labels.push("validUntil".to_string());
        values.push(valid_until.to_string());
    }

    let subject = vc
        .get("credentialSubject")
        .and_then(Value::as_object)
        .ok_or_else(|| HalpError::invalid_input("credential missing credentialSubject object"))?;
    if let Some(subject_id) = subject.get("id").and_then(Value::as_str) {
        labels.push("credentialSubject.id".to_string());
        values.push(subject_id.to_string());
    }
    // serde_json objects iterate in key order, which fixes the vector layout.
    for (key, value) in subject {
        if key == "id" {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other)
                .map_err(|e| HalpError::serialization(format!("subject field '{key}': {e}")))?,
        };
        labels.push(format!("credentialSubject.{key}"));
        values.push(format!("{key}:{rendered}"));
    }

    Ok((labels, values))
}

/// Build the signed message vector, optionally prepending the binding
/// commitment hash as `m₀`.
pub fn build_message_vector(
    vc: &Value,
    commitment_hash: Option<&BnFr>,
) -> HalpResult<(Vec<BlsFr>, Vec<String>)> {
    let (mut labels, values) = vc_message_strings(vc)?;
    let mut messages: Vec<BlsFr> = values.iter().map(|v| encode_message(v)).collect();
    if let Some(binding) = commitment_hash {
        messages.insert(0, bn_scalar_to_bls(binding));
        labels.insert(0, COMMITMENT_LABEL.to_string());
    }
    Ok((messages, labels))
}

impl CredentialRecord {
    /// Reconstruct the exact message vector this credential was signed over.
    pub fn message_vector(&self) -> HalpResult<Vec<BlsFr>> {
        let binding = self.commitment_hash_scalar()?;
        let (messages, labels) = build_message_vector(&self.vc_json, Some(&binding))?;
        if labels != self.message_labels {
            return Err(HalpError::invalid_input(
                "credential labels do not match its JSON body",
            ));
        }
        Ok(messages)
    }

    /// The stored binding value as a BN254 scalar.
    pub fn commitment_hash_scalar(&self) -> HalpResult<BnFr> {
        bn_scalar_from_hex(&self.commitment_hash)
    }

    /// Decode the stored signature.
    pub fn signature(&self) -> HalpResult<BbsSignature> {
        bbs::signature_from_b64(&self.bbs_signature)
    }

    /// Decode the issuer public key.
    pub fn issuer_key(&self) -> HalpResult<BbsPublicKey> {
        bbs::public_key_from_b64(&self.issuer_public_key)
    }

    /// Verify the stored signature against the reconstructed vector.
    pub fn verify(&self) -> HalpResult<bool> {
        let messages = self.message_vector()?;
        bbs::verify(&self.issuer_key()?, &messages, &self.signature()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_vc() -> Value {
        json!({
            "@context": ["https://www.w3.org/ns/credentials/v2"],
            "id": "urn:halp:cred:0123",
            "type": ["VerifiableCredential", "StudentCredential"],
            "issuer": "did:example:university",
            "validFrom": "2026-01-01T00:00:00Z",
            "credentialSubject": {
                "id": "did:example:alice",
                "studentId": "S-1",
                "program": "Mathematics"
            }
        })
    }

    #[test]
    fn test_message_strings_layout() {
        let (labels, values) = vc_message_strings(&sample_vc()).unwrap();
        assert_eq!(
            labels,
            vec![
                "@context",
                "id",
                "type",
                "issuer",
                "validFrom",
                "credentialSubject.id",
                "credentialSubject.program",
                "credentialSubject.studentId",
            ]
        );
        assert_eq!(values[1], "urn:halp:cred:0123");
        assert_eq!(values[6], "program:Mathematics");
        assert_eq!(values[7], "studentId:S-1");
    }

    #[test]
    fn test_valid_until_included_when_present() {
        let mut vc = sample_vc();
        vc["validUntil"] = json!("2027-01-01T00:00:00Z");
        let (labels, _) = vc_message_strings(&vc).unwrap();
        assert!(labels.contains(&"validUntil".to_string()));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let mut vc = sample_vc();
        vc.as_object_mut().unwrap().remove("issuer");
        assert!(vc_message_strings(&vc).is_err());
    }

    #[test]
    fn test_commitment_prepend() {
        let binding = BnFr::from(7u64);
        let (messages, labels) = build_message_vector(&sample_vc(), Some(&binding)).unwrap();
        let (bare, _) = build_message_vector(&sample_vc(), None).unwrap();
        assert_eq!(messages.len(), bare.len() + 1);
        assert_eq!(labels[0], COMMITMENT_LABEL);
        assert_eq!(messages[0], bn_scalar_to_bls(&binding));
        assert_eq!(&messages[1..], &bare[..]);
    }

    #[test]
    fn test_vector_is_deterministic() {
        let (a, _) = build_message_vector(&sample_vc(), None).unwrap();
        let (b, _) = build_message_vector(&sample_vc(), None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_changed_subject_value_changes_vector() {
        let mut vc = sample_vc();
        vc["credentialSubject"]["studentId"] = json!("S-2");
        let (a, _) = build_message_vector(&sample_vc(), None).unwrap();
        let (b, _) = build_message_vector(&vc, None).unwrap();
        assert_ne!(a, b);
    }
}
