//! Anonymous issuance, end to end: commitment + Schnorr proof in, signed
//! commitment-bound credential out.

use std::sync::Arc;

use halp_core::commitment::binding_commitment_hash;
use halp_core::curve::{bn_scalar_to_bls, scalar_from_hex};
use halp_core::issuance::{self, Issuer};
use halp_core::params::PublicParameters;
use halp_core::vault::{MasterSecretVault, MemoryStore};
use halp_core::HalpError;
use serde_json::json;

const CLAIMS_KEY: [u8; 32] = [42u8; 32];

struct Setup {
    params: Arc<PublicParameters>,
    vault: MasterSecretVault,
    issuer: Issuer,
}

fn setup() -> Setup {
    let params = Arc::new(PublicParameters::generate(8).unwrap());
    let vault = MasterSecretVault::with_default_key(Box::new(MemoryStore::new()));
    vault.generate("alice").unwrap();
    let issuer = Issuer::new(Arc::clone(&params), "did:example:university", CLAIMS_KEY);
    Setup {
        params,
        vault,
        issuer,
    }
}

#[test]
fn anonymous_issuance_end_to_end() {
    let s = setup();
    let nym = s
        .vault
        .derive_context_pseudonym("alice", "issuer:university")
        .unwrap();
    let master_secret = s.vault.get("alice").unwrap();
    let claims = json!({ "studentId": "S-1" });

    let (request, state) = issuance::prepare_request(
        &s.params,
        &master_secret,
        &nym.pseudonym_hex,
        "StudentCredential",
        &claims,
        &CLAIMS_KEY,
    )
    .unwrap();
    assert_eq!(request.credential_type, "StudentCredential");
    assert_eq!(request.commitment.len(), 96);
    assert_eq!(request.commitment_hash.len(), 64);

    let response = s.issuer.process(&request).unwrap();
    let credential = issuance::finalize_credential(&response, &state).unwrap();

    // The stored binding value opens under the holder's secrets.
    let blinding = scalar_from_hex(&state.blinding_hex).unwrap();
    let expected = binding_commitment_hash(&master_secret, &blinding);
    assert_eq!(
        credential.commitment_hash_scalar().unwrap(),
        expected,
        "stored commitment hash must equal the recomputed binding value"
    );

    // m0 of the signed vector is exactly that binding value.
    let messages = credential.message_vector().unwrap();
    assert_eq!(messages[0], bn_scalar_to_bls(&expected));
    assert_eq!(credential.message_labels[0], "commitment");

    assert!(credential.verify().unwrap());

    // The credential subject carries the certified claims.
    assert_eq!(
        credential.vc_json["credentialSubject"]["studentId"],
        json!("S-1")
    );
}

#[test]
fn issuer_rejects_claims_hash_mismatch() {
    let s = setup();
    let nym = s
        .vault
        .derive_context_pseudonym("alice", "issuer:university")
        .unwrap();
    let master_secret = s.vault.get("alice").unwrap();
    let (mut request, _) = issuance::prepare_request(
        &s.params,
        &master_secret,
        &nym.pseudonym_hex,
        "StudentCredential",
        &json!({ "studentId": "S-1" }),
        &CLAIMS_KEY,
    )
    .unwrap();

    request.claims_hash = "00".repeat(32);
    assert!(matches!(
        s.issuer.process(&request).unwrap_err(),
        HalpError::InvalidInput { .. }
    ));
}

#[test]
fn issuer_rejects_tampered_proof_response() {
    let s = setup();
    let nym = s
        .vault
        .derive_context_pseudonym("alice", "issuer:university")
        .unwrap();
    let master_secret = s.vault.get("alice").unwrap();
    let (mut request, _) = issuance::prepare_request(
        &s.params,
        &master_secret,
        &nym.pseudonym_hex,
        "StudentCredential",
        &json!({ "studentId": "S-1" }),
        &CLAIMS_KEY,
    )
    .unwrap();

    // Replace one response scalar; the sigma equation no longer balances.
    request.commitment_proof.responses[0] = "1".to_string();
    assert!(matches!(
        s.issuer.process(&request).unwrap_err(),
        HalpError::InvalidProof { .. }
    ));
}

#[test]
fn issuer_rejects_wrong_requester_context() {
    let s = setup();
    let nym = s
        .vault
        .derive_context_pseudonym("alice", "issuer:university")
        .unwrap();
    let master_secret = s.vault.get("alice").unwrap();
    let (mut request, _) = issuance::prepare_request(
        &s.params,
        &master_secret,
        &nym.pseudonym_hex,
        "StudentCredential",
        &json!({ "studentId": "S-1" }),
        &CLAIMS_KEY,
    )
    .unwrap();

    // Swap in a different pseudonym: the recomputed context changes and the
    // proof no longer verifies.
    let other = s
        .vault
        .derive_context_pseudonym("alice", "issuer:other")
        .unwrap();
    request.pseudonym = other.pseudonym_hex;
    assert!(matches!(
        s.issuer.process(&request).unwrap_err(),
        HalpError::InvalidProof { .. }
    ));
}

#[test]
fn request_survives_json_roundtrip() {
    let s = setup();
    let nym = s
        .vault
        .derive_context_pseudonym("alice", "issuer:university")
        .unwrap();
    let master_secret = s.vault.get("alice").unwrap();
    let (request, state) = issuance::prepare_request(
        &s.params,
        &master_secret,
        &nym.pseudonym_hex,
        "StudentCredential",
        &json!({ "studentId": "S-1" }),
        &CLAIMS_KEY,
    )
    .unwrap();

    let wire = serde_json::to_string(&request).unwrap();
    assert!(wire.contains("\"commitmentProof\""));
    assert!(wire.contains("\"T\""));
    let decoded: halp_core::IssuanceRequest = serde_json::from_str(&wire).unwrap();

    let response = s.issuer.process(&decoded).unwrap();
    assert!(issuance::finalize_credential(&response, &state)
        .unwrap()
        .verify()
        .unwrap());
}
