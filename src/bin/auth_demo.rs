use std::sync::Arc;

use halp_core::challenge::ChallengeStore;
use halp_core::hybrid::HybridProver;
use halp_core::issuance::{self, Issuer};
use halp_core::params::PublicParameters;
use halp_core::registry::{NullifierRegistry, RegistryConfig};
use halp_core::snark::{self, AuthProver, AuthVerifier};
use halp_core::vault::{MasterSecretVault, MemoryStore};
use halp_core::verify::HybridVerifier;
use halp_core::HalpError;

use rand::rngs::OsRng;
use serde_json::json;

const TREE_HEIGHT: usize = 12;

fn main() -> halp_core::HalpResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "halp_core=debug".into()),
        )
        .init();

    println!("[auth_demo] generating public parameters...");
    let params = Arc::new(PublicParameters::generate(8)?);
    params.verify()?;

    println!("[auth_demo] enrolling holder...");
    let vault = Arc::new(MasterSecretVault::with_default_key(Box::new(
        MemoryStore::new(),
    )));
    vault.generate("alice")?;
    let nym = vault.derive_context_pseudonym("alice", "issuer:example-university")?;

    println!("[auth_demo] anonymous issuance...");
    let claims_key = [42u8; 32];
    let issuer = Issuer::new(Arc::clone(&params), "did:example:university", claims_key);
    let claims = json!({ "studentId": "S-1", "program": "Mathematics" });
    let master_secret = vault.get("alice")?;
    let (request, state) = issuance::prepare_request(
        &params,
        &master_secret,
        &nym.pseudonym_hex,
        "StudentCredential",
        &claims,
        &claims_key,
    )?;
    let response = issuer.process(&request)?;
    let credential = issuance::finalize_credential(&response, &state)?;
    println!("  credential id = {}", credential.id);
    println!("  credential ok = {}", credential.verify()?);

    println!("[auth_demo] trusted setup (height {TREE_HEIGHT})...");
    let (proving_key, verifying_key) = snark::setup(TREE_HEIGHT, &mut OsRng)?;

    let registry = Arc::new(NullifierRegistry::new(RegistryConfig {
        height: TREE_HEIGHT,
        root_window: 1,
    }));
    let challenges = Arc::new(ChallengeStore::new());
    let prover = Arc::new(HybridProver::new(
        Arc::clone(&vault),
        Arc::new(AuthProver::new(proving_key, TREE_HEIGHT)),
        Arc::clone(&registry) as Arc<dyn halp_core::RegistryView>,
    ));
    let verifier = HybridVerifier::new(
        Arc::clone(&challenges),
        Arc::clone(&registry),
        Arc::new(AuthVerifier::new(&verifying_key)),
    );

    println!("[auth_demo] authentication for example.com...");
    let challenge = challenges.issue("example.com", &registry.root());
    let package = prover.generate("alice", &credential, &challenge, &[0])?;
    let (details, outcome) = verifier.verify(&package);
    let session = outcome?;
    println!("  session token = {}...", &session.session_token[..16]);
    println!(
        "  snark={} bbs={} binding={} root={} fresh={}",
        details.snark_valid,
        details.bbs_valid,
        details.binding_valid,
        details.registry_root_valid,
        details.nullifier_fresh
    );

    println!("[auth_demo] replaying the same package...");
    let (_, replay) = verifier.verify(&package);
    match replay {
        Err(HalpError::NullifierReused) => println!("  replay rejected: nullifier reused"),
        other => {
            println!("  unexpected outcome: {other:?}");
            return Err(HalpError::internal("replay was not rejected"));
        }
    }

    println!("[auth_demo] binding attack...");
    let challenge2 = challenges.issue("example.com", &registry.root());
    let mut forged = prover.generate("alice", &credential, &challenge2, &[0])?;
    forged.hybrid_proof.commitment_hash =
        "00".repeat(32);
    let (_, attacked) = verifier.verify(&forged);
    match attacked {
        Err(HalpError::BindingMismatch { .. }) => println!("  forgery rejected: binding mismatch"),
        other => {
            println!("  unexpected outcome: {other:?}");
            return Err(HalpError::internal("binding attack was not rejected"));
        }
    }

    println!("[auth_demo] done");
    Ok(())
}
