// halp-core: cryptographic core of a privacy-preserving verifiable
// credential system.
//
// This library provides the protocol stack that binds credentials to a
// holder-held master secret, authenticates sessions unlinkably, and
// prevents replay:
//
// 1. **Vault**: the master secret lives under the OS keychain, wrapped in
//    AES-256-GCM; base and context pseudonyms derive on BLS12-381 G1.
// 2. **Issuance**: a Pedersen commitment plus Schnorr proof of opening buys
//    a BBS+ signature whose first message is the holder's binding value.
// 3. **Authentication**: a Groth16 proof over the `halp-auth` circuit shows
//    the session pseudonym and nullifier derive from the vaulted secret and
//    that the nullifier is absent from the registry; a BBS+ selective
//    disclosure reveals the same binding value.
// 4. **Registry**: spent nullifiers live in an indexed Merkle tree with
//    Poseidon hashing and short non-membership proofs.
//
// ## End-to-end sketch
//
// ```rust,ignore
// use halp_core::{
//     challenge::ChallengeStore, hybrid::HybridProver, issuance,
//     params::PublicParameters, registry::NullifierRegistry,
//     vault::{MasterSecretVault, MemoryStore}, verify::HybridVerifier,
// };
//
// // Holder enrolls and requests a credential anonymously.
// let vault = MasterSecretVault::with_default_key(Box::new(MemoryStore::new()));
// vault.generate("alice")?;
// let (request, state) = issuance::prepare_request(
//     &params, &vault.get("alice")?, &nym_hex, "StudentCredential", &claims, &key,
// )?;
// let credential = issuance::finalize_credential(&issuer.process(&request)?, &state)?;
//
// // One authentication session.
// let challenge = challenges.issue("example.com", &registry.root());
// let package = prover.generate("alice", &credential, &challenge, &[0])?;
// let (_details, session) = verifier.verify(&package);
// assert!(session?.valid);
// ```
//
// Construct the process-scoped objects (parameters, verification key,
// challenge store, registry, vault) once in `main` and inject them; nothing
// in this crate is a global.

pub mod bbs;
pub mod challenge;
pub mod commitment;
pub mod credential;
pub mod curve;
pub mod errors;
pub mod hybrid;
pub mod issuance;
pub mod params;
pub mod poseidon;
pub mod registry;
pub mod snark;
pub mod util;
pub mod vault;
pub mod verify;

// Re-export the types a typical embedder touches.
pub use challenge::{Challenge, ChallengeStore};
pub use credential::CredentialRecord;
pub use errors::{HalpError, HalpResult};
pub use hybrid::{HybridAuthPackage, HybridProof, HybridProver};
pub use issuance::{IssuanceRequest, IssuanceResponse, Issuer};
pub use params::PublicParameters;
pub use registry::{NullifierRegistry, RegistryConfig, RegistryView};
pub use snark::{AuthProver, AuthVerifier, CIRCUIT_ID};
pub use vault::{KeyringStore, MasterSecretVault, MemoryStore};
pub use verify::{HybridVerifier, VerificationDetails, VerifiedSession};
