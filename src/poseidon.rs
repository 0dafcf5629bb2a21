//! Poseidon Hash over the BN254 Scalar Field
//!
//! Fixed-arity Poseidon used by the nullifier registry and the `halp-auth`
//! circuit. The parameter sets here are the single source of truth: the
//! in-circuit gadget (`snark::circuit`) consumes the same `PoseidonConfig`
//! values, so host and circuit can never disagree on a digest.
//!
//! Byte and string inputs are absorbed by splitting into 31-byte chunks
//! (each strictly below the field modulus) and left-folding with the
//! arity-2 hash.

use ark_crypto_primitives::sponge::poseidon::{
    find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge,
};
use ark_crypto_primitives::sponge::{CryptographicSponge, FieldBasedCryptographicSponge};
use ark_ff::{PrimeField, Zero};
use once_cell::sync::Lazy;

use crate::curve::BnFr;

const FULL_ROUNDS: u64 = 8;
const PARTIAL_ROUNDS: u64 = 57;
const ALPHA: u64 = 5;

/// Bytes absorbed per field element; 31 bytes always fit below the modulus.
pub const CHUNK_BYTES: usize = 31;

/// Parameters for the arity-2 permutation (inner Merkle nodes, chunk folding).
pub static POSEIDON_ARITY2: Lazy<PoseidonConfig<BnFr>> = Lazy::new(|| poseidon_config(2));

/// Parameters for the arity-3 permutation (leaves, pseudonyms, nullifiers).
pub static POSEIDON_ARITY3: Lazy<PoseidonConfig<BnFr>> = Lazy::new(|| poseidon_config(3));

fn poseidon_config(rate: usize) -> PoseidonConfig<BnFr> {
    let (ark, mds) = find_poseidon_ark_and_mds::<BnFr>(
        BnFr::MODULUS_BIT_SIZE as u64,
        rate,
        FULL_ROUNDS,
        PARTIAL_ROUNDS,
        0,
    );
    PoseidonConfig::new(
        FULL_ROUNDS as usize,
        PARTIAL_ROUNDS as usize,
        ALPHA,
        mds,
        ark,
        rate,
        1,
    )
}

fn squeeze_one(config: &PoseidonConfig<BnFr>, inputs: &[BnFr]) -> BnFr {
    let mut sponge = PoseidonSponge::new(config);
    sponge.absorb(&inputs.to_vec());
    sponge.squeeze_native_field_elements(1)[0]
}

/// Two-input Poseidon.
pub fn hash2(a: BnFr, b: BnFr) -> BnFr {
    squeeze_one(&POSEIDON_ARITY2, &[a, b])
}

/// Three-input Poseidon.
pub fn hash3(a: BnFr, b: BnFr, c: BnFr) -> BnFr {
    squeeze_one(&POSEIDON_ARITY3, &[a, b, c])
}

/// Variadic Poseidon over the arity-3 sponge.
pub fn hash_many(inputs: &[BnFr]) -> BnFr {
    squeeze_one(&POSEIDON_ARITY3, inputs)
}

/// Interpret up to [`CHUNK_BYTES`] bytes as a big-endian field element.
fn chunk_to_field(chunk: &[u8]) -> BnFr {
    debug_assert!(chunk.len() <= CHUNK_BYTES);
    BnFr::from_be_bytes_mod_order(chunk)
}

/// Absorb an arbitrary byte buffer into a single field element.
///
/// `acc = hash2(chunk_0, 0)` seeds the fold (`hash2(0, 0)` for empty input),
/// then `acc = hash2(acc, chunk_i)` for each remaining chunk.
pub fn hash_bytes(data: &[u8]) -> BnFr {
    let mut chunks = data.chunks(CHUNK_BYTES);
    let mut acc = match chunks.next() {
        Some(first) => hash2(chunk_to_field(first), BnFr::zero()),
        None => hash2(BnFr::zero(), BnFr::zero()),
    };
    for chunk in chunks {
        acc = hash2(acc, chunk_to_field(chunk));
    }
    acc
}

/// Absorb a UTF-8 string into a single field element.
pub fn hash_string(s: &str) -> BnFr {
    hash_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::One;

    #[test]
    fn test_hash2_deterministic() {
        let a = BnFr::from(7u64);
        let b = BnFr::from(11u64);
        assert_eq!(hash2(a, b), hash2(a, b));
        assert_ne!(hash2(a, b), hash2(b, a));
    }

    #[test]
    fn test_hash3_differs_from_hash2() {
        let a = BnFr::from(1u64);
        let b = BnFr::from(2u64);
        assert_ne!(hash3(a, b, BnFr::zero()), hash2(a, b));
    }

    #[test]
    fn test_hash_many_matches_hash3_on_three_inputs() {
        let inputs = [BnFr::from(3u64), BnFr::from(5u64), BnFr::from(8u64)];
        assert_eq!(hash_many(&inputs), hash3(inputs[0], inputs[1], inputs[2]));
    }

    #[test]
    fn test_hash_bytes_empty_and_single_chunk() {
        assert_eq!(hash_bytes(&[]), hash2(BnFr::zero(), BnFr::zero()));
        let data = [0x42u8; 16];
        assert_eq!(
            hash_bytes(&data),
            hash2(BnFr::from_be_bytes_mod_order(&data), BnFr::zero())
        );
    }

    #[test]
    fn test_hash_bytes_chunk_boundary() {
        // 31 bytes is one chunk; 32 bytes spills into a second fold step.
        let one_chunk = [1u8; CHUNK_BYTES];
        let two_chunks = [1u8; CHUNK_BYTES + 1];
        let seed = hash2(BnFr::from_be_bytes_mod_order(&one_chunk), BnFr::zero());
        assert_eq!(hash_bytes(&one_chunk), seed);
        assert_eq!(
            hash_bytes(&two_chunks),
            hash2(seed, BnFr::from_be_bytes_mod_order(&[1u8]))
        );
    }

    #[test]
    fn test_hash_string_stable_encoding() {
        assert_eq!(hash_string("example.com"), hash_bytes(b"example.com"));
        assert_ne!(hash_string("example.com"), hash_string("example.org"));
    }

    #[test]
    fn test_one_zero_inputs_distinct() {
        assert_ne!(
            hash2(BnFr::one(), BnFr::zero()),
            hash2(BnFr::zero(), BnFr::one())
        );
    }
}
