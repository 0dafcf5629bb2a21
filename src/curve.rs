//! Field and Curve Primitives
//!
//! BLS12-381 G1 and scalar helpers for the commitment and BBS+ layers, plus
//! the BN254 scalar codecs shared by the Poseidon and SNARK layers.
//!
//! Wire conventions are fixed across the system:
//! - scalars travel as 32-byte big-endian values (64 lower-case hex chars),
//! - G1 points travel compressed (48 bytes, 96 lower-case hex chars),
//! - hash-to-curve is the IETF-style suite (SHA-256 expand, WB map) with a
//!   caller-supplied domain separation tag.

use ark_ec::hashing::curve_maps::wb::WBMap;
use ark_ec::hashing::map_to_curve_hasher::MapToCurveBasedHasher;
use ark_ec::hashing::HashToCurve;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::field_hashers::DefaultFieldHasher;
use ark_ff::{BigInteger, Field, PrimeField};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;

use crate::errors::{HalpError, HalpResult};

pub use ark_bls12_381::{Fr as BlsFr, G1Affine, G1Projective};
pub use ark_bn254::Fr as BnFr;

/// Big-endian byte length of a serialized scalar (both fields).
pub const SCALAR_BYTES: usize = 32;

/// Byte length of a compressed G1 point.
pub const POINT_BYTES: usize = 48;

/// The BLS12-381 G1 base point.
pub fn g1_generator() -> G1Affine {
    G1Affine::generator()
}

/// Sample a uniform BLS12-381 scalar by rejection on 32 uniform bytes.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> BlsFr {
    loop {
        let mut buf = [0u8; SCALAR_BYTES];
        rng.fill_bytes(&mut buf);
        if let Some(fr) = BlsFr::from_random_bytes(&buf) {
            return fr;
        }
    }
}

/// Sample a scalar strictly below 2^252.
///
/// Values in this range are canonical in both scalar fields and satisfy the
/// circuit's comparison bound, so one sample can serve as a Pedersen blinding
/// exponent and a Poseidon input simultaneously.
pub fn random_bounded_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; SCALAR_BYTES] {
    let mut buf = [0u8; SCALAR_BYTES];
    rng.fill_bytes(&mut buf);
    buf[0] &= 0x0f;
    buf
}

/// True when the value occupies fewer than 252 bits.
///
/// The circuit's comparators are only sound below this bound; widening it
/// requires changing the circuit, not this check.
pub fn fits_comparison_range(value: &BnFr) -> bool {
    bn_scalar_to_bytes(value)[0] < 0x10
}

/// Serialize a BLS scalar to 32 big-endian bytes.
pub fn scalar_to_bytes(s: &BlsFr) -> [u8; SCALAR_BYTES] {
    let mut out = [0u8; SCALAR_BYTES];
    out.copy_from_slice(&s.into_bigint().to_bytes_be());
    out
}

/// Strictly parse a BLS scalar from 32 big-endian bytes.
///
/// Rejects values at or above the field modulus instead of reducing them, so
/// every scalar has exactly one wire form.
pub fn scalar_from_bytes(bytes: &[u8]) -> HalpResult<BlsFr> {
    if bytes.len() != SCALAR_BYTES {
        return Err(HalpError::invalid_scalar(format!(
            "expected {SCALAR_BYTES} bytes, got {}",
            bytes.len()
        )));
    }
    let candidate = BlsFr::from_be_bytes_mod_order(bytes);
    if scalar_to_bytes(&candidate) != bytes {
        return Err(HalpError::invalid_scalar("value exceeds field modulus"));
    }
    Ok(candidate)
}

/// Parse a BLS scalar from arbitrary bytes, reducing modulo the field order.
pub fn scalar_from_bytes_reduced(bytes: &[u8]) -> BlsFr {
    BlsFr::from_be_bytes_mod_order(bytes)
}

/// Render a BLS scalar as 64 lower-case hex characters.
pub fn scalar_to_hex(s: &BlsFr) -> String {
    hex::encode(scalar_to_bytes(s))
}

/// Parse a BLS scalar from its 64-char hex wire form.
pub fn scalar_from_hex(s: &str) -> HalpResult<BlsFr> {
    let bytes = hex::decode(s)
        .map_err(|e| HalpError::invalid_scalar(format!("bad scalar hex: {e}")))?;
    scalar_from_bytes(&bytes)
}

/// Serialize a BN254 scalar to 32 big-endian bytes.
pub fn bn_scalar_to_bytes(s: &BnFr) -> [u8; SCALAR_BYTES] {
    let mut out = [0u8; SCALAR_BYTES];
    out.copy_from_slice(&s.into_bigint().to_bytes_be());
    out
}

/// Strictly parse a BN254 scalar from 32 big-endian bytes.
pub fn bn_scalar_from_bytes(bytes: &[u8]) -> HalpResult<BnFr> {
    if bytes.len() != SCALAR_BYTES {
        return Err(HalpError::invalid_scalar(format!(
            "expected {SCALAR_BYTES} bytes, got {}",
            bytes.len()
        )));
    }
    let candidate = BnFr::from_be_bytes_mod_order(bytes);
    if bn_scalar_to_bytes(&candidate) != bytes {
        return Err(HalpError::invalid_scalar("value exceeds field modulus"));
    }
    Ok(candidate)
}

/// Render a BN254 scalar as 64 lower-case hex characters.
pub fn bn_scalar_to_hex(s: &BnFr) -> String {
    hex::encode(bn_scalar_to_bytes(s))
}

/// Parse a BN254 scalar from its 64-char hex wire form.
pub fn bn_scalar_from_hex(s: &str) -> HalpResult<BnFr> {
    let bytes = hex::decode(s)
        .map_err(|e| HalpError::invalid_scalar(format!("bad scalar hex: {e}")))?;
    bn_scalar_from_bytes(&bytes)
}

/// Embed a BN254 scalar into the BLS12-381 scalar field.
///
/// The BN254 order is strictly below the BLS12-381 order, so the big-endian
/// bytes of any BN254 element are a canonical BLS element; the embedding is
/// injective and byte-stable.
pub fn bn_scalar_to_bls(s: &BnFr) -> BlsFr {
    BlsFr::from_be_bytes_mod_order(&bn_scalar_to_bytes(s))
}

/// Reduce a BLS12-381 scalar into the BN254 scalar field.
pub fn bls_scalar_to_bn(s: &BlsFr) -> BnFr {
    BnFr::from_be_bytes_mod_order(&scalar_to_bytes(s))
}

/// Add two G1 points.
pub fn point_add(a: &G1Affine, b: &G1Affine) -> G1Affine {
    (a.into_group() + b.into_group()).into_affine()
}

/// Multiply a G1 point by a scalar.
pub fn point_mul(p: &G1Affine, s: &BlsFr) -> G1Affine {
    (p.into_group() * s).into_affine()
}

/// Negate a G1 point.
pub fn point_neg(p: &G1Affine) -> G1Affine {
    (-p.into_group()).into_affine()
}

/// Serialize a G1 point to its 48-byte compressed form.
pub fn point_to_bytes(p: &G1Affine) -> [u8; POINT_BYTES] {
    let mut out = Vec::with_capacity(POINT_BYTES);
    p.serialize_compressed(&mut out)
        .expect("compressed G1 serialization is infallible for affine points");
    let mut fixed = [0u8; POINT_BYTES];
    fixed.copy_from_slice(&out);
    fixed
}

/// Deserialize a compressed G1 point, checking curve and subgroup membership.
pub fn point_from_bytes(bytes: &[u8]) -> HalpResult<G1Affine> {
    if bytes.len() != POINT_BYTES {
        return Err(HalpError::invalid_point(format!(
            "expected {POINT_BYTES} bytes, got {}",
            bytes.len()
        )));
    }
    G1Affine::deserialize_compressed(bytes)
        .map_err(|e| HalpError::invalid_point(format!("not a valid G1 element: {e}")))
}

/// Render a G1 point as 96 lower-case hex characters.
pub fn point_to_hex(p: &G1Affine) -> String {
    hex::encode(point_to_bytes(p))
}

/// Parse a G1 point from its 96-char hex wire form.
pub fn point_from_hex(s: &str) -> HalpResult<G1Affine> {
    let bytes =
        hex::decode(s).map_err(|e| HalpError::invalid_point(format!("bad point hex: {e}")))?;
    point_from_bytes(&bytes)
}

/// Hash a message to a G1 point under the given domain separation tag.
pub fn hash_to_curve(dst: &[u8], msg: &[u8]) -> HalpResult<G1Affine> {
    let hasher = MapToCurveBasedHasher::<
        G1Projective,
        DefaultFieldHasher<Sha256, 128>,
        WBMap<ark_bls12_381::g1::Config>,
    >::new(dst)
    .map_err(|e| HalpError::internal(format!("hash-to-curve setup failed: {e}")))?;
    hasher
        .hash(msg)
        .map_err(|e| HalpError::internal(format!("hash-to-curve failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::One;
    use rand::thread_rng;

    #[test]
    fn test_scalar_roundtrip() {
        let mut rng = thread_rng();
        let s = random_scalar(&mut rng);
        let bytes = scalar_to_bytes(&s);
        assert_eq!(scalar_from_bytes(&bytes).unwrap(), s);
        assert_eq!(scalar_from_hex(&scalar_to_hex(&s)).unwrap(), s);
    }

    #[test]
    fn test_scalar_rejects_modulus_overflow() {
        // 2^256 - 1 is far above both moduli.
        let bytes = [0xffu8; 32];
        assert!(scalar_from_bytes(&bytes).is_err());
        assert!(bn_scalar_from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_scalar_rejects_wrong_length() {
        assert!(scalar_from_bytes(&[1u8; 31]).is_err());
        assert!(scalar_from_bytes(&[1u8; 33]).is_err());
    }

    #[test]
    fn test_point_roundtrip() {
        let mut rng = thread_rng();
        let p = point_mul(&g1_generator(), &random_scalar(&mut rng));
        let bytes = point_to_bytes(&p);
        assert_eq!(bytes.len(), POINT_BYTES);
        assert_eq!(point_from_bytes(&bytes).unwrap(), p);
        assert_eq!(point_from_hex(&point_to_hex(&p)).unwrap(), p);
    }

    #[test]
    fn test_point_rejects_garbage() {
        assert!(point_from_bytes(&[0xabu8; POINT_BYTES]).is_err());
        assert!(point_from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_point_algebra() {
        let g = g1_generator();
        let two = BlsFr::one() + BlsFr::one();
        assert_eq!(point_add(&g, &g), point_mul(&g, &two));
        let sum = point_add(&g, &point_neg(&g));
        assert!(sum.is_zero());
    }

    #[test]
    fn test_hash_to_curve_deterministic_and_dst_separated() {
        let a = hash_to_curve(b"HALP_TEST_DST_A", b"message").unwrap();
        let b = hash_to_curve(b"HALP_TEST_DST_A", b"message").unwrap();
        let c = hash_to_curve(b"HALP_TEST_DST_B", b"message").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(
            hash_to_curve(b"HALP_TEST_DST_A", b"other").unwrap(),
            a
        );
    }

    #[test]
    fn test_bn_embedding_is_byte_stable() {
        let mut rng = thread_rng();
        let bounded = random_bounded_scalar(&mut rng);
        let bn = bn_scalar_from_bytes(&bounded).unwrap();
        let bls = bn_scalar_to_bls(&bn);
        assert_eq!(scalar_to_bytes(&bls), bn_scalar_to_bytes(&bn));
    }

    #[test]
    fn test_bounded_scalar_fits_range() {
        let mut rng = thread_rng();
        for _ in 0..32 {
            let bytes = random_bounded_scalar(&mut rng);
            let v = bn_scalar_from_bytes(&bytes).unwrap();
            assert!(fits_comparison_range(&v));
        }
    }
}
