//! Groth16 Wire Format
//!
//! The proof travels in the snarkjs JSON layout: `pi_a`/`pi_b`/`pi_c` as
//! decimal coordinate strings with `protocol: "groth16"` and `curve: "bn128"`;
//! and public signals travel as 64-char hex field elements, converted to
//! decimal in declared order when handed to the pairing check.

use ark_bn254::{Bn254, Fq, Fq2, G1Affine as BnG1, G2Affine as BnG2};
use ark_ec::AffineRepr;
use ark_groth16::Proof;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::curve::{bn_scalar_from_hex, bn_scalar_to_hex};
use crate::errors::{HalpError, HalpResult};

use super::witness::AuthPublicInputs;

/// snarkjs-compatible Groth16 proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnarkProofWire {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    pub protocol: String,
    pub curve: String,
}

/// Public signals in the declared circuit order, 64-char hex each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicInputsWire {
    pub pseudonym: String,
    pub nullifier: String,
    pub commitment_hash: String,
    pub registry_root: String,
    pub challenge: String,
}

fn fq_to_dec(value: &Fq) -> String {
    value.to_string()
}

fn fq_from_dec(value: &str) -> HalpResult<Fq> {
    Fq::from_str(value)
        .map_err(|_| HalpError::invalid_input(format!("bad base-field decimal: {value:?}")))
}

fn g1_to_wire(point: &BnG1) -> HalpResult<Vec<String>> {
    let (x, y) = point
        .xy()
        .ok_or_else(|| HalpError::invalid_point("proof element is the point at infinity"))?;
    Ok(vec![fq_to_dec(x), fq_to_dec(y), "1".to_string()])
}

fn g1_from_wire(coords: &[String]) -> HalpResult<BnG1> {
    if coords.len() != 3 || coords[2] != "1" {
        return Err(HalpError::invalid_input("malformed G1 coordinates"));
    }
    let point = BnG1::new_unchecked(fq_from_dec(&coords[0])?, fq_from_dec(&coords[1])?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(HalpError::invalid_point("G1 coordinates not on curve"));
    }
    Ok(point)
}

fn g2_to_wire(point: &BnG2) -> HalpResult<Vec<Vec<String>>> {
    let (x, y) = point
        .xy()
        .ok_or_else(|| HalpError::invalid_point("proof element is the point at infinity"))?;
    Ok(vec![
        vec![fq_to_dec(&x.c0), fq_to_dec(&x.c1)],
        vec![fq_to_dec(&y.c0), fq_to_dec(&y.c1)],
        vec!["1".to_string(), "0".to_string()],
    ])
}

fn g2_from_wire(coords: &[Vec<String>]) -> HalpResult<BnG2> {
    if coords.len() != 3
        || coords.iter().any(|pair| pair.len() != 2)
        || coords[2][0] != "1"
        || coords[2][1] != "0"
    {
        return Err(HalpError::invalid_input("malformed G2 coordinates"));
    }
    let x = Fq2::new(fq_from_dec(&coords[0][0])?, fq_from_dec(&coords[0][1])?);
    let y = Fq2::new(fq_from_dec(&coords[1][0])?, fq_from_dec(&coords[1][1])?);
    let point = BnG2::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(HalpError::invalid_point("G2 coordinates not on curve"));
    }
    Ok(point)
}

impl SnarkProofWire {
    pub fn from_proof(proof: &Proof<Bn254>) -> HalpResult<Self> {
        Ok(Self {
            pi_a: g1_to_wire(&proof.a)?,
            pi_b: g2_to_wire(&proof.b)?,
            pi_c: g1_to_wire(&proof.c)?,
            protocol: "groth16".to_string(),
            curve: "bn128".to_string(),
        })
    }

    /// Reject structurally malformed proofs before any field parsing.
    pub fn validate_shape(&self) -> HalpResult<()> {
        if self.protocol != "groth16" {
            return Err(HalpError::invalid_input(format!(
                "unsupported protocol {:?}",
                self.protocol
            )));
        }
        if self.curve != "bn128" {
            return Err(HalpError::invalid_input(format!(
                "unsupported curve {:?}",
                self.curve
            )));
        }
        if self.pi_a.len() != 3 || self.pi_c.len() != 3 {
            return Err(HalpError::invalid_input("pi_a/pi_c must have 3 coordinates"));
        }
        if self.pi_b.len() != 3 || self.pi_b.iter().any(|pair| pair.len() != 2) {
            return Err(HalpError::invalid_input("pi_b must be a 3x2 matrix"));
        }
        Ok(())
    }

    pub fn to_proof(&self) -> HalpResult<Proof<Bn254>> {
        self.validate_shape()?;
        Ok(Proof {
            a: g1_from_wire(&self.pi_a)?,
            b: g2_from_wire(&self.pi_b)?,
            c: g1_from_wire(&self.pi_c)?,
        })
    }
}

impl PublicInputsWire {
    pub fn from_inputs(inputs: &AuthPublicInputs) -> Self {
        Self {
            pseudonym: bn_scalar_to_hex(&inputs.pseudonym),
            nullifier: bn_scalar_to_hex(&inputs.nullifier),
            commitment_hash: bn_scalar_to_hex(&inputs.commitment_hash),
            registry_root: bn_scalar_to_hex(&inputs.registry_root),
            challenge: bn_scalar_to_hex(&inputs.challenge),
        }
    }

    /// Decode the hex signals back into field elements.
    pub fn to_inputs(&self) -> HalpResult<AuthPublicInputs> {
        Ok(AuthPublicInputs {
            pseudonym: bn_scalar_from_hex(&self.pseudonym)?,
            nullifier: bn_scalar_from_hex(&self.nullifier)?,
            commitment_hash: bn_scalar_from_hex(&self.commitment_hash)?,
            registry_root: bn_scalar_from_hex(&self.registry_root)?,
            challenge: bn_scalar_from_hex(&self.challenge)?,
        })
    }

    /// Decimal strings in declared order, as a snarkjs prover would emit.
    pub fn decimal_signals(&self) -> HalpResult<Vec<String>> {
        Ok(self
            .to_inputs()?
            .to_vec()
            .iter()
            .map(|v| v.to_string())
            .collect())
    }
}
