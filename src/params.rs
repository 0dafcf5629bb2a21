//! Public Commitment Parameters
//!
//! Deterministic generator set shared by holders and the issuer:
//! `G` (the G1 base point), one attribute generator `Hᵢ` per supported
//! attribute slot, and the blinding generator `Hᵣ`. Every hashed generator
//! uses its own domain separation tag, so no party can know discrete-log
//! relations between them.
//!
//! Parameters are generated once, persisted as versioned JSON, and loaded
//! read-only at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::curve::{g1_generator, hash_to_curve, point_from_hex, point_to_hex, G1Affine};
use crate::errors::{HalpError, HalpResult};
use crate::util::unix_millis;

/// Current parameter-file format version.
pub const PARAMS_VERSION: u32 = 1;

/// DST for the blinding generator `Hᵣ`.
pub const BLINDING_GENERATOR_DST: &[u8] = b"BBS_BLINDING_GENERATOR_V1";

/// Domain tag binding commitments to this deployment; used when deriving
/// credential identifiers from commitment bytes.
pub const COMMITMENT_DOMAIN_TAG: &[u8] = b"BBS_COMMITMENT_HALP_V1";

fn attribute_generator_dst(index: usize) -> Vec<u8> {
    format!("BBS_ATTR_GENERATOR_{index}_V1").into_bytes()
}

/// The generator set for Pedersen commitments and Schnorr proofs.
#[derive(Debug, Clone)]
pub struct PublicParameters {
    pub version: u32,
    pub max_attributes: usize,
    pub g: G1Affine,
    pub h: Vec<G1Affine>,
    pub h_r: G1Affine,
    pub generated_at: u64,
}

/// JSON mirror of [`PublicParameters`] with hex-encoded points.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParamsFile {
    version: u32,
    max_attributes: usize,
    g: String,
    h: Vec<String>,
    h_r: String,
    generated_at: u64,
}

impl PublicParameters {
    /// Derive parameters supporting up to `max_attributes` attribute slots.
    ///
    /// `Hᵢ` uses DST `BBS_ATTR_GENERATOR_i_V1` (1-based), `Hᵣ` uses
    /// `BBS_BLINDING_GENERATOR_V1`; `G` is the G1 base point.
    pub fn generate(max_attributes: usize) -> HalpResult<Self> {
        if max_attributes == 0 {
            return Err(HalpError::invalid_input(
                "max_attributes must be at least 1",
            ));
        }
        let mut h = Vec::with_capacity(max_attributes);
        for i in 1..=max_attributes {
            h.push(hash_to_curve(&attribute_generator_dst(i), b"")?);
        }
        let h_r = hash_to_curve(BLINDING_GENERATOR_DST, b"")?;
        Ok(Self {
            version: PARAMS_VERSION,
            max_attributes,
            g: g1_generator(),
            h,
            h_r,
            generated_at: unix_millis(),
        })
    }

    /// Structural validation: slot count, point validity, distinctness.
    pub fn verify(&self) -> HalpResult<()> {
        if self.h.len() != self.max_attributes {
            return Err(HalpError::invalid_input(format!(
                "expected {} attribute generators, found {}",
                self.max_attributes,
                self.h.len()
            )));
        }
        let mut seen = HashSet::new();
        for point in std::iter::once(&self.g)
            .chain(self.h.iter())
            .chain(std::iter::once(&self.h_r))
        {
            // Round-trip through the wire form exercises the on-curve and
            // subgroup checks for parameters loaded from disk.
            let hex = point_to_hex(point);
            point_from_hex(&hex)?;
            if !seen.insert(hex) {
                return Err(HalpError::invalid_input("duplicate generator in parameters"));
            }
        }
        Ok(())
    }

    /// Persist as versioned JSON.
    pub fn save(&self, path: &Path) -> HalpResult<()> {
        let file = ParamsFile {
            version: self.version,
            max_attributes: self.max_attributes,
            g: point_to_hex(&self.g),
            h: self.h.iter().map(point_to_hex).collect(),
            h_r: point_to_hex(&self.h_r),
            generated_at: self.generated_at,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| HalpError::serialization(format!("params encode: {e}")))?;
        fs::write(path, json).map_err(|e| HalpError::internal(format!("params write: {e}")))
    }

    /// Load and verify a parameter file.
    pub fn load(path: &Path) -> HalpResult<Self> {
        let json =
            fs::read_to_string(path).map_err(|e| HalpError::internal(format!("params read: {e}")))?;
        let file: ParamsFile = serde_json::from_str(&json)
            .map_err(|e| HalpError::serialization(format!("params decode: {e}")))?;
        if file.version != PARAMS_VERSION {
            return Err(HalpError::serialization(format!(
                "unsupported params version {}",
                file.version
            )));
        }
        let params = Self {
            version: file.version,
            max_attributes: file.max_attributes,
            g: point_from_hex(&file.g)?,
            h: file
                .h
                .iter()
                .map(|s| point_from_hex(s))
                .collect::<HalpResult<Vec<_>>>()?,
            h_r: point_from_hex(&file.h_r)?,
            generated_at: file.generated_at,
        };
        params.verify()?;
        Ok(params)
    }
}
