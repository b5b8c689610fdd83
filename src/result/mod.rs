use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chain::{hex_bytes, keccak256, Address, Bytes32, Fingerprint},
    error::RegistryError,
};

pub mod abi;
mod json;
mod schema;

pub use json::RawDkgResult;
pub use schema::{AbiType, EncodingSchema, Field, FieldSpec};

/// Candidate DKG result as submitted to the registry. Field order here is the
/// order of the canonical encoding ([EncodingSchema::V1]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DkgResult {
    /// 1-based seat of the member submitting the result.
    pub submitter_member_index: u64,
    #[serde(with = "hex_bytes")]
    pub group_pub_key: Vec<u8>,
    /// 1-based seats, ascending.
    pub misbehaved_members_indices: Vec<u8>,
    /// Concatenated member signatures over the result.
    #[serde(with = "hex_bytes")]
    pub signatures: Vec<u8>,
    /// 1-based seats of the signers, ascending.
    pub signing_members_indices: Vec<u64>,
    /// Sortition pool member IDs, one per seat.
    pub members: Vec<u32>,
    pub members_hash: Bytes32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("{field}: value {value} does not fit in uint{bits}")]
    ValueOutOfRange {
        field: &'static str,
        value: u64,
        bits: u16,
    },
    #[error("{field}: uint{bits} is not a valid ABI width")]
    UnsupportedWidth { field: &'static str, bits: u16 },
    #[error("{field}: schema type {ty} does not fit the field")]
    TypeMismatch { field: &'static str, ty: String },
    #[error("{field}: {reason}")]
    Malformed { field: &'static str, reason: String },
}

/// Canonical encoding of `result`.
pub fn encode(result: &DkgResult) -> Result<Vec<u8>, EncodingError> {
    EncodingSchema::V1.encode(result)
}

/// Keccak-256 over the canonical encoding of `result`.
pub fn fingerprint(result: &DkgResult) -> Result<Fingerprint, EncodingError> {
    EncodingSchema::V1.fingerprint(result)
}

pub fn verify(result: &DkgResult, stored: &Fingerprint) -> bool {
    matches!(fingerprint(result), Ok(f) if f == *stored)
}

/// Commitment to the operators of a group: `keccak256(abi.encode(address[]))`
/// over the active (non-misbehaved) members in seat order.
pub fn members_hash(operators: &[Address]) -> Bytes32 {
    let tokens = operators.iter().copied().map(abi::Token::Address).collect();
    keccak256(&abi::encode(&[abi::Token::Array(tokens)]))
}

impl DkgResult {
    pub fn group_size(&self) -> usize {
        self.members.len()
    }

    fn check_index(&self, field: &'static str, index: u64) -> Result<(), RegistryError> {
        if index == 0 || index > self.members.len() as u64 {
            return Err(RegistryError::IndexOutOfBounds {
                field,
                index,
                members: self.members.len(),
            });
        }
        Ok(())
    }

    /// Every seat index the result carries lies in `[1, members.len()]`.
    pub fn check_indices(&self) -> Result<(), RegistryError> {
        self.check_index("submitterMemberIndex", self.submitter_member_index)?;
        for &index in &self.misbehaved_members_indices {
            self.check_index("misbehavedMembersIndices", index as u64)?;
        }
        for &index in &self.signing_members_indices {
            self.check_index("signingMembersIndices", index)?;
        }
        Ok(())
    }

    /// Member ID seated at a 1-based `index`.
    pub fn member_at(&self, field: &'static str, index: u64) -> Result<u32, RegistryError> {
        self.check_index(field, index)?;
        Ok(self.members[(index - 1) as usize])
    }

    pub fn submitter_member_id(&self) -> Result<u32, RegistryError> {
        self.member_at("submitterMemberIndex", self.submitter_member_index)
    }

    pub fn misbehaved_member_ids(&self) -> Result<Vec<u32>, RegistryError> {
        self.misbehaved_members_indices
            .iter()
            .map(|&i| self.member_at("misbehavedMembersIndices", i as u64))
            .collect()
    }
}
