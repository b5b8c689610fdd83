use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chain::{Bytes32, Fingerprint};

use super::{DkgResult, EncodingError};

/// Number as it appears in event dumps: a JSON integer, a decimal or
/// `0x` string, or an ethers `{"type":"BigNumber","hex":"0x.."}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Int(u64),
    Text(String),
    BigNumber { hex: String },
}

impl RawNumber {
    fn to_u64(&self, field: &'static str) -> Result<u64, EncodingError> {
        let malformed = |reason: String| EncodingError::Malformed { field, reason };
        match self {
            RawNumber::Int(n) => Ok(*n),
            RawNumber::Text(s) | RawNumber::BigNumber { hex: s } => {
                let s = s.trim();
                match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(digits) => u64::from_str_radix(digits, 16),
                    None => u64::from_str(s),
                }
                .map_err(|e| malformed(format!("{s:?}: {e}")))
            }
        }
    }

    fn narrow(&self, field: &'static str, bits: u16) -> Result<u64, EncodingError> {
        let value = self.to_u64(field)?;
        if bits < 64 && value >> bits != 0 {
            return Err(EncodingError::ValueOutOfRange { field, value, bits });
        }
        Ok(value)
    }
}

/// Loosely-typed DKG result as exported from a `DkgResultSubmitted` event
/// by off-chain tooling. Converting it into a [DkgResult] pins every value to
/// the width of its field, which is where representation mismatches between
/// independent encoders surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDkgResult {
    pub submitter_member_index: RawNumber,
    pub group_pub_key: String,
    pub misbehaved_members_indices: Vec<RawNumber>,
    pub signatures: String,
    pub signing_members_indices: Vec<RawNumber>,
    pub members: Vec<RawNumber>,
    pub members_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_block: Option<RawNumber>,
}

fn bytes(field: &'static str, s: &str) -> Result<Vec<u8>, EncodingError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| EncodingError::Malformed {
        field,
        reason: e.to_string(),
    })
}

fn word(field: &'static str, s: &str) -> Result<Bytes32, EncodingError> {
    Bytes32::from_str(s).map_err(|e| EncodingError::Malformed {
        field,
        reason: e.to_string(),
    })
}

impl RawDkgResult {
    pub fn stored_fingerprint(&self) -> Result<Option<Fingerprint>, EncodingError> {
        self.stored_hash
            .as_deref()
            .map(|h| word("storedHash", h))
            .transpose()
    }

    pub fn submission_block(&self) -> Result<Option<u64>, EncodingError> {
        self.submission_block
            .as_ref()
            .map(|b| b.to_u64("submissionBlock"))
            .transpose()
    }
}

impl TryFrom<&RawDkgResult> for DkgResult {
    type Error = EncodingError;

    fn try_from(raw: &RawDkgResult) -> Result<Self, Self::Error> {
        let list = |field: &'static str, values: &[RawNumber], bits: u16| {
            values
                .iter()
                .map(|v| v.narrow(field, bits))
                .collect::<Result<Vec<u64>, EncodingError>>()
        };

        Ok(DkgResult {
            submitter_member_index: raw
                .submitter_member_index
                .to_u64("submitterMemberIndex")?,
            group_pub_key: bytes("groupPubKey", &raw.group_pub_key)?,
            misbehaved_members_indices: list(
                "misbehavedMembersIndices",
                &raw.misbehaved_members_indices,
                8,
            )?
            .into_iter()
            .map(|v| v as u8)
            .collect(),
            signatures: bytes("signatures", &raw.signatures)?,
            signing_members_indices: list(
                "signingMembersIndices",
                &raw.signing_members_indices,
                64,
            )?,
            members: list("members", &raw.members, 32)?
                .into_iter()
                .map(|v| v as u32)
                .collect(),
            members_hash: word("membersHash", &raw.members_hash)?,
        })
    }
}

impl TryFrom<RawDkgResult> for DkgResult {
    type Error = EncodingError;

    fn try_from(raw: RawDkgResult) -> Result<Self, Self::Error> {
        DkgResult::try_from(&raw)
    }
}

impl From<&DkgResult> for RawDkgResult {
    fn from(result: &DkgResult) -> Self {
        let text = |v: u64| RawNumber::Text(v.to_string());
        RawDkgResult {
            submitter_member_index: text(result.submitter_member_index),
            group_pub_key: format!("0x{}", hex::encode(&result.group_pub_key)),
            misbehaved_members_indices: result
                .misbehaved_members_indices
                .iter()
                .map(|&i| text(i as u64))
                .collect(),
            signatures: format!("0x{}", hex::encode(&result.signatures)),
            signing_members_indices: result
                .signing_members_indices
                .iter()
                .map(|&i| text(i))
                .collect(),
            members: result.members.iter().map(|&m| text(m as u64)).collect(),
            members_hash: result.members_hash.to_string(),
            stored_hash: None,
            submission_block: None,
        }
    }
}
