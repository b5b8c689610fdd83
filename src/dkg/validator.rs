use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chain::{Address, Bytes32},
    pool::MembershipResolver,
    result::{members_hash, DkgResult},
};

/// Uncompressed secp256k1 key without the `04` prefix.
pub const PUBLIC_KEY_BYTE_SIZE: usize = 64;
pub const SIGNATURE_BYTE_SIZE: usize = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupParameters {
    pub group_size: usize,
    /// Minimum number of signers a result needs.
    pub group_threshold: usize,
}

impl Default for GroupParameters {
    fn default() -> Self {
        Self {
            group_size: 100,
            group_threshold: 51,
        }
    }
}

/// Reason a submitted result is not acceptable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidResult {
    #[error("expected {expected} group members, got {actual}")]
    UnexpectedGroupSize { expected: usize, actual: usize },
    #[error("invalid submitter index {0}")]
    InvalidSubmitterIndex(u64),
    #[error("malformed group public key: {0} bytes")]
    MalformedPublicKey(usize),
    #[error("malformed signatures: {bytes} bytes for {signers} signers")]
    MalformedSignatures { bytes: usize, signers: usize },
    #[error("too few signatures: {actual} of {required}")]
    TooFewSignatures { actual: usize, required: usize },
    #[error("corrupted signing member indices")]
    CorruptedSigningIndices,
    #[error("corrupted misbehaved members indices")]
    CorruptedMisbehavedIndices,
    #[error("misbehaved member {0} signed the result")]
    MisbehavedSigner(u64),
    #[error("member {0} does not resolve to an operator")]
    UnresolvedMember(u32),
    #[error("invalid members hash, expected {expected}")]
    InvalidMembersHash { expected: Bytes32 },
}

/// Strictly ascending and within `[1, members]`.
fn well_ordered(indices: impl Iterator<Item = u64>, members: usize) -> bool {
    let mut previous = 0;
    for index in indices {
        if index <= previous || index > members as u64 {
            return false;
        }
        previous = index;
    }
    true
}

/// Structural check of a DKG result. Signature cryptography and group
/// selection are not verified here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultValidator {
    group: GroupParameters,
}

impl ResultValidator {
    pub fn new(group: GroupParameters) -> Self {
        Self { group }
    }

    pub fn validate<R: MembershipResolver>(&self, result: &DkgResult, resolver: &R) -> Result<(), InvalidResult> {
        self.validate_fields(result)?;
        self.validate_members_hash(result, resolver)
    }

    fn validate_fields(&self, result: &DkgResult) -> Result<(), InvalidResult> {
        let members = result.members.len();
        if members != self.group.group_size {
            return Err(InvalidResult::UnexpectedGroupSize {
                expected: self.group.group_size,
                actual: members,
            });
        }
        if result.submitter_member_index == 0 || result.submitter_member_index > members as u64 {
            return Err(InvalidResult::InvalidSubmitterIndex(result.submitter_member_index));
        }
        if result.group_pub_key.len() != PUBLIC_KEY_BYTE_SIZE {
            return Err(InvalidResult::MalformedPublicKey(result.group_pub_key.len()));
        }

        let signers = result.signing_members_indices.len();
        if result.signatures.len() != signers * SIGNATURE_BYTE_SIZE {
            return Err(InvalidResult::MalformedSignatures {
                bytes: result.signatures.len(),
                signers,
            });
        }
        if signers < self.group.group_threshold {
            return Err(InvalidResult::TooFewSignatures {
                actual: signers,
                required: self.group.group_threshold,
            });
        }
        if !well_ordered(result.signing_members_indices.iter().copied(), members) {
            return Err(InvalidResult::CorruptedSigningIndices);
        }
        if !well_ordered(
            result.misbehaved_members_indices.iter().map(|&i| i as u64),
            members,
        ) {
            return Err(InvalidResult::CorruptedMisbehavedIndices);
        }
        if let Some(&index) = result
            .misbehaved_members_indices
            .iter()
            .find(|&&i| result.signing_members_indices.contains(&(i as u64)))
        {
            return Err(InvalidResult::MisbehavedSigner(index as u64));
        }
        Ok(())
    }

    /// The committed hash must cover exactly the operators of the
    /// non-misbehaved seats.
    fn validate_members_hash<R: MembershipResolver>(&self, result: &DkgResult, resolver: &R) -> Result<(), InvalidResult> {
        let active = result
            .members
            .iter()
            .enumerate()
            .filter(|(seat, _)| {
                !result
                    .misbehaved_members_indices
                    .iter()
                    .any(|&m| m as usize == seat + 1)
            })
            .map(|(_, &id)| resolver.resolve_operator(id).ok_or(InvalidResult::UnresolvedMember(id)))
            .collect::<Result<Vec<Address>, _>>()?;

        let expected = members_hash(&active);
        if expected != result.members_hash {
            return Err(InvalidResult::InvalidMembersHash { expected });
        }
        Ok(())
    }
}
