use enum_display::EnumDisplay;
use serde::{Deserialize, Serialize};

use crate::chain::{keccak256, Fingerprint};

use super::{
    abi::{self, Token},
    DkgResult, EncodingError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumDisplay, Serialize, Deserialize)]
pub enum Field {
    SubmitterMemberIndex,
    GroupPubKey,
    MisbehavedMembersIndices,
    Signatures,
    SigningMembersIndices,
    Members,
    MembersHash,
}

impl Field {
    fn name(&self) -> &'static str {
        match self {
            Field::SubmitterMemberIndex => "submitterMemberIndex",
            Field::GroupPubKey => "groupPubKey",
            Field::MisbehavedMembersIndices => "misbehavedMembersIndices",
            Field::Signatures => "signatures",
            Field::SigningMembersIndices => "signingMembersIndices",
            Field::Members => "members",
            Field::MembersHash => "membersHash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    Uint(u16),
    UintArray(u16),
    Bytes,
    Bytes32,
}

impl AbiType {
    fn signature(&self) -> String {
        match self {
            AbiType::Uint(bits) => format!("uint{bits}"),
            AbiType::UintArray(bits) => format!("uint{bits}[]"),
            AbiType::Bytes => "bytes".to_owned(),
            AbiType::Bytes32 => "bytes32".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    pub ty: AbiType,
}

const fn spec(field: Field, ty: AbiType) -> FieldSpec {
    FieldSpec { field, ty }
}

/// Ordered field list with ABI widths. The result is encoded as one tuple
/// value following this list, then hashed with Keccak-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingSchema {
    pub name: &'static str,
    pub version: u8,
    pub fields: &'static [FieldSpec],
}

impl EncodingSchema {
    /// Authoritative on-chain layout:
    /// `tuple(uint256,bytes,uint8[],bytes,uint256[],uint32[],bytes32)`.
    pub const V1: EncodingSchema = EncodingSchema {
        name: "v1",
        version: 1,
        fields: &[
            spec(Field::SubmitterMemberIndex, AbiType::Uint(256)),
            spec(Field::GroupPubKey, AbiType::Bytes),
            spec(Field::MisbehavedMembersIndices, AbiType::UintArray(8)),
            spec(Field::Signatures, AbiType::Bytes),
            spec(Field::SigningMembersIndices, AbiType::UintArray(256)),
            spec(Field::Members, AbiType::UintArray(32)),
            spec(Field::MembersHash, AbiType::Bytes32),
        ],
    };

    /// Misbehaved indices widened to `uint32[]`. Array elements are padded to
    /// full words either way, so only the type signature differs from V1.
    pub const WIDE_MISBEHAVED: EncodingSchema = EncodingSchema {
        name: "wide-misbehaved",
        version: 0,
        fields: &[
            spec(Field::SubmitterMemberIndex, AbiType::Uint(256)),
            spec(Field::GroupPubKey, AbiType::Bytes),
            spec(Field::MisbehavedMembersIndices, AbiType::UintArray(32)),
            spec(Field::Signatures, AbiType::Bytes),
            spec(Field::SigningMembersIndices, AbiType::UintArray(256)),
            spec(Field::Members, AbiType::UintArray(32)),
            spec(Field::MembersHash, AbiType::Bytes32),
        ],
    };

    /// `membersHash` placed ahead of `members`.
    pub const HASH_BEFORE_MEMBERS: EncodingSchema = EncodingSchema {
        name: "hash-before-members",
        version: 0,
        fields: &[
            spec(Field::SubmitterMemberIndex, AbiType::Uint(256)),
            spec(Field::GroupPubKey, AbiType::Bytes),
            spec(Field::MisbehavedMembersIndices, AbiType::UintArray(8)),
            spec(Field::Signatures, AbiType::Bytes),
            spec(Field::SigningMembersIndices, AbiType::UintArray(256)),
            spec(Field::MembersHash, AbiType::Bytes32),
            spec(Field::Members, AbiType::UintArray(32)),
        ],
    };

    /// Every known layout, authoritative first.
    pub const ALL: [EncodingSchema; 3] = [
        EncodingSchema::V1,
        EncodingSchema::WIDE_MISBEHAVED,
        EncodingSchema::HASH_BEFORE_MEMBERS,
    ];

    pub fn signature(&self) -> String {
        let types: Vec<String> = self.fields.iter().map(|f| f.ty.signature()).collect();
        format!("tuple({})", types.join(","))
    }

    pub fn tokens(&self, result: &DkgResult) -> Result<Vec<Token>, EncodingError> {
        self.fields
            .iter()
            .map(|spec| field_token(result, spec))
            .collect()
    }

    pub fn encode(&self, result: &DkgResult) -> Result<Vec<u8>, EncodingError> {
        Ok(abi::encode(&[Token::Tuple(self.tokens(result)?)]))
    }

    pub fn fingerprint(&self, result: &DkgResult) -> Result<Fingerprint, EncodingError> {
        Ok(keccak256(&self.encode(result)?))
    }
}

fn field_token(result: &DkgResult, spec: &FieldSpec) -> Result<Token, EncodingError> {
    let name = spec.field.name();
    let uints = |values: Vec<u64>, bits: u16| -> Result<Token, EncodingError> {
        values
            .into_iter()
            .map(|v| Token::uint(name, bits, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Token::Array)
    };

    match (spec.field, spec.ty) {
        (Field::SubmitterMemberIndex, AbiType::Uint(bits)) => {
            Token::uint(name, bits, result.submitter_member_index)
        }
        (Field::GroupPubKey, AbiType::Bytes) => Ok(Token::Bytes(result.group_pub_key.clone())),
        (Field::Signatures, AbiType::Bytes) => Ok(Token::Bytes(result.signatures.clone())),
        (Field::MisbehavedMembersIndices, AbiType::UintArray(bits)) => uints(
            result
                .misbehaved_members_indices
                .iter()
                .map(|&i| i as u64)
                .collect(),
            bits,
        ),
        (Field::SigningMembersIndices, AbiType::UintArray(bits)) => {
            uints(result.signing_members_indices.clone(), bits)
        }
        (Field::Members, AbiType::UintArray(bits)) => {
            uints(result.members.iter().map(|&m| m as u64).collect(), bits)
        }
        (Field::MembersHash, AbiType::Bytes32) => Ok(Token::FixedBytes(result.members_hash)),
        (field, ty) => Err(EncodingError::TypeMismatch {
            field: field.name(),
            ty: ty.signature(),
        }),
    }
}
