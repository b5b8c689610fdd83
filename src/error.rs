use thiserror::Error;

use crate::{
    chain::{Address, Fingerprint, Seed, WalletId},
    dkg::DkgState,
    pool::PoolError,
    result::EncodingError,
};

/// Named failure of a registry operation. Any error aborts the whole
/// operation: no state is changed and no event is emitted.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("caller {caller} is not authorized to {action}")]
    Unauthorized {
        caller: Address,
        action: &'static str,
    },
    #[error("current state is {actual}, expected {expected}")]
    StateMismatch {
        expected: DkgState,
        actual: DkgState,
    },
    #[error("result fingerprint {actual} does not match submitted {expected}")]
    HashMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },
    #[error("challenge period ends at block {challenge_end}, current block is {current}")]
    WindowNotElapsed { challenge_end: u64, current: u64 },
    #[error("only the submitter {submitter} may approve before block {precedence_end}")]
    PrecedenceViolation {
        submitter: Address,
        precedence_end: u64,
    },
    #[error("{field} index {index} is outside [1, {members}]")]
    IndexOutOfBounds {
        field: &'static str,
        index: u64,
        members: usize,
    },
    #[error("member {member_id} does not resolve to an operator")]
    ResolutionFailed { member_id: u32 },
    #[error("governance delay has not elapsed for {parameter}, {remaining}s remaining")]
    DelayNotElapsed { parameter: String, remaining: u64 },
    #[error("no update pending for {0}")]
    NoUpdatePending(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("sortition pool is locked")]
    PoolLocked,
    #[error("could not lock sortition pool: {0}")]
    PoolLockFailed(PoolError),
    #[error("could not unlock sortition pool: {0}")]
    PoolUnlockFailed(PoolError),
    #[error("wallet owner rejected the new wallet: {0}")]
    WalletOwnerRejected(String),
    #[error("wallet owner rejected the new wallet ({reason}) and the sortition pool could not be locked again: {error}")]
    PoolRelockFailed { reason: String, error: PoolError },
    #[error("wallet {0} already exists")]
    WalletAlreadyExists(WalletId),
    #[error("seed {actual} does not match delivered seed {expected}")]
    SeedMismatch { expected: Seed, actual: Seed },
    #[error("challenge period ended at block {challenge_end}, current block is {current}")]
    ChallengePeriodElapsed { challenge_end: u64, current: u64 },
    #[error("submitted result is valid, nothing to challenge")]
    NothingToChallenge,
    #[error("invalid value {value} for {parameter}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: &'static str,
    },
}
