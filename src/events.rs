use enum_display::EnumDisplay;
use serde::{Deserialize, Serialize};

use crate::{
    chain::{Address, Fingerprint, Seed, WalletId},
    governance::ParameterId,
    result::DkgResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumDisplay)]
pub enum RegistryEvent {
    DkgStarted {
        start_block: u64,
    },
    DkgSeedDelivered {
        seed: Seed,
    },
    DkgResultSubmitted {
        fingerprint: Fingerprint,
        seed: Seed,
        result: DkgResult,
    },
    DkgResultApproved {
        fingerprint: Fingerprint,
        approver: Address,
        misbehaved_operators: Vec<Address>,
    },
    DkgResultChallenged {
        fingerprint: Fingerprint,
        challenger: Address,
        reason: String,
    },
    WalletCreated {
        wallet_id: WalletId,
        fingerprint: Fingerprint,
    },
    DkgSeedTimedOut,
    DkgTimedOut,
    ParameterUpdateStarted {
        parameter: ParameterId,
        new_value: u64,
        initiated_at: u64,
    },
    ParameterUpdated {
        parameter: ParameterId,
        value: u64,
    },
    WalletOwnerUpdateStarted {
        new_owner: Address,
        initiated_at: u64,
    },
    WalletOwnerUpdated {
        wallet_owner: Address,
    },
}

/// Event together with the block it was emitted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub block: u64,
    pub event: RegistryEvent,
}
