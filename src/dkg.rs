use std::fmt::Display;

use serde::{Deserialize, Serialize};

mod tracker;
mod validator;
mod window;

pub use tracker::{DkgTracker, Submission, Timeout};
pub use validator::{
    GroupParameters, InvalidResult, ResultValidator, PUBLIC_KEY_BYTE_SIZE, SIGNATURE_BYTE_SIZE,
};
pub use window::{ResultWindow, WindowPhase};

pub(crate) fn log_target() -> String {
    "registry:dkg".to_owned()
}

/// Phase of the wallet-creation process. There is one per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DkgState {
    #[default]
    Idle,
    AwaitingSeed,
    AwaitingResult,
    Challenge,
}

impl DkgState {
    /// Numeric code reported to off-chain clients.
    pub fn code(&self) -> u8 {
        match self {
            DkgState::Idle => 0,
            DkgState::AwaitingSeed => 1,
            DkgState::AwaitingResult => 2,
            DkgState::Challenge => 3,
        }
    }
}

impl Display for DkgState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DkgState::Idle => "IDLE",
            DkgState::AwaitingSeed => "AWAITING_SEED",
            DkgState::AwaitingResult => "AWAITING_RESULT",
            DkgState::Challenge => "CHALLENGE",
        })
    }
}
