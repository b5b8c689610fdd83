use serde::{Deserialize, Serialize};

use crate::{chain::Address, error::RegistryError, governance::DkgParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPhase {
    /// Result can be challenged, nobody can approve it.
    Challenge,
    /// Only the submitter can approve.
    SubmitterPrecedence,
    /// Anyone can approve.
    Open,
}

/// Block boundaries derived from the block a result was submitted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultWindow {
    pub challenge_end: u64,
    pub precedence_end: u64,
}

impl ResultWindow {
    pub fn new(submitted_at_block: u64, params: &DkgParameters) -> Self {
        let challenge_end = submitted_at_block.saturating_add(params.result_challenge_period_length);
        Self {
            challenge_end,
            precedence_end: challenge_end.saturating_add(params.submitter_precedence_period_length),
        }
    }

    pub fn phase(&self, current: u64) -> WindowPhase {
        if current < self.challenge_end {
            WindowPhase::Challenge
        } else if current < self.precedence_end {
            WindowPhase::SubmitterPrecedence
        } else {
            WindowPhase::Open
        }
    }

    pub fn check_approval(&self, current: u64, caller: Address, submitter: Address) -> Result<(), RegistryError> {
        match self.phase(current) {
            WindowPhase::Challenge => Err(RegistryError::WindowNotElapsed {
                challenge_end: self.challenge_end,
                current,
            }),
            WindowPhase::SubmitterPrecedence if caller != submitter => {
                Err(RegistryError::PrecedenceViolation {
                    submitter,
                    precedence_end: self.precedence_end,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn check_challenge(&self, current: u64) -> Result<(), RegistryError> {
        if self.phase(current) != WindowPhase::Challenge {
            return Err(RegistryError::ChallengePeriodElapsed {
                challenge_end: self.challenge_end,
                current,
            });
        }
        Ok(())
    }
}
