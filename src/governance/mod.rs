use std::{collections::BTreeMap, str::FromStr};

use colored::Colorize;
use enum_display::EnumDisplay;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{chain::Address, error::RegistryError};

mod timelock;

pub use timelock::PendingUpdate;

pub(crate) fn log_target() -> String {
    "registry:gov".to_owned()
}

pub const WALLET_OWNER: &str = "WalletOwner";

/// Parameters that change only through a delayed two-phase update.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumDisplay,
)]
pub enum ParameterId {
    SeedTimeout,
    ResultChallengePeriodLength,
    ResultChallengeExtraGas,
    ResultSubmissionTimeout,
    SubmitterPrecedencePeriodLength,
    GovernanceDelay,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown parameter {0:?}")]
pub struct UnknownParameter(String);

impl ParameterId {
    pub const ALL: [ParameterId; 6] = [
        ParameterId::SeedTimeout,
        ParameterId::ResultChallengePeriodLength,
        ParameterId::ResultChallengeExtraGas,
        ParameterId::ResultSubmissionTimeout,
        ParameterId::SubmitterPrecedencePeriodLength,
        ParameterId::GovernanceDelay,
    ];

    /// DKG parameters may only change while no DKG is in progress.
    pub fn is_dkg_parameter(&self) -> bool {
        !matches!(self, ParameterId::GovernanceDelay)
    }

    pub fn validate(&self, value: u64) -> Result<(), RegistryError> {
        let reason = match self {
            ParameterId::ResultChallengePeriodLength if value < 10 => "must be at least 10 blocks",
            ParameterId::ResultChallengeExtraGas => return Ok(()),
            _ if value == 0 => "must be greater than zero",
            _ => return Ok(()),
        };
        Err(RegistryError::InvalidParameter {
            parameter: self.to_string(),
            value: value.to_string(),
            reason,
        })
    }
}

/// Accepts `SeedTimeout`, `seed-timeout` and `seed_timeout` alike.
impl FromStr for ParameterId {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        ParameterId::ALL
            .into_iter()
            .find(|id| id.to_string().to_lowercase() == wanted)
            .ok_or_else(|| UnknownParameter(s.to_owned()))
    }
}

/// Live DKG parameters. Block counts, except the gas value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DkgParameters {
    pub seed_timeout: u64,
    pub result_challenge_period_length: u64,
    pub result_challenge_extra_gas: u64,
    pub result_submission_timeout: u64,
    pub submitter_precedence_period_length: u64,
}

impl Default for DkgParameters {
    fn default() -> Self {
        Self {
            seed_timeout: 11_520,
            result_challenge_period_length: 11_520,
            result_challenge_extra_gas: 50_000,
            result_submission_timeout: 536,
            submitter_precedence_period_length: 20,
        }
    }
}

impl DkgParameters {
    fn get(&self, id: ParameterId) -> Option<u64> {
        Some(match id {
            ParameterId::SeedTimeout => self.seed_timeout,
            ParameterId::ResultChallengePeriodLength => self.result_challenge_period_length,
            ParameterId::ResultChallengeExtraGas => self.result_challenge_extra_gas,
            ParameterId::ResultSubmissionTimeout => self.result_submission_timeout,
            ParameterId::SubmitterPrecedencePeriodLength => {
                self.submitter_precedence_period_length
            }
            ParameterId::GovernanceDelay => return None,
        })
    }

    fn set(&mut self, id: ParameterId, value: u64) {
        match id {
            ParameterId::SeedTimeout => self.seed_timeout = value,
            ParameterId::ResultChallengePeriodLength => self.result_challenge_period_length = value,
            ParameterId::ResultChallengeExtraGas => self.result_challenge_extra_gas = value,
            ParameterId::ResultSubmissionTimeout => self.result_submission_timeout = value,
            ParameterId::SubmitterPrecedencePeriodLength => {
                self.submitter_precedence_period_length = value
            }
            ParameterId::GovernanceDelay => {}
        }
    }

    /// Check every value, and that the precedence period ends before result
    /// submission times out.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for id in ParameterId::ALL {
            if let Some(value) = self.get(id) {
                id.validate(value)?;
            }
        }
        self.check_precedence(
            self.submitter_precedence_period_length,
            self.result_submission_timeout,
        )
    }

    fn check_precedence(&self, precedence: u64, submission_timeout: u64) -> Result<(), RegistryError> {
        if precedence >= submission_timeout {
            return Err(RegistryError::InvalidParameter {
                parameter: ParameterId::SubmitterPrecedencePeriodLength.to_string(),
                value: precedence.to_string(),
                reason: "must be lower than the result submission timeout",
            });
        }
        Ok(())
    }
}

/// Owner-gated parameter store with a timelock on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Governance {
    owner: Address,
    governance_delay: u64,
    parameters: DkgParameters,
    wallet_owner: Address,
    #[serde(default)]
    pending: BTreeMap<ParameterId, PendingUpdate<u64>>,
    #[serde(default)]
    pending_wallet_owner: Option<PendingUpdate<Address>>,
}

impl Governance {
    pub fn new(
        owner: Address,
        wallet_owner: Address,
        parameters: DkgParameters,
        governance_delay: u64,
    ) -> Self {
        Self {
            owner,
            governance_delay,
            parameters,
            wallet_owner,
            pending: BTreeMap::new(),
            pending_wallet_owner: None,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn wallet_owner(&self) -> Address {
        self.wallet_owner
    }

    pub fn parameters(&self) -> DkgParameters {
        self.parameters
    }

    pub fn governance_delay(&self) -> u64 {
        self.governance_delay
    }

    pub fn value(&self, id: ParameterId) -> u64 {
        self.parameters.get(id).unwrap_or(self.governance_delay)
    }

    pub fn pending(&self, id: ParameterId) -> Option<&PendingUpdate<u64>> {
        self.pending.get(&id)
    }

    pub fn pending_updates(&self) -> impl Iterator<Item = (ParameterId, &PendingUpdate<u64>)> {
        self.pending.iter().map(|(id, update)| (*id, update))
    }

    pub fn pending_wallet_owner(&self) -> Option<&PendingUpdate<Address>> {
        self.pending_wallet_owner.as_ref()
    }

    fn check_owner(&self, caller: Address, action: &'static str) -> Result<(), RegistryError> {
        if caller != self.owner {
            return Err(RegistryError::Unauthorized { caller, action });
        }
        Ok(())
    }

    /// Start (or restart) an update of `id`. A request already pending for
    /// the same parameter is replaced and its delay starts over.
    pub fn begin_update(
        &mut self,
        caller: Address,
        id: ParameterId,
        value: u64,
        now: u64,
    ) -> Result<PendingUpdate<u64>, RegistryError> {
        self.check_owner(caller, "begin a parameter update")?;
        id.validate(value)?;

        let update = PendingUpdate::new(value, now);
        if let Some(previous) = self.pending.insert(id, update) {
            log::debug!(
                target: &log_target(),
                "replacing pending {} update to {}",
                id,
                previous.new_value
            );
        }
        log::info!(
            target: &log_target(),
            "{} update to {} started, finalizable in {}s",
            id.to_string().yellow(),
            value,
            self.governance_delay
        );
        Ok(update)
    }

    /// Value a finalize of `id` would apply now, if every condition holds.
    pub fn ready_update(&self, caller: Address, id: ParameterId, now: u64) -> Result<u64, RegistryError> {
        self.check_owner(caller, "finalize a parameter update")?;
        let update = self
            .pending
            .get(&id)
            .ok_or_else(|| RegistryError::NoUpdatePending(id.to_string()))?;
        update.check_ready(&id.to_string(), now, self.governance_delay)?;

        match id {
            ParameterId::SubmitterPrecedencePeriodLength => self
                .parameters
                .check_precedence(update.new_value, self.parameters.result_submission_timeout)?,
            ParameterId::ResultSubmissionTimeout => self.parameters.check_precedence(
                self.parameters.submitter_precedence_period_length,
                update.new_value,
            )?,
            _ => {}
        }
        Ok(update.new_value)
    }

    /// Apply the pending update of `id`. Callers check [Governance::ready_update] first.
    pub(crate) fn apply_update(&mut self, id: ParameterId) -> Option<u64> {
        let update = self.pending.remove(&id)?;
        let previous = self.value(id);
        match id {
            ParameterId::GovernanceDelay => self.governance_delay = update.new_value,
            _ => self.parameters.set(id, update.new_value),
        }
        log::info!(
            target: &log_target(),
            "{}: {} => {}",
            id.to_string().yellow(),
            previous,
            update.new_value.to_string().green()
        );
        Some(update.new_value)
    }

    pub fn remaining_update_time(&self, id: ParameterId, now: u64) -> Result<u64, RegistryError> {
        self.pending
            .get(&id)
            .map(|update| update.remaining(now, self.governance_delay))
            .ok_or_else(|| RegistryError::NoUpdatePending(id.to_string()))
    }

    pub fn begin_wallet_owner_update(
        &mut self,
        caller: Address,
        new_owner: Address,
        now: u64,
    ) -> Result<PendingUpdate<Address>, RegistryError> {
        self.check_owner(caller, "begin a wallet owner update")?;
        if new_owner.is_zero() {
            return Err(RegistryError::InvalidParameter {
                parameter: WALLET_OWNER.to_owned(),
                value: new_owner.to_string(),
                reason: "must not be the zero address",
            });
        }
        let update = PendingUpdate::new(new_owner, now);
        self.pending_wallet_owner = Some(update);
        log::info!(
            target: &log_target(),
            "{} update to {} started, finalizable in {}s",
            WALLET_OWNER.yellow(),
            new_owner,
            self.governance_delay
        );
        Ok(update)
    }

    pub fn ready_wallet_owner_update(&self, caller: Address, now: u64) -> Result<Address, RegistryError> {
        self.check_owner(caller, "finalize a wallet owner update")?;
        let update = self
            .pending_wallet_owner
            .as_ref()
            .ok_or_else(|| RegistryError::NoUpdatePending(WALLET_OWNER.to_owned()))?;
        update.check_ready(WALLET_OWNER, now, self.governance_delay)?;
        Ok(update.new_value)
    }

    pub(crate) fn apply_wallet_owner_update(&mut self) -> Option<Address> {
        let update = self.pending_wallet_owner.take()?;
        log::info!(
            target: &log_target(),
            "{}: {} => {}",
            WALLET_OWNER.yellow(),
            self.wallet_owner,
            update.new_value.to_string().green()
        );
        self.wallet_owner = update.new_value;
        Some(update.new_value)
    }

    pub fn remaining_wallet_owner_update_time(&self, now: u64) -> Result<u64, RegistryError> {
        self.pending_wallet_owner
            .as_ref()
            .map(|update| update.remaining(now, self.governance_delay))
            .ok_or_else(|| RegistryError::NoUpdatePending(WALLET_OWNER.to_owned()))
    }
}
