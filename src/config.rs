use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chain::Address,
    dkg::GroupParameters,
    error::RegistryError,
    governance::{DkgParameters, ParameterId},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] RegistryError),
}

/// Deployment of a registry: who plays which role and the initial
/// parameters. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Identity the registry uses towards the sortition pool.
    pub registry: Address,
    pub governance_owner: Address,
    pub wallet_owner: Address,
    pub random_beacon: Address,
    pub parameters: DkgParameters,
    /// Seconds.
    pub governance_delay: u64,
    pub group: GroupParameters,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry: Address::from_low_u64(0x1000),
            governance_owner: Address::from_low_u64(0x2000),
            wallet_owner: Address::from_low_u64(0x3000),
            random_beacon: Address::from_low_u64(0x4000),
            parameters: DkgParameters::default(),
            governance_delay: 604_800,
            group: GroupParameters::default(),
        }
    }
}

impl RegistryConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        log::debug!("loaded config from: {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        self.parameters.validate()?;
        ParameterId::GovernanceDelay.validate(self.governance_delay)?;
        if self.group.group_threshold == 0 || self.group.group_threshold > self.group.group_size {
            return Err(RegistryError::InvalidParameter {
                parameter: "groupThreshold".to_owned(),
                value: self.group.group_threshold.to_string(),
                reason: "must be between 1 and the group size",
            });
        }
        Ok(())
    }
}
