use std::fs;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chain::{Address, Block},
    config::RegistryConfig,
    error::RegistryError,
    pool::LocalSortitionPool,
    registry::{RegistryState, WalletRegistry},
    wallet_owner::RecordingWalletOwner,
};

pub mod diagnose;
pub mod run;
pub mod scenario;

pub type LocalRegistry = WalletRegistry<LocalSortitionPool, RecordingWalletOwner>;

const SAVE_FILE: &str = "registry-state.json";
const SAVE_FILE_DIR_CONFIG: &str = "DKG_REGISTRY_SAVE_DIR";
fn save_location() -> String {
    match std::env::var(SAVE_FILE_DIR_CONFIG) {
        Ok(dir) => dir + "/" + SAVE_FILE,
        Err(_) => SAVE_FILE.to_owned(),
    }
}

/// Seconds between two simulated blocks.
pub const SECONDS_PER_BLOCK: u64 = 12;

/// Ledger snapshot the CLI works on between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    pub config: RegistryConfig,
    pub block: Block,
    pub registry: RegistryState,
    pub pool: LocalSortitionPool,
    pub wallet_owner: RecordingWalletOwner,
}

#[derive(Debug, Error)]
pub enum SaveDataError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),
}

/// Operator address seated as pool member `n` in a fresh snapshot.
pub fn operator_address(n: u64) -> Address {
    Address::from_low_u64(0x0a00 + n)
}

impl SaveData {
    /// Fresh ledger at `block` with `operators` registered in the pool.
    pub fn create(config: RegistryConfig, operators: u64, block: Block) -> Result<Self, SaveDataError> {
        config.validate()?;
        let mut pool = LocalSortitionPool::new(config.registry);
        for n in 1..=operators {
            pool.insert_operator(operator_address(n));
        }
        Ok(Self {
            registry: RegistryState::new(&config),
            wallet_owner: RecordingWalletOwner::default(),
            pool,
            block,
            config,
        })
    }

    pub fn load() -> Result<Self, SaveDataError> {
        let data = fs::read_to_string(save_location())?;
        let save_data: Self = serde_json::de::from_str(&data)?;
        log::debug!("loaded save data from: {:?}", save_location());
        Ok(save_data)
    }

    pub fn save(&self) -> Result<(), SaveDataError> {
        let data = serde_json::ser::to_string_pretty(self)?;
        fs::write(save_location(), data)?;
        log::debug!("saved data to: {:?}", save_location());
        Ok(())
    }

    pub fn into_registry(self) -> (LocalRegistry, RegistryConfig, Block) {
        let registry = WalletRegistry::from_parts(self.registry, self.pool, self.wallet_owner);
        (registry, self.config, self.block)
    }

    pub fn from_registry(registry: LocalRegistry, config: RegistryConfig, block: Block) -> Self {
        let (state, pool, wallet_owner) = registry.into_parts();
        Self {
            config,
            block,
            registry: state,
            pool,
            wallet_owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{MembershipResolver, SortitionPool};

    #[test]
    fn snapshot_survives_json() {
        let data = SaveData::create(RegistryConfig::default(), 3, Block::new(10, 120)).unwrap();
        let json = serde_json::to_string_pretty(&data).unwrap();
        let back: SaveData = serde_json::from_str(&json).unwrap();

        let (registry, config, block) = back.into_registry();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(block, Block::new(10, 120));
        assert_eq!(registry.pool().resolve_operator(3), Some(operator_address(3)));
        assert_eq!(registry.pool().owner(), config.registry);
        assert_eq!(registry.parameters(), config.parameters);
    }
}
