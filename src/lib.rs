pub mod chain;
pub mod config;
pub mod demo;
pub mod dkg;
pub mod error;
pub mod events;
pub mod governance;
pub mod pool;
pub mod registry;
pub mod result;
pub mod wallet_owner;
pub mod wallets;

pub use chain::{Address, Block, Bytes32, Fingerprint, Seed, WalletId};
pub use config::RegistryConfig;
pub use dkg::DkgState;
pub use error::RegistryError;
pub use events::RegistryEvent;
pub use governance::{DkgParameters, ParameterId, PendingUpdate};
pub use registry::{RegistryState, WalletRegistry};
pub use result::{DkgResult, EncodingError, EncodingSchema};
