use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::chain::WalletId;

/// Contract notified once a new wallet's group public key is accepted.
pub trait WalletOwner {
    fn on_wallet_created(&mut self, wallet_id: WalletId, public_key: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedWallet {
    pub wallet_id: WalletId,
    pub public_key: String,
}

/// Wallet owner that keeps every notification it receives. Setting
/// `rejection` makes it refuse callbacks with that reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingWalletOwner {
    pub created: Vec<CreatedWallet>,
    #[serde(default)]
    pub rejection: Option<String>,
}

impl WalletOwner for RecordingWalletOwner {
    fn on_wallet_created(&mut self, wallet_id: WalletId, public_key: &[u8]) -> Result<()> {
        if let Some(reason) = &self.rejection {
            bail!("{}", reason);
        }
        self.created.push(CreatedWallet {
            wallet_id,
            public_key: hex::encode(public_key),
        });
        Ok(())
    }
}
