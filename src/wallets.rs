use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chain::{hex_bytes, keccak256, Bytes32, WalletId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    pub members_hash: Bytes32,
    pub created_at_block: u64,
}

/// Wallet ID of a group public key: `keccak256(publicKey)`.
pub fn wallet_id(public_key: &[u8]) -> WalletId {
    keccak256(public_key)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wallets(BTreeMap<WalletId, Wallet>);

impl Wallets {
    pub fn insert(&mut self, wallet: Wallet) {
        self.0.insert(wallet.id, wallet);
    }

    pub fn get(&self, id: &WalletId) -> Option<&Wallet> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &WalletId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wallet> {
        self.0.values()
    }
}
