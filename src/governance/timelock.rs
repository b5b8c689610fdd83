use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Value waiting out the governance delay before it can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate<T> {
    pub new_value: T,
    /// Block timestamp at which the update was started.
    pub initiated_at: u64,
}

impl<T> PendingUpdate<T> {
    pub fn new(new_value: T, initiated_at: u64) -> Self {
        Self {
            new_value,
            initiated_at,
        }
    }

    /// Seconds left until the update can be finalized under `delay`, 0 once
    /// it is ready.
    pub fn remaining(&self, now: u64, delay: u64) -> u64 {
        self.initiated_at.saturating_add(delay).saturating_sub(now)
    }

    pub fn check_ready(&self, parameter: &str, now: u64, delay: u64) -> Result<(), RegistryError> {
        match self.remaining(now, delay) {
            0 => Ok(()),
            remaining => Err(RegistryError::DelayNotElapsed {
                parameter: parameter.to_owned(),
                remaining,
            }),
        }
    }
}
