//! Network-upgrade parameters consulted while building transactions

use serde::{Deserialize, Serialize};

use crate::transaction::{TX_VERSION_LEGACY, TX_VERSION_SAPLING};

/// Consensus branch id mixed into the Sapling signature hash
pub const SAPLING_BRANCH_ID: u32 = 0x76b8_09bb;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// First block height at which shielded data is allowed
    pub sapling_activation_height: u32,
    /// Maximum serialized transaction size before Sapling activation
    pub max_tx_size_before_sapling: usize,
    /// Maximum serialized transaction size after Sapling activation
    pub max_tx_size_after_sapling: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            sapling_activation_height: 0,
            max_tx_size_before_sapling: 100_000,
            max_tx_size_after_sapling: 256_000,
        }
    }
}

impl ConsensusParams {
    pub fn is_sapling_active(&self, height: u32) -> bool {
        height >= self.sapling_activation_height
    }

    /// Transaction version to use for a transaction mined at `height`
    pub fn tx_version(&self, height: u32) -> u16 {
        if self.is_sapling_active(height) {
            TX_VERSION_SAPLING
        } else {
            TX_VERSION_LEGACY
        }
    }

    pub fn max_tx_size(&self, height: u32) -> usize {
        if self.is_sapling_active(height) {
            self.max_tx_size_after_sapling
        } else {
            self.max_tx_size_before_sapling
        }
    }
}
