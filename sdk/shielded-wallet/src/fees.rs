//! Fee and dust policy
//!
//! Passed explicitly to the builder and the operation.

use sapling_primitives::{Amount, MAX_MONEY, SPEND_DESCRIPTION_SIZE};
use serde::{Deserialize, Serialize};

/// Size of a typical transparent output plus the input that later spends it
const TRANSPARENT_DUST_SPEND_SIZE: usize = 182;

/// Size of a spend description plus a transparent output
const SHIELDED_DUST_SPEND_SIZE: usize = SPEND_DESCRIPTION_SIZE + 34;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Minimum relay fee per 1000 bytes
    pub min_relay_fee_per_k: Amount,
    /// Factor applied to the relay fee for transactions with shielded data
    pub shielded_fee_multiplier: Amount,
    /// An accepted fee above this multiple of the minimum is rejected
    pub max_fee_multiplier_transparent: Amount,
    pub max_fee_multiplier_shielded: Amount,
    pub default_min_depth: u32,
    /// Bound on the fee convergence loop
    pub max_fee_iterations: u32,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            min_relay_fee_per_k: 10_000,
            shielded_fee_multiplier: 100,
            max_fee_multiplier_transparent: 100,
            max_fee_multiplier_shielded: 10_000,
            default_min_depth: 5,
            max_fee_iterations: 100,
        }
    }
}

impl FeePolicy {
    /// Fee at the relay rate for `bytes`; never zero for a non-zero rate
    pub fn fee_for_size(&self, bytes: usize) -> Amount {
        let fee = self.min_relay_fee_per_k.saturating_mul(bytes as Amount) / 1000;
        if fee == 0 && self.min_relay_fee_per_k > 0 {
            return self.min_relay_fee_per_k;
        }
        fee
    }

    pub fn min_relay_fee(&self, bytes: usize) -> Amount {
        self.fee_for_size(bytes).min(MAX_MONEY)
    }

    pub fn shielded_min_fee(&self, bytes: usize) -> Amount {
        self.fee_for_size(bytes)
            .saturating_mul(self.shielded_fee_multiplier)
            .min(MAX_MONEY)
    }

    /// Minimum fee for a transaction of `bytes`, by whether it carries shielded data
    pub fn required_fee(&self, bytes: usize, shielded: bool) -> Amount {
        if shielded {
            self.shielded_min_fee(bytes)
        } else {
            self.min_relay_fee(bytes)
        }
    }

    /// Largest acceptable fee given the minimum `required`
    pub fn max_fee(&self, required: Amount, shielded: bool) -> Amount {
        let multiplier = if shielded {
            self.max_fee_multiplier_shielded
        } else {
            self.max_fee_multiplier_transparent
        };
        required.saturating_mul(multiplier)
    }

    /// Transparent outputs below this are dust
    pub fn dust_threshold(&self) -> Amount {
        3 * self.fee_for_size(TRANSPARENT_DUST_SPEND_SIZE)
    }

    /// Shielded outputs below this are dust
    pub fn shielded_dust_threshold(&self) -> Amount {
        3 * self.shielded_fee_multiplier * self.fee_for_size(SHIELDED_DUST_SPEND_SIZE)
    }

    pub fn dust_threshold_for(&self, shielded: bool) -> Amount {
        if shielded {
            self.shielded_dust_threshold()
        } else {
            self.dust_threshold()
        }
    }
}
