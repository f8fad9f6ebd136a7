//! Gas-speed policy.
//!
//! Every send path prices gas through [`GasPolicy::adjust`], so a speed
//! selection always changes the fee that is actually submitted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl fmt::Display for GasSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GasSpeed::Slow => "slow",
            GasSpeed::Normal => "normal",
            GasSpeed::Fast => "fast",
        };
        f.write_str(s)
    }
}

impl FromStr for GasSpeed {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(GasSpeed::Slow),
            "normal" => Ok(GasSpeed::Normal),
            "fast" => Ok(GasSpeed::Fast),
            other => Err(ValidationError::InvalidGasSpeed(other.to_string())),
        }
    }
}

/// Gas price multipliers per speed tier, in percent of the network gas price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPolicy {
    pub slow_pct: u32,
    pub normal_pct: u32,
    pub fast_pct: u32,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            slow_pct: 80,
            normal_pct: 100,
            fast_pct: 150,
        }
    }
}

impl GasPolicy {
    pub fn percent(&self, speed: GasSpeed) -> u32 {
        match speed {
            GasSpeed::Slow => self.slow_pct,
            GasSpeed::Normal => self.normal_pct,
            GasSpeed::Fast => self.fast_pct,
        }
    }

    /// Network gas price scaled by the tier multiplier.
    pub fn adjust(&self, base_gas_price: u128, speed: GasSpeed) -> u128 {
        base_gas_price.saturating_mul(self.percent(speed) as u128) / 100
    }

    /// Fee budget for `gas_limit` units at the adjusted price.
    pub fn fee(&self, base_gas_price: u128, speed: GasSpeed, gas_limit: u64) -> u128 {
        self.adjust(base_gas_price, speed)
            .saturating_mul(gas_limit as u128)
    }
}
