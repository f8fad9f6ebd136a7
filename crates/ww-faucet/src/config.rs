//! Faucet policy configuration.
//!
//! A [`FaucetPolicyConfig`] is built once at startup and injected into its
//! [`FaucetDispenser`](crate::FaucetDispenser). Resetting a faucet clears its
//! ledger; it never changes the configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use ww_core::constants::{
    CONFIRMATION_TIMEOUT_SECS, NATIVE_DECIMALS, NATIVE_SYMBOL, TOBY_CONTRACT, TOBY_DECIMALS,
    WEI_PER_ETH,
};
use ww_core::error::ValidationError;
use ww_core::{Address, Amount, Asset, GasSpeed};

/// Which faucet a claim, ledger or admin action refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaucetKind {
    /// Native gas currency, one claim per wallet.
    Gas,
    /// TOBY token, one claim per wallet per hour.
    Token,
}

impl FaucetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaucetKind::Gas => "gas",
            FaucetKind::Token => "token",
        }
    }
}

impl fmt::Display for FaucetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaucetKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gas" => Ok(FaucetKind::Gas),
            "token" => Ok(FaucetKind::Token),
            other => Err(ValidationError::UnknownFaucet(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaucetPolicyConfig {
    pub kind: FaucetKind,
    /// Asset dispensed by this faucet.
    pub asset: Asset,
    /// Fixed amount sent per successful claim.
    pub amount_per_claim: Amount,
    /// Minimum time between claims by one recipient. Zero means one claim ever.
    pub cooldown: Duration,
    /// Maximum cumulative amount this faucet will distribute.
    pub global_cap: Amount,
    /// Gas tier used for faucet transfers.
    pub gas_speed: GasSpeed,
    /// Upper bound on waiting for the transfer to be mined.
    pub confirmation_timeout: StdDuration,
}

impl FaucetPolicyConfig {
    /// 0.0005 ETH once per wallet, 0.005 ETH in total.
    pub fn gas_defaults() -> Self {
        Self {
            kind: FaucetKind::Gas,
            asset: Asset::native(NATIVE_SYMBOL, NATIVE_DECIMALS),
            amount_per_claim: Amount::new(WEI_PER_ETH / 2_000, NATIVE_DECIMALS),
            cooldown: Duration::zero(),
            global_cap: Amount::new(WEI_PER_ETH / 200, NATIVE_DECIMALS),
            gas_speed: GasSpeed::Normal,
            confirmation_timeout: StdDuration::from_secs(CONFIRMATION_TIMEOUT_SECS),
        }
    }

    /// 10 TOBY per wallet per hour, 1,000,000 TOBY in total.
    pub fn token_defaults() -> Self {
        let unit = 10u128.pow(TOBY_DECIMALS as u32);
        let contract = Address::parse(TOBY_CONTRACT).unwrap_or_default();
        Self {
            kind: FaucetKind::Token,
            asset: Asset::token("TOBY", contract, TOBY_DECIMALS),
            amount_per_claim: Amount::new(10 * unit, TOBY_DECIMALS),
            cooldown: Duration::hours(1),
            global_cap: Amount::new(1_000_000 * unit, TOBY_DECIMALS),
            gas_speed: GasSpeed::Normal,
            confirmation_timeout: StdDuration::from_secs(CONFIRMATION_TIMEOUT_SECS),
        }
    }

    /// `true` when each recipient may claim at most once.
    pub fn is_one_time(&self) -> bool {
        self.cooldown <= Duration::zero()
    }

    /// Reject configurations the dispenser cannot honour.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount_per_claim.is_zero() {
            return Err(ValidationError::ZeroAmount);
        }
        let decimals = self.asset.decimals();
        if self.amount_per_claim.decimals() != decimals || self.global_cap.decimals() != decimals {
            return Err(ValidationError::InvalidAmount(format!(
                "{} faucet amounts must use {decimals} decimals",
                self.kind
            )));
        }
        Ok(())
    }
}
