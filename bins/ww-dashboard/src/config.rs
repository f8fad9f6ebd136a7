//! Dashboard configuration loaded from `WW_*` environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use ww_core::constants::{
    BALANCE_CACHE_TTL_SECS, BALANCE_REFRESH_INTERVAL_SECS, CONFIRMATION_TIMEOUT_SECS,
    DEFAULT_RPC_URL, NATIVE_DECIMALS, NATIVE_SYMBOL, PRICE_CACHE_TTL_SECS, TOBY_CONTRACT,
    TOBY_DECIMALS, USDC_CONTRACT, USDC_DECIMALS,
};
use ww_core::{Address, Amount, Asset, GasPolicy};
use ww_faucet::FaucetPolicyConfig;
use ww_rpc::chat::DEFAULT_CHAT_MODEL;
use ww_rpc::price_feed::{default_ids, DEFAULT_PRICE_API_URL};

#[derive(Clone, Debug)]
pub struct Config {
    /// Base JSON-RPC endpoint.
    pub rpc_url: String,
    /// Address to bind the HTTP server.
    pub bind_addr: String,
    /// Directory holding the faucet ledger database.
    pub data_dir: PathBuf,
    /// Node-managed account paying faucet claims. Faucets refuse claims without it.
    pub funding_address: Option<Address>,
    pub gas_faucet: FaucetPolicyConfig,
    pub token_faucet: FaucetPolicyConfig,
    /// Native asset first, then tracked tokens.
    pub tracked_assets: Vec<Asset>,
    pub gas_policy: GasPolicy,
    pub price_api_url: String,
    pub price_api_key: Option<String>,
    pub price_ids: HashMap<String, String>,
    pub chat_endpoint: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_model: String,
    /// Identity provider wallet API used for embedded-wallet sends.
    pub wallet_api_url: Option<String>,
    pub wallet_api_key: Option<String>,
    /// Hex Ed25519 key authorizing faucet resets. Unset disables them.
    pub admin_public_key: Option<String>,
    pub refresh_interval: Duration,
    pub balance_ttl: chrono::Duration,
    pub price_ttl: chrono::Duration,
    pub confirmation_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_url = var("WW_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let bind_addr = var("WW_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let data_dir = var("WW_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("welcome-wallet")
        });

        let funding_address = var("WW_FAUCET_FUNDING_ADDRESS")
            .map(|a| Address::parse(&a))
            .transpose()
            .context("WW_FAUCET_FUNDING_ADDRESS must be a 0x address")?;

        let confirmation_timeout = Duration::from_secs(parse_or(
            &var,
            "WW_CONFIRMATION_TIMEOUT_SECS",
            CONFIRMATION_TIMEOUT_SECS,
        )?);

        let mut gas_faucet = FaucetPolicyConfig::gas_defaults();
        if let Some(amount) = var("WW_GAS_FAUCET_AMOUNT") {
            gas_faucet.amount_per_claim = Amount::parse(&amount, NATIVE_DECIMALS)
                .context("WW_GAS_FAUCET_AMOUNT must be a decimal ETH amount")?;
        }
        if let Some(cap) = var("WW_GAS_FAUCET_CAP") {
            gas_faucet.global_cap = Amount::parse(&cap, NATIVE_DECIMALS)
                .context("WW_GAS_FAUCET_CAP must be a decimal ETH amount")?;
        }
        gas_faucet.confirmation_timeout = confirmation_timeout;
        gas_faucet.validate().context("invalid gas faucet configuration")?;

        let mut token_faucet = FaucetPolicyConfig::token_defaults();
        let token_decimals = token_faucet.asset.decimals();
        if let Some(amount) = var("WW_TOKEN_FAUCET_AMOUNT") {
            token_faucet.amount_per_claim = Amount::parse(&amount, token_decimals)
                .context("WW_TOKEN_FAUCET_AMOUNT must be a decimal token amount")?;
        }
        if let Some(cap) = var("WW_TOKEN_FAUCET_CAP") {
            token_faucet.global_cap = Amount::parse(&cap, token_decimals)
                .context("WW_TOKEN_FAUCET_CAP must be a decimal token amount")?;
        }
        let cooldown_secs: i64 = parse_or(&var, "WW_TOKEN_FAUCET_COOLDOWN_SECS", 3600)?;
        token_faucet.cooldown = chrono::Duration::seconds(cooldown_secs);
        token_faucet.confirmation_timeout = confirmation_timeout;
        token_faucet.validate().context("invalid token faucet configuration")?;

        let tracked_assets = match var("WW_TRACKED_TOKENS") {
            Some(spec) => parse_tracked_tokens(&spec)?,
            None => default_tracked_tokens()?,
        };

        let gas_policy = match var("WW_GAS_SPEED_PERCENT") {
            Some(spec) => parse_gas_policy(&spec)?,
            None => GasPolicy::default(),
        };

        let price_ids = match var("WW_PRICE_IDS") {
            Some(spec) => parse_pairs(&spec).context("WW_PRICE_IDS must look like ETH=ethereum,USDC=usd-coin")?,
            None => default_ids(),
        };

        Ok(Config {
            rpc_url,
            bind_addr,
            data_dir,
            funding_address,
            gas_faucet,
            token_faucet,
            tracked_assets,
            gas_policy,
            price_api_url: var("WW_PRICE_API_URL").unwrap_or_else(|| DEFAULT_PRICE_API_URL.to_string()),
            price_api_key: var("WW_PRICE_API_KEY"),
            price_ids,
            chat_endpoint: var("WW_CHAT_ENDPOINT"),
            chat_api_key: var("WW_CHAT_API_KEY"),
            chat_model: var("WW_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            wallet_api_url: var("WW_WALLET_API_URL"),
            wallet_api_key: var("WW_WALLET_API_KEY"),
            admin_public_key: var("WW_ADMIN_PUBLIC_KEY"),
            refresh_interval: Duration::from_secs(parse_or(
                &var,
                "WW_BALANCE_REFRESH_SECS",
                BALANCE_REFRESH_INTERVAL_SECS,
            )?),
            balance_ttl: chrono::Duration::seconds(parse_or(
                &var,
                "WW_BALANCE_CACHE_TTL_SECS",
                BALANCE_CACHE_TTL_SECS as i64,
            )?),
            price_ttl: chrono::Duration::seconds(parse_or(
                &var,
                "WW_PRICE_CACHE_TTL_SECS",
                PRICE_CACHE_TTL_SECS as i64,
            )?),
            confirmation_timeout,
        })
    }

    /// Upper-case symbols of every tracked asset.
    pub fn tracked_symbols(&self) -> Vec<String> {
        self.tracked_assets.iter().map(|a| a.symbol().to_string()).collect()
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}

fn default_tracked_tokens() -> Result<Vec<Asset>> {
    parse_tracked_tokens(&format!(
        "USDC:{USDC_CONTRACT}:{USDC_DECIMALS},TOBY:{TOBY_CONTRACT}:{TOBY_DECIMALS}"
    ))
}

/// `SYMBOL:0xcontract:decimals` entries separated by commas. The native
/// asset is always tracked and comes first.
fn parse_tracked_tokens(spec: &str) -> Result<Vec<Asset>> {
    let mut assets = vec![Asset::native(NATIVE_SYMBOL, NATIVE_DECIMALS)];
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').collect();
        let [symbol, contract, decimals] = parts.as_slice() else {
            bail!("tracked token {entry:?} must be SYMBOL:0xcontract:decimals");
        };
        let contract = Address::parse(contract).with_context(|| format!("tracked token {symbol}"))?;
        let decimals: u8 = decimals
            .parse()
            .with_context(|| format!("decimals of tracked token {symbol}"))?;
        assets.push(Asset::token(symbol, contract, decimals));
    }
    Ok(assets)
}

/// `slow,normal,fast` percentages, e.g. `80,100,150`.
fn parse_gas_policy(spec: &str) -> Result<GasPolicy> {
    let pcts = spec
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .context("WW_GAS_SPEED_PERCENT must be three integers")?;
    let [slow_pct, normal_pct, fast_pct] = pcts.as_slice() else {
        bail!("WW_GAS_SPEED_PERCENT must have exactly three entries");
    };
    Ok(GasPolicy {
        slow_pct: *slow_pct,
        normal_pct: *normal_pct,
        fast_pct: *fast_pct,
    })
}

fn parse_pairs(spec: &str) -> Result<HashMap<String, String>> {
    spec.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) => Ok((k.trim().to_uppercase(), v.trim().to_string())),
            None => bail!("expected KEY=value, got {entry:?}"),
        })
        .collect()
}
