//! ww-dashboard: Welcome Wallet backend.
//!
//! Serves the dashboard REST API: session and signer selection, cached
//! balances with USD values, sends with a gas-speed choice, the gas and
//! token faucets, and the crypto chat assistant.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use ww_assets::{BalanceCache, BalanceCacheConfig, PriceAnnotator, PriceCacheConfig, SchedulerConfig};
use ww_core::constants::CHAIN_ID;
use ww_core::error::ChainError;
use ww_core::traits::{ChainClient, ChatClient, PriceStore, Signer};
use ww_core::{Address, Clock, SystemClock};
use ww_faucet::{AdminGate, CounterStore, FaucetDispenser, RocksCounterStore};
use ww_rpc::{EmbeddedSigner, EvmRpcClient, HttpChatClient, HttpPriceFeed, NodeSigner};

mod config;
mod error;
mod routes;
mod send;
mod session;

use config::Config;
use routes::FaucetMap;
use send::SendFlow;
use session::{Session, SignerFactory, WalletKind};

/// Welcome Wallet dashboard backend.
#[derive(Parser, Debug)]
#[command(name = "ww-dashboard", version, about = "Welcome Wallet dashboard API server")]
struct Args {
    /// HTTP bind address (overrides WW_BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

/// Shared application state passed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Logged-in wallet and its refresh task.
    pub session: Arc<Session>,
    /// Builds the signer for a wallet at login.
    pub signers: SignerFactory,
    pub cache: Arc<BalanceCache>,
    pub prices: Arc<PriceAnnotator>,
    pub send: Arc<SendFlow>,
    pub faucets: Arc<FaucetMap>,
    pub admin: Arc<AdminGate>,
    /// `None` when no chat backend is configured; chat then always degrades.
    pub chat: Option<Arc<dyn ChatClient>>,
    /// Symbols quoted by `/api/prices` when none are requested.
    pub tracked_symbols: Arc<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let mut config = Config::from_env().context("Failed to load dashboard configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    info!(
        rpc = %config.rpc_url,
        bind = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        tracked = ?config.tracked_symbols(),
        "Starting ww-dashboard"
    );

    let (state, store) = build_state(&config).await?;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Err(e) = store.flush() {
        warn!(error = %e, "failed to flush faucet ledger");
    }
    info!("ww-dashboard shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down..."),
        Err(e) => error!(error = %e, "failed to listen for Ctrl+C"),
    }
}

/// Wire collaborators from configuration. Returns the ledger store so it can
/// be flushed on shutdown.
async fn build_state(config: &Config) -> Result<(AppState, Arc<RocksCounterStore>)> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let rpc = EvmRpcClient::new(&config.rpc_url).context("Failed to create RPC client")?;
    match rpc.chain_id().await {
        Ok(id) if id == CHAIN_ID => info!(chain_id = id, "RPC endpoint reachable"),
        Ok(id) => warn!(chain_id = id, expected = CHAIN_ID, "RPC endpoint serves an unexpected chain"),
        Err(e) => warn!(error = %e, "RPC endpoint unreachable at startup"),
    }
    let chain: Arc<dyn ChainClient> = Arc::new(rpc.clone());

    let cache = Arc::new(BalanceCache::new(
        BalanceCacheConfig {
            ttl: config.balance_ttl,
            assets: config.tracked_assets.clone(),
        },
        chain.clone(),
        clock.clone(),
    ));

    let feed = HttpPriceFeed::new(
        &config.price_api_url,
        config.price_api_key.clone(),
        config.price_ids.clone(),
    )
    .context("Failed to create price feed client")?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;
    let ledger_path = config.data_dir.join("faucet");
    let store = Arc::new(
        RocksCounterStore::open(&ledger_path)
            .with_context(|| format!("Failed to open faucet ledger at {}", ledger_path.display()))?,
    );

    let prices = Arc::new(
        PriceAnnotator::new(
            PriceCacheConfig {
                ttl: config.price_ttl,
                ..PriceCacheConfig::default()
            },
            Arc::new(feed),
            clock.clone(),
        )
        .with_store(store.clone() as Arc<dyn PriceStore>),
    );

    let funding: Option<Arc<dyn Signer>> = match config.funding_address {
        Some(address) => {
            info!(%address, "faucet funding account configured");
            Some(Arc::new(NodeSigner::new(rpc.clone(), address)) as Arc<dyn Signer>)
        }
        None => {
            warn!("WW_FAUCET_FUNDING_ADDRESS not set; faucet claims will be refused");
            None
        }
    };

    let mut faucets = FaucetMap::new();
    for policy in [&config.gas_faucet, &config.token_faucet] {
        let dispenser = FaucetDispenser::new(
            policy.clone(),
            store.clone() as Arc<dyn CounterStore>,
            chain.clone(),
            funding.clone(),
            clock.clone(),
        )
        .with_gas_policy(config.gas_policy);
        faucets.insert(policy.kind, Arc::new(dispenser));
    }

    let admin = match &config.admin_public_key {
        Some(key) => AdminGate::from_hex(key, clock.clone()).context("WW_ADMIN_PUBLIC_KEY is invalid")?,
        None => {
            info!("WW_ADMIN_PUBLIC_KEY not set; faucet resets disabled");
            AdminGate::disabled(clock.clone())
        }
    };

    let chat: Option<Arc<dyn ChatClient>> = match (&config.chat_endpoint, &config.chat_api_key) {
        (Some(endpoint), Some(key)) => {
            let client = HttpChatClient::new(endpoint, key, &config.chat_model)
                .context("Failed to create chat client")?;
            Some(Arc::new(client) as Arc<dyn ChatClient>)
        }
        _ => {
            info!("chat backend not configured; chat replies will degrade");
            None
        }
    };

    let signers = signer_factory(rpc, config);

    let state = AppState {
        session: Arc::new(Session::new(
            cache.clone(),
            SchedulerConfig {
                interval: config.refresh_interval,
            },
        )),
        signers,
        cache: cache.clone(),
        prices,
        send: Arc::new(SendFlow::new(
            chain,
            cache,
            config.gas_policy,
            config.tracked_assets.clone(),
            config.confirmation_timeout,
        )),
        faucets: Arc::new(faucets),
        admin: Arc::new(admin),
        chat,
        tracked_symbols: Arc::new(config.tracked_symbols()),
    };
    Ok((state, store))
}

/// External wallets sign on the node; embedded wallets through the identity
/// provider's wallet API.
fn signer_factory(rpc: EvmRpcClient, config: &Config) -> SignerFactory {
    let wallet_api = config.wallet_api_url.clone().zip(config.wallet_api_key.clone());
    Arc::new(
        move |kind: WalletKind, address: Address| -> Result<Arc<dyn Signer>, ChainError> {
            match kind {
                WalletKind::External => Ok(Arc::new(NodeSigner::new(rpc.clone(), address))),
                WalletKind::Embedded => {
                    let (url, key) = wallet_api
                        .as_ref()
                        .ok_or_else(|| ChainError::Signer("embedded wallet API not configured".into()))?;
                    Ok(Arc::new(EmbeddedSigner::new(url, key, address)?))
                }
            }
        },
    )
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
