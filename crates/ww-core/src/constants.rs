//! Chain and dashboard constants. Monetary values are in base units.

/// Base mainnet chain id.
pub const CHAIN_ID: u64 = 8453;

/// Public Base RPC endpoint used when none is configured.
pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";

pub const NATIVE_SYMBOL: &str = "ETH";
pub const NATIVE_DECIMALS: u8 = 18;

/// 1 ETH in wei.
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

pub const USDC_CONTRACT: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";
pub const USDC_DECIMALS: u8 = 6;

pub const TOBY_CONTRACT: &str = "0xb8d98a102b0079b69ffbc760c8d857a31653e56e";
pub const TOBY_DECIMALS: u8 = 18;

/// Gas limit of a plain value transfer.
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// Gas limit budgeted for an ERC-20 `transfer`.
pub const TOKEN_TRANSFER_GAS: u64 = 65_000;

/// `transfer(address,uint256)`
pub const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `balanceOf(address)`
pub const ERC20_BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// `decimals()`
pub const ERC20_DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
/// `symbol()`
pub const ERC20_SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];

/// Background balance refresh period.
pub const BALANCE_REFRESH_INTERVAL_SECS: u64 = 30;

/// Age after which a cached balance snapshot is refreshed. Kept below the
/// refresh interval so every scheduled tick sees an expired snapshot.
pub const BALANCE_CACHE_TTL_SECS: u64 = 25;

/// Price cache time-to-live (5 minutes).
pub const PRICE_CACHE_TTL_SECS: u64 = 300;

/// Upper bound on waiting for a transaction receipt.
pub const CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Receipt polling period while waiting for confirmation.
pub const CONFIRMATION_POLL_MILLIS: u64 = 2_000;

/// Timeout for outbound HTTP calls (price feed, chat, embedded wallet API).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// System prompt sent with every chat completion.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant specialized in cryptocurrency and blockchain topics. \
Provide concise and accurate information to help users understand crypto concepts, market trends, \
and how to use their assets safely.";

/// Reply shown when the chat backend cannot be reached.
pub const CHAT_FALLBACK_REPLY: &str =
    "I'm sorry, I couldn't process your request right now. Please try again later.";

/// Last-resort USD prices used when neither the feed nor the cache can answer.
pub const DEFAULT_PRICES_USD: &[(&str, f64)] = &[
    ("ETH", 3100.00),
    ("BTC", 62000.00),
    ("SOL", 140.00),
    ("USDC", 1.00),
    ("TOBY", 0.001),
];
