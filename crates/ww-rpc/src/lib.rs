//! # ww-rpc: network-facing implementations of the `ww-core` traits.
//!
//! - [`evm`]: [`EvmRpcClient`] over Ethereum JSON-RPC, and [`NodeSigner`]
//!   for node-managed accounts
//! - [`embedded`]: [`EmbeddedSigner`] for wallets held by the identity provider
//! - [`price_feed`]: [`HttpPriceFeed`] against a CoinGecko-compatible API
//! - [`chat`]: [`HttpChatClient`] against an OpenAI-compatible endpoint

pub mod chat;
pub mod embedded;
pub mod evm;
mod hexutil;
pub mod price_feed;

pub use chat::HttpChatClient;
pub use embedded::EmbeddedSigner;
pub use evm::{EvmRpcClient, NodeSigner};
pub use price_feed::HttpPriceFeed;
