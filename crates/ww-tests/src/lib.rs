//! Scenario tests for Welcome Wallet.
//!
//! Faucet and balance behaviour exercised across crates with scripted
//! collaborators from [`helpers`] standing in for the chain, signers and
//! upstream feeds.

pub mod helpers;
