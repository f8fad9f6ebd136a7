//! Persistent counters behind the faucets.
//!
//! Two records exist per faucet: the [`DistributionLedger`] (total
//! distributed and the set of recipients) and one last-claim timestamp per
//! recipient. Both are written together by [`CounterStore::commit_claim`].

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use ww_core::error::StorageError;
use ww_core::{Address, Amount};

use crate::config::FaucetKind;

/// A successful claim. Never mutated; removed only by a ledger reset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimRecord {
    pub recipient: Address,
    pub claimed_at: DateTime<Utc>,
}

/// Running totals of one faucet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DistributionLedger {
    pub total_distributed: Amount,
    pub recipients: BTreeSet<Address>,
}

impl DistributionLedger {
    pub fn empty(decimals: u8) -> Self {
        Self {
            total_distributed: Amount::zero(decimals),
            recipients: BTreeSet::new(),
        }
    }

    /// The ledger after crediting `amount` to `recipient`.
    pub fn with_claim(&self, recipient: Address, amount: Amount) -> Result<Self, StorageError> {
        let total_distributed = self
            .total_distributed
            .checked_add(amount)
            .ok_or_else(|| StorageError::Backend("ledger total overflow or scale mismatch".into()))?;
        let mut recipients = self.recipients.clone();
        recipients.insert(recipient);
        Ok(Self {
            total_distributed,
            recipients,
        })
    }
}

/// Durable store for claim history and distribution totals.
///
/// Implementations must make [`commit_claim`](Self::commit_claim) atomic:
/// after a crash either both the ledger and the claim record reflect the
/// claim, or neither does.
pub trait CounterStore: Send + Sync {
    /// Current ledger, or an empty one with `decimals` scale if none was written.
    fn ledger(&self, faucet: FaucetKind, decimals: u8) -> Result<DistributionLedger, StorageError>;

    /// Most recent claim by `recipient`, if any.
    fn last_claim(
        &self,
        faucet: FaucetKind,
        recipient: &Address,
    ) -> Result<Option<ClaimRecord>, StorageError>;

    /// Record `claim` and add `amount` to the ledger. Returns the new ledger.
    fn commit_claim(
        &self,
        faucet: FaucetKind,
        claim: &ClaimRecord,
        amount: Amount,
    ) -> Result<DistributionLedger, StorageError>;

    /// Clear the ledger and every claim record of `faucet`.
    fn reset(&self, faucet: FaucetKind) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryState {
    ledgers: HashMap<FaucetKind, DistributionLedger>,
    claims: HashMap<(FaucetKind, Address), DateTime<Utc>>,
}

/// Non-durable [`CounterStore`] for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCounterStore {
    state: Mutex<MemoryState>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn ledger(&self, faucet: FaucetKind, decimals: u8) -> Result<DistributionLedger, StorageError> {
        let state = self.state.lock();
        match state.ledgers.get(&faucet) {
            Some(ledger) if ledger.total_distributed.decimals() != decimals => Err(StorageError::Corrupt {
                key: faucet.to_string(),
                reason: format!(
                    "ledger scale {} does not match {decimals}",
                    ledger.total_distributed.decimals()
                ),
            }),
            Some(ledger) => Ok(ledger.clone()),
            None => Ok(DistributionLedger::empty(decimals)),
        }
    }

    fn last_claim(
        &self,
        faucet: FaucetKind,
        recipient: &Address,
    ) -> Result<Option<ClaimRecord>, StorageError> {
        let state = self.state.lock();
        Ok(state.claims.get(&(faucet, *recipient)).map(|at| ClaimRecord {
            recipient: *recipient,
            claimed_at: *at,
        }))
    }

    fn commit_claim(
        &self,
        faucet: FaucetKind,
        claim: &ClaimRecord,
        amount: Amount,
    ) -> Result<DistributionLedger, StorageError> {
        let mut state = self.state.lock();
        let current = state
            .ledgers
            .get(&faucet)
            .cloned()
            .unwrap_or_else(|| DistributionLedger::empty(amount.decimals()));
        let updated = current.with_claim(claim.recipient, amount)?;
        state.ledgers.insert(faucet, updated.clone());
        state.claims.insert((faucet, claim.recipient), claim.claimed_at);
        Ok(updated)
    }

    fn reset(&self, faucet: FaucetKind) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.ledgers.remove(&faucet);
        state.claims.retain(|(kind, _), _| *kind != faucet);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address::from_bytes([seed; 20])
    }

    fn claim(seed: u8, secs: i64) -> ClaimRecord {
        ClaimRecord {
            recipient: addr(seed),
            claimed_at: DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[test]
    fn empty_ledger_by_default() {
        let store = MemoryCounterStore::new();
        let ledger = store.ledger(FaucetKind::Gas, 18).unwrap();
        assert!(ledger.total_distributed.is_zero());
        assert!(ledger.recipients.is_empty());
        assert_eq!(store.last_claim(FaucetKind::Gas, &addr(1)).unwrap(), None);
    }

    #[test]
    fn commit_updates_ledger_and_claim() {
        let store = MemoryCounterStore::new();
        let ledger = store
            .commit_claim(FaucetKind::Gas, &claim(1, 100), Amount::new(5, 18))
            .unwrap();
        assert_eq!(ledger.total_distributed, Amount::new(5, 18));
        assert!(ledger.recipients.contains(&addr(1)));
        assert_eq!(store.last_claim(FaucetKind::Gas, &addr(1)).unwrap(), Some(claim(1, 100)));
    }

    #[test]
    fn later_claim_replaces_timestamp() {
        let store = MemoryCounterStore::new();
        store.commit_claim(FaucetKind::Token, &claim(1, 100), Amount::new(5, 18)).unwrap();
        let ledger = store
            .commit_claim(FaucetKind::Token, &claim(1, 5000), Amount::new(5, 18))
            .unwrap();
        assert_eq!(ledger.total_distributed, Amount::new(10, 18));
        assert_eq!(ledger.recipients.len(), 1);
        assert_eq!(
            store.last_claim(FaucetKind::Token, &addr(1)).unwrap().unwrap().claimed_at.timestamp(),
            5000
        );
    }

    #[test]
    fn faucets_are_isolated() {
        let store = MemoryCounterStore::new();
        store.commit_claim(FaucetKind::Gas, &claim(1, 100), Amount::new(5, 18)).unwrap();
        assert_eq!(store.last_claim(FaucetKind::Token, &addr(1)).unwrap(), None);
        assert!(store.ledger(FaucetKind::Token, 18).unwrap().recipients.is_empty());
    }

    #[test]
    fn reset_clears_only_one_faucet() {
        let store = MemoryCounterStore::new();
        store.commit_claim(FaucetKind::Gas, &claim(1, 100), Amount::new(5, 18)).unwrap();
        store.commit_claim(FaucetKind::Token, &claim(1, 100), Amount::new(7, 18)).unwrap();
        store.reset(FaucetKind::Gas).unwrap();
        assert!(store.ledger(FaucetKind::Gas, 18).unwrap().total_distributed.is_zero());
        assert_eq!(store.last_claim(FaucetKind::Gas, &addr(1)).unwrap(), None);
        assert_eq!(
            store.ledger(FaucetKind::Token, 18).unwrap().total_distributed,
            Amount::new(7, 18)
        );
    }

    #[test]
    fn scale_mismatch_is_corrupt() {
        let store = MemoryCounterStore::new();
        store.commit_claim(FaucetKind::Gas, &claim(1, 100), Amount::new(5, 18)).unwrap();
        assert!(matches!(
            store.ledger(FaucetKind::Gas, 6),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
