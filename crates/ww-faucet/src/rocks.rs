//! RocksDB-backed faucet counters, plus the persisted price cache.
//!
//! Column families:
//! - `ledgers`: key `<faucet>`, value bincode [`LedgerRecord`]
//! - `claims`: key `<faucet>:<address>`, value last-claim time as i64 millis (LE)
//! - `prices`: key upper-case symbol, value bincode [`PriceRecord`]
//!
//! A claim commit writes both faucet families in one [`WriteBatch`].

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use ww_core::error::StorageError;
use ww_core::traits::PriceStore;
use ww_core::{Address, Amount, PriceEntry};

use crate::config::FaucetKind;
use crate::store::{ClaimRecord, CounterStore, DistributionLedger};

const CF_LEDGERS: &str = "ledgers";
const CF_CLAIMS: &str = "claims";
const CF_PRICES: &str = "prices";

const ALL_CFS: &[&str] = &[CF_LEDGERS, CF_CLAIMS, CF_PRICES];

/// On-disk form of a [`DistributionLedger`].
#[derive(bincode::Encode, bincode::Decode)]
struct LedgerRecord {
    total_units: u128,
    decimals: u8,
    /// Lower-case `0x…` recipient addresses.
    recipients: Vec<String>,
}

#[derive(bincode::Encode, bincode::Decode)]
struct PriceRecord {
    price_usd: f64,
    fetched_at_millis: i64,
}

pub struct RocksCounterStore {
    db: DB,
    /// Serializes read-modify-write of ledger records.
    write_lock: Mutex<()>,
}

impl RocksCounterStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        info!(path = %path.as_ref().display(), "faucet counter store opened");
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Backend(format!("missing column family: {name}")))
    }

    fn claim_key(faucet: FaucetKind, recipient: &Address) -> Vec<u8> {
        format!("{}:{}", faucet.as_str(), recipient.storage_key()).into_bytes()
    }

    fn claim_prefix(faucet: FaucetKind) -> Vec<u8> {
        format!("{}:", faucet.as_str()).into_bytes()
    }

    fn read_ledger(&self, faucet: FaucetKind) -> Result<Option<DistributionLedger>, StorageError> {
        let cf = self.cf_handle(CF_LEDGERS)?;
        let Some(bytes) = self
            .db
            .get_cf(cf, faucet.as_str().as_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };

        let corrupt = |reason: String| StorageError::Corrupt {
            key: faucet.to_string(),
            reason,
        };
        let (record, _): (LedgerRecord, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| corrupt(e.to_string()))?;

        let recipients = record
            .recipients
            .iter()
            .map(|s| Address::parse(s).map_err(|e| corrupt(e.to_string())))
            .collect::<Result<_, _>>()?;

        Ok(Some(DistributionLedger {
            total_distributed: Amount::new(record.total_units, record.decimals),
            recipients,
        }))
    }

    fn encode_ledger(ledger: &DistributionLedger) -> Result<Vec<u8>, StorageError> {
        let record = LedgerRecord {
            total_units: ledger.total_distributed.units(),
            decimals: ledger.total_distributed.decimals(),
            recipients: ledger.recipients.iter().map(Address::storage_key).collect(),
        };
        bincode::encode_to_vec(&record, bincode::config::standard())
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

impl CounterStore for RocksCounterStore {
    fn ledger(&self, faucet: FaucetKind, decimals: u8) -> Result<DistributionLedger, StorageError> {
        match self.read_ledger(faucet)? {
            Some(ledger) if ledger.total_distributed.decimals() != decimals => Err(StorageError::Corrupt {
                key: faucet.to_string(),
                reason: format!(
                    "ledger scale {} does not match {decimals}",
                    ledger.total_distributed.decimals()
                ),
            }),
            Some(ledger) => Ok(ledger),
            None => Ok(DistributionLedger::empty(decimals)),
        }
    }

    fn last_claim(
        &self,
        faucet: FaucetKind,
        recipient: &Address,
    ) -> Result<Option<ClaimRecord>, StorageError> {
        let cf = self.cf_handle(CF_CLAIMS)?;
        let key = Self::claim_key(faucet, recipient);
        match self
            .db
            .get_cf(cf, &key)
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(bytes) if bytes.len() == 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                let millis = i64::from_le_bytes(raw);
                let claimed_at = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                    StorageError::Corrupt {
                        key: String::from_utf8_lossy(&key).into_owned(),
                        reason: format!("timestamp out of range: {millis}"),
                    }
                })?;
                Ok(Some(ClaimRecord {
                    recipient: *recipient,
                    claimed_at,
                }))
            }
            Some(bytes) => Err(StorageError::Corrupt {
                key: String::from_utf8_lossy(&key).into_owned(),
                reason: format!("expected 8 bytes, got {}", bytes.len()),
            }),
            None => Ok(None),
        }
    }

    fn commit_claim(
        &self,
        faucet: FaucetKind,
        claim: &ClaimRecord,
        amount: Amount,
    ) -> Result<DistributionLedger, StorageError> {
        let _guard = self.write_lock.lock();

        let current = self
            .read_ledger(faucet)?
            .unwrap_or_else(|| DistributionLedger::empty(amount.decimals()));
        let updated = current.with_claim(claim.recipient, amount)?;

        let cf_ledgers = self.cf_handle(CF_LEDGERS)?;
        let cf_claims = self.cf_handle(CF_CLAIMS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_ledgers, faucet.as_str().as_bytes(), Self::encode_ledger(&updated)?);
        batch.put_cf(
            cf_claims,
            Self::claim_key(faucet, &claim.recipient),
            claim.claimed_at.timestamp_millis().to_le_bytes(),
        );
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!(%faucet, recipient = %claim.recipient, total = %updated.total_distributed, "claim committed");
        Ok(updated)
    }

    fn reset(&self, faucet: FaucetKind) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();

        let cf_ledgers = self.cf_handle(CF_LEDGERS)?;
        let cf_claims = self.cf_handle(CF_CLAIMS)?;
        let prefix = Self::claim_prefix(faucet);

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf_ledgers, faucet.as_str().as_bytes());

        let mut removed = 0usize;
        let iter = self
            .db
            .iterator_cf(cf_claims, IteratorMode::From(prefix.as_slice(), Direction::Forward));
        for item in iter {
            let (key, _) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete_cf(cf_claims, &key);
            removed += 1;
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        info!(%faucet, removed, "faucet ledger reset");
        Ok(())
    }
}

impl PriceStore for RocksCounterStore {
    fn load_prices(&self) -> Result<Vec<PriceEntry>, StorageError> {
        let cf = self.cf_handle(CF_PRICES)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            let symbol = String::from_utf8_lossy(&key).into_owned();
            let corrupt = |reason: String| StorageError::Corrupt {
                key: format!("prices:{symbol}"),
                reason,
            };
            let (record, _): (PriceRecord, usize) =
                bincode::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| corrupt(e.to_string()))?;
            let fetched_at = DateTime::<Utc>::from_timestamp_millis(record.fetched_at_millis)
                .ok_or_else(|| corrupt(format!("timestamp out of range: {}", record.fetched_at_millis)))?;
            entries.push(PriceEntry {
                symbol,
                price_usd: record.price_usd,
                fetched_at,
            });
        }
        Ok(entries)
    }

    fn save_prices(&self, entries: &[PriceEntry]) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_PRICES)?;
        let mut batch = WriteBatch::default();
        for entry in entries {
            let record = PriceRecord {
                price_usd: entry.price_usd,
                fetched_at_millis: entry.fetched_at.timestamp_millis(),
            };
            let value = bincode::encode_to_vec(&record, bincode::config::standard())
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            batch.put_cf(cf, entry.symbol.to_uppercase().as_bytes(), value);
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        debug!(count = entries.len(), "prices persisted");
        Ok(())
    }
}
