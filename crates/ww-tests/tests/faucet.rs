//! Faucet scenarios: per-recipient limits, the global cap, concurrency,
//! failure handling and administrative reset.

use std::sync::Arc;

use chrono::Duration;
use ed25519_dalek::{Signer as _, SigningKey};

use ww_core::{Amount, Clock};
use ww_faucet::admin::signing_message;
use ww_faucet::{
    AdminGate, CounterStore, DenyReason, FaucetError, FaucetKind, FaucetPolicyConfig,
    MemoryCounterStore, RocksCounterStore,
};
use ww_tests::helpers::*;

fn memory() -> Arc<dyn CounterStore> {
    Arc::new(MemoryCounterStore::new())
}

fn gas_harness() -> FaucetHarness {
    FaucetHarness::new(FaucetPolicyConfig::gas_defaults(), memory())
}

fn cooldown_harness() -> FaucetHarness {
    FaucetHarness::new(FaucetPolicyConfig::token_defaults(), memory())
}

fn denied(result: Result<ww_core::TxHash, FaucetError>) -> DenyReason {
    match result {
        Err(e) => e.deny_reason().unwrap_or_else(|| panic!("expected denial, got {e:?}")),
        Ok(hash) => panic!("expected denial, got {hash}"),
    }
}

#[tokio::test]
async fn one_time_faucet_denies_second_claim() {
    let h = gas_harness();
    h.dispenser.dispense(&addr_str(1)).await.unwrap();

    h.clock.advance(Duration::days(30));
    assert_eq!(denied(h.dispenser.dispense(&addr_str(1)).await), DenyReason::AlreadyClaimed);
    assert_eq!(h.funding.sent_count(), 1);
}

#[tokio::test]
async fn recipient_address_is_case_insensitive() {
    let h = gas_harness();
    let lower = format!("0x{}", "ab".repeat(20));
    let upper = format!("0x{}", "AB".repeat(20));

    h.dispenser.dispense(&lower).await.unwrap();
    assert_eq!(denied(h.dispenser.dispense(&upper).await), DenyReason::AlreadyClaimed);
}

#[tokio::test]
async fn cooldown_boundary_is_exact() {
    let h = cooldown_harness();
    let start = h.clock.now();
    h.dispenser.dispense(&addr_str(2)).await.unwrap();

    h.clock.set(start + Duration::seconds(3599));
    match h.dispenser.dispense(&addr_str(2)).await {
        Err(FaucetError::RateLimited { reason, retry_at }) => {
            assert_eq!(reason, DenyReason::CooldownActive);
            assert_eq!(retry_at, Some(start + Duration::seconds(3600)));
        }
        other => panic!("expected cooldown, got {other:?}"),
    }

    h.clock.set(start + Duration::seconds(3600));
    h.dispenser.dispense(&addr_str(2)).await.unwrap();
    assert_eq!(h.ledger().total_distributed.to_string(), "20.0");
}

#[tokio::test]
async fn cap_admits_exactly_ten_gas_claims() {
    let h = gas_harness();
    for seed in 1..=10 {
        h.dispenser.dispense(&addr_str(seed)).await.unwrap();
    }
    assert_eq!(denied(h.dispenser.dispense(&addr_str(11)).await), DenyReason::GlobalCapReached);

    let ledger = h.ledger();
    assert_eq!(ledger.total_distributed.to_string(), "0.005");
    assert_eq!(ledger.recipients.len(), 10);
    assert_eq!(h.funding.sent_count(), 10);
}

#[tokio::test]
async fn claim_crossing_cap_is_denied_whole() {
    let config = FaucetPolicyConfig {
        global_cap: Amount::parse("0.0012", 18).unwrap(),
        ..FaucetPolicyConfig::gas_defaults()
    };
    let h = FaucetHarness::new(config, memory());

    h.dispenser.dispense(&addr_str(1)).await.unwrap();
    h.dispenser.dispense(&addr_str(2)).await.unwrap();
    assert_eq!(denied(h.dispenser.dispense(&addr_str(3)).await), DenyReason::GlobalCapReached);
    assert_eq!(h.ledger().total_distributed.to_string(), "0.001");
}

#[tokio::test]
async fn concurrent_claims_for_one_recipient_yield_one_transfer() {
    let h = Arc::new(gas_harness());
    let recipient = addr_str(7);

    let (a, b) = tokio::join!(h.dispenser.dispense(&recipient), h.dispenser.dispense(&recipient));

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert_eq!(denied(loser), DenyReason::AlreadyClaimed);
    assert_eq!(h.funding.sent_count(), 1);
    assert_eq!(h.ledger().recipients.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_claims_never_exceed_cap() {
    let h = Arc::new(gas_harness());
    let mut tasks = Vec::new();
    for seed in 1..=25u8 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move { h.dispenser.dispense(&addr_str(seed)).await }));
    }
    let mut granted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            granted += 1;
        }
    }
    assert_eq!(granted, 10);
    assert_eq!(h.ledger().total_distributed.to_string(), "0.005");
}

#[tokio::test]
async fn storage_failure_denies_without_sending() {
    let h = FaucetHarness::new(FaucetPolicyConfig::gas_defaults(), Arc::new(FailingStore));
    let err = h.dispenser.dispense(&addr_str(1)).await.unwrap_err();
    assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
    assert_eq!(h.funding.sent_count(), 0);
}

#[tokio::test]
async fn failed_submission_writes_nothing() {
    let h = gas_harness();
    h.funding.set_failing(true);

    let err = h.dispenser.dispense(&addr_str(1)).await.unwrap_err();
    assert_eq!(err.code(), "TRANSFER_FAILED");
    assert!(h.ledger().total_distributed.is_zero());

    h.funding.set_failing(false);
    h.dispenser.dispense(&addr_str(1)).await.unwrap();
}

#[tokio::test]
async fn confirmation_timeout_writes_nothing() {
    let h = gas_harness();
    h.chain.set_receipt_mode(ReceiptMode::Timeout);

    let err = h.dispenser.dispense(&addr_str(1)).await.unwrap_err();
    assert_eq!(err.code(), "CONFIRMATION_TIMEOUT");
    assert!(h.ledger().recipients.is_empty());
    assert!(
        h.store
            .last_claim(FaucetKind::Gas, &addr(1))
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn unreadable_gas_price_means_funding_unavailable() {
    let h = gas_harness();
    h.chain.set_gas_failing(true);
    let err = h.dispenser.dispense(&addr_str(1)).await.unwrap_err();
    assert_eq!(err.code(), "FUNDING_UNAVAILABLE");
    assert_eq!(h.funding.sent_count(), 0);
}

#[tokio::test]
async fn token_faucet_sends_erc20_transfer() {
    let h = cooldown_harness();
    h.dispenser.dispense(&addr_str(4)).await.unwrap();

    let sent = h.funding.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].value, 0);
    assert_eq!(&sent[0].data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    assert_eq!(Some(&sent[0].to), h.dispenser.config().asset.contract());
}

#[tokio::test]
async fn admin_reset_reopens_faucet() {
    let h = gas_harness();
    for seed in 1..=10 {
        h.dispenser.dispense(&addr_str(seed)).await.unwrap();
    }

    let key = SigningKey::generate(&mut rand::rngs::OsRng);
    let gate = AdminGate::from_hex(
        &hex::encode(key.verifying_key().as_bytes()),
        Arc::new(h.clock.clone()),
    )
    .unwrap();
    let timestamp = h.clock.now().timestamp().to_string();
    let signature = key.sign(&signing_message(FaucetKind::Gas, &timestamp));
    let grant = gate
        .authorize(FaucetKind::Gas, &timestamp, &hex::encode(signature.to_bytes()))
        .unwrap();

    h.dispenser.reset_ledger(&grant).await.unwrap();

    let ledger = h.ledger();
    assert!(ledger.total_distributed.is_zero());
    assert!(ledger.recipients.is_empty());
    h.dispenser.dispense(&addr_str(1)).await.unwrap();
}

#[tokio::test]
async fn ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store: Arc<dyn CounterStore> = Arc::new(RocksCounterStore::open(dir.path()).unwrap());
        let h = FaucetHarness::new(FaucetPolicyConfig::gas_defaults(), store);
        h.dispenser.dispense(&addr_str(1)).await.unwrap();
        h.dispenser.dispense(&addr_str(2)).await.unwrap();
    }

    let store: Arc<dyn CounterStore> = Arc::new(RocksCounterStore::open(dir.path()).unwrap());
    let h = FaucetHarness::new(FaucetPolicyConfig::gas_defaults(), store);
    assert_eq!(h.ledger().total_distributed.to_string(), "0.001");
    assert_eq!(denied(h.dispenser.dispense(&addr_str(1)).await), DenyReason::AlreadyClaimed);
}
