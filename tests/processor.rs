//! End-to-end ticks through the processor against the mock chain.

use alloy::primitives::U256;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use tx_scheduler::notify::NotificationKind;
use tx_scheduler::schedule::{SignedTransaction, TransactionStatus};
use tx_scheduler::watcher::BlockWatcher;
use tx_scheduler::Shutdown;

mod common;
use common::{record, sign_legacy, signer, Harness, CHAIN, GWEI};

#[tokio::test]
async fn test_full_lifecycle_of_one_transaction() {
    let h = Harness::new();
    let s = signer();
    let r = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;

    // First sighting: only the condition block is written.
    h.tick(100).await;
    let stored = h.repository.get(&r.id);
    assert_eq!(stored.condition_block, 100);
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(h.chain.broadcast_count(), 0);

    h.tick(101).await;
    h.tick(102).await;
    assert_eq!(h.chain.broadcast_count(), 0);
    assert_eq!(h.repository.get(&r.id).condition_block, 100);

    h.tick(103).await;
    let stored = h.repository.get(&r.id);
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.asset_name.as_deref(), Some("ETH"));
    assert!(stored.gas_paid.is_some());
    assert!(stored.executed_at.is_some());
    assert_eq!(h.chain.broadcast_count(), 1);

    let sent = h.notifier.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, NotificationKind::Success);
    assert_eq!(sent[0].1.status, TransactionStatus::Completed);

    // Terminal records leave the pending set.
    h.tick(104).await;
    assert_eq!(h.chain.broadcast_count(), 1);
    assert_eq!(h.notifier.settle().await.len(), 1);
}

#[tokio::test]
async fn test_one_winner_per_nonce_and_siblings_go_stale() {
    let h = Harness::new();
    let s = signer();
    let mut low = record(sign_legacy(&s, 0, 10 * GWEI, 1));
    low.priority = 2;
    let mut high = record(sign_legacy(&s, 0, 11 * GWEI, 2));
    high.priority = 1;
    let low = h.schedule(low).await;
    let high = h.schedule(high).await;

    h.tick(10).await;

    assert_eq!(h.repository.get(&high.id).condition_block, 10);
    assert_eq!(h.repository.get(&low.id).status, TransactionStatus::StaleNonce);

    h.tick(13).await;
    assert_eq!(h.repository.get(&high.id).status, TransactionStatus::Completed);
    assert_eq!(h.repository.get(&low.id).status, TransactionStatus::StaleNonce);
    assert_eq!(h.chain.broadcast_count(), 1);

    let kinds = h.notifier.wait_for(1).await;
    assert_eq!(kinds.len(), 1);
}

#[tokio::test]
async fn test_falls_through_to_next_priority_when_first_is_not_ready() {
    let h = Harness::new();
    let s = signer();
    let mut waiting = record(sign_legacy(&s, 0, 10 * GWEI, 1));
    waiting.priority = 0;
    waiting.time_condition = Some(Utc::now() + ChronoDuration::hours(1));
    let mut ready = record(sign_legacy(&s, 0, 10 * GWEI, 2));
    ready.priority = 5;
    let waiting = h.schedule(waiting).await;
    let ready = h.schedule(ready).await;

    h.tick(10).await;

    assert_eq!(h.repository.get(&ready.id).condition_block, 10);
    assert_eq!(h.repository.get(&waiting.id).status, TransactionStatus::StaleNonce);
    assert_eq!(h.repository.get(&waiting.id).condition_block, 0);
}

#[tokio::test]
async fn test_next_nonce_waits_for_lower_one() {
    let h = Harness::new();
    let s = signer();
    let first = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;
    let second = h.schedule(record(sign_legacy(&s, 1, 10 * GWEI, 1))).await;

    h.tick(10).await;
    assert_eq!(h.repository.get(&first.id).condition_block, 10);
    assert_eq!(h.repository.get(&second.id).condition_block, 0);

    h.tick(13).await;
    assert_eq!(h.repository.get(&first.id).status, TransactionStatus::Completed);
    assert_eq!(h.repository.get(&second.id).condition_block, 0);

    // Only now does nonce 1 become the lowest outstanding nonce.
    h.tick(14).await;
    assert_eq!(h.repository.get(&second.id).condition_block, 14);
    h.tick(17).await;
    assert_eq!(h.repository.get(&second.id).status, TransactionStatus::Completed);

    let nonces: Vec<u64> = h
        .chain
        .sent()
        .iter()
        .map(|raw| SignedTransaction::decode(raw).unwrap().nonce)
        .collect();
    assert_eq!(nonces, vec![0, 1]);
}

#[tokio::test]
async fn test_future_nonce_does_not_stale_siblings() {
    let h = Harness::new();
    let s = signer();
    h.chain.set_nonce(s.address(), 4);
    let a = h.schedule(record(sign_legacy(&s, 5, 10 * GWEI, 1))).await;
    let b = h.schedule(record(sign_legacy(&s, 5, 10 * GWEI, 2))).await;

    h.tick(10).await;

    assert_eq!(h.repository.get(&a.id).status, TransactionStatus::Pending);
    assert_eq!(h.repository.get(&b.id).status, TransactionStatus::Pending);
    assert_eq!(h.repository.update_count(), 0);
}

#[tokio::test]
async fn test_gas_retry_bump_is_persisted() {
    let h = Harness::new();
    let s = signer();
    let mut r = record(sign_legacy(&s, 0, 10 * GWEI, 1));
    r.gas_price_aware = true;
    let r = h.schedule(r).await;
    h.gas_oracle.set(12 * GWEI);

    h.tick(10).await;
    let stored = h.repository.get(&r.id);
    assert_eq!(stored.execution_attempts, 1);
    assert!(stored.last_execution_attempt.is_some());
    assert!(stored.gas_price_notified_at.is_some());
    assert_eq!(stored.condition_block, 0);

    // Second attempt inside the throttle window: counted, not re-notified.
    h.tick(11).await;
    let stored = h.repository.get(&r.id);
    assert_eq!(stored.execution_attempts, 2);

    let sent = h.notifier.settle().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, NotificationKind::DelayedGasPrice);
}

#[tokio::test]
async fn test_failed_broadcast_notifies_failure() {
    let h = Harness::new();
    let s = signer();
    h.chain.fail_broadcasts("nonce too low");
    let r = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;

    h.tick(10).await;
    h.tick(13).await;

    let stored = h.repository.get(&r.id);
    assert_eq!(stored.status, TransactionStatus::Error);
    assert!(stored.error.unwrap().contains("nonce too low"));

    let sent = h.notifier.wait_for(1).await;
    assert_eq!(sent[0].0, NotificationKind::Failure);
}

#[tokio::test]
async fn test_reconciles_transaction_mined_elsewhere() {
    let h = Harness::new();
    let s = signer();
    let raw = sign_legacy(&s, 0, 10 * GWEI, 1);
    let r = h.schedule(record(raw.clone())).await;
    h.chain.mine_externally(&raw, true);
    h.chain.with_state(|st| st.posted.clear());
    h.chain.set_nonce(s.address(), 1);

    h.tick(10).await;

    assert_eq!(h.repository.get(&r.id).status, TransactionStatus::Completed);
    assert_eq!(h.chain.broadcast_count(), 0);
    let sent = h.notifier.wait_for(1).await;
    assert_eq!(sent[0].0, NotificationKind::Success);
}

#[tokio::test]
async fn test_cancelled_records_are_ignored() {
    let h = Harness::new();
    let s = signer();
    let r = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;
    h.repository.cancel(&r.id);

    h.tick(10).await;
    h.tick(13).await;

    assert_eq!(h.repository.get(&r.id).status, TransactionStatus::Cancelled);
    assert_eq!(h.chain.broadcast_count(), 0);
}

#[tokio::test]
async fn test_failing_sender_does_not_block_others() {
    let h = Harness::new();
    let broken = signer();
    let healthy = signer();
    h.chain.fail_sender(broken.address());
    let a = h.schedule(record(sign_legacy(&broken, 0, 10 * GWEI, 1))).await;
    let b = h.schedule(record(sign_legacy(&healthy, 0, 10 * GWEI, 1))).await;

    h.tick(10).await;

    assert_eq!(h.repository.get(&a.id).condition_block, 0);
    assert_eq!(h.repository.get(&b.id).condition_block, 10);
}

#[tokio::test]
async fn test_unavailable_repository_is_logged_not_raised() {
    let h = Harness::new();
    let s = signer();
    let r = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;

    h.repository.set_unavailable(true);
    h.tick(10).await;
    h.repository.set_unavailable(false);

    assert_eq!(h.repository.get(&r.id).condition_block, 0);
    h.tick(11).await;
    assert_eq!(h.repository.get(&r.id).condition_block, 11);
}

#[tokio::test]
async fn test_process_by_ids_uses_chain_head() {
    let h = Harness::new();
    let s = signer();
    let r = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;
    let untouched = h.schedule(record(sign_legacy(&signer(), 0, 10 * GWEI, 1))).await;
    h.chain.set_block(42);

    h.processor.process_by_ids(&[r.id.clone(), "missing".to_string()]).await;

    assert_eq!(h.repository.get(&r.id).condition_block, 42);
    assert_eq!(h.repository.get(&untouched.id).condition_block, 0);
}

#[tokio::test]
async fn test_process_by_ids_skips_terminal_records() {
    let h = Harness::new();
    let s = signer();
    let r = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;
    h.repository.cancel(&r.id);
    h.chain.set_block(42);

    h.processor.process_by_ids(&[r.id.clone()]).await;

    assert_eq!(h.repository.update_count(), 0);
}

#[tokio::test]
async fn test_overlapping_ticks_broadcast_once() {
    let h = Harness::new();
    let s = signer();
    h.chain.set_confirm_delay(Duration::from_millis(200));
    let mut r = record(sign_legacy(&s, 0, 10 * GWEI, 1));
    r.condition_block = 100;
    let r = h.schedule(r).await;
    h.chain.set_block(104);

    let p1 = Arc::clone(&h.processor);
    let p2 = Arc::clone(&h.processor);
    let first = tokio::spawn(async move { p1.process(CHAIN, 103).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = tokio::spawn(async move { p2.process(CHAIN, 104).await });
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(h.chain.broadcast_count(), 1);
    assert_eq!(h.repository.get(&r.id).status, TransactionStatus::Completed);
    assert_eq!(h.notifier.wait_for(1).await.len(), 1);
}

#[tokio::test]
async fn test_balance_condition_releases_when_funded() {
    let h = Harness::new();
    let s = signer();
    let mut r = record(sign_legacy(&s, 0, 10 * GWEI, 1));
    r.condition_amount = Some(U256::from(1000u64));
    let r = h.schedule(r).await;

    h.chain.set_balance(s.address(), U256::from(999u64));
    h.tick(10).await;
    assert_eq!(h.repository.get(&r.id).condition_block, 0);

    h.chain.set_balance(s.address(), U256::from(1000u64));
    h.tick(11).await;
    assert_eq!(h.repository.get(&r.id).condition_block, 11);
}

#[tokio::test]
async fn test_watcher_drives_processing_until_shutdown() {
    let h = Harness::new();
    let s = signer();
    let r = h.schedule(record(sign_legacy(&s, 0, 10 * GWEI, 1))).await;
    h.chain.set_block(7);

    let shutdown = Shutdown::new();
    let watcher = BlockWatcher::new(h.chain.clone(), Arc::clone(&h.processor), Duration::from_millis(10));
    assert_eq!(watcher.chain_id(), CHAIN);
    let handle = tokio::spawn(watcher.run(shutdown.subscribe()));

    for _ in 0..100 {
        if h.repository.get(&r.id).condition_block == 7 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.repository.get(&r.id).condition_block, 7);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("watcher stops")
        .unwrap();
}

#[tokio::test]
async fn test_watcher_reports_only_new_heads() {
    let h = Harness::new();
    let mut watcher = BlockWatcher::new(h.chain.clone(), Arc::clone(&h.processor), Duration::from_millis(10));

    h.chain.set_block(5);
    assert_eq!(watcher.poll_head().await, Some(5));
    assert_eq!(watcher.poll_head().await, None);

    h.chain.set_block(8);
    assert_eq!(watcher.poll_head().await, Some(8));
    assert_eq!(watcher.last_head(), Some(8));
}

#[tokio::test]
async fn test_stale_record_is_reconciled_on_tick() {
    let h = Harness::new();
    let s = signer();
    let raw = sign_legacy(&s, 0, 10 * GWEI, 1);
    let mut r = record(raw.clone());
    r.status = TransactionStatus::StaleNonce;
    let r = h.schedule(r).await;

    // Slot still open: the record stays stale and is never broadcast.
    h.tick(20).await;
    assert_eq!(h.repository.get(&r.id).status, TransactionStatus::StaleNonce);
    assert_eq!(h.repository.update_count(), 0);

    // The slot turns out to hold this very transaction.
    h.chain.mine_externally(&raw, true);
    h.chain.with_state(|st| st.posted.clear());
    h.chain.set_nonce(s.address(), 1);

    h.tick(21).await;
    let stored = h.repository.get(&r.id);
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert!(stored.gas_paid.is_some());
    assert_eq!(h.chain.broadcast_count(), 0);
    let sent = h.notifier.wait_for(1).await;
    assert_eq!(sent[0].0, NotificationKind::Success);
}

#[tokio::test]
async fn test_in_flight_owner_keeps_its_slot_across_overlapping_tick() {
    let h = Harness::new();
    let s = signer();
    let raw_a = sign_legacy(&s, 0, 10 * GWEI, 1);
    let mut a = record(raw_a.clone());
    a.priority = 1;
    a.condition_block = 100;
    let a = h.schedule(a).await;
    let mut b = record(sign_legacy(&s, 0, 11 * GWEI, 2));
    b.priority = 2;
    let b = h.schedule(b).await;

    // A is still executing from an earlier tick.
    let guard = h.in_flight.try_acquire(&a.id).unwrap();
    h.tick(104).await;
    drop(guard);

    assert_eq!(h.repository.get(&a.id).status, TransactionStatus::Pending);
    assert_eq!(h.repository.get(&b.id).status, TransactionStatus::Pending);
    assert_eq!(h.repository.get(&b.id).condition_block, 0);

    // The earlier execution got A mined.
    h.chain.mine_externally(&raw_a, true);
    h.chain.set_nonce(s.address(), 1);

    for block in 105..115 {
        h.tick(block).await;
    }

    assert_eq!(h.repository.get(&a.id).status, TransactionStatus::Completed);
    assert_eq!(h.repository.get(&b.id).status, TransactionStatus::StaleNonce);
    assert_eq!(h.chain.broadcast_count(), 0);
    let sent = h.notifier.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, NotificationKind::Success);
}

#[tokio::test]
async fn test_reprocessing_never_rebroadcasts_a_claimed_slot() {
    let h = Harness::new();
    let s = signer();
    let mut a = record(sign_legacy(&s, 0, 10 * GWEI, 1));
    a.priority = 1;
    a.condition_block = 100;
    let a = h.schedule(a).await;
    let mut stale = record(sign_legacy(&s, 0, 11 * GWEI, 2));
    stale.status = TransactionStatus::StaleNonce;
    let stale = h.schedule(stale).await;
    let mut waiting = record(sign_legacy(&s, 0, 12 * GWEI, 3));
    waiting.priority = 5;
    let waiting = h.schedule(waiting).await;

    h.chain.set_block(101);
    h.processor.process_by_ids(&[stale.id.clone(), waiting.id.clone()]).await;

    assert_eq!(h.repository.get(&stale.id).status, TransactionStatus::StaleNonce);
    assert_eq!(h.repository.get(&stale.id).condition_block, 0);
    assert_eq!(h.repository.get(&waiting.id).condition_block, 0);
    assert_eq!(h.repository.update_count(), 0);

    h.chain.set_block(104);
    h.processor.process_by_ids(&[stale.id.clone(), waiting.id.clone()]).await;
    assert_eq!(h.chain.broadcast_count(), 0);

    // Only the owner broadcasts.
    h.tick(104).await;
    assert_eq!(h.chain.broadcast_count(), 1);
    assert_eq!(h.repository.get(&a.id).status, TransactionStatus::Completed);
    assert_eq!(h.repository.get(&waiting.id).status, TransactionStatus::StaleNonce);
}
