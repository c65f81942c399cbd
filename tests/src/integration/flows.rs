//! # Integration Test Flows
//!
//! End-to-end runs of the watcher over one [`MockChainClient`]:
//!
//! 1. **Advancer unblocks a tracked transaction**: a transaction reaches
//!    native finality while the watermark lags; the advancement loop moves
//!    the watermark and the tracker's secure wait resolves.
//! 2. **Watch-only mode**: a bare watermark wait against a moving
//!    watermark, no transaction involved.
//! 3. **Concurrent trackers**: independent transactions resolve strictly
//!    by their own inclusion heights, sharing only the client connection.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;

use chain_client::{
    BlockRef, DispatchOutcome, MockChainClient, SignedPayload, TxStatus, Watermark,
};
use secure_finality::{
    LifecycleEvent, SecureTracker, WatcherConfig, WatermarkAdvancer, WatermarkWait,
};

fn block(byte: u8) -> BlockRef {
    BlockRef::from_bytes([byte; 32])
}

fn payload(byte: u8) -> SignedPayload {
    SignedPayload::from_bytes(vec![byte; 8])
}

fn success_script(inclusion: BlockRef) -> Vec<TxStatus> {
    vec![
        TxStatus::Ready,
        TxStatus::Broadcast,
        TxStatus::InBlock(inclusion),
        TxStatus::Finalized {
            block: inclusion,
            outcome: DispatchOutcome::Success,
        },
    ]
}

fn test_config() -> WatcherConfig {
    WatcherConfig {
        poll_interval_secs: 1,
        ..WatcherConfig::for_testing()
    }
}

async fn eventually<P: Fn() -> bool>(predicate: P) {
    timeout(Duration::from_secs(60), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(start_paused = true)]
async fn advancer_unblocks_a_tracked_transaction() {
    let mock = Arc::new(MockChainClient::new());
    let inclusion = block(0x10);
    mock.insert_header(inclusion, 100);
    mock.set_finalized(105);
    mock.set_watermark(90);
    mock.script_transaction(success_script(inclusion));

    // Submit and reach native finality; the secure wait is stuck behind
    // the lagging watermark.
    let tracker = SecureTracker::new(mock.clone());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handle = tracker
        .submit_and_watch(payload(0xaa), move |event| sink.lock().push(event))
        .await
        .unwrap();

    eventually(|| {
        events
            .lock()
            .iter()
            .any(|e| matches!(e, LifecycleEvent::Finalized { .. }))
    })
    .await;
    assert!(!events
        .lock()
        .iter()
        .any(|e| matches!(e, LifecycleEvent::SecureFinalized(_))));

    // The advancement loop notices finalized 105 > watermark 90 and
    // records the verified height, which releases the tracker.
    let advancer = WatermarkAdvancer::spawn(mock.clone(), test_config());
    assert_eq!(
        timeout(Duration::from_secs(60), handle.secure_finalized())
            .await
            .expect("secure wait never resolved")
            .unwrap(),
        100
    );
    advancer.shutdown().await;

    assert_eq!(
        events.lock().last(),
        Some(&LifecycleEvent::SecureFinalized(100))
    );
    let calls = mock.privileged_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, 105);
}

#[tokio::test(start_paused = true)]
async fn watch_only_wait_resolves_as_the_watermark_advances() {
    let mock = Arc::new(MockChainClient::new());
    mock.set_finalized(50);
    mock.set_watermark(0);

    // No transaction anywhere: just a fixed-target wait riding on the
    // advancement loop.
    let advancer = WatermarkAdvancer::spawn(mock.clone(), test_config());
    let wait = WatermarkWait::spawn(mock.clone(), 50);

    let watermark = timeout(Duration::from_secs(60), wait.wait())
        .await
        .expect("wait never resolved")
        .unwrap();
    assert_eq!(watermark, Watermark(50));
    advancer.shutdown().await;
}

#[tokio::test]
async fn concurrent_trackers_resolve_by_their_own_inclusion_heights() {
    let mock = Arc::new(MockChainClient::new());
    let first_block = block(0x01);
    let second_block = block(0x02);
    mock.insert_header(first_block, 100);
    mock.insert_header(second_block, 200);
    mock.set_watermark(90);
    mock.script_transaction(success_script(first_block));
    mock.script_transaction(success_script(second_block));

    let tracker = SecureTracker::new(mock.clone());
    let first = tracker
        .submit_and_watch(payload(0x01), |_| {})
        .await
        .unwrap();
    let second = tracker
        .submit_and_watch(payload(0x02), |_| {})
        .await
        .unwrap();

    // 150 satisfies only the first tracker's inclusion height.
    mock.set_watermark(150);
    assert_eq!(
        timeout(Duration::from_secs(5), first.secure_finalized())
            .await
            .expect("first tracker stuck")
            .unwrap(),
        100
    );

    mock.set_watermark(200);
    assert_eq!(
        timeout(Duration::from_secs(5), second.secure_finalized())
            .await
            .expect("second tracker stuck")
            .unwrap(),
        200
    );
    assert_eq!(mock.submitted().len(), 2);
}
