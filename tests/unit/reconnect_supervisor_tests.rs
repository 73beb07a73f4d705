//! Unit tests for the fixed-interval reconnect supervisor.
//!
//! Validates the delayed first attempt, the fixed retry period, exit on
//! success, and cancellation through the handle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use object_exchange::exchange::reconnect::{
    AttemptFuture, ReconnectHandle, ReconnectSupervisor, RecoveryKind,
};

/// Spawn a supervisor whose attempts succeed from attempt `succeed_on` on.
fn spawn_counting(
    interval_ms: u64,
    succeed_on: u32,
) -> (ReconnectHandle, Arc<AtomicU32>, CancellationToken) {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let cancel = CancellationToken::new();
    let supervisor = ReconnectSupervisor::new(
        1,
        RecoveryKind::Reconnect,
        Duration::from_millis(interval_ms),
        cancel.clone(),
        move || -> AttemptFuture {
            let counter = Arc::clone(&counter);
            Box::pin(async move { counter.fetch_add(1, Ordering::SeqCst) + 1 >= succeed_on })
        },
    );
    (supervisor.spawn(), attempts, cancel)
}

async fn wait_finished(handle: &ReconnectHandle) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("supervisor should finish");
}

#[tokio::test]
async fn first_attempt_waits_one_interval() {
    let (handle, attempts, _cancel) = spawn_counting(150, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 0, "no attempt before the first tick");

    wait_finished(&handle).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_until_success_then_stops() {
    let (handle, attempts, _cancel) = spawn_counting(20, 4);

    wait_finished(&handle).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        attempts.load(Ordering::SeqCst),
        4,
        "no attempts after success"
    );
}

#[tokio::test]
async fn attempts_follow_the_fixed_interval() {
    let (handle, attempts, _cancel) = spawn_counting(100, u32::MAX);

    tokio::time::sleep(Duration::from_millis(130)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let seen = attempts.load(Ordering::SeqCst);
    assert!(
        (3..=5).contains(&seen),
        "expected roughly one attempt per 100ms, saw {seen}"
    );

    drop(handle);
}

#[tokio::test]
async fn dropping_handle_cancels_loop() {
    let (handle, attempts, cancel) = spawn_counting(20, u32::MAX);
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(handle);
    assert!(cancel.is_cancelled());
    tokio::time::sleep(Duration::from_millis(30)).await;
    let seen = attempts.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(attempts.load(Ordering::SeqCst), seen);
}

#[tokio::test]
async fn external_cancel_stops_loop() {
    let (handle, _attempts, cancel) = spawn_counting(20, u32::MAX);

    cancel.cancel();
    wait_finished(&handle).await;

    assert_eq!(handle.id(), 1);
    assert_eq!(handle.kind(), RecoveryKind::Reconnect);
}

#[tokio::test]
async fn await_completion_returns_after_cancel() {
    let (handle, _attempts, _cancel) = spawn_counting(20, u32::MAX);

    tokio::time::timeout(Duration::from_secs(2), handle.await_completion())
        .await
        .expect("completion should not hang");
}
