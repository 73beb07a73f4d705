//! Integration tests for echo suppression.
//!
//! An applied remote update must never be sent back to its origin.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use object_exchange::transport::memory::MemoryTransport;
use object_exchange::ExchangeRole;

use super::test_helpers::{drain_events, linked_pair, next_remote_update, object_changes, CHANNEL};

#[tokio::test]
async fn inbound_update_is_not_sent_back() {
    let transport = MemoryTransport::new();
    let (mut listener, mut connector) = linked_pair(&transport).await;

    listener
        .object
        .update(|record| record.test_data_string = "hello".into());
    next_remote_update(&mut connector.events).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.sends(CHANNEL, ExchangeRole::Listener), 1);
    assert_eq!(
        transport.sends(CHANNEL, ExchangeRole::Connector),
        0,
        "connector must not echo the applied update"
    );
    assert_eq!(object_changes(&drain_events(&mut listener.events)), 0);
    assert_eq!(listener.coordinator.stats().applied, 0);
}

#[tokio::test]
async fn local_hooks_do_not_fire_for_remote_updates() {
    let transport = MemoryTransport::new();
    let (listener, mut connector) = linked_pair(&transport).await;

    let local_edits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&local_edits);
    connector.object.subscribe(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    listener.object.update(|record| record.test_data_int = 5);
    next_remote_update(&mut connector.events).await;

    assert_eq!(local_edits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn local_edit_after_remote_update_is_sent() {
    let transport = MemoryTransport::new();
    let (mut listener, mut connector) = linked_pair(&transport).await;

    listener
        .object
        .update(|record| record.test_data_string = "ping".into());
    next_remote_update(&mut connector.events).await;

    connector
        .object
        .update(|record| record.test_data_string = "pong".into());
    let remote = next_remote_update(&mut listener.events).await;

    assert_eq!(remote.test_data_string, "pong");
    assert_eq!(transport.sends(CHANNEL, ExchangeRole::Connector), 1);
    assert_eq!(transport.sends(CHANNEL, ExchangeRole::Listener), 1);
}

#[tokio::test]
async fn alternating_edits_do_not_ping_pong() {
    let transport = MemoryTransport::new();
    let (mut listener, mut connector) = linked_pair(&transport).await;

    for round in 0..5 {
        listener.object.update(|record| record.test_data_int = round * 2);
        next_remote_update(&mut connector.events).await;
        connector
            .object
            .update(|record| record.test_data_int = round * 2 + 1);
        next_remote_update(&mut listener.events).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.sends(CHANNEL, ExchangeRole::Listener), 5);
    assert_eq!(transport.sends(CHANNEL, ExchangeRole::Connector), 5);
    assert_eq!(listener.object.snapshot().test_data_int, 9);
    assert_eq!(connector.object.snapshot().test_data_int, 9);
}
