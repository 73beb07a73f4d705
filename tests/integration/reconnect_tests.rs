//! Integration tests for the connector's reconnect behavior.
//!
//! Failed connects are retried at the fixed interval until one succeeds,
//! then retries stop.

use std::time::Duration;

use object_exchange::transport::memory::MemoryTransport;
use object_exchange::{ExchangeRole, LinkState};

use super::test_helpers::{
    connection_states, drain_events, next_connection_state, next_remote_update, peer, wait_until,
    CHANNEL,
};

#[tokio::test]
async fn retries_until_connect_succeeds() {
    let transport = MemoryTransport::new();
    let listener = peer(&transport);
    listener
        .coordinator
        .start(CHANNEL, ExchangeRole::Listener)
        .await
        .expect("listener starts");

    transport.fail_next_connects(3);
    let mut connector = peer(&transport);
    connector
        .coordinator
        .start(CHANNEL, ExchangeRole::Connector)
        .await
        .expect("connect failures are not start errors");

    assert!(next_connection_state(&mut connector.events).await);
    assert_eq!(transport.connect_attempts(), 4);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.connect_attempts(), 4, "no attempts after success");
    assert_eq!(connector.coordinator.stats().connect_attempts, 4);
    assert!(!connector.coordinator.is_recovering());
}

#[tokio::test]
async fn failed_attempts_do_not_emit_connection_events() {
    let transport = MemoryTransport::new();
    let mut connector = peer(&transport);
    connector
        .coordinator
        .start(CHANNEL, ExchangeRole::Connector)
        .await
        .expect("connector starts");

    wait_until("several attempts", || transport.connect_attempts() >= 3).await;

    assert!(connection_states(&drain_events(&mut connector.events)).is_empty());
    assert_eq!(connector.coordinator.link_state(), LinkState::Reconnecting);
    assert!(connector.coordinator.is_recovering());
}

#[tokio::test]
async fn connector_links_once_listener_appears() {
    let transport = MemoryTransport::new();
    let mut connector = peer(&transport);
    connector
        .coordinator
        .start(CHANNEL, ExchangeRole::Connector)
        .await
        .expect("connector starts");
    wait_until("first retry", || transport.connect_attempts() >= 2).await;

    let listener = peer(&transport);
    listener
        .coordinator
        .start(CHANNEL, ExchangeRole::Listener)
        .await
        .expect("listener starts");

    assert!(next_connection_state(&mut connector.events).await);
    listener.object.update(|record| record.test_data_int = 11);
    assert_eq!(
        next_remote_update(&mut connector.events).await.test_data_int,
        11
    );
}

#[tokio::test]
async fn retries_use_the_fixed_interval() {
    let transport = MemoryTransport::new();
    let connector = peer(&transport);
    connector
        .coordinator
        .start(CHANNEL, ExchangeRole::Connector)
        .await
        .expect("connector starts");

    tokio::time::sleep(Duration::from_millis(275)).await;
    let attempts = transport.connect_attempts();

    // One attempt from start, then one every 50ms.
    assert!(
        (4..=7).contains(&attempts),
        "expected about six attempts, saw {attempts}"
    );
}

#[tokio::test]
async fn stop_cancels_pending_reconnect() {
    let transport = MemoryTransport::new();
    let connector = peer(&transport);
    connector
        .coordinator
        .start(CHANNEL, ExchangeRole::Connector)
        .await
        .expect("connector starts");
    wait_until("retrying", || transport.connect_attempts() >= 2).await;

    connector.coordinator.stop();
    let seen = transport.connect_attempts();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(transport.connect_attempts(), seen);
    assert!(!connector.coordinator.is_recovering());
    assert_eq!(connector.coordinator.link_state(), LinkState::Idle);
}
