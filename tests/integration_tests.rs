//! Integration tests for the dispatch subsystem
//!
//! These tests drive the public API end to end against the in-memory broker:
//! - Single-flight lazy connection
//! - Recovery after failed connects and dropped transports
//! - Queue assertion once per channel
//! - Isolation between queues
//! - Time-bounded, never-failing sends

mod fixtures;

use fixtures::TestSystem;
use futures::future::join_all;
use roster_dispatch::amqp::ConnectionStatus;
use roster_dispatch::metrics::DispatchOutcome;
use roster_dispatch::types::{ClanRequest, PlayerRequest, CLAN_REQUESTS_QUEUE, PLAYER_REQUESTS_QUEUE};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_concurrent_channel_requests_connect_once() {
    let system = TestSystem::slow(Duration::from_millis(50));
    let manager = system.dispatcher.manager().clone();

    let requests = (0..25).map(|_| {
        let manager = manager.clone();
        async move { manager.get_channel(PLAYER_REQUESTS_QUEUE).await }
    });
    let results = join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(system.broker.connect_attempts(), 1);
    assert_eq!(system.broker.channels_opened(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Ready);
}

#[tokio::test]
async fn test_reconnects_after_failed_attempt() {
    let system = TestSystem::unreachable();
    let dispatcher = &system.dispatcher;

    assert!(
        !dispatcher
            .send(PLAYER_REQUESTS_QUEUE, &PlayerRequest { membership_id: 1 })
            .await
    );
    assert_eq!(dispatcher.status(), ConnectionStatus::Disconnected);
    assert_eq!(system.broker.connect_attempts(), 1);

    system.broker.set_reachable(true);
    assert!(
        dispatcher
            .send(PLAYER_REQUESTS_QUEUE, &PlayerRequest { membership_id: 1 })
            .await
    );
    assert_eq!(system.broker.connect_attempts(), 2);
    assert_eq!(dispatcher.status(), ConnectionStatus::Ready);
}

#[tokio::test]
async fn test_send_never_fails_when_broker_is_gone() {
    let system = TestSystem::unreachable();
    let dispatcher = &system.dispatcher;

    assert!(!dispatcher.send(CLAN_REQUESTS_QUEUE, &json!({ "groupId": 7 })).await);
    assert!(!dispatcher.send(CLAN_REQUESTS_QUEUE, &json!(null)).await);
    assert!(!dispatcher.send(CLAN_REQUESTS_QUEUE, &"not an object").await);
    assert!(!dispatcher.send("", &json!({})).await);

    assert_eq!(
        dispatcher
            .metrics()
            .dispatch_count(CLAN_REQUESTS_QUEUE, DispatchOutcome::Dropped),
        3
    );
    assert!(system.broker.messages().is_empty());
}

#[tokio::test]
async fn test_queue_declared_once_and_both_sends_succeed() {
    let system = TestSystem::new();
    let dispatcher = &system.dispatcher;

    assert!(dispatcher.send(CLAN_REQUESTS_QUEUE, &ClanRequest { group_id: 7 }).await);
    assert!(dispatcher.send(CLAN_REQUESTS_QUEUE, &ClanRequest { group_id: 8 }).await);

    assert_eq!(system.broker.declare_count(CLAN_REQUESTS_QUEUE), 1);
    assert_eq!(system.broker.messages_for(CLAN_REQUESTS_QUEUE).len(), 2);
    assert_eq!(system.broker.is_durable(CLAN_REQUESTS_QUEUE), Some(false));
}

#[tokio::test]
async fn test_failing_queue_does_not_affect_others() {
    let system = TestSystem::new();
    let dispatcher = &system.dispatcher;
    system.broker.reject_queue("clan_requests_v2");

    assert!(!dispatcher.send("clan_requests_v2", &ClanRequest { group_id: 7 }).await);
    assert!(
        dispatcher
            .send(PLAYER_REQUESTS_QUEUE, &PlayerRequest { membership_id: 123 })
            .await
    );
    assert!(!dispatcher.send("clan_requests_v2", &ClanRequest { group_id: 7 }).await);
    assert!(
        dispatcher
            .send(PLAYER_REQUESTS_QUEUE, &PlayerRequest { membership_id: 456 })
            .await
    );

    assert_eq!(system.broker.messages_for(PLAYER_REQUESTS_QUEUE).len(), 2);
    assert_eq!(system.broker.declare_count(PLAYER_REQUESTS_QUEUE), 1);
    assert!(system.broker.messages_for("clan_requests_v2").is_empty());
    // A queue-level failure must not cost the shared connection.
    assert_eq!(system.broker.connect_attempts(), 1);

    system.broker.accept_queue("clan_requests_v2");
    assert!(dispatcher.send("clan_requests_v2", &ClanRequest { group_id: 7 }).await);
}

#[tokio::test]
async fn test_unreachable_broker_resolves_false_within_timeout_then_recovers() {
    let system = TestSystem::unreachable();
    let dispatcher = &system.dispatcher;

    let start = Instant::now();
    let ok = dispatcher
        .send(PLAYER_REQUESTS_QUEUE, &json!({ "membershipId": 123 }))
        .await;
    assert!(!ok);
    assert!(start.elapsed() < fixtures::SEND_TIMEOUT);

    system.broker.set_reachable(true);
    assert!(
        dispatcher
            .send(PLAYER_REQUESTS_QUEUE, &json!({ "membershipId": 123 }))
            .await
    );
    assert_eq!(
        system.broker.messages_for(PLAYER_REQUESTS_QUEUE)[0].json(),
        Some(json!({ "membershipId": 123 }))
    );
}

#[tokio::test]
async fn test_send_timeout_does_not_abort_connect() {
    let system =
        TestSystem::with_timeouts(Duration::from_secs(5), Duration::from_millis(100));
    system.broker.set_connect_delay(Duration::from_millis(300));
    let dispatcher = &system.dispatcher;

    let start = Instant::now();
    assert!(!dispatcher.send(CLAN_REQUESTS_QUEUE, &ClanRequest { group_id: 7 }).await);
    assert!(start.elapsed() < Duration::from_millis(300));

    // The handshake keeps going in the background; the next send rides on it.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(dispatcher.status(), ConnectionStatus::Ready);
    assert!(dispatcher.send(CLAN_REQUESTS_QUEUE, &ClanRequest { group_id: 7 }).await);
    assert_eq!(system.broker.connect_attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_concurrent_sends_before_connect() {
    let system = TestSystem::slow(Duration::from_millis(50));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let dispatcher = system.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .send(CLAN_REQUESTS_QUEUE, &ClanRequest { group_id: 7 })
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(system.broker.connect_attempts(), 1);
    assert_eq!(system.broker.declare_count(CLAN_REQUESTS_QUEUE), 1);
    assert_eq!(system.broker.messages_for(CLAN_REQUESTS_QUEUE).len(), 50);
    assert_eq!(
        system
            .dispatcher
            .metrics()
            .dispatch_count(CLAN_REQUESTS_QUEUE, DispatchOutcome::Sent),
        50
    );
}

#[tokio::test]
async fn test_dropped_transport_recovers_on_next_send() {
    let system = TestSystem::new();
    let dispatcher = &system.dispatcher;

    assert!(dispatcher.send(PLAYER_REQUESTS_QUEUE, &PlayerRequest { membership_id: 1 }).await);
    system.broker.drop_connections();
    assert_eq!(dispatcher.status(), ConnectionStatus::Disconnected);

    assert!(dispatcher.send(PLAYER_REQUESTS_QUEUE, &PlayerRequest { membership_id: 2 }).await);
    assert_eq!(system.broker.connect_attempts(), 2);
    // New channel, so the queue is asserted again.
    assert_eq!(system.broker.declare_count(PLAYER_REQUESTS_QUEUE), 2);
}

#[tokio::test]
async fn test_disconnect_closes_transport_and_is_idempotent() {
    let system = TestSystem::new();
    let dispatcher = &system.dispatcher;

    dispatcher.disconnect().await;
    assert_eq!(system.broker.connect_attempts(), 0);

    assert!(dispatcher.send(CLAN_REQUESTS_QUEUE, &ClanRequest { group_id: 1 }).await);
    assert_eq!(system.broker.open_connections(), 1);

    dispatcher.disconnect().await;
    dispatcher.disconnect().await;
    assert_eq!(system.broker.open_connections(), 0);
    assert_eq!(dispatcher.status(), ConnectionStatus::Disconnected);
}
