//! Load and property tests for dispatch under concurrency and failure

mod fixtures;

use fixtures::TestSystem;
use futures::future::join_all;
use proptest::prelude::*;
use roster_dispatch::amqp::ConnectionStatus;
use roster_dispatch::types::{CLAN_REQUESTS_QUEUE, PLAYER_REQUESTS_QUEUE};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

fn arbitrary_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ".*".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|map: BTreeMap<String, Value>| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn send_resolves_false_for_any_payload_when_unreachable(
        payload in arbitrary_json(),
        queue in "[a-z_]{0,12}",
    ) {
        let ok = tokio_test::block_on(async {
            let system = TestSystem::unreachable();
            system.dispatcher.send(&queue, &payload).await
        });
        prop_assert!(!ok);
    }

    #[test]
    fn unserializable_payloads_resolve_false(keys in prop::collection::vec(any::<(u8, u8)>(), 1..5)) {
        let payload: HashMap<(u8, u8), u8> = keys.into_iter().map(|k| (k, 0)).collect();
        let ok = tokio_test::block_on(async {
            let system = TestSystem::new();
            system.dispatcher.send(PLAYER_REQUESTS_QUEUE, &payload).await
        });
        prop_assert!(!ok);
    }

    #[test]
    fn object_payloads_arrive_unchanged(group_id in any::<i64>(), tag in "[a-z]{0,10}") {
        let payload = json!({ "groupId": group_id, "tag": tag });
        let (ok, received) = tokio_test::block_on(async {
            let system = TestSystem::new();
            let ok = system.dispatcher.send(CLAN_REQUESTS_QUEUE, &payload).await;
            (ok, system.broker.messages_for(CLAN_REQUESTS_QUEUE))
        });
        prop_assert!(ok);
        prop_assert_eq!(received.len(), 1);
        prop_assert_eq!(received[0].json(), Some(payload));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_queue_burst_shares_one_connection() {
    let system = TestSystem::slow(Duration::from_millis(30));

    let sends = (0..200).map(|i| {
        let dispatcher = system.dispatcher.clone();
        tokio::spawn(async move {
            if i % 2 == 0 {
                dispatcher
                    .send(PLAYER_REQUESTS_QUEUE, &json!({ "membershipId": i }))
                    .await
            } else {
                dispatcher
                    .send(CLAN_REQUESTS_QUEUE, &json!({ "groupId": i }))
                    .await
            }
        })
    });

    let results = join_all(sends).await;
    assert!(results.into_iter().all(|r| r.unwrap()));

    assert_eq!(system.broker.connect_attempts(), 1);
    assert_eq!(system.broker.channels_opened(), 2);
    assert_eq!(system.broker.messages_for(PLAYER_REQUESTS_QUEUE).len(), 100);
    assert_eq!(system.broker.messages_for(CLAN_REQUESTS_QUEUE).len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_against_dead_broker_is_bounded() {
    let system = TestSystem::unreachable();

    let sends = (0..50).map(|i| {
        let dispatcher = system.dispatcher.clone();
        async move {
            dispatcher
                .send(CLAN_REQUESTS_QUEUE, &json!({ "groupId": i }))
                .await
        }
    });

    let results = tokio::time::timeout(fixtures::SEND_TIMEOUT, join_all(sends))
        .await
        .expect("every send resolves within the send timeout");

    assert!(results.iter().all(|ok| !ok));
    // Waiters share attempts, so there are never more attempts than sends.
    let attempts = system.broker.connect_attempts();
    assert!((1..=50).contains(&attempts));
    assert_eq!(system.dispatcher.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_transport_drops_during_traffic() {
    let system = TestSystem::new();
    let dispatcher = &system.dispatcher;

    let mut delivered = 0;
    for round in 0..5 {
        for i in 0..10 {
            if dispatcher
                .send(PLAYER_REQUESTS_QUEUE, &json!({ "membershipId": round * 10 + i }))
                .await
            {
                delivered += 1;
            }
        }
        system.broker.drop_connections();
    }

    assert_eq!(delivered, 50);
    assert_eq!(system.broker.connect_attempts(), 5);
    assert_eq!(system.broker.declare_count(PLAYER_REQUESTS_QUEUE), 5);
}
