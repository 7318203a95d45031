use chrono::{Duration, Utc};
use httpmock::prelude::*;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::watch;

use chain_notifier::chain::{BlockHash, BlockTransfers, TransferEvent};
use chain_notifier::network::Network;
use chain_notifier::scanner::{ScannerConfig, handle_block};
use chain_notifier::scheduler::{NotificationScheduler, SchedulerConfig, TickSummary};
use chain_notifier::store::{
    Profile, Subscriber, TxDirection, insert_address, insert_profile, insert_subscriber,
    transaction_by_tx_id_and_owner, undelivered_notifications,
};
use chain_notifier_push::{DynPusher, FcmConfig, FcmPusher, TestPusher};

async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

async fn seed_subscribed_profile(pool: &SqlitePool, id: &str, name: &str, address: &str) {
    insert_profile(
        pool,
        &Profile {
            id: id.to_string(),
            name: name.to_string(),
            username: id.to_string(),
            is_chat_bot: false,
        },
    )
    .await
    .unwrap();
    insert_address(pool, id, Network::Polkadot, address)
        .await
        .unwrap();
    insert_subscriber(
        pool,
        &Subscriber {
            address: address.to_string(),
            push_token: format!("device-{id}"),
            network: Network::Polkadot,
        },
    )
    .await
    .unwrap();
}

fn block_with_transfer(from: &str, to: &str, amount: u128) -> BlockTransfers {
    BlockTransfers {
        number: 19_000_000,
        hash: BlockHash("0x5c0f".to_string()),
        transfers: vec![TransferEvent {
            event_index: 7,
            extrinsic_index: Some(2),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            fee: 0,
        }],
    }
}

fn scheduler(pool: SqlitePool, pusher: DynPusher) -> NotificationScheduler {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    NotificationScheduler::new(SchedulerConfig::default(), pool, pusher, shutdown_rx)
}

#[tokio::test]
async fn test_block_to_push_between_two_subscribers() {
    let pool = setup_test_db().await;
    seed_subscribed_profile(&pool, "alice", "Alice", "A").await;
    seed_subscribed_profile(&pool, "bob", "Bob", "B").await;

    let processed_at = Utc::now();
    let summary = handle_block(
        &pool,
        Network::Polkadot,
        &ScannerConfig::default(),
        &block_with_transfer("A", "B", 10_000),
        processed_at,
    )
    .await
    .unwrap();

    assert_eq!(summary.transactions, 2);
    assert_eq!(summary.notifications, 2);

    let out = transaction_by_tx_id_and_owner(&pool, "19000000-7", "alice")
        .await
        .unwrap()
        .unwrap();
    let incoming = transaction_by_tx_id_and_owner(&pool, "19000000-7", "bob")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.direction, TxDirection::Out);
    assert_eq!(incoming.direction, TxDirection::In);

    let pusher = TestPusher::new();
    let tick_at = processed_at + Duration::seconds(60);
    let tick = scheduler(pool.clone(), Arc::new(pusher.clone()))
        .tick(tick_at)
        .await
        .unwrap();

    assert_eq!(
        tick,
        TickSummary {
            delivered: 2,
            failed: 0,
            missing_token: 0
        }
    );
    assert!(
        undelivered_notifications(&pool, tick_at.timestamp())
            .await
            .unwrap()
            .is_empty()
    );

    let mut pushes: Vec<(String, String, String)> = pusher
        .sent()
        .into_iter()
        .map(|push| (push.token, push.title, push.body))
        .collect();
    pushes.sort();
    assert_eq!(
        pushes,
        vec![
            (
                "device-alice".to_string(),
                "Bob".to_string(),
                "Sent 0.000001 DOT".to_string()
            ),
            (
                "device-bob".to_string(),
                "Alice".to_string(),
                "Received 0.000001 DOT".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_replayed_block_does_not_notify_twice() {
    let pool = setup_test_db().await;
    seed_subscribed_profile(&pool, "alice", "Alice", "A").await;
    let block = block_with_transfer("X", "A", 10_000);

    for _ in 0..2 {
        handle_block(
            &pool,
            Network::Polkadot,
            &ScannerConfig::default(),
            &block,
            Utc::now(),
        )
        .await
        .unwrap();
    }

    assert_eq!(
        undelivered_notifications(&pool, i64::MAX)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_scheduler_pushes_through_fcm() {
    let server = MockServer::start();
    let fcm = server.mock(|when, then| {
        when.method(POST)
            .path("/fcm/send")
            .header("authorization", "key=server-key")
            .json_body_partial(r#"{"to": "device-bob", "notification": {"title": "X"}}"#);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"success": 1, "failure": 0, "results": [{"message_id": "1"}]}));
    });

    let pool = setup_test_db().await;
    seed_subscribed_profile(&pool, "bob", "Bob", "B").await;

    let processed_at = Utc::now();
    handle_block(
        &pool,
        Network::Polkadot,
        &ScannerConfig::default(),
        &block_with_transfer("X", "B", 10_000),
        processed_at,
    )
    .await
    .unwrap();

    let pusher = FcmPusher::try_from_config(&FcmConfig {
        fcm_server_key: Some("server-key".to_string()),
        fcm_url: url::Url::parse(&server.url("/fcm/send")).unwrap(),
    })
    .unwrap();

    let tick = scheduler(pool, Arc::new(pusher))
        .tick(processed_at + Duration::seconds(60))
        .await
        .unwrap();

    fcm.assert();
    assert_eq!(tick.delivered, 1);
}
