// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::super::{Broker, BrokerError, ConsumerConfig, FlakyBroker};
use super::*;
use std::time::Duration;

fn fast_config(name: &str) -> ConsumerConfig {
    ConsumerConfig {
        durable_name: name.to_string(),
        max_deliver: 3,
        ack_wait: Duration::from_millis(50),
        backoff: vec![Duration::from_millis(10)],
    }
}

#[tokio::test]
async fn publish_then_consume() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();
    broker.publish("t.subject", b"hello".to_vec()).await.unwrap();

    let delivery = sub.next().await.unwrap();
    assert_eq!(delivery.payload, b"hello");
    assert_eq!(delivery.delivered, 1);
    delivery.ack().await;
    assert_eq!(broker.pending("t.subject"), 0);
}

#[tokio::test]
async fn consume_wakes_on_later_publish() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();

    let publisher = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.publish("t.subject", b"late".to_vec()).await.unwrap();
    });

    let delivery = sub.next().await.unwrap();
    assert_eq!(delivery.payload, b"late");
    delivery.ack().await;
}

#[tokio::test]
async fn unacked_delivery_is_redelivered_with_count() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();
    broker.publish("t.subject", b"m".to_vec()).await.unwrap();

    let first = sub.next().await.unwrap();
    assert_eq!(first.delivered, 1);
    // Do not settle; wait out ack_wait
    drop(first);
    let second = sub.next().await.unwrap();
    assert_eq!(second.delivered, 2);
    second.ack().await;
}

#[tokio::test]
async fn nak_schedules_redelivery() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();
    broker.publish("t.subject", b"m".to_vec()).await.unwrap();

    let first = sub.next().await.unwrap();
    first.nak(Duration::from_millis(10)).await;

    let second = sub.next().await.unwrap();
    assert_eq!(second.delivered, 2);
    second.ack().await;
}

#[tokio::test]
async fn term_stops_redelivery() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();
    broker.publish("t.subject", b"m".to_vec()).await.unwrap();

    let delivery = sub.next().await.unwrap();
    delivery.term().await;
    assert_eq!(broker.pending("t.subject"), 0);
}

#[tokio::test]
async fn message_dies_after_max_deliver() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();
    broker.publish("t.subject", b"poison".to_vec()).await.unwrap();

    for expected in 1..=3u32 {
        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.delivered, expected);
        delivery.nak(Duration::from_millis(1)).await;
    }

    // Fourth delivery would exceed max_deliver=3: the message is dropped.
    tokio::time::sleep(Duration::from_millis(20)).await;
    broker.publish("t.subject", b"after".to_vec()).await.unwrap();
    let delivery = sub.next().await.unwrap();
    assert_eq!(delivery.payload, b"after");
    delivery.ack().await;
    assert_eq!(broker.pending("t.subject"), 0);
}

#[tokio::test]
async fn second_consumer_on_subject_refused() {
    let broker = EmbeddedBroker::new();
    let _sub = broker
        .pull_subscribe("t.subject", fast_config("a"))
        .await
        .unwrap();
    let err = broker
        .pull_subscribe("t.subject", fast_config("b"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BrokerError::ConsumerExists(_)));
}

#[tokio::test]
async fn ordering_is_preserved_per_subject() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();
    for i in 0..5u8 {
        broker.publish("t.subject", vec![i]).await.unwrap();
    }
    for i in 0..5u8 {
        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.payload, vec![i]);
        delivery.ack().await;
    }
}

#[tokio::test]
async fn shutdown_ends_consumers_and_refuses_publish() {
    let broker = EmbeddedBroker::new();
    let mut sub = broker
        .pull_subscribe("t.subject", fast_config("w"))
        .await
        .unwrap();

    let closer = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        closer.shutdown();
    });

    assert!(sub.next().await.is_none());
    let err = broker.publish("t.subject", vec![]).await.err().unwrap();
    assert!(matches!(err, BrokerError::Closed));
}

#[tokio::test]
async fn flaky_broker_fails_then_recovers() {
    let broker = FlakyBroker::new();
    broker.fail_publish("t.subject", 2);

    assert!(broker.publish("t.subject", vec![]).await.is_err());
    assert!(broker.publish("t.subject", vec![]).await.is_err());
    assert!(broker.publish("t.subject", vec![]).await.is_ok());
}
