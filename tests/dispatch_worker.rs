//! Dispatch worker tests: delivery bookkeeping and the full polling loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakePort;
use smsgate::modem::ModemSession;
use smsgate::storage::{DeliveryStatus, MemoryStore, MessageStore, OutboundMessage};
use smsgate::worker::{self, deliver, DispatchConfig};

fn scripted_session() -> ModemSession {
    ModemSession::with_port(Box::new(FakePort::new()))
}

#[test]
fn successful_delivery_marks_sent() {
    let session = scripted_session();
    let store = MemoryStore::new();
    let message = OutboundMessage::new("+380631234567", "test");
    store.insert(&message).unwrap();

    deliver(&session, &store, message.clone());

    let stored = store.get_by_id(message.id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Sent);
    assert_eq!(stored.retries, 1);
}

#[test]
fn failed_delivery_counts_against_retry_ceiling() {
    // The fake port has no script for this destination, so the send prompt
    // never arrives and every attempt fails.
    let session = scripted_session();
    let store = MemoryStore::new();
    let message = OutboundMessage::new("+380440000000", "no route");
    store.insert(&message).unwrap();

    for attempt in 1..=3u32 {
        let current = store.get_by_id(message.id).unwrap();
        deliver(&session, &store, current);
        let stored = store.get_by_id(message.id).unwrap();
        assert_eq!(stored.status, DeliveryStatus::Error);
        assert_eq!(stored.retries, attempt);
    }

    // At the ceiling the message stops being offered, without any
    // terminal state change.
    assert!(store.fetch_pending(3).unwrap().is_empty());
    let stored = store.get_by_id(message.id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Error);

    // A raised limit makes the same message eligible again.
    let pending = store.fetch_pending(4).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, message.id);
}

#[test]
fn sent_messages_are_never_refetched() {
    let session = scripted_session();
    let store = MemoryStore::new();
    let message = OutboundMessage::new("+380631234567", "test");
    store.insert(&message).unwrap();

    deliver(&session, &store, message);
    assert!(store.fetch_pending(3).unwrap().is_empty());
    // Even an absurdly high limit does not resurrect a sent message.
    assert!(store.fetch_pending(u32::MAX).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatch_loop_drains_the_queue() {
    let session = Arc::new(scripted_session());
    let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());

    let first = OutboundMessage::new("+380631234567", "test");
    let second = OutboundMessage::new("+380631234567", "test");
    store.insert(&first).unwrap();
    store.insert(&second).unwrap();

    let config = DispatchConfig {
        poll_interval: Duration::from_millis(50),
        retry_limit: 3,
    };
    let (producer, consumer) = worker::start_dispatch(session, store.clone(), config);

    // Give the loop a few polling rounds to work through both messages.
    for _ in 0..40 {
        if store.fetch_pending(3).unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for id in [first.id, second.id] {
        let stored = store.get_by_id(id).unwrap();
        assert_eq!(stored.status, DeliveryStatus::Sent);
        // A poll can overlap an in-flight delivery, so the count may exceed one.
        assert!(stored.retries >= 1);
    }

    producer.abort();
    consumer.abort();
}
