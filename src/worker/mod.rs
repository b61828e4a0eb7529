//! Dispatch worker: drains the outbound queue through the modem.
//!
//! Two tasks cooperate over a bounded channel. The producer polls the store
//! on a fixed interval and forwards every eligible message; the consumer
//! takes them one at a time and drives the modem send, so deliveries are
//! strictly serial regardless of how fast the queue fills. The channel's
//! capacity of one keeps the producer from racing ahead: it parks on `send`
//! until the consumer has taken the previous message.
//!
//! Every delivery attempt counts against the message's retry total, success
//! or failure. The retry ceiling lives entirely in the fetch predicate, so
//! the worker itself never decides a message is beyond saving.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::modem::ModemSession;
use crate::storage::{DeliveryStatus, MessageStore, OutboundMessage};

/// Tuning for the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How often the producer re-scans the store.
    pub poll_interval: Duration,
    /// Delivery attempts allowed per message before it stops being fetched.
    pub retry_limit: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            retry_limit: 3,
        }
    }
}

/// Spawn the producer and consumer tasks. The returned handles run until the
/// process exits; the caller typically just parks on a shutdown signal.
pub fn start_dispatch(
    session: Arc<ModemSession>,
    store: Arc<dyn MessageStore>,
    config: DispatchConfig,
) -> (JoinHandle<()>, JoinHandle<()>) {
    info!(
        "starting dispatch worker (poll every {:?}, retry limit {})",
        config.poll_interval, config.retry_limit
    );
    let (tx, rx) = mpsc::channel(1);
    let producer = tokio::spawn(produce(store.clone(), tx, config));
    let consumer = tokio::spawn(consume(session, store, rx));
    (producer, consumer)
}

async fn produce(
    store: Arc<dyn MessageStore>,
    tx: mpsc::Sender<OutboundMessage>,
    config: DispatchConfig,
) {
    loop {
        match store.fetch_pending(config.retry_limit) {
            Ok(pending) => {
                if !pending.is_empty() {
                    debug!("{} messages awaiting delivery", pending.len());
                }
                for message in pending {
                    if tx.send(message).await.is_err() {
                        // Consumer is gone; nothing left to feed.
                        return;
                    }
                }
            }
            Err(e) => warn!("failed to poll message store: {}", e),
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

async fn consume(
    session: Arc<ModemSession>,
    store: Arc<dyn MessageStore>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(message) = rx.recv().await {
        deliver(&session, store.as_ref(), message);
    }
}

/// Attempt one delivery and record the outcome.
pub fn deliver(session: &ModemSession, store: &dyn MessageStore, mut message: OutboundMessage) {
    message.retries += 1;
    let status = match session.send_message(&message.to, &message.body) {
        Ok(()) => {
            info!(
                "delivered message {} to {} (attempt {})",
                message.id, message.to, message.retries
            );
            DeliveryStatus::Sent
        }
        Err(e) => {
            warn!(
                "delivery of message {} failed on attempt {}: {}",
                message.id, message.retries, e
            );
            DeliveryStatus::Error
        }
    };
    if let Err(e) = store.update_status(message.id, status, message.retries) {
        warn!("failed to record outcome for message {}: {}", message.id, e);
    }
}
