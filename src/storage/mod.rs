//! Persistent outbound message queue.
//!
//! The dispatch worker treats the store as its work queue: producers insert
//! pending messages, the consumer marks them sent or errored after each
//! delivery attempt. The store is the only record of delivery state, so a
//! restart resumes exactly where the process left off.
//!
//! [`JsonStore`] is the production backend: one JSON file per message under
//! `<data_dir>/outbox/`, guarded by an advisory lock on the data directory so
//! two gateway processes cannot share one queue. [`MemoryStore`] backs tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no stored message with id {0}")]
    UnknownId(Uuid),
}

/// Delivery state of an outbound message.
///
/// There is no terminal "gave up" state: a message that keeps failing simply
/// crosses the retry ceiling and stops being fetched, and raising the
/// configured limit makes it eligible again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Error,
}

impl DeliveryStatus {
    pub fn is_sent(self) -> bool {
        matches!(self, DeliveryStatus::Sent)
    }
}

/// One queued outbound message with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub to: String,
    pub body: String,
    pub status: DeliveryStatus,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(to: &str, body: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            to: to.to_string(),
            body: body.to_string(),
            status: DeliveryStatus::Pending,
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whether a message should still be offered to the dispatch worker.
fn eligible(message: &OutboundMessage, retry_limit: u32) -> bool {
    !message.status.is_sent() && message.retries < retry_limit
}

/// Backend-independent queue operations.
pub trait MessageStore: Send + Sync {
    fn insert(&self, message: &OutboundMessage) -> Result<(), StoreError>;

    /// Record the outcome of a delivery attempt.
    fn update_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        retries: u32,
    ) -> Result<(), StoreError>;

    /// Messages still owed a delivery attempt, oldest first.
    fn fetch_pending(&self, retry_limit: u32) -> Result<Vec<OutboundMessage>, StoreError>;

    fn get_by_id(&self, id: Uuid) -> Result<OutboundMessage, StoreError>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryStore {
    fn insert(&self, message: &OutboundMessage) -> Result<(), StoreError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn update_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        retries: u32,
    ) -> Result<(), StoreError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::UnknownId(id))?;
        message.status = status;
        message.retries = retries;
        message.updated_at = Utc::now();
        Ok(())
    }

    fn fetch_pending(&self, retry_limit: u32) -> Result<Vec<OutboundMessage>, StoreError> {
        let messages = self.messages.lock().unwrap();
        let mut pending: Vec<OutboundMessage> = messages
            .iter()
            .filter(|m| eligible(m, retry_limit))
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        Ok(pending)
    }

    fn get_by_id(&self, id: Uuid) -> Result<OutboundMessage, StoreError> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(StoreError::UnknownId(id))
    }
}

/// File-backed store: one pretty-printed JSON document per message.
pub struct JsonStore {
    outbox: PathBuf,
    // Held for the store's lifetime; the lock releases when the file closes.
    _lock: fs::File,
}

impl JsonStore {
    /// Open (creating if needed) the store under `data_dir` and take the
    /// exclusive process lock.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let outbox = data_dir.join("outbox");
        fs::create_dir_all(&outbox)?;
        let lock = fs::File::create(data_dir.join(".lock"))?;
        lock.lock_exclusive()?;
        debug!("opened message store at {}", outbox.display());
        Ok(Self {
            outbox,
            _lock: lock,
        })
    }

    fn message_path(&self, id: Uuid) -> PathBuf {
        self.outbox.join(format!("{}.json", id))
    }

    fn load(&self, path: &Path) -> Result<OutboundMessage, StoreError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, message: &OutboundMessage) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(message)?;
        fs::write(self.message_path(message.id), raw)?;
        Ok(())
    }
}

impl MessageStore for JsonStore {
    fn insert(&self, message: &OutboundMessage) -> Result<(), StoreError> {
        debug!("queueing message {} to {}", message.id, message.to);
        self.save(message)
    }

    fn update_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        retries: u32,
    ) -> Result<(), StoreError> {
        let path = self.message_path(id);
        if !path.exists() {
            return Err(StoreError::UnknownId(id));
        }
        let mut message = self.load(&path)?;
        message.status = status;
        message.retries = retries;
        message.updated_at = Utc::now();
        self.save(&message)
    }

    fn fetch_pending(&self, retry_limit: u32) -> Result<Vec<OutboundMessage>, StoreError> {
        let mut pending = Vec::new();
        for entry in fs::read_dir(&self.outbox)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json") != Some(true) {
                continue;
            }
            let message = self.load(&path)?;
            if eligible(&message, retry_limit) {
                pending.push(message);
            }
        }
        pending.sort_by_key(|m| m.created_at);
        Ok(pending)
    }

    fn get_by_id(&self, id: Uuid) -> Result<OutboundMessage, StoreError> {
        let path = self.message_path(id);
        if !path.exists() {
            return Err(StoreError::UnknownId(id));
        }
        self.load(&path)
    }
}
