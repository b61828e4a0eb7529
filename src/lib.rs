//! # Smsgate - SMS Gateway for Serial GSM Modems
//!
//! Smsgate drives a cellular GSM modem over a serial link and turns it into a
//! small messaging gateway: it queues outbound text messages in a persistent
//! store, delivers them one at a time through the modem, and exposes the
//! modem's other facilities (signal quality, USSD balance queries, mailbox
//! access) behind a typed API.
//!
//! ## Features
//!
//! - **AT Protocol Engine**: Suffix-terminated response framing with idle-read
//!   timeout budgets, retry loops, and structured ERROR classification.
//! - **Payload Codecs**: GSM 03.38 7-bit packed alphabet (with extension
//!   table) and UCS-2 decoding for non-Latin message bodies.
//! - **Persistent Outbox**: One-JSON-file-per-message queue that survives
//!   restarts, with a per-message retry ceiling enforced at fetch time.
//! - **Serial Dispatch**: A producer/consumer worker pair that guarantees
//!   strictly one delivery in flight at a time.
//! - **Async Design**: Built with Tokio; the blocking serial exchanges stay
//!   contained inside the session layer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smsgate::config::Config;
//! use smsgate::modem::ModemSession;
//! use smsgate::storage::JsonStore;
//! use smsgate::worker::{self, DispatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!
//!     let store = Arc::new(JsonStore::open(config.storage.data_dir.as_ref())?);
//!     let session = Arc::new(ModemSession::connect(
//!         &config.modem.port,
//!         config.modem.baud_rate,
//!     )?);
//!     session.reset()?;
//!
//!     worker::start_dispatch(session, store, DispatchConfig::default());
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`modem`] - AT command channel, codecs, parsers, and session operations
//! - [`storage`] - Persistent outbound message queue
//! - [`worker`] - Producer/consumer dispatch loop
//! - [`config`] - Configuration management
//! - [`logutil`] - Wire-traffic log sanitization

pub mod config;
pub mod logutil;
pub mod modem;
pub mod storage;
pub mod worker;
