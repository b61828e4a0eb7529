//! # Modem Session Module
//!
//! One open serial connection to a GSM modem, and the high-level operations
//! built on top of it: initialization, liveness and signal probes, USSD
//! balance queries, sending text messages, and mailbox access.
//!
//! ## Layering
//!
//! - [`channel`] — the AT command channel: one command/response exchange at a
//!   time over the raw port, with idle-budget timeouts and ERROR
//!   classification
//! - [`pdu`] — payload codecs (GSM 7-bit packed alphabet, UCS-2)
//! - [`parse`] — fixed-pattern parsers for each response shape
//! - [`error`] — the error taxonomy shared by all of the above
//!
//! The session is created once at startup and lives for the process
//! lifetime. It owns the channel's exclusive-access lock; the dispatch
//! worker additionally serializes whole send operations, so only one logical
//! operation touches the modem end to end.
//!
//! ## Example
//!
//! ```rust,no_run
//! use smsgate::modem::ModemSession;
//!
//! fn main() -> anyhow::Result<()> {
//!     let session = ModemSession::connect("/dev/ttyUSB0", 115200)?;
//!     session.reset()?;
//!     println!("signal: {}", session.get_signal()?);
//!     session.send_message("+380631234567", "hello from smsgate")?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod parse;
pub mod pdu;

use std::io;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use log::{debug, info, warn};

use crate::logutil::escape_log;

pub use channel::{AtChannel, Port, DEFAULT_IDLE_READS, PROMPT, TERMINAL_OK};
pub use error::{CommandFailure, ModemError};

/// Ctrl-Z, the message body terminator.
const CTRL_Z: char = '\u{1a}';
/// Attempts per command during [`ModemSession::reset`].
const RESET_ATTEMPTS: usize = 10;
/// Fixed delay between reset attempts.
const RESET_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Idle-read budget for a USSD session reply, which can lag the command
/// acknowledgement by several read cycles.
const USSD_IDLE_READS: usize = 10;
/// Terminal marker of an extended USSD session result.
const USSD_TERMINAL: &str = "15\r\n";

/// Ordered initialization sequence: mode reset, echo off, full
/// functionality, verbose errors, operator selection, text mode, message
/// parameters, storage selection, notification settings, character set.
const INIT_COMMANDS: [&str; 10] = [
    "ATZ\r",
    "ATE0\r",
    "AT+CFUN=1\r",
    "AT+CMEE=1\r",
    "AT+COPS=3,0\r",
    "AT+CMGF=1\r",
    "AT+CSMP=49,167,0,0\r",
    "AT+CPMS=\"ME\",\"ME\",\"ME\"\r",
    "AT+CNMI=2,1,0,2\r",
    "AT+CSCS=\"GSM\"\r",
];

/// A message read out of the modem's mailbox storage.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub index: u32,
    pub label: String,
    pub sender: String,
    pub timestamp: DateTime<FixedOffset>,
    pub body: String,
}

/// One open serial connection to the modem.
pub struct ModemSession {
    port_name: String,
    baud_rate: u32,
    channel: AtChannel,
}

impl ModemSession {
    /// Open the serial device at the configured baud rate and wrap it in an
    /// AT command channel.
    pub fn connect(port_name: &str, baud_rate: u32) -> Result<Self, ModemError> {
        info!("connecting to modem on {} at {} baud", port_name, baud_rate);
        let mut builder = serialport::new(port_name, baud_rate).timeout(Duration::from_secs(1));
        // Some USB serial adapters need explicit settings
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let port = builder.open().map_err(|e| ModemError::Open {
            port: port_name.to_string(),
            source: e,
        })?;
        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            channel: AtChannel::new(Box::new(SerialLink { inner: port })),
        })
    }

    /// Build a session over an already-open port. Used by tests and fixtures
    /// that script the device side.
    pub fn with_port(port: Box<dyn Port>) -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 0,
            channel: AtChannel::new(port),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Drive the modem through the full initialization sequence.
    ///
    /// Each command gets up to ten attempts with a fixed inter-attempt delay;
    /// the first command to exhaust its attempts aborts the whole reset and
    /// surfaces that command's error. Later commands are not attempted.
    pub fn reset(&self) -> Result<(), ModemError> {
        info!("resetting modem");
        // Terminate any half-entered message body left over from a crash.
        let _ = self.channel.send(&CTRL_Z.to_string(), false);
        for command in INIT_COMMANDS {
            let mut attempt = 0;
            loop {
                match self.channel.send(command, true) {
                    Ok(_) => break,
                    Err(e) if attempt + 1 < RESET_ATTEMPTS => {
                        attempt += 1;
                        warn!(
                            "init command {} failed on attempt {}: {}",
                            escape_log(command),
                            attempt,
                            e
                        );
                        std::thread::sleep(RESET_RETRY_DELAY);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Bare liveness probe.
    pub fn check_connection(&self) -> Result<(), ModemError> {
        self.channel.send("AT\r", true).map(|_| ())
    }

    /// Signal quality as a decimal figure (`<rssi>.<ber>`).
    pub fn get_signal(&self) -> Result<f64, ModemError> {
        let status = self.channel.send("AT+CSQ\r", true)?;
        parse::parse_signal(&status)
    }

    /// Currently selected character set.
    pub fn get_charset(&self) -> Result<String, ModemError> {
        let status = self.channel.send("AT+CSCS?\r", true)?;
        parse::parse_charset(&status)
    }

    /// Run a USSD balance query and extract the currency figure from the
    /// decoded network reply.
    pub fn get_balance(&self, ussd_code: &str) -> Result<f64, ModemError> {
        debug!("querying balance via {}", ussd_code);
        // Best effort: some firmwares only answer CUSD from PDU mode.
        let _ = self.channel.send("AT+CMGF=0\r", true);
        let _ = self.channel.send("AT^USSDMODE=1\r", true);
        let request = pdu::hex_upper(&pdu::encode_7bit(ussd_code));
        self.channel
            .send(&format!("AT+CUSD=1,\"{}\",15\r", request), true)?;
        let reply = self.channel.wait_for(USSD_IDLE_READS, USSD_TERMINAL)?;
        let payload = parse::parse_ussd_payload(&reply)?;
        let bytes = pdu::hex_decode(&payload).ok_or_else(|| ModemError::Parse {
            context: "USSD payload",
            raw: payload.clone(),
        })?;
        let text = pdu::decode_7bit(&bytes);
        debug!("decoded USSD reply: {}", escape_log(&text));
        parse::find_decimal(&text).ok_or(ModemError::Parse {
            context: "balance figure",
            raw: text,
        })
    }

    /// Send a single-segment text message.
    ///
    /// CMGS is answered with a prompt rather than a terminal line, so the
    /// command is written without a terminal wait and the prompt is awaited
    /// separately unless the post-write drain already caught it. The body is
    /// terminated by Ctrl-Z.
    pub fn send_message(&self, destination: &str, body: &str) -> Result<(), ModemError> {
        debug!("sending message to {}", destination);
        self.channel.send("AT+CMGF=1\r", true)?;
        let echoed = self
            .channel
            .send(&format!("AT+CMGS=\"{}\"\r", destination), false)?;
        if !echoed.ends_with(PROMPT) {
            self.channel.wait_for(DEFAULT_IDLE_READS, PROMPT)?;
        }
        self.channel.send(&format!("{}{}", body, CTRL_Z), true)?;
        Ok(())
    }

    /// Delete the message stored at `index`.
    pub fn delete_message(&self, index: u32) -> Result<(), ModemError> {
        let _ = self.channel.send("AT+CMGF=1\r", true);
        self.channel
            .send(&format!("AT+CMGD={}\r", index), true)
            .map(|_| ())
    }

    /// Read and decode the message stored at `index`.
    pub fn get_message(&self, index: u32) -> Result<InboundMessage, ModemError> {
        let status = self.channel.send(&format!("AT+CMGR={}\r", index), true)?;
        let reply = parse::parse_read_reply(&status)?;
        let timestamp = parse::parse_timestamp(reply.timestamp)?;
        let body = parse::decode_message_body(reply.body, index);
        Ok(InboundMessage {
            index,
            label: reply.label.to_string(),
            sender: reply.sender.to_string(),
            timestamp,
            body,
        })
    }

    /// List occupied mailbox slots.
    ///
    /// This issues the delete capability query (`AT+CMGD=?`). Many modem
    /// families report supported delete-mode flags there rather than occupied
    /// slots; the firmware this gateway targets returns actual indexes, and
    /// the command is kept as-is for compatibility with it.
    pub fn get_message_indexes(&self) -> Result<Vec<u32>, ModemError> {
        let _ = self.channel.send("AT+CMGF=1\r", true);
        let status = self.channel.send("AT+CMGD=?\r", true)?;
        parse::parse_index_list(&status)
    }

    /// Read every stored message, failing on the first unreadable slot.
    pub fn get_messages(&self) -> Result<Vec<InboundMessage>, ModemError> {
        let indexes = self.get_message_indexes()?;
        debug!("reading {} stored messages", indexes.len());
        indexes.into_iter().map(|i| self.get_message(i)).collect()
    }
}

/// Adapter from the serialport crate to the [`Port`] capability.
///
/// A read that hits the per-call timeout reports zero bytes instead of an
/// error, which is what the channel's idle accounting expects.
struct SerialLink {
    inner: Box<dyn serialport::SerialPort>,
}

impl Port for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match io::Read::read(&mut self.inner, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.inner, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the serialport handle closes the device.
        Ok(())
    }
}
