//! AT command channel: turns a raw byte-oriented serial port into a
//! synchronous command/response protocol.
//!
//! Framing is implicit. There is no length prefix on the wire; a response is
//! complete when the accumulated buffer ends with a known terminal suffix
//! (`OK\r\n`, the CMGS prompt, the USSD session-end marker) or matches the
//! `ERROR` pattern. Latency is bounded by an idle-read budget rather than
//! wall-clock time: each unproductive read already blocks for the port's
//! fixed per-call timeout, so counting empty reads is the timeout.
//!
//! The channel owns the exclusive-access lock on the port. The unit of mutual
//! exclusion is one exchange (one `send` or one `wait_for`), never a whole
//! multi-step session operation.

use log::{debug, trace};
use std::io;
use std::sync::Mutex;

use super::error::{CommandFailure, ModemError};
use super::parse;
use crate::logutil::escape_log;

/// Byte-stream capability for the physical serial device.
///
/// `read` must return `Ok(0)` promptly when no data is currently available
/// instead of blocking indefinitely; the serial adapter maps its per-call
/// read timeout to a zero-byte read.
pub trait Port: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// Discard anything sitting in the receive buffer.
    fn flush(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

/// Default idle-read budget for a terminal wait.
pub const DEFAULT_IDLE_READS: usize = 5;
/// Standard command terminal marker.
pub const TERMINAL_OK: &str = "OK\r\n";
/// Prompt the modem emits after `AT+CMGS` instead of a terminal line.
pub const PROMPT: &str = "\r\n> ";
/// Per-read chunk size, matching the granularity of the wire dialect.
const READ_CHUNK: usize = 32;

enum Outcome {
    Terminal,
    Idle,
    Failed(CommandFailure),
}

/// Serializes command/response exchanges over one port.
pub struct AtChannel {
    port: Mutex<Box<dyn Port>>,
}

impl AtChannel {
    pub fn new(port: Box<dyn Port>) -> Self {
        Self {
            port: Mutex::new(port),
        }
    }

    /// Run one command exchange: flush stale receive data, write the literal
    /// command bytes, then collect the reply.
    ///
    /// With `wait` the reply is collected until `OK\r\n` under the default
    /// idle budget; silence is a [`ModemError::Timeout`]. Without `wait` a
    /// single idle-read drain picks up any immediate echo and silence is not
    /// an error, though a matched `ERROR` reply still fails the call.
    pub fn send(&self, command: &str, wait: bool) -> Result<String, ModemError> {
        debug!("send: {}", escape_log(command));
        let mut port = self.port.lock().unwrap();
        port.flush()?;
        port.write(command.as_bytes())?;
        if wait {
            let (text, outcome) = collect(&mut **port, DEFAULT_IDLE_READS, TERMINAL_OK)?;
            match outcome {
                Outcome::Terminal => Ok(text),
                Outcome::Idle => Err(ModemError::Timeout),
                Outcome::Failed(failure) => Err(ModemError::Command(failure)),
            }
        } else {
            let (text, outcome) = collect(&mut **port, 1, TERMINAL_OK)?;
            match outcome {
                Outcome::Failed(failure) => Err(ModemError::Command(failure)),
                _ => Ok(text),
            }
        }
    }

    /// Wait for output terminated by `suffix`, tolerating up to `max_idle`
    /// empty reads. Used standalone for replies that trail the command
    /// acknowledgement, like the CMGS prompt and USSD session results.
    pub fn wait_for(&self, max_idle: usize, suffix: &str) -> Result<String, ModemError> {
        trace!("wait_for: budget={} suffix={}", max_idle, escape_log(suffix));
        let mut port = self.port.lock().unwrap();
        let (text, outcome) = collect(&mut **port, max_idle, suffix)?;
        match outcome {
            Outcome::Terminal => Ok(text),
            Outcome::Idle => Err(ModemError::Timeout),
            Outcome::Failed(failure) => Err(ModemError::Command(failure)),
        }
    }
}

/// Accumulate reads until the buffer ends with `suffix`, an ERROR pattern
/// matches, or `max_idle` zero-byte reads have elapsed. Productive reads do
/// not consume the idle budget, so slow trickling data cannot time out; only
/// true silence can.
fn collect(
    port: &mut dyn Port,
    max_idle: usize,
    suffix: &str,
) -> Result<(String, Outcome), ModemError> {
    let mut response = String::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut idle = 0;
    while idle < max_idle {
        let n = port.read(&mut buf)?;
        if n == 0 {
            idle += 1;
            trace!("no output on idle read {}/{}", idle, max_idle);
            continue;
        }
        let chunk = String::from_utf8_lossy(&buf[..n]);
        trace!("received {} bytes: {}", n, escape_log(&chunk));
        response.push_str(&chunk);
        if response.ends_with(suffix) {
            return Ok((response, Outcome::Terminal));
        }
        if let Some(failure) = parse::match_error(&response) {
            return Ok((response, Outcome::Failed(failure)));
        }
    }
    Ok((response, Outcome::Idle))
}
