//! Error taxonomy for the modem protocol engine.

use std::fmt;
use thiserror::Error;

/// Text captured around an `ERROR` marker in a modem reply.
///
/// The wire dialect prefixes the marker with an uppercase family name
/// (`CME `, `CMS `) and may append a code, e.g. `+CME ERROR: 50`. Either side
/// can be empty; when both are, the modem gave nothing to report and the
/// failure displays as `unknown ERROR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub prefix: String,
    pub suffix: String,
}

impl CommandFailure {
    pub fn is_unknown(&self) -> bool {
        self.prefix.is_empty() && self.suffix.is_empty()
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "unknown ERROR")
        } else {
            write!(f, "{}ERROR{}", self.prefix, self.suffix)
        }
    }
}

/// Errors raised by the AT command channel and the session operations built on it.
#[derive(Debug, Error)]
pub enum ModemError {
    /// Port read/write failure. Fatal to the current operation; the protocol
    /// layer never retries these itself.
    #[error("serial transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The serial device could not be opened at connect time.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// No terminal match within the idle-read budget.
    #[error("timed out waiting for modem output")]
    Timeout,

    /// The modem answered with an ERROR line.
    #[error("modem reported: {0}")]
    Command(CommandFailure),

    /// Response text did not match the expected shape. The raw text is kept
    /// for diagnostics.
    #[error("failed to parse {context} response: {raw:?}")]
    Parse { context: &'static str, raw: String },
}

#[cfg(test)]
mod tests {
    use super::CommandFailure;

    #[test]
    fn failure_display_includes_captures() {
        let failure = CommandFailure {
            prefix: "CME ".into(),
            suffix: ": 50".into(),
        };
        assert_eq!(failure.to_string(), "CME ERROR: 50");
    }

    #[test]
    fn empty_captures_display_as_unknown() {
        let failure = CommandFailure {
            prefix: String::new(),
            suffix: String::new(),
        };
        assert!(failure.is_unknown());
        assert_eq!(failure.to_string(), "unknown ERROR");
    }
}
