//! Logging utilities for rendering wire traffic safely. AT exchanges are
//! full of carriage returns and control bytes (Ctrl-Z most of all) that would
//! otherwise mangle log lines.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - other control bytes => `\xNN`
///
/// Truncates very long strings (over `MAX_PREVIEW` chars) with an ellipsis so
/// a big mailbox dump doesn't flood the log.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 200;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_log;

    #[test]
    fn escapes_wire_traffic() {
        assert_eq!(escape_log("AT+CSQ\r"), "AT+CSQ\\r");
        assert_eq!(escape_log("+CSQ: 23,99\r\nOK\r\n"), "+CSQ: 23,99\\r\\nOK\\r\\n");
    }

    #[test]
    fn control_bytes_become_hex() {
        assert_eq!(escape_log("test\u{1a}"), "test\\x1A");
    }

    #[test]
    fn long_output_is_truncated() {
        let long = "A".repeat(500);
        let escaped = escape_log(&long);
        assert!(escaped.ends_with('…'));
        assert_eq!(escaped.chars().count(), 201);
    }
}
