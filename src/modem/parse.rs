//! Fixed-pattern parsers for the modem's response dialects.
//!
//! Each parser works over literal markers and restricted character classes
//! rather than a general grammar; the shapes are exactly the ones this
//! hardware family emits, and compatibility depends on matching them
//! verbatim (including the non-greedy body capture and the optional
//! timezone sign in read-message replies).

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use log::{debug, warn};

use super::error::{CommandFailure, ModemError};
use super::pdu;

fn parse_err(context: &'static str, raw: &str) -> ModemError {
    ModemError::Parse {
        context,
        raw: raw.to_string(),
    }
}

/// Match the `([A-Z ]*)ERROR([0-9A-Za-z :]*)` pattern anywhere in a response,
/// capturing the uppercase family prefix and the code/text suffix around the
/// marker.
pub fn match_error(response: &str) -> Option<CommandFailure> {
    let pos = response.find("ERROR")?;
    let bytes = response.as_bytes();
    let mut start = pos;
    while start > 0 {
        let c = bytes[start - 1];
        if c == b' ' || c.is_ascii_uppercase() {
            start -= 1;
        } else {
            break;
        }
    }
    let marker_end = pos + "ERROR".len();
    let mut end = marker_end;
    while end < bytes.len() {
        let c = bytes[end];
        if c == b' ' || c == b':' || c.is_ascii_alphanumeric() {
            end += 1;
        } else {
            break;
        }
    }
    Some(CommandFailure {
        prefix: response[start..pos].to_string(),
        suffix: response[marker_end..end].to_string(),
    })
}

/// Extract the `<value>,<value>` signal quality pair from a `+CSQ` reply and
/// read it as a decimal figure.
pub fn parse_signal(response: &str) -> Result<f64, ModemError> {
    let bytes = response.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b',' {
            let mid = i;
            i += 1;
            let frac = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > frac {
                let figure = format!("{}.{}", &response[start..mid], &response[frac..i]);
                return figure
                    .parse::<f64>()
                    .map_err(|_| parse_err("signal", response));
            }
        }
    }
    Err(parse_err("signal", response))
}

/// Extract the quoted alphanumeric token from a `+CSCS?` reply.
pub fn parse_charset(response: &str) -> Result<String, ModemError> {
    let mut rest = response;
    while let Some(open) = rest.find('"') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('"') else { break };
        let token = &after[..close];
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Ok(token.to_string());
        }
        rest = &after[close + 1..];
    }
    Err(parse_err("charset", response))
}

/// Extract the hex payload from a `+CUSD: <n>,"<hex>",<n>` session reply.
pub fn parse_ussd_payload(response: &str) -> Result<String, ModemError> {
    const MARKER: &str = "+CUSD: ";
    let start = response
        .find(MARKER)
        .ok_or_else(|| parse_err("USSD", response))?;
    let rest = &response[start + MARKER.len()..];
    let bytes = rest.as_bytes();
    if bytes.len() < 3 || !bytes[0].is_ascii_digit() || bytes[1] != b',' || bytes[2] != b'"' {
        return Err(parse_err("USSD", response));
    }
    let payload_start = 3;
    let mut i = payload_start;
    while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'"' || bytes.get(i + 1) != Some(&b',') {
        return Err(parse_err("USSD", response));
    }
    Ok(rest[payload_start..i].to_string())
}

/// Find the first `<digits>.<digits>` figure in decoded USSD text. The
/// caller treats absence as a parse error, never as a zero balance.
pub fn find_decimal(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            let frac = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > frac {
                return text[start..i].parse().ok();
            }
        }
    }
    None
}

/// Raw fields of a `+CMGR` read-message reply, still undecoded.
#[derive(Debug, PartialEq, Eq)]
pub struct ReadReply<'a> {
    pub label: &'a str,
    pub sender: &'a str,
    pub timestamp: &'a str,
    pub body: &'a str,
}

/// Parse `CMGR: "<label>","<sender>",,"<timestamp>"` followed by a body
/// terminated by a blank line and `OK`. The body capture is non-greedy: it
/// ends at the first blank-line-plus-OK sequence.
pub fn parse_read_reply(response: &str) -> Result<ReadReply<'_>, ModemError> {
    let fail = || parse_err("read-message", response);
    let start = response.find("CMGR: \"").ok_or_else(fail)?;
    let rest = &response[start + "CMGR: \"".len()..];
    let (label, rest) =
        quoted_field(rest, |c| c == ' ' || c.is_ascii_uppercase()).ok_or_else(fail)?;
    let rest = rest.strip_prefix(",\"").ok_or_else(fail)?;
    let (sender, rest) =
        quoted_field(rest, |c| c == '+' || c.is_ascii_digit()).ok_or_else(fail)?;
    let rest = rest.strip_prefix(",,\"").ok_or_else(fail)?;
    let (timestamp, rest) = quoted_field(rest, |c| {
        matches!(c, '0'..='9' | '/' | ',' | ':' | '+' | '-')
    })
    .ok_or_else(fail)?;
    let rest = rest.strip_prefix("\r\n").ok_or_else(fail)?;
    let body_end = rest.find("\r\n\r\nOK").ok_or_else(fail)?;
    Ok(ReadReply {
        label,
        sender,
        timestamp,
        body: &rest[..body_end],
    })
}

/// Take characters up to the closing quote, requiring all of them to be in
/// the field's character class.
fn quoted_field(s: &str, class: fn(char) -> bool) -> Option<(&str, &str)> {
    let end = s.find('"')?;
    let token = &s[..end];
    if token.chars().all(class) {
        Some((token, &s[end + 1..]))
    } else {
        None
    }
}

/// Parse a mailbox timestamp of the form `YY/MM/DD,HH:MM:SS±ZZ`, where the
/// zone is a signed offset in quarter-hour units.
pub fn parse_timestamp(timestamp: &str) -> Result<DateTime<FixedOffset>, ModemError> {
    const CLOCK_LEN: usize = "YY/MM/DD,HH:MM:SS".len();
    if timestamp.len() <= CLOCK_LEN {
        return Err(parse_err("timestamp", timestamp));
    }
    let (clock, zone) = timestamp.split_at(CLOCK_LEN);
    let naive = NaiveDateTime::parse_from_str(clock, "%y/%m/%d,%H:%M:%S")
        .map_err(|_| parse_err("timestamp", timestamp))?;
    let quarters: i32 = zone
        .parse()
        .map_err(|_| parse_err("timestamp", timestamp))?;
    let offset = FixedOffset::east_opt(quarters * 15 * 60)
        .ok_or_else(|| parse_err("timestamp", timestamp))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| parse_err("timestamp", timestamp))
}

/// Parse the `+CMGD: (<comma-separated values>)` listing. Non-numeric tokens
/// are logged and skipped, not treated as failures.
pub fn parse_index_list(response: &str) -> Result<Vec<u32>, ModemError> {
    const MARKER: &str = "+CMGD: (";
    let start = response
        .find(MARKER)
        .ok_or_else(|| parse_err("mailbox listing", response))?;
    let rest = &response[start + MARKER.len()..];
    let end = rest
        .find(')')
        .ok_or_else(|| parse_err("mailbox listing", response))?;
    let inner = &rest[..end];
    let mut indexes = Vec::new();
    if inner.is_empty() {
        return Ok(indexes);
    }
    for token in inner.split(',') {
        match token.parse::<u32>() {
            Ok(index) => indexes.push(index),
            Err(_) => warn!("skipping non-numeric mailbox index {:?}", token),
        }
    }
    Ok(indexes)
}

/// Decide how a read-message body field is decoded.
///
/// Bodies arrive either as raw text or as a hex string. A hex-only payload is
/// decoded to bytes; if those bytes contain a run of three consecutive
/// lowercase-or-space characters they are taken as already-plain ASCII,
/// otherwise the payload is treated as UCS-2. The run heuristic is a
/// deliberate approximation kept for compatibility with the deployed
/// firmware; it can misclassify short or symbol-heavy messages.
pub fn decode_message_body(field: &str, index: u32) -> String {
    if !is_hex_payload(field) {
        return field.to_string();
    }
    let Some(bytes) = pdu::hex_decode(field) else {
        return field.to_string();
    };
    if looks_plain_text(&bytes) {
        debug!("decoding message #{} as plain text", index);
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        debug!("decoding message #{} as UCS-2", index);
        match pdu::decode_ucs2(&bytes) {
            Some(text) => text,
            None => {
                warn!("failed to decode message #{} as UCS-2", index);
                String::new()
            }
        }
    }
}

/// A body field counts as hex only when it consists entirely of uppercase
/// hex digits; the wire dialect never emits lowercase hex.
pub fn is_hex_payload(field: &str) -> bool {
    !field.is_empty()
        && field
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// A run of three consecutive lowercase-or-space bytes marks plain ASCII.
pub fn looks_plain_text(bytes: &[u8]) -> bool {
    let mut run = 0;
    for &b in bytes {
        if b == b' ' || b.is_ascii_lowercase() {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}
