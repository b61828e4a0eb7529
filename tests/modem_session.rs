//! Session-level tests against the scripted fake modem.

mod common;

use chrono::{FixedOffset, TimeZone};
use common::FakePort;
use smsgate::modem::{ModemError, ModemSession};

fn session() -> ModemSession {
    ModemSession::with_port(Box::new(FakePort::new()))
}

#[test]
fn reset_runs_full_init_sequence() {
    let port = FakePort::new();
    let log = port.write_log();
    let session = ModemSession::with_port(Box::new(port));
    session.reset().unwrap();

    let writes = log.lock().unwrap();
    // Ctrl-Z preamble first, then every init command in order.
    assert_eq!(writes[0], "\u{1a}");
    let expected = [
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
    assert_eq!(&writes[1..], &expected);
}

#[test]
fn reset_aborts_after_exhausting_attempts() {
    let mut port = FakePort::new();
    port.set_response("ATZ\r", "\r\nERROR\r\n");
    let log = port.write_log();
    let session = ModemSession::with_port(Box::new(port));

    let err = session.reset().unwrap_err();
    assert!(matches!(err, ModemError::Command(_)));

    let writes = log.lock().unwrap();
    let atz_attempts = writes.iter().filter(|w| *w == "ATZ\r").count();
    assert_eq!(atz_attempts, 10);
    // The failing command aborts the sequence; nothing after it runs.
    assert!(!writes.iter().any(|w| w == "ATE0\r"));
}

#[test]
fn check_connection_succeeds() {
    session().check_connection().unwrap();
}

#[test]
fn silence_is_a_timeout() {
    let session = ModemSession::with_port(Box::new(FakePort::silent()));
    let err = session.check_connection().unwrap_err();
    assert!(matches!(err, ModemError::Timeout));
}

#[test]
fn cme_error_is_classified() {
    let mut port = FakePort::new();
    port.set_response("AT+CSQ\r", "\r\n+CME ERROR: 50\r\n");
    let session = ModemSession::with_port(Box::new(port));
    match session.get_signal().unwrap_err() {
        ModemError::Command(failure) => {
            assert_eq!(failure.prefix, "CME ");
            assert_eq!(failure.suffix, ": 50");
            assert_eq!(failure.to_string(), "CME ERROR: 50");
        }
        other => panic!("expected command failure, got {other:?}"),
    }
}

#[test]
fn bare_error_reports_unknown() {
    let mut port = FakePort::new();
    port.set_response("AT+CSQ\r", "\r\nERROR\r\n");
    let session = ModemSession::with_port(Box::new(port));
    match session.get_signal().unwrap_err() {
        ModemError::Command(failure) => {
            assert!(failure.is_unknown());
            assert_eq!(failure.to_string(), "unknown ERROR");
        }
        other => panic!("expected command failure, got {other:?}"),
    }
}

#[test]
fn reads_signal_quality() {
    assert_eq!(session().get_signal().unwrap(), 23.99);
}

#[test]
fn reads_charset() {
    assert_eq!(session().get_charset().unwrap(), "IRA");
}

#[test]
fn queries_balance_over_ussd() {
    assert_eq!(session().get_balance("*111#").unwrap(), 107.0);
}

#[test]
fn lists_message_indexes() {
    assert_eq!(session().get_message_indexes().unwrap(), vec![0, 3, 17]);
}

#[test]
fn reads_plain_text_hex_message() {
    let message = session().get_message(3).unwrap();
    assert_eq!(message.index, 3);
    assert_eq!(message.label, "REC READ");
    assert_eq!(message.sender, "53525151");
    // +08 in quarter-hour units is UTC+02:00.
    let expected_ts = FixedOffset::east_opt(2 * 3600)
        .unwrap()
        .with_ymd_and_hms(2015, 10, 29, 17, 49, 8)
        .unwrap();
    assert_eq!(message.timestamp, expected_ts);
    assert!(message.body.starts_with("Balans 46.00hrn, bonus 0.00hrn.\n***\n"));
    assert!(message.body.ends_with("Dzvinky po 25 kop/hv na in"));
}

#[test]
fn reads_all_messages() {
    let messages = session().get_messages().unwrap();
    assert_eq!(messages.len(), 3);

    // UCS-2 body with no ASCII lowercase runs decodes as Cyrillic.
    assert_eq!(messages[0].index, 0);
    assert_eq!(messages[0].label, "REC UNREAD");
    assert_eq!(messages[0].sender, "1081051021015841");
    assert!(messages[0].body.starts_with("ДЗВОНІТЬ ЗА КОРДОН ДЕШЕВО!"));

    // Literal (non-hex) body passes through untouched.
    assert_eq!(messages[2].index, 17);
    assert_eq!(messages[2].sender, "+380631234567");
    assert_eq!(messages[2].body, "test");
}

#[test]
fn sends_message() {
    let port = FakePort::new();
    let log = port.write_log();
    let session = ModemSession::with_port(Box::new(port));
    session.send_message("+380631234567", "test").unwrap();

    let writes = log.lock().unwrap();
    assert!(writes.iter().any(|w| w == "AT+CMGS=\"+380631234567\"\r"));
    assert_eq!(writes.last().unwrap(), "test\u{1a}");
}

#[test]
fn deletes_message() {
    session().delete_message(0).unwrap();
}
