//! Test utilities & fixtures.
//! Provides a scripted serial port that answers AT commands like a real
//! modem, with canned replies captured from live hardware.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use smsgate::modem::Port;

/// Fake serial device: every recognized command written to the port loads a
/// canned reply into the read buffer. Unrecognized writes leave the buffer
/// empty, so reads report silence.
pub struct FakePort {
    responses: HashMap<String, String>,
    buffer: Vec<u8>,
    pos: usize,
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakePort {
    /// A port scripted with the full canned-reply set.
    pub fn new() -> Self {
        let mut responses = HashMap::new();
        for (command, reply) in [
            ("ATZ\r", "\r\nOK\r\n"),
            ("AT\r", "\r\nOK\r\n"),
            ("ATE0\r", "ATE0\r\nOK\r\n"),
            ("AT+CFUN=1\r", "\r\nOK\r\n"),
            ("AT+CMEE=1\r", "\r\nOK\r\n"),
            ("AT+COPS=3,0\r", "\r\nOK\r\n"),
            ("AT+CMGF=0\r", "\r\nOK\r\n"),
            ("AT+CMGF=1\r", "\r\nOK\r\n"),
            ("AT^USSDMODE=1\r", "\r\nOK\r\n"),
            (
                "AT+CUSD=1,\"AA582C3602\",15\r",
                "\r\nFFFFFFFFFFFFFFFFFFFFFFFF\r\nOK\r\n+CUSD: 0,\"C2303BEC9E8362B09B0B0643CBDD2C90F8EDAECF4130170C8696BB5D0A954AA58096E5657B5ABE0E83F461767E8E5ED741F0F79C5D3F835431596CA400\",15\r\n",
            ),
            ("AT+CSMP=49,167,0,0\r", "\r\nOK\r\n"),
            (
                "AT+CPMS=\"ME\",\"ME\",\"ME\"\r",
                "\r\n+CPMS: 23,50,23,50,23,50\r\n\r\nOK\r\n",
            ),
            ("AT+CNMI=2,1,0,2\r", "\r\nOK\r\n"),
            ("AT+CSCS=\"GSM\"\r", "\r\nOK\r\n"),
            ("AT+CSQ\r", "\r\n+CSQ: 23,99\r\n\r\nOK\r\n"),
            ("AT+CSCS?\r", "\r\n+CSCS: \"IRA\"\r\n\r\nOK\r\n"),
            ("AT+CMGD=?\r", "\r\n+CMGD: (0,3,17),(0-4)\r\n\r\nOK\r\n"),
            ("AT+CMGD=0\r", "\r\nOK\r\n"),
            (
                "AT+CMGR=0\r",
                "\r\n+CMGR: \"REC UNREAD\",\"1081051021015841\",,\"15/11/02,17:34:06+08\"\r\n041404170412041E041D04060422042C0020041704100020041A041E04200414041E041D002004140415042804150412041E00210020040404320440043E043F0430002C00200410043C043504400438043A0430002C0020041A0438044204300439002C00200420043E04410456044F00200442043000200456043D044804560020043A0440\r\n\r\nOK\r\n",
            ),
            (
                "AT+CMGR=3\r",
                "\r\n+CMGR: \"REC READ\",\"53525151\",,\"15/10/29,17:49:08+08\"\r\n42616C616E732034362E303068726E2C20626F6E757320302E303068726E2E0A2A2A2A0A5A616C7973686F6B207363686F64656E6E6F676F2070616B65747520706F736C75673A203435534D533B2042657A6C696D69746E69206876796C796E79206E61206C6966653A293B2035302E304D4220496E7465726E6574753B20447A76696E6B7920706F203235206B6F702F6876206E6120696E\r\n\r\nOK\r\n",
            ),
            (
                "AT+CMGR=17\r",
                "\r\n+CMGR: \"REC READ\",\"+380631234567\",,\"15/11/01,03:20:05+08\"\r\ntest\r\n\r\nOK\r\n",
            ),
            ("AT+CMGS=\"+380631234567\"\r", "\r\n> "),
            ("test\u{1a}", "\r\nOK\r\n"),
        ] {
            responses.insert(command.to_string(), reply.to_string());
        }
        Self::with_responses(responses)
    }

    /// A port that answers nothing at all.
    pub fn silent() -> Self {
        Self::with_responses(HashMap::new())
    }

    fn with_responses(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            buffer: Vec::new(),
            pos: 0,
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Override (or add) the reply for one command.
    pub fn set_response(&mut self, command: &str, reply: &str) {
        self.responses
            .insert(command.to_string(), reply.to_string());
    }

    /// Shared view of every command written to the port, in order.
    pub fn write_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.writes.clone()
    }
}

impl Port for FakePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buffer.len() {
            return Ok(0);
        }
        let n = (self.buffer.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let command = String::from_utf8_lossy(buf).to_string();
        self.writes.lock().unwrap().push(command.clone());
        if let Some(reply) = self.responses.get(&command) {
            self.buffer = reply.clone().into_bytes();
            self.pos = 0;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.clear();
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
