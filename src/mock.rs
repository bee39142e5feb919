//! Scripted SCPI transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::InstrumentError;
use crate::scpi::ScpiTransport;

#[derive(Clone, Debug)]
pub enum Reply {
    Bytes(Vec<u8>),
    Timeout,
    /// Time out, then deliver the bytes to whatever reads next
    Late(Vec<u8>),
}

/// Records every written command and answers configured ones.
///
/// One-shot replies queued with `once` take precedence over the standing
/// replies registered with `on`.
#[derive(Default)]
pub struct MockTransport {
    pub written: Vec<String>,
    standing: HashMap<String, Vec<u8>>,
    queued: HashMap<String, VecDeque<Reply>>,
    pending: VecDeque<u8>,
    late: Vec<u8>,
    timed_out: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, command: &str, reply: &str) {
        self.standing
            .insert(command.to_string(), reply.as_bytes().to_vec());
    }

    pub fn once(&mut self, command: &str, reply: Reply) {
        self.queued
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Standard answers for a scope that always completes and reports unit
    /// scaling.
    pub fn scope_defaults(&mut self) {
        self.on("*idn?", "TEKTRONIX,MSO44,C000001,CF:91.1CT FV:1.0\n");
        self.on("*opc?", "1\n");
        self.on("DATA:SOURCE?", "CH1\n");
        self.on("wfmoutpre:xincr?", "1.0E-5\n");
        self.on("wfmoutpre:xzero?", "0.0\n");
        self.on("wfmoutpre:ymult?", "1.0\n");
        self.on("wfmoutpre:yzero?", "0.0\n");
        self.on("wfmoutpre:yoff?", "0.0\n");
        self.on("*esr?", "0\n");
        self.on("allev?", "0,\"No events to report - queue empty\"\n");
    }

    pub fn count(&self, command: &str) -> usize {
        self.written.iter().filter(|c| c.as_str() == command).count()
    }

    pub fn position(&self, command: &str) -> Option<usize> {
        self.written.iter().position(|c| c == command)
    }

    fn expire(&mut self) {
        self.timed_out = false;
        self.pending.extend(self.late.drain(..));
    }
}

pub fn block(data: &[i8]) -> Vec<u8> {
    let len = data.len().to_string();
    let mut out = format!("#{}{}", len.len(), len).into_bytes();
    out.extend(data.iter().map(|&b| b as u8));
    out.push(b'\n');
    out
}

impl ScpiTransport for MockTransport {
    fn write_line(&mut self, command: &str) -> Result<(), InstrumentError> {
        self.written.push(command.to_string());
        let queued = self
            .queued
            .get_mut(command)
            .and_then(|replies| replies.pop_front());
        match queued {
            Some(Reply::Bytes(bytes)) => self.pending.extend(bytes),
            Some(Reply::Timeout) => self.timed_out = true,
            Some(Reply::Late(bytes)) => {
                self.timed_out = true;
                self.late = bytes;
            }
            None => {
                if let Some(bytes) = self.standing.get(command) {
                    self.pending.extend(bytes.iter().copied());
                }
            }
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, InstrumentError> {
        if self.timed_out || self.pending.is_empty() {
            self.expire();
            return Err(InstrumentError::Timeout(Duration::from_secs(100)));
        }
        let mut line = Vec::new();
        while let Some(b) = self.pending.pop_front() {
            line.push(b);
            if b == b'\n' {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        if self.timed_out || self.pending.len() < buf.len() {
            self.expire();
            return Err(InstrumentError::Timeout(Duration::from_secs(100)));
        }
        for slot in buf.iter_mut() {
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        Ok(())
    }
}
