use std::ffi::CString;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

use log::trace;
use visa_rs::prelude::*;

use crate::error::InstrumentError;
use crate::scpi::ScpiTransport;

/// SCPI over an NI-VISA session, e.g. `TCPIP0::192.168.1.10::INSTR`.
pub struct VisaInstrument {
    // Keep the resource manager alive for as long as the session
    _rm: DefaultRM,
    instr: Instrument,
    timeout: Duration,
    termination: String,
}

impl VisaInstrument {
    pub fn open(resource: &str, timeout: Duration, termination: &str) -> Result<Self, InstrumentError> {
        // Initialize the VISA resource manager
        let rm = DefaultRM::new().map_err(vs_to_instrument_err)?;

        let resource_string =
            CString::new(resource).map_err(|e| InstrumentError::Visa(e.to_string()))?;

        // Open a session to the resource
        let instr = rm
            .open(&resource_string.into(), AccessMode::NO_LOCK, timeout)
            .map_err(vs_to_instrument_err)?;

        Ok(Self {
            _rm: rm,
            instr,
            timeout,
            termination: termination.to_string(),
        })
    }

    fn map_io(&self, err: io::Error) -> InstrumentError {
        let message = err.to_string();
        if err.kind() == io::ErrorKind::TimedOut || message.to_ascii_uppercase().contains("TMO") {
            InstrumentError::Timeout(self.timeout)
        } else {
            vs_to_instrument_err(visa_rs::io_to_vs_err(err))
        }
    }
}

fn vs_to_instrument_err(err: visa_rs::Error) -> InstrumentError {
    InstrumentError::Visa(err.to_string())
}

impl ScpiTransport for VisaInstrument {
    fn write_line(&mut self, command: &str) -> Result<(), InstrumentError> {
        trace!(">> {}", command);
        let line = format!("{}{}", command, self.termination);
        self.instr
            .write_all(line.as_bytes())
            .map_err(|e| self.map_io(e))
    }

    fn read_line(&mut self) -> Result<String, InstrumentError> {
        let mut response = String::new();
        {
            // Scope the BufReader so it is dropped before the session is used again
            let mut reader = BufReader::new(&self.instr);
            reader.read_line(&mut response).map_err(|e| self.map_io(e))?;
        }
        trace!("<< {}", response.trim_end());
        Ok(response)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        (&self.instr).read_exact(buf).map_err(|e| self.map_io(e))
    }
}
