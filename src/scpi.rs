use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, trace};

use crate::error::InstrumentError;

/// Line-oriented SCPI link to a bench instrument.
///
/// Implementors only move bytes; the provided methods build queries and
/// binary block transfers on top.
pub trait ScpiTransport {
    fn write_line(&mut self, command: &str) -> Result<(), InstrumentError>;

    /// Read one response line, including its terminator if present.
    fn read_line(&mut self) -> Result<String, InstrumentError>;

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError>;

    /// Send a query and return the trimmed response line.
    fn query(&mut self, command: &str) -> Result<String, InstrumentError> {
        self.write_line(command)?;
        let response = self.read_line()?;
        let response = response.trim().to_string();
        debug!("{} -> {}", command, response);
        Ok(response)
    }

    fn query_f64(&mut self, command: &str) -> Result<f64, InstrumentError> {
        let response = self.query(command)?;
        response
            .parse::<f64>()
            .map_err(|_| InstrumentError::BadResponse {
                command: command.to_string(),
                response,
            })
    }

    /// Send a query answered with an IEEE 488.2 definite-length block of
    /// signed bytes (`#<n><len><data>`).
    fn query_block_i8(&mut self, command: &str) -> Result<Vec<i8>, InstrumentError> {
        self.write_line(command)?;
        let data = read_definite_block(self)?;
        debug!("{} -> {} byte block", command, data.len());
        Ok(data.into_iter().map(|b| b as i8).collect())
    }
}

impl<T: ScpiTransport + ?Sized> ScpiTransport for Box<T> {
    fn write_line(&mut self, command: &str) -> Result<(), InstrumentError> {
        (**self).write_line(command)
    }

    fn read_line(&mut self) -> Result<String, InstrumentError> {
        (**self).read_line()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        (**self).read_bytes(buf)
    }
}

pub fn read_definite_block<T: ScpiTransport + ?Sized>(
    link: &mut T,
) -> Result<Vec<u8>, InstrumentError> {
    let mut head = [0u8; 2];
    link.read_bytes(&mut head)?;
    if head[0] != b'#' {
        return Err(InstrumentError::MalformedBlock(format!(
            "expected '#', got {:?}",
            head[0] as char
        )));
    }
    let digits = (head[1] as char)
        .to_digit(10)
        .ok_or_else(|| InstrumentError::MalformedBlock(format!("bad digit count {:?}", head[1] as char)))?
        as usize;
    if digits == 0 {
        return Err(InstrumentError::MalformedBlock(
            "indefinite-length blocks are not supported".into(),
        ));
    }

    let mut len_buf = vec![0u8; digits];
    link.read_bytes(&mut len_buf)?;
    let len_str = String::from_utf8_lossy(&len_buf);
    let len = len_str
        .parse::<usize>()
        .map_err(|_| InstrumentError::MalformedBlock(format!("bad block length {len_str:?}")))?;

    let mut data = vec![0u8; len];
    link.read_bytes(&mut data)?;

    // Swallow the message terminator that follows the block
    link.read_line()?;
    Ok(data)
}

/// Raw SCPI socket, usually port 5025 on LXI instruments.
pub struct TcpInstrument {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    timeout: Duration,
    termination: String,
}

impl TcpInstrument {
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
        termination: &str,
    ) -> Result<Self, InstrumentError> {
        let stream = TcpStream::connect(addr)?;

        // Set timeouts to prevent hanging on a silent instrument
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader,
            timeout,
            termination: termination.to_string(),
        })
    }

    fn map_io(&self, err: io::Error) -> InstrumentError {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                InstrumentError::Timeout(self.timeout)
            }
            _ => InstrumentError::Io(err),
        }
    }
}

impl ScpiTransport for TcpInstrument {
    fn write_line(&mut self, command: &str) -> Result<(), InstrumentError> {
        trace!(">> {}", command);
        let line = format!("{}{}", command, self.termination);
        self.stream
            .write_all(line.as_bytes())
            .map_err(|e| self.map_io(e))
    }

    fn read_line(&mut self) -> Result<String, InstrumentError> {
        let mut response = String::new();
        let n = self
            .reader
            .read_line(&mut response)
            .map_err(|e| self.map_io(e))?;
        if n == 0 {
            return Err(InstrumentError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "instrument closed the connection",
            )));
        }
        trace!("<< {}", response.trim_end());
        Ok(response)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        self.reader.read_exact(buf).map_err(|e| self.map_io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, Reply};

    #[test]
    fn query_trims_and_parses_numbers() {
        let mut link = MockTransport::new();
        link.on("wfmoutpre:ymult?", "1.5625E-3\n");
        let value = link.query_f64("wfmoutpre:ymult?").unwrap();
        assert!((value - 1.5625e-3).abs() < 1e-15);
        assert_eq!(link.written, vec!["wfmoutpre:ymult?"]);
    }

    #[test]
    fn query_f64_reports_garbage() {
        let mut link = MockTransport::new();
        link.on("wfmoutpre:xincr?", "n/a\n");
        let err = link.query_f64("wfmoutpre:xincr?").unwrap_err();
        assert!(matches!(err, InstrumentError::BadResponse { .. }));
    }

    #[test]
    fn definite_block_decodes_signed_bytes() {
        let mut link = MockTransport::new();
        let mut payload = b"#14".to_vec();
        payload.extend_from_slice(&[0x00, 0x7f, 0x80, 0xff]);
        payload.push(b'\n');
        link.once("curve?", Reply::Bytes(payload));
        let data = link.query_block_i8("curve?").unwrap();
        assert_eq!(data, vec![0, 127, -128, -1]);
    }

    #[test]
    fn multi_digit_block_length() {
        let mut link = MockTransport::new();
        let mut payload = b"#212".to_vec();
        payload.extend(std::iter::repeat(5u8).take(12));
        payload.push(b'\n');
        link.once("curve?", Reply::Bytes(payload));
        assert_eq!(link.query_block_i8("curve?").unwrap().len(), 12);
    }

    #[test]
    fn indefinite_block_is_rejected() {
        let mut link = MockTransport::new();
        link.once("curve?", Reply::Bytes(b"#0abc\n".to_vec()));
        let err = link.query_block_i8("curve?").unwrap_err();
        assert!(matches!(err, InstrumentError::MalformedBlock(_)));
    }

    #[test]
    fn missing_reply_is_a_timeout() {
        let mut link = MockTransport::new();
        link.once("*opc?", Reply::Timeout);
        assert!(link.query("*opc?").unwrap_err().is_timeout());
    }
}
