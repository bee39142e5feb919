use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::ChannelSettings;
use crate::error::InstrumentError;
use crate::scpi::ScpiTransport;
use crate::waveform::{Capture, Waveform, WaveformScaling};

/// Result of waiting for a single-sequence acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Complete,
    /// `*opc?` timed out; the scope may still hold the previous record
    TimedOut,
}

/// Tektronix-style SCPI oscilloscope capturing long single-sequence records.
pub struct Oscilloscope<T: ScpiTransport> {
    link: T,
    source_settle: Duration,
    /// Answers still owed for `*opc?` queries that timed out
    late_replies: usize,
}

impl<T: ScpiTransport> Oscilloscope<T> {
    pub fn new(link: T, source_settle: Duration) -> Self {
        Self {
            link,
            source_settle,
            late_replies: 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.link
    }

    /// Clear status, identify, reset to defaults and disable response headers.
    pub fn initialize(&mut self) -> Result<String, InstrumentError> {
        self.discard_late_replies()?;
        self.link.write_line("*cls")?;
        let idn = self.link.query("*idn?")?;
        info!("oscilloscope: {}", idn);

        self.link.write_line("*rst")?;
        self.link.write_line("header 0")?;
        let started = Instant::now();
        self.link.query("*opc?")?;
        debug!("reset took {:?}", started.elapsed());
        Ok(idn)
    }

    /// Enable and set up every channel in one pass, then the acquisition mode.
    pub fn configure_channels(
        &mut self,
        channels: &[ChannelSettings],
        acquire_mode: &str,
    ) -> Result<(), InstrumentError> {
        for ch in channels {
            let name = &ch.name;
            self.link.write_line(&format!("SELect:{name} ON"))?;
            self.link
                .write_line(&format!(":{name}:SCAle {}", ch.volts_per_div))?;
            self.link
                .write_line(&format!(":{name}:COUP {}", ch.coupling))?;
            self.link
                .write_line(&format!("{name}:PROBEFunc:EXTAtten {}", ch.attenuation))?;
        }
        self.link
            .write_line(&format!("acquire:mode {acquire_mode}"))?;
        Ok(())
    }

    /// Manual horizontal mode at the channels' sample rate, sized to hold
    /// `window_s` seconds. Returns the record length.
    pub fn configure_horizontal(
        &mut self,
        channels: &[ChannelSettings],
        window_s: f64,
    ) -> Result<usize, InstrumentError> {
        self.discard_late_replies()?;
        let mut record_length = 0;
        // The horizontal system is shared; the last channel's rate wins
        for ch in channels {
            record_length = ch.record_length(window_s);
            self.link.write_line("HORIZONTAL:MODE MANUAL")?;
            self.link
                .write_line(&format!("HORIZONTAL:MODE:SAMPLERATE {}", ch.sampling_rate_hz))?;
            self.link
                .write_line(&format!("HORIZONTAL:RECORDLENGTH {record_length}"))?;
        }
        let started = Instant::now();
        self.link.query("*opc?")?;
        debug!("horizontal setup took {:?}", started.elapsed());
        Ok(record_length)
    }

    /// One signed byte per sample, whole record, stop after one sequence.
    pub fn configure_transfer(&mut self, record_length: usize) -> Result<(), InstrumentError> {
        self.link.write_line("data:encdg SRIBINARY")?;
        self.link.write_line("data:start 1")?;
        self.link
            .write_line(&format!("data:stop {record_length}"))?;
        self.link.write_line("wfmoutpre:byt_n 1")?;
        self.link.write_line("acquire:state 0")?;
        self.link.write_line("acquire:stopafter SEQUENCE")?;
        Ok(())
    }

    /// Arm a single sequence and wait on `*opc?` once.
    ///
    /// A timeout is tolerated: it is logged and reported as
    /// [`AcquireOutcome::TimedOut`]. The scope answers the query once the
    /// sequence completes; that late reply is dropped before the next query.
    /// Any other failure propagates.
    pub fn acquire(&mut self) -> Result<AcquireOutcome, InstrumentError> {
        self.discard_late_replies()?;
        self.link.write_line("acquire:state 1")?;
        let started = Instant::now();
        match self.link.query("*opc?") {
            Ok(_) => {
                debug!("acquisition took {:?}", started.elapsed());
                Ok(AcquireOutcome::Complete)
            }
            Err(e) if e.is_timeout() => {
                warn!("timeout waiting for acquisition to complete: {e}");
                self.late_replies += 1;
                Ok(AcquireOutcome::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    pub fn scaling(&mut self) -> Result<WaveformScaling, InstrumentError> {
        Ok(WaveformScaling {
            x_increment: self.link.query_f64("wfmoutpre:xincr?")?,
            x_zero: self.link.query_f64("wfmoutpre:xzero?")?,
            y_mult: self.link.query_f64("wfmoutpre:ymult?")?,
            y_zero: self.link.query_f64("wfmoutpre:yzero?")?,
            y_offset: self.link.query_f64("wfmoutpre:yoff?")?,
        })
    }

    /// Transfer one channel's record and convert it to volts.
    pub fn fetch_waveform(
        &mut self,
        channel: &str,
        record_length: usize,
    ) -> Result<Waveform, InstrumentError> {
        self.discard_late_replies()?;
        self.link.write_line(&format!("data:source {channel}"))?;
        if !self.source_settle.is_zero() {
            thread::sleep(self.source_settle);
        }
        let source = self.link.query("DATA:SOURCE?")?;
        debug!("data source set to {source}");

        self.link
            .write_line(&format!("data:stop {record_length}"))?;

        let started = Instant::now();
        let raw = self.link.query_block_i8("curve?")?;
        info!(
            "transferred {} samples from {} in {:?}",
            raw.len(),
            channel,
            started.elapsed()
        );

        let scaling = self.scaling()?;
        Ok(Waveform::from_raw(channel, &raw, scaling))
    }

    /// Fetch every configured channel of the last acquisition.
    pub fn capture(
        &mut self,
        channels: &[ChannelSettings],
        window_s: f64,
    ) -> Result<Capture, InstrumentError> {
        let mut capture = Capture::new();
        for ch in channels {
            let waveform = self.fetch_waveform(&ch.name, ch.record_length(window_s))?;
            capture.insert(waveform);
        }
        Ok(capture)
    }

    /// Event status register and queued event messages.
    pub fn event_status(&mut self) -> Result<(u8, String), InstrumentError> {
        self.discard_late_replies()?;
        let esr = self.link.query("*esr?")?;
        let esr_value = esr
            .parse::<u8>()
            .map_err(|_| InstrumentError::BadResponse {
                command: "*esr?".to_string(),
                response: esr.clone(),
            })?;
        let events = self.link.query("allev?")?;
        Ok((esr_value, events))
    }

    /// Read and drop the answers of timed-out `*opc?` queries so the next
    /// query is paired with its own response. Gives up if one never comes.
    fn discard_late_replies(&mut self) -> Result<(), InstrumentError> {
        while self.late_replies > 0 {
            match self.link.read_line() {
                Ok(line) => {
                    debug!("dropped late reply {:?}", line.trim_end());
                    self.late_replies -= 1;
                }
                Err(e) if e.is_timeout() => {
                    warn!("late *opc? reply never arrived: {e}");
                    self.late_replies = 0;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn factory_reset(&mut self) -> Result<(), InstrumentError> {
        warn!("restoring oscilloscope factory settings");
        self.link.write_line("FACtory")
    }
}
