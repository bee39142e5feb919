use log::info;

use crate::error::InstrumentError;
use crate::scpi::ScpiTransport;

/// SCPI function generator with numbered source/output channels.
pub struct FunctionGenerator<T: ScpiTransport> {
    link: T,
    channel: u8,
    waveform: String,
}

impl<T: ScpiTransport> FunctionGenerator<T> {
    pub fn new(link: T, channel: u8, waveform: &str) -> Self {
        Self {
            link,
            channel,
            waveform: waveform.to_string(),
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn transport(&self) -> &T {
        &self.link
    }

    /// Clear the status and error queues
    pub fn clear(&mut self) -> Result<(), InstrumentError> {
        self.link.write_line("*CLS")
    }

    /// Program function, amplitude (Vpp) and frequency without touching the
    /// output state.
    pub fn configure_sine(&mut self, amplitude_v: f64, frequency_hz: f64) -> Result<(), InstrumentError> {
        let n = self.channel;
        self.link
            .write_line(&format!("SOURCE{n}:FUNCTION {}", self.waveform))?;
        self.link
            .write_line(&format!("SOURCE{n}:VOLTAGE:AMPLITUDE {amplitude_v}"))?;
        self.link
            .write_line(&format!("SOURCE{n}:FREQUENCY {frequency_hz}"))?;
        Ok(())
    }

    /// Program amplitude and frequency only, keeping the current function
    pub fn configure_level(&mut self, amplitude_v: f64, frequency_hz: f64) -> Result<(), InstrumentError> {
        let n = self.channel;
        self.link
            .write_line(&format!("SOURCE{n}:VOLTAGE:AMPLITUDE {amplitude_v}"))?;
        self.link
            .write_line(&format!("SOURCE{n}:FREQUENCY {frequency_hz}"))
    }

    pub fn set_output(&mut self, enabled: bool) -> Result<(), InstrumentError> {
        let state = if enabled { "ON" } else { "OFF" };
        self.link
            .write_line(&format!("OUTPUT{}:STATE {}", self.channel, state))?;
        info!("function generator output {}", state.to_lowercase());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[test]
    fn sine_setup_and_output_commands() {
        let mut fg = FunctionGenerator::new(MockTransport::new(), 1, "SIN");
        fg.configure_sine(0.25, 20.0).unwrap();
        fg.set_output(true).unwrap();
        fg.set_output(false).unwrap();
        assert_eq!(
            fg.transport().written,
            vec![
                "SOURCE1:FUNCTION SIN",
                "SOURCE1:VOLTAGE:AMPLITUDE 0.25",
                "SOURCE1:FREQUENCY 20",
                "OUTPUT1:STATE ON",
                "OUTPUT1:STATE OFF",
            ]
        );
    }

    #[test]
    fn second_channel_and_level_only() {
        let mut fg = FunctionGenerator::new(MockTransport::new(), 2, "SQU");
        fg.clear().unwrap();
        fg.configure_level(1.0, 150.5).unwrap();
        assert_eq!(
            fg.transport().written,
            vec!["*CLS", "SOURCE2:VOLTAGE:AMPLITUDE 1", "SOURCE2:FREQUENCY 150.5"]
        );
    }
}
