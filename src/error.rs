use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures on the wire between us and a bench instrument.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("instrument i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("instrument did not answer within {0:?}")]
    Timeout(Duration),
    #[error("unexpected response to `{command}`: {response:?}")]
    BadResponse { command: String, response: String },
    #[error("malformed binary block: {0}")]
    MalformedBlock(String),
    #[cfg(feature = "visa")]
    #[error("VISA error: {0}")]
    Visa(String),
}

impl InstrumentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InstrumentError::Timeout(_))
    }
}

#[derive(Debug, Error)]
pub enum LabError {
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    #[error("invalid sweep range: start {start}, stop {stop}, step {step}")]
    InvalidRange { start: f64, stop: f64, step: f64 },
    #[error("streaming device: {0}")]
    Stream(String),
    #[error("file i/o failed for {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("malformed results line {line:?}: {reason}")]
    ResultsLine { line: String, reason: String },
    #[error("signal has too few samples ({0}) for analysis")]
    EmptySignal(usize),
}

impl LabError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LabError::File {
            path: path.into(),
            source,
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for LabError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        LabError::Plot(format!("{value:?}"))
    }
}
