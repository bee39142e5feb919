use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::LabError;
use crate::grid::GridPoint;

/// One field after the amplitude and frequency of a result line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricField {
    /// Frequency, written with a ` Hz` suffix
    Hz(Option<f64>),
    /// Unitless value
    Value(Option<f64>),
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricField::Hz(v) => write!(f, "{} Hz", OptNum(*v)),
            MetricField::Value(v) => write!(f, "{}", OptNum(*v)),
        }
    }
}

struct OptNum(Option<f64>);

impl fmt::Display for OptNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            // Debug keeps the trailing `.0` on whole numbers
            Some(v) => write!(f, "{v:?}"),
            None => write!(f, "None"),
        }
    }
}

/// `0.5 V, 150.0 Hz, 12.34 Hz, 0.0456`
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    pub point: GridPoint,
    pub fields: Vec<MetricField>,
}

impl MetricRecord {
    pub fn new(point: GridPoint) -> Self {
        Self {
            point: point.rounded(),
            fields: Vec::new(),
        }
    }

    pub fn hz(mut self, value: Option<f64>) -> Self {
        self.fields.push(MetricField::Hz(value));
        self
    }

    pub fn value(mut self, value: Option<f64>) -> Self {
        self.fields.push(MetricField::Value(value));
        self
    }
}

impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} V, {:?} Hz",
            self.point.amplitude_v, self.point.frequency_hz
        )?;
        for field in &self.fields {
            write!(f, ", {field}")?;
        }
        Ok(())
    }
}

/// Append-only text file of result lines.
///
/// The file is opened for each append and closed right after; nothing is
/// locked and re-runs add duplicate lines.
#[derive(Clone, Debug)]
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &MetricRecord) -> Result<(), LabError> {
        self.append_line(&record.to_string())
    }

    pub fn append_line(&self, line: &str) -> Result<(), LabError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LabError::file(&self.path, e))?;
        writeln!(file, "{line}").map_err(|e| LabError::file(&self.path, e))?;
        debug!("{} <- {}", self.path.display(), line);
        Ok(())
    }
}

/// A results line split back into numbers; `None` marks a missing value.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedLine {
    pub values: Vec<Option<f64>>,
}

impl ParsedLine {
    pub fn get(&self, idx: usize) -> Option<f64> {
        self.values.get(idx).copied().flatten()
    }
}

/// Parse `0.5 V, 150.0 Hz, None Hz, None` style lines. Unit suffixes are
/// dropped.
pub fn parse_line(line: &str) -> Result<ParsedLine, LabError> {
    let values = line
        .trim()
        .split(',')
        .map(|token| {
            let number = token.split_whitespace().next().unwrap_or("");
            match number {
                "None" | "nan" => Ok(None),
                n => n.parse::<f64>().map(Some).map_err(|_| LabError::ResultsLine {
                    line: line.to_string(),
                    reason: format!("{:?} is not a number", token.trim()),
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedLine { values })
}

/// Parse every non-blank line of a results file.
pub fn read_results(path: &Path) -> Result<Vec<ParsedLine>, LabError> {
    let text = std::fs::read_to_string(path).map_err(|e| LabError::file(path, e))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_line)
        .collect()
}
