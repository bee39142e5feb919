use serde::{Deserialize, Serialize};

use crate::error::LabError;

// Tolerance on the step count so that e.g. 0.05..=1.0 by 0.05 yields 20 values
const STEP_EPSILON: f64 = 1e-9;

/// Inclusive `start..=stop` range walked in `step` increments.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl SweepRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    /// Values are computed as `start + i * step` rather than accumulated, so
    /// the last value never drifts past `stop`.
    pub fn values(&self) -> Result<Vec<f64>, LabError> {
        let valid = self.step > 0.0
            && self.start.is_finite()
            && self.stop.is_finite()
            && self.step.is_finite()
            && self.stop >= self.start;
        if !valid {
            return Err(LabError::InvalidRange {
                start: self.start,
                stop: self.stop,
                step: self.step,
            });
        }
        let count = ((self.stop - self.start) / self.step + STEP_EPSILON).floor() as usize + 1;
        Ok((0..count)
            .map(|i| self.start + i as f64 * self.step)
            .collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPoint {
    pub amplitude_v: f64,
    pub frequency_hz: f64,
}

impl GridPoint {
    /// `data_<amplitude>_<frequency>` with both values rounded for the name.
    pub fn file_stem(&self) -> String {
        format!("data_{}_{}", label(self.amplitude_v), label(self.frequency_hz))
    }

    pub fn rounded(&self) -> GridPoint {
        GridPoint {
            amplitude_v: round2(self.amplitude_v),
            frequency_hz: round2(self.frequency_hz),
        }
    }
}

/// Cartesian amplitude × frequency grid, amplitude in the outer loop.
#[derive(Clone, Debug)]
pub struct SweepGrid {
    amplitudes_v: Vec<f64>,
    frequencies_hz: Vec<f64>,
}

impl SweepGrid {
    pub fn new(amplitude: &SweepRange, frequency: &SweepRange) -> Result<Self, LabError> {
        Ok(Self {
            amplitudes_v: amplitude.values()?,
            frequencies_hz: frequency.values()?,
        })
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes_v
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies_hz
    }

    pub fn len(&self) -> usize {
        self.amplitudes_v.len() * self.frequencies_hz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> impl Iterator<Item = GridPoint> + '_ {
        self.amplitudes_v.iter().flat_map(move |&amplitude_v| {
            self.frequencies_hz.iter().map(move |&frequency_hz| GridPoint {
                amplitude_v,
                frequency_hz,
            })
        })
    }
}

/// Round to two decimals, folding `-0.0` into `0.0`.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0 + 0.0
}

/// Shortest decimal form of the rounded value (`0.05`, `150`).
pub fn label(x: f64) -> String {
    format!("{}", round2(x))
}
