//! Summaries assembled from results files for plotting.

use log::{debug, warn};

use crate::error::LabError;
use crate::results::ParsedLine;

/// Magnitudes on the measured amplitude × frequency grid.
#[derive(Clone, Debug, PartialEq)]
pub struct HeatMap {
    /// Sorted distinct amplitudes (columns)
    pub amplitudes: Vec<f64>,
    /// Sorted distinct frequencies (rows)
    pub frequencies: Vec<f64>,
    /// `values[row][col]`, `0.0` where nothing was measured
    pub values: Vec<Vec<f64>>,
}

impl HeatMap {
    /// Build from `amplitude, frequency, ..., value` lines, taking the last
    /// field as the cell value. The first line for a cell wins; lines whose
    /// value is `None` leave the cell empty.
    pub fn from_lines(lines: &[ParsedLine]) -> Result<Self, LabError> {
        let mut cells = Vec::with_capacity(lines.len());
        for line in lines {
            let (Some(amp), Some(freq)) = (line.get(0), line.get(1)) else {
                return Err(LabError::ResultsLine {
                    line: format!("{:?}", line.values),
                    reason: "missing amplitude or frequency".into(),
                });
            };
            if line.values.len() < 3 {
                return Err(LabError::ResultsLine {
                    line: format!("{:?}", line.values),
                    reason: "no value after amplitude and frequency".into(),
                });
            }
            cells.push((amp, freq, line.values.last().copied().flatten()));
        }

        let amplitudes = distinct_sorted(cells.iter().map(|c| c.0));
        let frequencies = distinct_sorted(cells.iter().map(|c| c.1));
        let mut values = vec![vec![0.0; amplitudes.len()]; frequencies.len()];
        let mut filled = vec![vec![false; amplitudes.len()]; frequencies.len()];

        for (amp, freq, value) in cells {
            let col = position(&amplitudes, amp);
            let row = position(&frequencies, freq);
            if filled[row][col] {
                debug!("duplicate cell {amp} V / {freq} Hz ignored");
                continue;
            }
            filled[row][col] = true;
            match value {
                Some(v) => values[row][col] = v,
                None => debug!("no value at {amp} V / {freq} Hz"),
            }
        }

        Ok(Self {
            amplitudes,
            frequencies,
            values,
        })
    }

    pub fn get(&self, amplitude: f64, frequency: f64) -> Option<f64> {
        let col = self.amplitudes.iter().position(|&a| a == amplitude)?;
        let row = self.frequencies.iter().position(|&f| f == frequency)?;
        Some(self.values[row][col])
    }

    pub fn max_value(&self) -> f64 {
        self.values
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Cell boundaries centred on each value; the outermost cells mirror
    /// their inner neighbour's spacing.
    pub fn edges(centers: &[f64]) -> Vec<f64> {
        match centers.len() {
            0 => Vec::new(),
            1 => vec![centers[0] - 0.5, centers[0] + 0.5],
            n => {
                let mut edges = Vec::with_capacity(n + 1);
                edges.push(centers[0] - (centers[1] - centers[0]) / 2.0);
                for pair in centers.windows(2) {
                    edges.push((pair[0] + pair[1]) / 2.0);
                }
                edges.push(centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0);
                edges
            }
        }
    }
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

fn position(sorted: &[f64], value: f64) -> usize {
    sorted
        .iter()
        .position(|&v| v == value)
        .unwrap_or_default()
}

/// RMS levels of the IDS and the reference accelerometer at one frequency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RmsRow {
    pub frequency_hz: f64,
    pub ids_mean: f64,
    pub ids_std: f64,
    pub acc_mean: f64,
    pub acc_std: f64,
}

impl RmsRow {
    pub fn from_line(line: &ParsedLine) -> Result<Self, LabError> {
        let field = |idx: usize| {
            line.get(idx).ok_or_else(|| LabError::ResultsLine {
                line: format!("{:?}", line.values),
                reason: format!("column {idx} is missing"),
            })
        };
        Ok(Self {
            frequency_hz: field(0)?,
            ids_mean: field(1)?,
            ids_std: field(2)?,
            acc_mean: field(3)?,
            acc_std: field(4)?,
        })
    }
}

/// Average every column over the rows sharing a frequency, ordered by
/// frequency.
pub fn group_by_frequency(rows: &[RmsRow]) -> Vec<RmsRow> {
    let mut frequencies = distinct_sorted(rows.iter().map(|r| r.frequency_hz));
    frequencies.retain(|f| f.is_finite());

    frequencies
        .into_iter()
        .map(|f| {
            let group: Vec<&RmsRow> = rows.iter().filter(|r| r.frequency_hz == f).collect();
            let n = group.len() as f64;
            let avg = |pick: fn(&RmsRow) -> f64| group.iter().map(|r| pick(r)).sum::<f64>() / n;
            RmsRow {
                frequency_hz: f,
                ids_mean: avg(|r| r.ids_mean),
                ids_std: avg(|r| r.ids_std),
                acc_mean: avg(|r| r.acc_mean),
                acc_std: avg(|r| r.acc_std),
            }
        })
        .collect()
}

/// Parse rows, skipping lines that do not carry all five columns.
pub fn rms_rows(lines: &[ParsedLine]) -> Vec<RmsRow> {
    lines
        .iter()
        .filter_map(|line| match RmsRow::from_line(line) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("skipping RMS line: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::parse_line;

    fn lines(text: &[&str]) -> Vec<ParsedLine> {
        text.iter().map(|l| parse_line(l).unwrap()).collect()
    }

    #[test]
    fn heatmap_places_cells_and_fills_gaps() {
        let map = HeatMap::from_lines(&lines(&[
            "0.5 V, 150.0 Hz, 150.0 Hz, 2.0",
            "1.0 V, 150.0 Hz, 150.0 Hz, 4.0",
            "0.5 V, 200.0 Hz, 200.0 Hz, 3.0",
        ]))
        .unwrap();
        assert_eq!(map.amplitudes, vec![0.5, 1.0]);
        assert_eq!(map.frequencies, vec![150.0, 200.0]);
        assert_eq!(map.values, vec![vec![2.0, 4.0], vec![3.0, 0.0]]);
        assert_eq!(map.get(1.0, 200.0), Some(0.0));
        assert_eq!(map.max_value(), 4.0);
    }

    #[test]
    fn first_occurrence_wins() {
        let map = HeatMap::from_lines(&lines(&[
            "0.5 V, 150.0 Hz, 1.5",
            "0.5 V, 150.0 Hz, 9.5",
        ]))
        .unwrap();
        assert_eq!(map.values, vec![vec![1.5]]);
    }

    #[test]
    fn sentinel_leaves_cell_empty() {
        let map = HeatMap::from_lines(&lines(&[
            "0.5 V, 150.0 Hz, None",
            "0.5 V, 150.0 Hz, 7.0",
        ]))
        .unwrap();
        assert_eq!(map.values, vec![vec![0.0]]);
    }

    #[test]
    fn short_lines_are_rejected() {
        assert!(HeatMap::from_lines(&lines(&["0.5 V, 150.0 Hz"])).is_err());
    }

    #[test]
    fn edges_center_each_cell() {
        assert_eq!(HeatMap::edges(&[20.0, 40.0, 60.0]), vec![10.0, 30.0, 50.0, 70.0]);
        assert_eq!(HeatMap::edges(&[1.0]), vec![0.5, 1.5]);
        assert!(HeatMap::edges(&[]).is_empty());
    }

    #[test]
    fn rms_rows_average_per_frequency() {
        let rows = rms_rows(&lines(&[
            "40, 1.0, 0.1, 2.0, 0.2",
            "20, 5.0, 0.5, 6.0, 0.6",
            "40, 3.0, 0.3, 4.0, 0.4",
            "40, 3.0",
        ]));
        assert_eq!(rows.len(), 3);
        let grouped = group_by_frequency(&rows);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].frequency_hz, 20.0);
        assert_eq!(grouped[0].ids_mean, 5.0);
        assert_eq!(grouped[1].frequency_hz, 40.0);
        assert_eq!(grouped[1].ids_mean, 2.0);
        assert!((grouped[1].ids_std - 0.2).abs() < 1e-12);
        assert_eq!(grouped[1].acc_mean, 3.0);
        assert!((grouped[1].acc_std - 0.3).abs() < 1e-12);
    }
}
