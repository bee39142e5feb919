//! Offline peak analysis of IDS streams exported to CSV.

use std::path::Path;

use log::{debug, info};

use crate::analysis::{magnitude_spectrum, mean, PeakCriteria, PeakSummary, Spectrum};
use crate::error::LabError;
use crate::grid::{GridPoint, SweepGrid};
use crate::plot;
use crate::results::{MetricRecord, ResultsLog};

/// Time and axis-0 position columns of one exported stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trace {
    pub time_s: Vec<f64>,
    pub position_pm: Vec<f64>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.position_pm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position_pm.is_empty()
    }

    /// Spacing of the first two time stamps.
    pub fn sample_interval(&self) -> Option<f64> {
        match self.time_s.as_slice() {
            [t0, t1, ..] => Some(t1 - t0),
            _ => None,
        }
    }

    /// Position with its mean removed.
    pub fn displacement(&self) -> Vec<f64> {
        let offset = mean(&self.position_pm).unwrap_or_default();
        self.position_pm.iter().map(|p| p - offset).collect()
    }
}

/// Read `time, pos0, ...` rows. Rows whose first two fields are not numbers,
/// such as a header, are skipped.
pub fn load_trace(path: &Path) -> Result<Trace, LabError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut trace = Trace::default();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let time = record.get(0).and_then(|v| v.parse::<f64>().ok());
        let pos = record.get(1).and_then(|v| v.parse::<f64>().ok());
        match (time, pos) {
            (Some(t), Some(p)) => {
                trace.time_s.push(t);
                trace.position_pm.push(p);
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("{}: skipped {skipped} non-numeric rows", path.display());
    }
    Ok(trace)
}

/// Spectrum of the mean-free displacement and its peaks under `criteria`.
pub fn analyze_trace(
    trace: &Trace,
    criteria: &PeakCriteria,
) -> Result<(Spectrum, PeakSummary), LabError> {
    let dt = trace
        .sample_interval()
        .ok_or(LabError::EmptySignal(trace.len()))?;
    let spectrum = magnitude_spectrum(&trace.displacement(), dt, criteria.zero_low_bins)?;
    let peaks = criteria.pick(&spectrum);
    Ok((spectrum, peaks))
}

/// The two results files a replay appends to.
pub struct ReplayOutputs {
    /// `a V, f Hz, m1/m2`
    pub ratio: ResultsLog,
    /// `a V, f Hz, m1`
    pub first_peak: ResultsLog,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub analyzed: usize,
    pub missing: usize,
}

/// Re-analyze `data_{a}_{f}.csv` under `data_dir` for each grid point.
/// Points without a file are reported and skipped.
pub fn replay_grid(
    grid: &SweepGrid,
    data_dir: &Path,
    criteria: &PeakCriteria,
    outputs: &ReplayOutputs,
    plot_dir: Option<&Path>,
) -> Result<ReplaySummary, LabError> {
    let mut summary = ReplaySummary::default();
    for point in grid.points() {
        let path = data_dir.join(format!("{}.csv", point.file_stem()));
        if !path.is_file() {
            info!("file not found: {}", path.display());
            summary.missing += 1;
            continue;
        }

        let trace = load_trace(&path)?;
        let (spectrum, peaks) = analyze_trace(&trace, criteria)?;
        for peak in &peaks.peaks {
            info!(
                "peak detected at frequency: {} Hz with magnitude: {}",
                peak.frequency_hz, peak.magnitude
            );
        }
        if let Some(dir) = plot_dir {
            render(dir, &point, &trace, &spectrum, &peaks)?;
        }

        let (ratio, first) = records(&point, &peaks);
        outputs.ratio.append(&ratio)?;
        outputs.first_peak.append(&first)?;
        summary.analyzed += 1;
    }
    info!(
        "replay finished: {} analyzed, {} missing",
        summary.analyzed, summary.missing
    );
    Ok(summary)
}

fn records(point: &GridPoint, peaks: &PeakSummary) -> (MetricRecord, MetricRecord) {
    let ratio = MetricRecord::new(*point).value(Some(peaks.ratio()));
    let first = MetricRecord::new(*point).value(peaks.first().map(|p| p.magnitude));
    (ratio, first)
}

fn render(
    dir: &Path,
    point: &GridPoint,
    trace: &Trace,
    spectrum: &Spectrum,
    peaks: &PeakSummary,
) -> Result<(), LabError> {
    let stem = point.file_stem();
    plot::line_chart(
        &dir.join(format!("{stem}_displacement.svg")),
        "Displacement vs Time",
        ("Time (s)", "Displacement (pm)"),
        &trace.time_s,
        &trace.displacement(),
    )?;
    plot::spectrum_chart(
        &dir.join(format!("{stem}_fft.svg")),
        "FFT of Displacement",
        spectrum,
        peaks,
    )
}
