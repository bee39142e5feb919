use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::analysis::{
    arctan_displacement, differential, magnitude_spectrum, mean, rms, PeakCriteria, PeakSummary,
    Spectrum,
};
use crate::config::{ChannelSettings, DemodChannels, FuncgenConfig, ScopeConfig};
use crate::error::LabError;
use crate::funcgen::FunctionGenerator;
use crate::grid::{GridPoint, SweepGrid};
use crate::ids::{background_capture, StreamingDevice};
use crate::plot;
use crate::results::{MetricRecord, ResultsLog};
use crate::scope::{AcquireOutcome, Oscilloscope};
use crate::scpi::ScpiTransport;
use crate::waveform::Capture;

/// Waits around each output state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub output_on_settle: Duration,
    pub output_off_settle: Duration,
}

impl Timing {
    pub fn from_config(cfg: &FuncgenConfig) -> Self {
        Self {
            output_on_settle: Duration::from_millis(cfg.output_on_settle_ms),
            output_off_settle: Duration::from_millis(cfg.output_off_settle_ms),
        }
    }

    pub fn none() -> Self {
        Self {
            output_on_settle: Duration::ZERO,
            output_off_settle: Duration::ZERO,
        }
    }
}

/// Where the bench is within one grid point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointPhase {
    Idle,
    Configuring,
    Acquiring,
}

/// A way of measuring the response at one grid point.
pub trait Acquisition {
    fn name(&self) -> &'static str;

    /// One-off instrument setup before the first point.
    fn prepare(&mut self) -> Result<(), LabError> {
        Ok(())
    }

    /// Measure while the excitation is on. `None` means nothing is appended
    /// for this point.
    fn acquire(&mut self, point: &GridPoint) -> Result<Option<MetricRecord>, LabError>;
}

impl<A: Acquisition + ?Sized> Acquisition for Box<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn prepare(&mut self) -> Result<(), LabError> {
        (**self).prepare()
    }

    fn acquire(&mut self, point: &GridPoint) -> Result<Option<MetricRecord>, LabError> {
        (**self).acquire(point)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub points: usize,
    pub recorded: usize,
}

/// Step the function generator through `grid`, amplitude outer, measuring
/// each point with `acquisition`.
///
/// An error aborts the sweep as is: the generator output is not switched
/// back off and lines already appended stay in the results file.
pub fn run_sweep<T, A>(
    grid: &SweepGrid,
    funcgen: &mut FunctionGenerator<T>,
    timing: Timing,
    acquisition: &mut A,
    results: Option<&ResultsLog>,
) -> Result<SweepSummary, LabError>
where
    T: ScpiTransport,
    A: Acquisition + ?Sized,
{
    info!(
        "starting {} sweep over {} points",
        acquisition.name(),
        grid.len()
    );
    acquisition.prepare()?;

    let mut summary = SweepSummary::default();
    for point in grid.points() {
        let mut phase = PointPhase::Idle;
        enter(&mut phase, PointPhase::Configuring, &point);
        funcgen.configure_sine(point.amplitude_v, point.frequency_hz)?;
        funcgen.set_output(true)?;
        settle(timing.output_on_settle);

        enter(&mut phase, PointPhase::Acquiring, &point);
        info!(
            "starting acquisition for amplitude: {} V and frequency: {} Hz",
            point.amplitude_v, point.frequency_hz
        );
        let record = acquisition.acquire(&point)?;

        funcgen.set_output(false)?;
        settle(timing.output_off_settle);
        enter(&mut phase, PointPhase::Idle, &point);

        summary.points += 1;
        if let Some(record) = record {
            info!("writing results: {record}");
            if let Some(log) = results {
                log.append(&record)?;
            }
            summary.recorded += 1;
        }
    }

    info!(
        "sweep finished: {} points, {} records",
        summary.points, summary.recorded
    );
    Ok(summary)
}

fn enter(phase: &mut PointPhase, next: PointPhase, point: &GridPoint) {
    debug!(
        "{} V / {} Hz: {:?} -> {:?}",
        point.amplitude_v, point.frequency_hz, phase, next
    );
    *phase = next;
}

fn settle(wait: Duration) {
    if !wait.is_zero() {
        thread::sleep(wait);
    }
}

/// Scope with its channel and record setup, shared by the scope metrics.
pub struct ScopeSession<T: ScpiTransport> {
    scope: Oscilloscope<T>,
    channels: Vec<ChannelSettings>,
    window_s: f64,
    acquire_mode: String,
    stale_acquisitions: usize,
}

impl<T: ScpiTransport> ScopeSession<T> {
    pub fn new(scope: Oscilloscope<T>, cfg: &ScopeConfig) -> Self {
        Self {
            scope,
            channels: cfg.channels.clone(),
            window_s: cfg.time_window_s,
            acquire_mode: cfg.acquire_mode.clone(),
            stale_acquisitions: 0,
        }
    }

    pub fn scope(&self) -> &Oscilloscope<T> {
        &self.scope
    }

    pub fn window_s(&self) -> f64 {
        self.window_s
    }

    /// Number of acquisitions whose completion wait timed out.
    pub fn stale_acquisitions(&self) -> usize {
        self.stale_acquisitions
    }

    /// Reset, set up every channel, the horizontal system and the transfer
    /// format.
    pub fn prepare(&mut self) -> Result<(), LabError> {
        self.scope.initialize()?;
        self.scope
            .configure_channels(&self.channels, &self.acquire_mode)?;
        let record_length = self
            .scope
            .configure_horizontal(&self.channels, self.window_s)?;
        self.scope.configure_transfer(record_length)?;
        Ok(())
    }

    /// Run one sequence, carrying on with whatever the scope holds when the
    /// completion wait times out.
    pub fn trigger(&mut self) -> Result<(), LabError> {
        if self.scope.acquire()? == AcquireOutcome::TimedOut {
            self.stale_acquisitions += 1;
            warn!("continuing with the previous record");
        }
        Ok(())
    }

    /// Trigger, then read every configured channel.
    pub fn capture_all(&mut self) -> Result<Capture, LabError> {
        self.trigger()?;
        Ok(self.scope.capture(&self.channels, self.window_s)?)
    }

    /// Trigger, then read only `names`.
    pub fn capture_only(&mut self, names: &[&str]) -> Result<Capture, LabError> {
        self.trigger()?;
        let mut capture = Capture::new();
        for name in names {
            let Some(ch) = self.channels.iter().find(|c| c.name == *name) else {
                warn!("{name} is not a configured scope channel");
                continue;
            };
            let record_length = ch.record_length(self.window_s);
            capture.insert(self.scope.fetch_waveform(name, record_length)?);
        }
        Ok(capture)
    }
}

/// Displacement recovered from the two quadrature pairs of one capture.
#[derive(Clone, Debug)]
pub struct Demodulated {
    pub time_s: Vec<f64>,
    pub displacement_pm: Vec<f64>,
    pub sample_interval: f64,
}

/// `atan2(sine+ - sine-, cosine+ - cosine-)` scaled to picometres.
///
/// `None` unless all four channels were captured.
pub fn demodulate(capture: &Capture, demod: &DemodChannels, pm_per_degree: f64) -> Option<Demodulated> {
    let sp = capture.channel(&demod.sine_plus)?;
    let sm = capture.channel(&demod.sine_minus)?;
    let cp = capture.channel(&demod.cosine_plus)?;
    let cm = capture.channel(&demod.cosine_minus)?;

    let sine = differential(&sp.volts, &sm.volts);
    let cosine = differential(&cp.volts, &cm.volts);
    let displacement_pm = arctan_displacement(&sine, &cosine, pm_per_degree);
    let time_s = sm.time_s[..displacement_pm.len().min(sm.time_s.len())].to_vec();

    Some(Demodulated {
        time_s,
        displacement_pm,
        sample_interval: sm.sample_interval(),
    })
}

/// First spectral peak of the demodulated displacement, written as
/// `a V, f Hz, peak Hz, magnitude`.
pub struct ScopeArctanPeak<T: ScpiTransport> {
    session: ScopeSession<T>,
    demod: DemodChannels,
    pm_per_degree: f64,
    criteria: PeakCriteria,
    plot_dir: Option<PathBuf>,
}

impl<T: ScpiTransport> ScopeArctanPeak<T> {
    pub fn new(
        session: ScopeSession<T>,
        demod: DemodChannels,
        pm_per_degree: f64,
        criteria: PeakCriteria,
    ) -> Self {
        Self {
            session,
            demod,
            pm_per_degree,
            criteria,
            plot_dir: None,
        }
    }

    pub fn with_plots(mut self, dir: Option<PathBuf>) -> Self {
        self.plot_dir = dir;
        self
    }

    pub fn session(&self) -> &ScopeSession<T> {
        &self.session
    }

    fn render(
        &self,
        dir: &Path,
        point: &GridPoint,
        demod: &Demodulated,
        spectrum: &Spectrum,
        peaks: &PeakSummary,
    ) -> Result<(), LabError> {
        let stem = point.file_stem();
        let title = format!("{} V and {} Hz", point.amplitude_v, point.frequency_hz);
        plot::line_chart(
            &dir.join(format!("{stem}_arctan.svg")),
            &format!("Arctangent IDS for {title}"),
            ("Time (seconds)", "Result (pm)"),
            &demod.time_s,
            &demod.displacement_pm,
        )?;
        plot::spectrum_chart(
            &dir.join(format!("{stem}_fft.svg")),
            &format!("FFT IDS for {title}"),
            spectrum,
            peaks,
        )
    }
}

impl<T: ScpiTransport> Acquisition for ScopeArctanPeak<T> {
    fn name(&self) -> &'static str {
        "arctan-peak"
    }

    fn prepare(&mut self) -> Result<(), LabError> {
        self.session.prepare()
    }

    fn acquire(&mut self, point: &GridPoint) -> Result<Option<MetricRecord>, LabError> {
        let capture = self.session.capture_all()?;
        let Some(demod) = demodulate(&capture, &self.demod, self.pm_per_degree) else {
            warn!(
                "capture lacks one of {:?}, nothing recorded",
                self.demod.all()
            );
            return Ok(None);
        };
        debug!("arctangent computed over {} samples", demod.displacement_pm.len());

        let spectrum = magnitude_spectrum(
            &demod.displacement_pm,
            demod.sample_interval,
            self.criteria.zero_low_bins,
        )?;
        let peaks = self.criteria.pick(&spectrum);
        for peak in &peaks.peaks {
            info!(
                "peak detected at frequency: {} Hz with magnitude: {}",
                peak.frequency_hz, peak.magnitude
            );
        }

        if let Some(dir) = &self.plot_dir {
            self.render(dir, point, &demod, &spectrum, &peaks)?;
        }

        let first = peaks.first();
        Ok(Some(
            MetricRecord::new(*point)
                .hz(first.map(|p| p.frequency_hz))
                .value(first.map(|p| p.magnitude)),
        ))
    }
}

/// RMS and mean of one scope channel, written as `a V, f Hz, rms, mean`.
pub struct ScopeChannelRms<T: ScpiTransport> {
    session: ScopeSession<T>,
    channel: String,
}

impl<T: ScpiTransport> ScopeChannelRms<T> {
    pub fn new(session: ScopeSession<T>, channel: &str) -> Self {
        Self {
            session,
            channel: channel.to_string(),
        }
    }

    pub fn session(&self) -> &ScopeSession<T> {
        &self.session
    }
}

impl<T: ScpiTransport> Acquisition for ScopeChannelRms<T> {
    fn name(&self) -> &'static str {
        "rms"
    }

    fn prepare(&mut self) -> Result<(), LabError> {
        self.session.prepare()
    }

    fn acquire(&mut self, point: &GridPoint) -> Result<Option<MetricRecord>, LabError> {
        let capture = self.session.capture_only(&[self.channel.as_str()])?;
        let volts = capture
            .channel(&self.channel)
            .map(|w| w.volts.as_slice())
            .unwrap_or_default();
        Ok(Some(
            MetricRecord::new(*point)
                .value(rms(volts))
                .value(mean(volts)),
        ))
    }
}

/// Records one `.aws` stream per point; metrics come later from replay.
pub struct IdsStreaming<D: StreamingDevice> {
    device: D,
    data_dir: PathBuf,
    duration: Duration,
}

impl<D: StreamingDevice> IdsStreaming<D> {
    pub fn new(device: D, data_dir: impl Into<PathBuf>, duration: Duration) -> Self {
        Self {
            device,
            data_dir: data_dir.into(),
            duration,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn target(&self, point: &GridPoint) -> PathBuf {
        self.data_dir.join(format!("{}.aws", point.file_stem()))
    }
}

impl<D: StreamingDevice> Acquisition for IdsStreaming<D> {
    fn name(&self) -> &'static str {
        "ids-stream"
    }

    fn prepare(&mut self) -> Result<(), LabError> {
        self.device.connect()
    }

    fn acquire(&mut self, point: &GridPoint) -> Result<Option<MetricRecord>, LabError> {
        let target = self.target(point);
        background_capture(&mut self.device, &target, self.duration)?;
        Ok(None)
    }
}

/// One trace taken outside a sweep.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Channel name, or `arctan` for the demodulated displacement
    pub source: String,
    pub time_s: Vec<f64>,
    pub values: Vec<f64>,
    pub sample_interval: f64,
}

impl Snapshot {
    pub fn is_demodulated(&self) -> bool {
        self.source == "arctan"
    }

    /// `time_s, <source>` rows with a header line.
    pub fn write_csv(&self, path: &Path) -> Result<(), LabError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["time_s", self.source.as_str()])?;
        for (t, v) in self.time_s.iter().zip(&self.values) {
            writer.serialize((t, v))?;
        }
        writer.flush().map_err(|e| LabError::file(path, e))?;
        info!("saved {} samples to {}", self.values.len(), path.display());
        Ok(())
    }
}

/// Prepare the scope, acquire once and reduce the capture to one trace.
///
/// The trace is the arctangent displacement when all four quadrature
/// channels were captured, otherwise the first channel in volts.
pub fn snapshot<T: ScpiTransport>(
    session: &mut ScopeSession<T>,
    demod: &DemodChannels,
    pm_per_degree: f64,
    crop_s: Option<f64>,
) -> Result<Snapshot, LabError> {
    session.prepare()?;
    let mut capture = session.capture_all()?;
    if let Some(seconds) = crop_s {
        capture.crop(seconds);
    }

    if let Some(d) = demodulate(&capture, demod, pm_per_degree) {
        return Ok(Snapshot {
            source: "arctan".to_string(),
            time_s: d.time_s,
            values: d.displacement_pm,
            sample_interval: d.sample_interval,
        });
    }
    let first = capture
        .iter()
        .next()
        .ok_or_else(|| LabError::EmptySignal(0))?;
    warn!("quadrature channels incomplete, keeping {} only", first.channel);
    Ok(Snapshot {
        source: first.channel.clone(),
        time_s: first.time_s.clone(),
        values: first.volts.clone(),
        sample_interval: first.sample_interval(),
    })
}

/// Switch the output off, program a tone, play it for `duration` and switch
/// off again.
pub fn play_tone<T: ScpiTransport>(
    funcgen: &mut FunctionGenerator<T>,
    amplitude_v: f64,
    frequency_hz: f64,
    duration: Duration,
    timing: Timing,
) -> Result<(), LabError> {
    funcgen.clear()?;
    funcgen.set_output(false)?;
    settle(timing.output_off_settle);

    funcgen.configure_level(amplitude_v, frequency_hz)?;
    funcgen.set_output(true)?;
    info!("playing {amplitude_v} V at {frequency_hz} Hz for {duration:?}");
    settle(duration);
    funcgen.set_output(false)?;
    Ok(())
}

/// Peaks in the spectrum of the ideal sine the generator should emit,
/// sampled at `rate_hz`.
pub fn reference_peaks(
    amplitude_v: f64,
    frequency_hz: f64,
    duration_s: f64,
    rate_hz: f64,
) -> Result<PeakSummary, LabError> {
    let n = (duration_s * rate_hz) as usize;
    let dt = 1.0 / rate_hz;
    let wave: Vec<f64> = (0..n)
        .map(|i| amplitude_v * (std::f64::consts::TAU * frequency_hz * i as f64 * dt).sin())
        .collect();
    let spectrum = magnitude_spectrum(&wave, dt, 0)?;
    let criteria = PeakCriteria {
        height_fraction: 0.5,
        min_distance: 1,
        min_prominence: 0.0,
        zero_low_bins: 0,
    };
    Ok(criteria.pick(&spectrum))
}
