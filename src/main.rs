mod analysis;
mod cli;
mod config;
mod convert;
mod error;
mod experiment;
mod funcgen;
mod grid;
mod ids;
#[cfg(test)]
mod mock;
mod plot;
mod replay;
mod report;
mod results;
mod scope;
mod scpi;
#[cfg(feature = "visa")]
mod visa;
mod waveform;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use cli::{Args, Command, Metric};
use config::{InstrumentConfig, LabConfig, TransportKind};
use experiment::{
    Acquisition, IdsStreaming, ScopeArctanPeak, ScopeChannelRms, ScopeSession, Timing,
};
use funcgen::FunctionGenerator;
use ids::CommandBridge;
use replay::ReplayOutputs;
use results::ResultsLog;
use scope::Oscilloscope;
use scpi::{ScpiTransport, TcpInstrument};

type Link = Box<dyn ScpiTransport>;

fn open_transport(cfg: &InstrumentConfig) -> Result<Link> {
    match cfg.transport {
        TransportKind::Socket => {
            let link =
                TcpInstrument::connect(cfg.address.as_str(), cfg.timeout(), &cfg.write_termination)
                    .with_context(|| format!("failed to connect to {}", cfg.address))?;
            info!("connected to {}", cfg.address);
            Ok(Box::new(link))
        }
        #[cfg(feature = "visa")]
        TransportKind::Visa => {
            let link =
                visa::VisaInstrument::open(&cfg.resource, cfg.timeout(), &cfg.write_termination)
                    .with_context(|| format!("failed to open {}", cfg.resource))?;
            info!("opened {}", cfg.resource);
            Ok(Box::new(link))
        }
        #[cfg(not(feature = "visa"))]
        TransportKind::Visa => bail!(
            "{} needs the VISA transport; rebuild with `--features visa`",
            cfg.resource
        ),
    }
}

fn open_funcgen(cfg: &LabConfig) -> Result<FunctionGenerator<Link>> {
    let link = open_transport(&cfg.funcgen.instrument).context("function generator")?;
    Ok(FunctionGenerator::new(
        link,
        cfg.funcgen.channel,
        &cfg.funcgen.waveform,
    ))
}

fn open_scope(cfg: &LabConfig) -> Result<Oscilloscope<Link>> {
    let link = open_transport(&cfg.scope.instrument).context("oscilloscope")?;
    Ok(Oscilloscope::new(
        link,
        Duration::from_millis(cfg.scope.source_settle_ms),
    ))
}

fn scope_sweep(cfg: &LabConfig, metric: Metric, output: Option<PathBuf>) -> Result<()> {
    let grid = cfg.sweep.grid()?;
    let mut funcgen = open_funcgen(cfg)?;
    let session = ScopeSession::new(open_scope(cfg)?, &cfg.scope);

    let default_output = match metric {
        Metric::ArctanPeak => &cfg.output.first_peak,
        Metric::Rms => &cfg.output.rms,
    };
    let mut backend: Box<dyn Acquisition> = match metric {
        Metric::ArctanPeak => Box::new(
            ScopeArctanPeak::new(
                session,
                cfg.analysis.demod.clone(),
                cfg.analysis.pm_per_degree,
                cfg.analysis.scope_peaks.clone(),
            )
            .with_plots(cfg.output.plot_dir.clone()),
        ),
        Metric::Rms => Box::new(ScopeChannelRms::new(session, &cfg.analysis.rms_channel)),
    };
    let log = ResultsLog::new(output.unwrap_or_else(|| default_output.clone()));

    let summary = experiment::run_sweep(
        &grid,
        &mut funcgen,
        Timing::from_config(&cfg.funcgen),
        &mut backend,
        Some(&log),
    )?;
    info!(
        "{} records appended to {}",
        summary.recorded,
        log.path().display()
    );
    Ok(())
}

fn ids_sweep(cfg: &LabConfig) -> Result<()> {
    let grid = cfg.sweep.grid()?;
    let mut funcgen = open_funcgen(cfg)?;
    let mut streaming = IdsStreaming::new(
        CommandBridge::from_config(&cfg.ids),
        &cfg.output.data_dir,
        Duration::from_millis(cfg.ids.capture_ms),
    );
    experiment::run_sweep(
        &grid,
        &mut funcgen,
        Timing::from_config(&cfg.funcgen),
        &mut streaming,
        None,
    )?;
    info!("streams saved under {}", cfg.output.data_dir.display());
    Ok(())
}

fn replay_sweep(cfg: &LabConfig, data_dir: Option<PathBuf>) -> Result<()> {
    let grid = cfg.sweep.grid()?;
    let data_dir = data_dir.unwrap_or_else(|| cfg.output.data_dir.clone());
    let outputs = ReplayOutputs {
        ratio: ResultsLog::new(&cfg.output.replay_ratio),
        first_peak: ResultsLog::new(&cfg.output.replay_first_peak),
    };
    replay::replay_grid(
        &grid,
        &data_dir,
        &cfg.analysis.replay_peaks,
        &outputs,
        cfg.output.plot_dir.as_deref(),
    )?;
    Ok(())
}

fn capture(cfg: &LabConfig, output: &Path, crop_s: Option<f64>) -> Result<()> {
    let mut session = ScopeSession::new(open_scope(cfg)?, &cfg.scope);
    let snap = experiment::snapshot(
        &mut session,
        &cfg.analysis.demod,
        cfg.analysis.pm_per_degree,
        crop_s,
    )?;
    snap.write_csv(output)?;

    let spectrum = analysis::magnitude_spectrum(
        &snap.values,
        snap.sample_interval,
        cfg.analysis.scope_peaks.zero_low_bins,
    )?;
    let peaks = cfg.analysis.scope_peaks.pick(&spectrum);
    for peak in &peaks.peaks {
        info!(
            "peak detected at frequency: {} Hz with magnitude: {}",
            peak.frequency_hz, peak.magnitude
        );
    }

    let y_label = if snap.is_demodulated() {
        "Result (pm)"
    } else {
        "Voltage (V)"
    };
    plot::line_chart(
        &output.with_extension("trace.svg"),
        &format!("{} trace", snap.source),
        ("Time (seconds)", y_label),
        &snap.time_s,
        &snap.values,
    )?;
    plot::spectrum_chart(
        &output.with_extension("fft.svg"),
        &format!("FFT of {}", snap.source),
        &spectrum,
        &peaks,
    )?;
    Ok(())
}

fn tone(cfg: &LabConfig, amplitude: f64, frequency: f64, duration_s: f64) -> Result<()> {
    if !(duration_s.is_finite() && duration_s >= 0.0) {
        bail!("duration must be a non-negative number of seconds, got {duration_s}");
    }
    let mut funcgen = open_funcgen(cfg)?;
    experiment::play_tone(
        &mut funcgen,
        amplitude,
        frequency,
        Duration::from_secs_f64(duration_s),
        Timing::from_config(&cfg.funcgen),
    )?;

    let rate_hz = cfg.analysis.tone_reference_rate_hz;
    if duration_s * rate_hz < 2.0 {
        return Ok(());
    }
    let expected = experiment::reference_peaks(amplitude, frequency, duration_s, rate_hz)?;
    for peak in &expected.peaks {
        info!(
            "reference peak: {:.2} Hz, magnitude {:.5}",
            peak.frequency_hz, peak.magnitude
        );
    }
    Ok(())
}

fn colorplot(results_path: &Path, output: &Path, vmin: f64) -> Result<()> {
    let lines = results::read_results(results_path)?;
    let map = report::HeatMap::from_lines(&lines)?;
    plot::heatmap(
        output,
        "Color Plot of First Peak Magnitudes",
        &map,
        vmin,
    )?;
    info!("color map written to {}", output.display());
    Ok(())
}

fn rms_plot(results_path: &Path, prefix: &Path) -> Result<()> {
    let lines = results::read_results(results_path)?;
    let grouped = report::group_by_frequency(&report::rms_rows(&lines));
    if grouped.is_empty() {
        bail!("{} has no complete RMS lines", results_path.display());
    }

    let stem = prefix.display();
    plot::error_bar_chart(
        Path::new(&format!("{stem}_ids.svg")),
        "RMS acceleration (IDS)",
        &grouped,
        |r| (r.ids_mean, r.ids_std),
    )?;
    plot::error_bar_chart(
        Path::new(&format!("{stem}_acc.svg")),
        "RMS acceleration (ACC)",
        &grouped,
        |r| (r.acc_mean, r.acc_std),
    )?;
    info!("RMS plots written with prefix {stem}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = LabConfig::load_or_default(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    match args.command {
        Command::ScopeSweep { metric, output } => scope_sweep(&cfg, metric, output),
        Command::IdsSweep => ids_sweep(&cfg),
        Command::Replay { data_dir } => replay_sweep(&cfg, data_dir),
        Command::Convert { folder } => {
            let mut bridge = CommandBridge::from_config(&cfg.ids);
            let written = convert::convert_folder(&mut bridge, &folder)?;
            info!("converted {} streams", written.len());
            Ok(())
        }
        Command::Capture { output, crop_s } => capture(&cfg, &output, crop_s),
        Command::Tone {
            amplitude,
            frequency,
            duration_s,
        } => tone(&cfg, amplitude, frequency, duration_s),
        Command::ResetScope => {
            open_scope(&cfg)?.factory_reset()?;
            Ok(())
        }
        Command::Colorplot {
            results,
            output,
            vmin,
        } => colorplot(&results, &output, vmin),
        Command::RmsPlot { results, output } => rms_plot(&results, &output),
        Command::PrintConfig => {
            println!("{}", cfg.to_toml()?);
            Ok(())
        }
    }
}
