use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::{PeakCriteria, PM_PER_DEGREE};
use crate::error::LabError;
use crate::grid::{SweepGrid, SweepRange};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Raw SCPI socket at `address`
    #[default]
    Socket,
    /// NI-VISA session at `resource` (requires the `visa` feature)
    Visa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default)]
    pub transport: TransportKind,
    /// `host:port` for socket transport
    pub address: String,
    /// VISA resource string
    pub resource: String,
    #[serde(default = "InstrumentConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "InstrumentConfig::default_write_termination")]
    pub write_termination: String,
}

impl InstrumentConfig {
    fn default_timeout_ms() -> u64 {
        5_000
    }
    fn default_write_termination() -> String {
        "\n".to_string()
    }

    fn lan(ip: &str, timeout_ms: u64) -> Self {
        Self {
            transport: TransportKind::default(),
            address: format!("{ip}:5025"),
            resource: format!("TCPIP0::{ip}::INSTR"),
            timeout_ms,
            write_termination: Self::default_write_termination(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncgenConfig {
    #[serde(default = "FuncgenConfig::default_instrument")]
    pub instrument: InstrumentConfig,
    #[serde(default = "FuncgenConfig::default_channel")]
    pub channel: u8,
    #[serde(default = "FuncgenConfig::default_waveform")]
    pub waveform: String,
    /// Wait after enabling the output before acquiring
    #[serde(default = "FuncgenConfig::default_settle_ms")]
    pub output_on_settle_ms: u64,
    /// Wait after disabling the output before the next point
    #[serde(default = "FuncgenConfig::default_settle_ms")]
    pub output_off_settle_ms: u64,
}

impl FuncgenConfig {
    fn default_instrument() -> InstrumentConfig {
        InstrumentConfig::lan("192.168.1.4", InstrumentConfig::default_timeout_ms())
    }
    fn default_channel() -> u8 {
        1
    }
    fn default_waveform() -> String {
        "SIN".to_string()
    }
    fn default_settle_ms() -> u64 {
        1_000
    }
}

impl Default for FuncgenConfig {
    fn default() -> Self {
        Self {
            instrument: Self::default_instrument(),
            channel: Self::default_channel(),
            waveform: Self::default_waveform(),
            output_on_settle_ms: Self::default_settle_ms(),
            output_off_settle_ms: Self::default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSettings {
    pub name: String,
    #[serde(default = "ChannelSettings::default_sampling_rate")]
    pub sampling_rate_hz: f64,
    #[serde(default = "ChannelSettings::default_volts_per_div")]
    pub volts_per_div: f64,
    #[serde(default = "ChannelSettings::default_coupling")]
    pub coupling: String,
    #[serde(default = "ChannelSettings::default_attenuation")]
    pub attenuation: f64,
}

impl ChannelSettings {
    fn default_sampling_rate() -> f64 {
        1e5
    }
    fn default_volts_per_div() -> f64 {
        0.1
    }
    fn default_coupling() -> String {
        "AC".to_string()
    }
    fn default_attenuation() -> f64 {
        1.0
    }

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sampling_rate_hz: Self::default_sampling_rate(),
            volts_per_div: Self::default_volts_per_div(),
            coupling: Self::default_coupling(),
            attenuation: Self::default_attenuation(),
        }
    }

    pub fn record_length(&self, window_s: f64) -> usize {
        (self.sampling_rate_hz * window_s) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default = "ScopeConfig::default_instrument")]
    pub instrument: InstrumentConfig,
    #[serde(default = "ScopeConfig::default_channels")]
    pub channels: Vec<ChannelSettings>,
    #[serde(default = "ScopeConfig::default_time_window_s")]
    pub time_window_s: f64,
    #[serde(default = "ScopeConfig::default_acquire_mode")]
    pub acquire_mode: String,
    /// Pause after switching the data source
    #[serde(default = "ScopeConfig::default_source_settle_ms")]
    pub source_settle_ms: u64,
}

impl ScopeConfig {
    fn default_instrument() -> InstrumentConfig {
        // Long records take a while to acquire and transfer
        InstrumentConfig::lan("192.168.1.10", 100_000)
    }
    fn default_channels() -> Vec<ChannelSettings> {
        ["CH1", "CH2", "CH3", "CH4"]
            .into_iter()
            .map(ChannelSettings::new)
            .collect()
    }
    fn default_time_window_s() -> f64 {
        11.0
    }
    fn default_acquire_mode() -> String {
        "HIRES".to_string()
    }
    fn default_source_settle_ms() -> u64 {
        100
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSettings> {
        self.channels.iter().find(|c| c.name == name)
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            instrument: Self::default_instrument(),
            channels: Self::default_channels(),
            time_window_s: Self::default_time_window_s(),
            acquire_mode: Self::default_acquire_mode(),
            source_settle_ms: Self::default_source_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsConfig {
    #[serde(default = "IdsConfig::default_address")]
    pub address: String,
    /// Vendor streaming rate setting, passed through unchanged
    #[serde(default = "IdsConfig::default_stream_rate")]
    pub stream_rate: u32,
    #[serde(default = "IdsConfig::default_axes")]
    pub axes: Vec<u8>,
    /// Wall-clock duration of each background stream
    #[serde(default = "IdsConfig::default_capture_ms")]
    pub capture_ms: u64,
    /// Helper started for each stream; may keep running until stopped
    #[serde(default)]
    pub start_command: Vec<String>,
    /// Helper that ends a stream; without it the start helper is killed
    #[serde(default)]
    pub stop_command: Vec<String>,
    /// Helper that prints an `.aws` file as CSV rows on stdout
    #[serde(default)]
    pub convert_command: Vec<String>,
}

impl IdsConfig {
    fn default_address() -> String {
        "192.168.1.1".to_string()
    }
    fn default_stream_rate() -> u32 {
        10
    }
    fn default_axes() -> Vec<u8> {
        vec![0]
    }
    fn default_capture_ms() -> u64 {
        10_000
    }
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            stream_rate: Self::default_stream_rate(),
            axes: Self::default_axes(),
            capture_ms: Self::default_capture_ms(),
            start_command: Vec::new(),
            stop_command: Vec::new(),
            convert_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "SweepConfig::default_amplitude")]
    pub amplitude_v: SweepRange,
    #[serde(default = "SweepConfig::default_frequency")]
    pub frequency_hz: SweepRange,
}

impl SweepConfig {
    fn default_amplitude() -> SweepRange {
        SweepRange::new(0.05, 1.0, 0.05)
    }
    fn default_frequency() -> SweepRange {
        SweepRange::new(20.0, 300.0, 20.0)
    }

    pub fn grid(&self) -> Result<SweepGrid, LabError> {
        SweepGrid::new(&self.amplitude_v, &self.frequency_hz)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            amplitude_v: Self::default_amplitude(),
            frequency_hz: Self::default_frequency(),
        }
    }
}

/// Channels combined into the quadrature pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemodChannels {
    pub sine_plus: String,
    pub sine_minus: String,
    pub cosine_plus: String,
    pub cosine_minus: String,
}

impl DemodChannels {
    pub fn all(&self) -> [&str; 4] {
        [
            &self.sine_plus,
            &self.sine_minus,
            &self.cosine_plus,
            &self.cosine_minus,
        ]
    }
}

impl Default for DemodChannels {
    fn default() -> Self {
        Self {
            sine_plus: "CH1".to_string(),
            sine_minus: "CH2".to_string(),
            cosine_plus: "CH3".to_string(),
            cosine_minus: "CH4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "AnalysisConfig::default_pm_per_degree")]
    pub pm_per_degree: f64,
    #[serde(default)]
    pub demod: DemodChannels,
    #[serde(default)]
    pub scope_peaks: PeakCriteria,
    #[serde(default = "PeakCriteria::replay")]
    pub replay_peaks: PeakCriteria,
    /// Channel reduced to RMS/mean by the `rms` metric
    #[serde(default = "AnalysisConfig::default_rms_channel")]
    pub rms_channel: String,
    /// Sample rate of the ideal sine the `tone` command analyzes
    #[serde(default = "AnalysisConfig::default_tone_reference_rate_hz")]
    pub tone_reference_rate_hz: f64,
}

impl AnalysisConfig {
    fn default_pm_per_degree() -> f64 {
        PM_PER_DEGREE
    }
    fn default_rms_channel() -> String {
        "CH1".to_string()
    }
    fn default_tone_reference_rate_hz() -> f64 {
        10_000.0
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pm_per_degree: Self::default_pm_per_degree(),
            demod: DemodChannels::default(),
            scope_peaks: PeakCriteria::default(),
            replay_peaks: PeakCriteria::replay(),
            rms_channel: Self::default_rms_channel(),
            tone_reference_rate_hz: Self::default_tone_reference_rate_hz(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where `.aws` streams and CSV replays live
    #[serde(default = "OutputConfig::default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "OutputConfig::default_first_peak")]
    pub first_peak: PathBuf,
    #[serde(default = "OutputConfig::default_rms")]
    pub rms: PathBuf,
    #[serde(default = "OutputConfig::default_replay_ratio")]
    pub replay_ratio: PathBuf,
    #[serde(default = "OutputConfig::default_replay_first_peak")]
    pub replay_first_peak: PathBuf,
    /// Per-point trace and spectrum plots are written here when set
    #[serde(default)]
    pub plot_dir: Option<PathBuf>,
}

impl OutputConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from(".")
    }
    fn default_first_peak() -> PathBuf {
        PathBuf::from("output_1peak.txt")
    }
    fn default_rms() -> PathBuf {
        PathBuf::from("output_rms.txt")
    }
    fn default_replay_ratio() -> PathBuf {
        PathBuf::from("output_ids_peakratio_1.txt")
    }
    fn default_replay_first_peak() -> PathBuf {
        PathBuf::from("output_ids_firstpeak_1.txt")
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            first_peak: Self::default_first_peak(),
            rms: Self::default_rms(),
            replay_ratio: Self::default_replay_ratio(),
            replay_first_peak: Self::default_replay_first_peak(),
            plot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabConfig {
    #[serde(default)]
    pub funcgen: FuncgenConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub ids: IdsConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl LabConfig {
    /// Read `path`, falling back to the built-in bench defaults when the file
    /// does not exist. A file that exists but does not parse is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, LabError> {
        if !path.exists() {
            info!("{} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| LabError::file(path, e))?;
        let cfg = Self::from_toml(&contents)?;
        info!("loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> Result<Self, LabError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml(&self) -> Result<String, LabError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
