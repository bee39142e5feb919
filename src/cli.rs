use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Sensor frequency-response sweeps and offline analysis")]
pub struct Args {
    /// Path to config TOML
    #[arg(long, global = true, default_value = "lab.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Metric {
    /// First spectral peak of the demodulated displacement
    ArctanPeak,
    /// RMS and mean of one channel
    Rms,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sweep the function generator and measure on the oscilloscope
    ScopeSweep {
        #[arg(long, value_enum, default_value_t = Metric::ArctanPeak)]
        metric: Metric,

        /// Results file (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Sweep the function generator and record one IDS stream per point
    IdsSweep,

    /// Re-analyze exported IDS streams found in the data directory
    Replay {
        /// Folder holding `data_<a>_<f>.csv` (overrides config)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Export every `.aws` stream in a folder to CSV
    Convert {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,
    },

    /// Single acquisition of all scope channels
    Capture {
        /// CSV file receiving `time, value` rows
        #[arg(long, default_value = "capture.csv")]
        output: PathBuf,

        /// Keep only the first seconds of the record
        #[arg(long)]
        crop_s: Option<f64>,
    },

    /// Play one sine on the function generator for a fixed time
    Tone {
        #[arg(long, default_value_t = 0.25)]
        amplitude: f64,

        #[arg(long, default_value_t = 20.0)]
        frequency: f64,

        #[arg(long, default_value_t = 10.0)]
        duration_s: f64,
    },

    /// Restore the oscilloscope's factory settings
    ResetScope,

    /// Color map of the last column of a results file
    Colorplot {
        #[arg(value_name = "RESULTS")]
        results: PathBuf,

        #[arg(long, default_value = "colorplot.svg")]
        output: PathBuf,

        /// Cells below this value are drawn white
        #[arg(long, default_value_t = 0.01)]
        vmin: f64,
    },

    /// Error-bar plots of `f, ids_mean, ids_std, acc_mean, acc_std` lines
    RmsPlot {
        #[arg(value_name = "RESULTS")]
        results: PathBuf,

        /// Prefix of the two SVG files written
        #[arg(long, default_value = "rms")]
        output: PathBuf,
    },

    /// Print the effective configuration as TOML
    PrintConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sweep_with_metric() {
        let args = Args::parse_from(["sensor_sweep", "scope-sweep", "--metric", "rms"]);
        assert_eq!(args.config, PathBuf::from("lab.toml"));
        assert!(matches!(
            args.command,
            Command::ScopeSweep {
                metric: Metric::Rms,
                output: None
            }
        ));
    }

    #[test]
    fn global_config_after_subcommand() {
        let args = Args::parse_from([
            "sensor_sweep",
            "tone",
            "--amplitude",
            "0.5",
            "--config",
            "bench.toml",
        ]);
        assert_eq!(args.config, PathBuf::from("bench.toml"));
        match args.command {
            Command::Tone {
                amplitude,
                frequency,
                duration_s,
            } => {
                assert_eq!(amplitude, 0.5);
                assert_eq!(frequency, 20.0);
                assert_eq!(duration_s, 10.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn convert_requires_folder() {
        assert!(Args::try_parse_from(["sensor_sweep", "convert"]).is_err());
        let args = Args::try_parse_from(["sensor_sweep", "capture", "--crop-s", "2.5"]).unwrap();
        assert!(matches!(args.command, Command::Capture { crop_s: Some(c), .. } if c == 2.5));
    }
}
