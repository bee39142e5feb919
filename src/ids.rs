//! Interferometric displacement sensor (IDS) streaming sessions.
//!
//! The sensor's vendor software owns the streaming session and the `.aws`
//! file format. This module only starts, stops and reads back those
//! sessions; the bundled [`CommandBridge`] does so through helper programs
//! configured per bench.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::IdsConfig;
use crate::error::LabError;

pub trait StreamingDevice {
    fn connect(&mut self) -> Result<(), LabError> {
        Ok(())
    }

    /// Begin logging to `target` in the background.
    fn start_background(&mut self, target: &Path) -> Result<(), LabError>;

    fn stop_background(&mut self) -> Result<(), LabError>;

    /// Read a recorded stream back as rows of text fields.
    fn load_file(&mut self, source: &Path) -> Result<Vec<Vec<String>>, LabError>;
}

/// Stream into `target` for a fixed wall-clock `duration`.
///
/// Nothing confirms that the device actually recorded for the whole
/// duration; the only check is that `target` exists once streaming stops.
pub fn background_capture<D: StreamingDevice + ?Sized>(
    device: &mut D,
    target: &Path,
    duration: Duration,
) -> Result<(), LabError> {
    device.start_background(target)?;
    info!("background streaming started -> {}", target.display());

    debug!("waiting {duration:?} (fixed delay, not device-acknowledged)");
    thread::sleep(duration);

    device.stop_background()?;
    if target.exists() {
        info!("background streaming stopped, data saved to {}", target.display());
    } else {
        warn!(
            "background streaming stopped but {} was not written",
            target.display()
        );
    }
    Ok(())
}

/// Drives the vendor streaming software through external helper programs.
///
/// Arguments may contain `{address}`, `{rate}`, `{axes}`, `{file}` and
/// `{input}` placeholders.
pub struct CommandBridge {
    address: String,
    rate: u32,
    axes: Vec<u8>,
    start_command: Vec<String>,
    stop_command: Vec<String>,
    convert_command: Vec<String>,
    running: Option<Child>,
    target: Option<PathBuf>,
}

impl CommandBridge {
    pub fn from_config(cfg: &IdsConfig) -> Self {
        Self {
            address: cfg.address.clone(),
            rate: cfg.stream_rate,
            axes: cfg.axes.clone(),
            start_command: cfg.start_command.clone(),
            stop_command: cfg.stop_command.clone(),
            convert_command: cfg.convert_command.clone(),
            running: None,
            target: None,
        }
    }

    fn expand(&self, template: &[String], file: Option<&Path>) -> Result<Command, LabError> {
        let (program, args) = template
            .split_first()
            .ok_or_else(|| LabError::Stream("helper command is not configured".into()))?;
        let axes = self
            .axes
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let file = file.map(|f| f.display().to_string()).unwrap_or_default();

        let mut cmd = Command::new(program);
        for arg in args {
            let arg = arg
                .replace("{address}", &self.address)
                .replace("{rate}", &self.rate.to_string())
                .replace("{axes}", &axes)
                .replace("{file}", &file)
                .replace("{input}", &file);
            cmd.arg(arg);
        }
        Ok(cmd)
    }

    fn reap(&mut self, child: &mut Child) -> Result<(), LabError> {
        let status = child.wait()?;
        debug!("streaming helper exited with {status}");
        Ok(())
    }
}

impl StreamingDevice for CommandBridge {
    fn connect(&mut self) -> Result<(), LabError> {
        info!("IDS at {}", self.address);
        Ok(())
    }

    fn start_background(&mut self, target: &Path) -> Result<(), LabError> {
        if self.start_command.is_empty() {
            return Err(LabError::Stream(
                "ids.start_command must be set to stream from the sensor".into(),
            ));
        }
        if self.running.is_some() {
            return Err(LabError::Stream("a stream is already running".into()));
        }
        let mut cmd = self.expand(&self.start_command, Some(target))?;
        let child = cmd
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| LabError::Stream(format!("failed to start streaming helper: {e}")))?;
        self.running = Some(child);
        self.target = Some(target.to_path_buf());
        Ok(())
    }

    fn stop_background(&mut self) -> Result<(), LabError> {
        let Some(mut child) = self.running.take() else {
            return Err(LabError::Stream("no stream is running".into()));
        };
        let target = self.target.take();

        if self.stop_command.is_empty() {
            // Helper streams until killed
            if child.try_wait()?.is_none() {
                child.kill()?;
            }
        } else {
            let status = self.expand(&self.stop_command, target.as_deref())?.status()?;
            if !status.success() {
                warn!("stop helper exited with {status}");
            }
        }
        self.reap(&mut child)
    }

    fn load_file(&mut self, source: &Path) -> Result<Vec<Vec<String>>, LabError> {
        if self.convert_command.is_empty() {
            return Err(LabError::Stream(
                "ids.convert_command must be set to read back streams".into(),
            ));
        }
        let output = self.expand(&self.convert_command, Some(source))?.output()?;
        if !output.status.success() {
            return Err(LabError::Stream(format!(
                "convert helper failed on {}: {}",
                source.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(output.stdout.as_slice());
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }
}

impl Drop for CommandBridge {
    fn drop(&mut self) {
        if let Some(mut child) = self.running.take() {
            warn!("streaming helper still running on shutdown, killing it");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// In-memory stand-in that writes a small file when a stream stops.
    #[derive(Default)]
    pub struct RecordingDevice {
        pub events: Vec<String>,
        target: Option<PathBuf>,
    }

    impl StreamingDevice for RecordingDevice {
        fn start_background(&mut self, target: &Path) -> Result<(), LabError> {
            self.events.push(format!("start {}", target.display()));
            self.target = Some(target.to_path_buf());
            Ok(())
        }

        fn stop_background(&mut self) -> Result<(), LabError> {
            self.events.push("stop".to_string());
            if let Some(target) = self.target.take() {
                fs::write(target, b"aws")?;
            }
            Ok(())
        }

        fn load_file(&mut self, source: &Path) -> Result<Vec<Vec<String>>, LabError> {
            self.events.push(format!("load {}", source.display()));
            Ok(vec![
                vec!["time".into(), "pos0".into()],
                vec!["0.0".into(), "12.5".into()],
            ])
        }
    }

    #[test]
    fn capture_brackets_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data_0.5_150.aws");
        let mut dev = RecordingDevice::default();
        background_capture(&mut dev, &target, Duration::ZERO).unwrap();
        assert_eq!(dev.events.len(), 2);
        assert!(dev.events[0].starts_with("start"));
        assert_eq!(dev.events[1], "stop");
        assert!(target.exists());
    }

    fn bridge(start: &[&str], stop: &[&str], convert: &[&str]) -> CommandBridge {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        CommandBridge::from_config(&IdsConfig {
            start_command: owned(start),
            stop_command: owned(stop),
            convert_command: owned(convert),
            ..IdsConfig::default()
        })
    }

    #[test]
    fn unconfigured_bridge_refuses_to_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = bridge(&[], &[], &[]);
        b.connect().unwrap();
        assert!(b.start_background(&dir.path().join("s.aws")).is_err());
        assert!(b.stop_background().is_err());
        assert!(b.load_file(&dir.path().join("s.aws")).is_err());
    }

    #[test]
    fn placeholders_are_expanded() {
        let b = bridge(&["helper", "{address}", "--rate={rate}", "{axes}", "{file}"], &[], &[]);
        let cmd = b.expand(&b.start_command, Some(Path::new("/tmp/x.aws"))).unwrap();
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.get_program(), "helper");
        assert_eq!(args, vec!["192.168.1.1", "--rate=10", "0", "/tmp/x.aws"]);
    }

    #[cfg(unix)]
    #[test]
    fn bridge_runs_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("s.aws");
        let mut b = bridge(
            &["sh", "-c", "echo streamed > {file}"],
            &["true"],
            &["sh", "-c", "printf '0.0,1.5\\n0.1,2.5\\n'"],
        );
        b.connect().unwrap();
        b.start_background(&target).unwrap();
        assert!(b.start_background(&target).is_err());
        b.stop_background().unwrap();
        assert!(target.exists());

        let rows = b.load_file(&target).unwrap();
        assert_eq!(rows, vec![vec!["0.0", "1.5"], vec!["0.1", "2.5"]]);
    }
}
