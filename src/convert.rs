//! Export recorded `.aws` streams to CSV next to the originals.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::LabError;
use crate::ids::StreamingDevice;

/// Stream files directly inside `folder`, in name order.
pub fn stream_files(folder: &Path) -> Result<Vec<PathBuf>, LabError> {
    let entries = fs::read_dir(folder).map_err(|e| LabError::file(folder, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| LabError::file(folder, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "aws") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load one stream through `device` and write its rows to `<stem>.csv`.
pub fn convert_file<D: StreamingDevice + ?Sized>(
    device: &mut D,
    stream: &Path,
) -> Result<PathBuf, LabError> {
    info!("processing file: {}", stream.display());
    let rows = device.load_file(stream)?;

    let output = stream.with_extension("csv");
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&output)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|e| LabError::file(&output, e))?;

    info!("saved {} rows to {}", rows.len(), output.display());
    Ok(output)
}

/// Convert every `.aws` file in `folder`.
pub fn convert_folder<D: StreamingDevice + ?Sized>(
    device: &mut D,
    folder: &Path,
) -> Result<Vec<PathBuf>, LabError> {
    device.connect()?;
    let mut written = Vec::new();
    for stream in stream_files(folder)? {
        written.push(convert_file(device, &stream)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdsConfig;
    use crate::ids::tests::RecordingDevice;
    use crate::ids::CommandBridge;

    #[test]
    fn converts_only_stream_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data_1_20.aws"), b"x").unwrap();
        fs::write(dir.path().join("data_0.5_20.aws"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let mut dev = RecordingDevice::default();
        let written = convert_folder(&mut dev, dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("data_0.5_20.csv"));
        assert!(written[1].ends_with("data_1_20.csv"));
        assert_eq!(dev.events.len(), 2);

        let text = fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text, "time,pos0\n0.0,12.5\n");
    }

    #[cfg(unix)]
    #[test]
    fn bridge_converts_without_a_stream_command() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data_0.5_150.aws"), b"x").unwrap();

        let mut bridge = CommandBridge::from_config(&IdsConfig {
            convert_command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "printf '0.0,1.5\\n'".to_string(),
            ],
            ..IdsConfig::default()
        });
        let written = convert_folder(&mut bridge, dir.path()).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(fs::read_to_string(&written[0]).unwrap(), "0.0,1.5\n");
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = RecordingDevice::default();
        assert!(convert_folder(&mut dev, &dir.path().join("nope")).is_err());
    }
}
