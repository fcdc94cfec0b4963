//! # Export
//!
//! Writes store contents as `;`-separated CSV or JSON Lines.
//!
//! CSV rows look like `EPS;BCR1;VOLTAGE;2021-03-04;12:00:01;8.120000;`, with
//! the header `DEVICE;SOURCE;TYPE;DATE;TIME;VALUE;` written only when the file
//! is created. Existing files are appended to.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use super::store::{Sample, TelemetryStore};
use crate::error::{EpsTlmError, Result};
use crate::tlm::registry::{Command, VALID_COMMANDS};

/// CSV header; the trailing empty field produces the closing `;`
pub const CSV_HEADER: [&str; 7] = ["DEVICE", "SOURCE", "TYPE", "DATE", "TIME", "VALUE", ""];

/// Default number of decimals of the VALUE column
pub const DEFAULT_CSV_PRECISION: usize = 6;

/// Row writer shared by the exporters and the streaming CSV sink
pub struct CsvSampleWriter<W: Write> {
    writer: csv::Writer<W>,
    precision: usize,
}

impl<W: Write> std::fmt::Debug for CsvSampleWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSampleWriter")
            .field("precision", &self.precision)
            .finish_non_exhaustive()
    }
}

impl CsvSampleWriter<File> {
    /// Open `path` for appending, writing the header if the file is new
    pub fn append_to<P: AsRef<Path>>(path: P, precision: usize) -> Result<Self> {
        let path = path.as_ref();
        let is_new = !path.is_file();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::from_writer(file, precision, is_new)
    }
}

impl<W: Write> CsvSampleWriter<W> {
    pub fn from_writer(inner: W, precision: usize, write_header: bool) -> Result<Self> {
        let writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_writer(inner);
        let mut this = Self { writer, precision };
        if write_header {
            this.writer.write_record(CSV_HEADER)?;
        }
        Ok(this)
    }

    /// Write one sample row
    pub fn write_sample(&mut self, command: Command, sample: &Sample) -> Result<()> {
        let date = sample.time.format("%Y-%m-%d").to_string();
        let time = sample.time.format("%H:%M:%S").to_string();
        let value = format!("{:.*}", self.precision, sample.value);

        self.writer.write_record([
            command.device.as_str(),
            command.source.as_str(),
            command.quantity.as_str(),
            date.as_str(),
            time.as_str(),
            value.as_str(),
            "",
        ])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the inner writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| EpsTlmError::Io(e.into_error()))
    }
}

/// Append one command's series to a CSV file
///
/// Returns the number of rows written.
pub fn write_series_csv<P: AsRef<Path>>(
    store: &TelemetryStore,
    path: P,
    command: Command,
    precision: usize,
) -> Result<usize> {
    let samples = store
        .series(command)
        .ok_or_else(|| EpsTlmError::InvalidCommand(command.to_string()))?;

    let mut writer = CsvSampleWriter::append_to(path.as_ref(), precision)?;
    for sample in samples {
        writer.write_sample(command, sample)?;
    }
    writer.flush()?;

    debug!("Wrote {} rows of {} to {}", samples.len(), command, path.as_ref().display());
    Ok(samples.len())
}

/// Append every series to a CSV file in registry order
///
/// `progress` receives 0.0 first and `i / n` after each command.
pub fn write_all_csv<P, F>(store: &TelemetryStore, path: P, precision: usize, mut progress: F) -> Result<usize>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let total = VALID_COMMANDS.len();
    let mut writer = CsvSampleWriter::append_to(path.as_ref(), precision)?;
    let mut rows = 0;

    progress(0.0);
    for (done, (command, samples)) in store.iter().enumerate() {
        for sample in samples {
            writer.write_sample(command, sample)?;
        }
        rows += samples.len();
        progress((done + 1) as f32 / total as f32);
    }
    writer.flush()?;

    info!("Exported {} samples to {}", rows, path.as_ref().display());
    Ok(rows)
}

#[derive(Serialize)]
struct JsonlRecord<'a> {
    device: &'a str,
    source: &'a str,
    #[serde(rename = "type")]
    quantity: &'a str,
    unit: &'a str,
    #[serde(flatten)]
    sample: &'a Sample,
}

/// Write every sample as one JSON object per line, truncating `path`
pub fn write_jsonl<P: AsRef<Path>>(store: &TelemetryStore, path: P) -> Result<usize> {
    let mut out = BufWriter::new(File::create(path.as_ref())?);
    let mut rows = 0;

    for (command, samples) in store.iter() {
        for sample in samples {
            let record = JsonlRecord {
                device: command.device.as_str(),
                source: command.source.as_str(),
                quantity: command.quantity.as_str(),
                unit: command.quantity.physical_unit(),
                sample,
            };
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
            rows += 1;
        }
    }
    out.flush()?;

    info!("Exported {} samples to {}", rows, path.as_ref().display());
    Ok(rows)
}

/// CSV path written next to a `.tlm` file
///
/// `pass.tlm` becomes `pass.csv`; if that exists, `pass(1).csv`,
/// `pass(2).csv` and so on.
pub fn csv_path_for(tlm: &Path) -> PathBuf {
    let stem = match tlm.extension() {
        Some(ext) if ext == "tlm" => tlm.with_extension(""),
        _ => tlm.to_path_buf(),
    };

    let mut candidate = PathBuf::from(format!("{}.csv", stem.display()));
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}({}).csv", stem.display(), n));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlm::registry::{Device, Quantity, Source};
    use chrono::DateTime;
    use tempfile::TempDir;

    const VOLTAGE: Command = Command::new(Device::Eps, Source::Bcr1, Quantity::Voltage);
    const TEMPERATURE: Command = Command::new(Device::Bat, Source::Bttc, Quantity::Temperature);

    fn sample(seconds: i64, value: f32) -> Sample {
        Sample::new(DateTime::from_timestamp(seconds, 0).unwrap(), value)
    }

    fn store_with_samples() -> TelemetryStore {
        let mut store = TelemetryStore::new();
        store.push(VOLTAGE, sample(1_614_859_201, 8.12));
        store.push(VOLTAGE, sample(1_614_859_202, 8.5));
        store.push(TEMPERATURE, sample(1_614_859_203, 293.15));
        store
    }

    #[test]
    fn test_row_format() {
        let mut writer = CsvSampleWriter::from_writer(Vec::new(), 3, true).unwrap();
        writer.write_sample(VOLTAGE, &sample(1_614_859_201, 8.12)).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(
            text,
            "DEVICE;SOURCE;TYPE;DATE;TIME;VALUE;\nEPS;BCR1;VOLTAGE;2021-03-04;12:00:01;8.120;\n"
        );
    }

    #[test]
    fn test_write_series_appends_without_second_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let store = store_with_samples();

        assert_eq!(write_series_csv(&store, &path, VOLTAGE, 6).unwrap(), 2);
        assert_eq!(write_series_csv(&store, &path, TEMPERATURE, 6).unwrap(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "DEVICE;SOURCE;TYPE;DATE;TIME;VALUE;");
        assert_eq!(lines[1], "EPS;BCR1;VOLTAGE;2021-03-04;12:00:01;8.120000;");
        assert!(lines[3].starts_with("BAT;BTTC;TEMPERATURE;2021-03-04;12:00:03;293.149"));
    }

    #[test]
    fn test_write_series_rejects_unregistered_command() {
        let dir = TempDir::new().unwrap();
        let store = TelemetryStore::new();
        let bogus = Command::new(Device::Sse, Source::Sse, Quantity::Voltage);
        let result = write_series_csv(&store, dir.path().join("x.csv"), bogus, 6);
        assert!(matches!(result, Err(EpsTlmError::InvalidCommand(_))));
    }

    #[test]
    fn test_write_all_reports_progress() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("all.csv");
        let store = store_with_samples();

        let mut calls = Vec::new();
        let rows = write_all_csv(&store, &path, 6, |p| calls.push(p)).unwrap();

        assert_eq!(rows, 3);
        assert_eq!(calls.len(), VALID_COMMANDS.len() + 1);
        assert_eq!(calls[0], 0.0);
        assert_eq!(*calls.last().unwrap(), 1.0);
        assert!(calls.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_write_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("all.jsonl");
        let store = store_with_samples();

        assert_eq!(write_jsonl(&store, &path).unwrap(), 3);

        let text = std::fs::read_to_string(&path).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["device"], "EPS");
        assert_eq!(first["type"], "VOLTAGE");
        assert_eq!(first["unit"], "V");
        assert_eq!(first["time"], "2021-03-04T12:00:01Z");
    }

    #[test]
    fn test_csv_path_for_picks_free_name() {
        let dir = TempDir::new().unwrap();
        let tlm = dir.path().join("pass.tlm");

        let first = csv_path_for(&tlm);
        assert_eq!(first, dir.path().join("pass.csv"));

        std::fs::write(&first, "").unwrap();
        assert_eq!(csv_path_for(&tlm), dir.path().join("pass(1).csv"));

        std::fs::write(dir.path().join("pass(1).csv"), "").unwrap();
        assert_eq!(csv_path_for(&tlm), dir.path().join("pass(2).csv"));

        assert_eq!(csv_path_for(&dir.path().join("raw.bin")), dir.path().join("raw.bin.csv"));
    }
}
