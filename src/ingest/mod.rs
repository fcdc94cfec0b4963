//! # Ingestion Module
//!
//! Drives the frame decoder over `.tlm` files and fills a [`TelemetryStore`].
//!
//! This module handles:
//! - Counting decoded items and rejected records per file
//! - Aborting files whose rejection rate exceeds the configured limit
//! - Reading lists of files and whole folders with progress reporting
//! - Optional per-record echo and streaming CSV output

pub mod sink;

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::telemetry::export::{csv_path_for, DEFAULT_CSV_PRECISION};
use crate::telemetry::store::{Sample, TelemetryStore};
use crate::tlm::decoder::{ByteOrder, DecodeOutcome, FrameDecoder};

use sink::{CsvSink, EchoSink, RecordSink, Rejection};

/// Default maximum fraction of rejected records
pub const DEFAULT_ERROR_RATE_LIMIT: f64 = 0.025;

/// Default number of items that must be read before the rate is enforced
pub const DEFAULT_MINIMUM_COUNT: usize = 500;

/// Corruption thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestLimits {
    pub error_rate_limit: f64,
    pub minimum_count: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            error_rate_limit: DEFAULT_ERROR_RATE_LIMIT,
            minimum_count: DEFAULT_MINIMUM_COUNT,
        }
    }
}

impl IngestLimits {
    /// True once more than `minimum_count` items were read and the error
    /// ratio is strictly above the limit
    pub fn exceeded(&self, items: usize, errors: usize) -> bool {
        items > self.minimum_count && errors as f64 / items as f64 > self.error_rate_limit
    }
}

/// Counters of one decoded stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Records decoded, valid or not
    pub items: usize,
    /// Records rejected
    pub errors: usize,
    /// Samples appended to the store
    pub accepted: usize,
    /// Stream was abandoned because of the error rate
    pub aborted: bool,
}

/// How reading one file ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// Read to the end of the stream
    Complete,
    /// Abandoned by the corruption rule; samples read so far are kept
    Corrupt,
    /// Path does not exist
    Missing,
    /// Could not be opened or read
    Unreadable,
    /// Requested CSV output could not be created; the file was not read
    OutputFailed,
}

impl FileOutcome {
    pub fn is_success(self) -> bool {
        self == FileOutcome::Complete
    }
}

/// Result of reading one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
    #[serde(flatten)]
    pub stats: StreamStats,
}

impl FileReport {
    fn new(path: &Path, outcome: FileOutcome, stats: StreamStats) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome,
            stats,
        }
    }
}

/// Result of reading a list of files
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    /// Every file completed
    pub success: bool,
    pub files: Vec<FileReport>,
}

impl Default for IngestReport {
    fn default() -> Self {
        Self {
            success: true,
            files: Vec::new(),
        }
    }
}

impl IngestReport {
    pub fn push(&mut self, report: FileReport) {
        self.success &= report.outcome.is_success();
        self.files.push(report);
    }

    pub fn total_items(&self) -> usize {
        self.files.iter().map(|f| f.stats.items).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.files.iter().map(|f| f.stats.errors).sum()
    }

    pub fn total_accepted(&self) -> usize {
        self.files.iter().map(|f| f.stats.accepted).sum()
    }
}

/// Reads `.tlm` files into a store
#[derive(Debug, Clone)]
pub struct TlmFileReader {
    limits: IngestLimits,
    byte_order: ByteOrder,
    echo: bool,
    csv_output: bool,
    csv_precision: usize,
}

impl Default for TlmFileReader {
    fn default() -> Self {
        Self::new(IngestLimits::default(), ByteOrder::default())
    }
}

impl TlmFileReader {
    pub fn new(limits: IngestLimits, byte_order: ByteOrder) -> Self {
        Self {
            limits,
            byte_order,
            echo: false,
            csv_output: false,
            csv_precision: DEFAULT_CSV_PRECISION,
        }
    }

    /// Reader configured from the `[ingest]` and `[output]` sections
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ingest.limits(), config.ingest.byte_order)
            .with_csv_precision(config.output.csv_precision)
    }

    /// Log every accepted and rejected record
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Stream accepted samples to a CSV file next to each input file
    pub fn with_csv_output(mut self, csv_output: bool) -> Self {
        self.csv_output = csv_output;
        self
    }

    pub fn with_csv_precision(mut self, precision: usize) -> Self {
        self.csv_precision = precision;
        self
    }

    /// Decode `reader` until end of stream or until the error rate is exceeded
    ///
    /// The corruption rule is evaluated after every record, so the outcome
    /// does not depend on where in the stream the bad records sit.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failures of `reader` or a failing sink.
    pub fn read_stream<R, S>(&self, store: &mut TelemetryStore, reader: R, sink: &mut S) -> Result<StreamStats>
    where
        R: Read,
        S: RecordSink + ?Sized,
    {
        let mut stats = StreamStats::default();
        let mut decoder = FrameDecoder::new(reader, self.byte_order);
        self.drain(store, &mut decoder, sink, &mut stats)?;
        Ok(stats)
    }

    /// Decode records into `store`, counting into `stats`
    ///
    /// `stats` holds everything counted so far when an error is returned.
    fn drain<R, S>(
        &self,
        store: &mut TelemetryStore,
        decoder: &mut FrameDecoder<R>,
        sink: &mut S,
        stats: &mut StreamStats,
    ) -> Result<()>
    where
        R: Read,
        S: RecordSink + ?Sized,
    {
        loop {
            match decoder.next_record()? {
                DecodeOutcome::End => break,
                DecodeOutcome::Record(record) => {
                    stats.items += 1;
                    let sample = Sample::new(record.timestamp, record.value);
                    match record.command() {
                        Some(command) if store.push(command, sample) => {
                            stats.accepted += 1;
                            sink.accepted(command, &sample)?;
                        }
                        _ => {
                            stats.errors += 1;
                            sink.rejected(&Rejection::unknown(&record))?;
                        }
                    }
                }
                DecodeOutcome::Malformed(record) => {
                    stats.items += 1;
                    stats.errors += 1;
                    sink.rejected(&Rejection::malformed(&record))?;
                }
            }

            if self.limits.exceeded(stats.items, stats.errors) {
                stats.aborted = true;
                break;
            }
        }

        Ok(())
    }

    /// Read one file into `store`
    ///
    /// # Arguments
    ///
    /// * `store` - Store receiving every accepted sample
    /// * `path` - Path of the `.tlm` file
    ///
    /// # Returns
    ///
    /// * `FileReport` - Outcome and counters of the file
    ///
    /// # Errors
    ///
    /// Never fails; problems are reported through [`FileReport::outcome`]:
    /// - [`FileOutcome::Missing`] if the path does not exist
    /// - [`FileOutcome::OutputFailed`] if the CSV output cannot be created
    /// - [`FileOutcome::Unreadable`] if opening or reading fails
    /// - [`FileOutcome::Corrupt`] if the rejection limit is exceeded
    ///
    /// Samples appended before a corruption abort or a read error stay in
    /// `store` and are counted in the report.
    pub fn read_file<P: AsRef<Path>>(&self, store: &mut TelemetryStore, path: P) -> FileReport {
        let path = path.as_ref();

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Telemetry file not found: {}", path.display());
                return FileReport::new(path, FileOutcome::Missing, StreamStats::default());
            }
            Err(e) => {
                warn!("Cannot open {}: {}", path.display(), e);
                return FileReport::new(path, FileOutcome::Unreadable, StreamStats::default());
            }
        };

        let mut sinks = match self.sinks_for(path) {
            Ok(sinks) => sinks,
            Err(e) => {
                warn!("Cannot create output for {}: {}", path.display(), e);
                return FileReport::new(path, FileOutcome::OutputFailed, StreamStats::default());
            }
        };

        let decoder = FrameDecoder::new(BufReader::new(file), self.byte_order);
        self.read_decoder(store, path, decoder, &mut sinks)
    }

    fn read_decoder<R, S>(
        &self,
        store: &mut TelemetryStore,
        path: &Path,
        mut decoder: FrameDecoder<R>,
        sink: &mut S,
    ) -> FileReport
    where
        R: Read,
        S: RecordSink + ?Sized,
    {
        let mut stats = StreamStats::default();
        if let Err(e) = self.drain(store, &mut decoder, sink, &mut stats) {
            warn!(
                "Failed reading {} after {} records: {}",
                path.display(),
                stats.items,
                e
            );
            return FileReport::new(path, FileOutcome::Unreadable, stats);
        }

        let outcome = if stats.aborted {
            warn!(
                "{} is corrupt: {} of {} records rejected, reading stopped",
                path.display(),
                stats.errors,
                stats.items
            );
            FileOutcome::Corrupt
        } else {
            debug!(
                "Read {}: {} records, {} rejected",
                path.display(),
                stats.items,
                stats.errors
            );
            FileOutcome::Complete
        };

        FileReport::new(path, outcome, stats)
    }

    /// Read `paths` in order, best effort
    ///
    /// # Arguments
    ///
    /// * `store` - Store receiving every accepted sample
    /// * `paths` - Files to read, in order
    /// * `progress` - Receives 0.0 before the first file and `i / n` after each
    ///
    /// # Returns
    ///
    /// * `IngestReport` - One report per path; succeeds only if every file
    ///   completed
    ///
    /// # Errors
    ///
    /// Never fails; a failing file is recorded in its [`FileReport`] and
    /// never stops the files after it.
    pub fn read_file_list<P, F>(&self, store: &mut TelemetryStore, paths: &[P], mut progress: F) -> IngestReport
    where
        P: AsRef<Path>,
        F: FnMut(f32),
    {
        let mut report = IngestReport::default();
        let total = paths.len();

        progress(0.0);
        for (done, path) in paths.iter().enumerate() {
            report.push(self.read_file(store, path));
            progress((done + 1) as f32 / total as f32);
        }

        info!(
            "Ingested {} files: {} samples accepted, {} records rejected",
            total,
            report.total_accepted(),
            report.total_errors()
        );
        report
    }

    /// Read every `*.tlm` file of `dir`, sorted by path
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be listed.
    pub fn read_folder<P, F>(&self, store: &mut TelemetryStore, dir: P, progress: F) -> Result<IngestReport>
    where
        P: AsRef<Path>,
        F: FnMut(f32),
    {
        let paths = tlm_files_in(dir.as_ref())?;
        debug!("Found {} telemetry files in {}", paths.len(), dir.as_ref().display());
        Ok(self.read_file_list(store, paths.as_slice(), progress))
    }

    fn sinks_for(&self, path: &Path) -> Result<Vec<Box<dyn RecordSink>>> {
        let mut sinks: Vec<Box<dyn RecordSink>> = Vec::new();

        if self.echo {
            sinks.push(Box::new(EchoSink::new(io::stdout())));
        }

        if self.csv_output {
            let csv_path = csv_path_for(path);
            let sink = CsvSink::create(&csv_path, self.csv_precision)?;
            info!("Writing {}", csv_path.display());
            sinks.push(Box::new(sink));
        }

        Ok(sinks)
    }
}

/// Sorted `*.tlm` files directly inside `dir`
pub fn tlm_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "tlm") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
