//! # Application Runner
//!
//! Runs one ingestion job on a blocking thread while the async side reports
//! progress and listens for Ctrl+C.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{EpsTlmError, Result};
use crate::ingest::{IngestReport, TlmFileReader};
use crate::telemetry::derived::{derive_power, derive_scratch, Combinator};
use crate::telemetry::export::{write_all_csv, write_jsonl};
use crate::telemetry::store::TelemetryStore;
use crate::tlm::registry::Command;

/// Exit code used when the job is interrupted by Ctrl+C
pub const EXIT_INTERRUPTED: i32 = 130;

/// Two series merged into the first scratch channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombineRequest {
    pub primary: Command,
    pub secondary: Command,
    pub combinator: Combinator,
}

/// What one run should do after ingestion
#[derive(Debug, Clone, Default)]
pub struct Job {
    /// A `.tlm` file or a folder of them
    pub path: PathBuf,
    /// Echo every record
    pub print: bool,
    /// Write a CSV file next to every input file
    pub output: bool,
    /// Sort every series once ingestion is done
    pub sort: bool,
    pub derive_power: bool,
    pub combine: Option<CombineRequest>,
    pub export_csv: Option<PathBuf>,
    pub export_jsonl: Option<PathBuf>,
}

/// A derived series and its length
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedSeries {
    pub command: String,
    pub samples: usize,
}

/// An export file and its row count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub rows: usize,
}

/// Everything a finished job produced
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub report: IngestReport,
    pub derived: Vec<DerivedSeries>,
    pub exported: Vec<ExportedFile>,
    #[serde(skip)]
    pub store: TelemetryStore,
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Finished(Box<Summary>),
    Interrupted,
}

/// Run `job` synchronously
///
/// Ingestion progress goes to `progress`. Derived channels and exports are
/// produced after every file has been read.
///
/// # Errors
///
/// Returns error if a folder cannot be listed or an export fails.
/// Unreadable or corrupt input files are reported in [`Summary::report`].
pub fn execute<F>(config: &Config, job: &Job, progress: F) -> Result<Summary>
where
    F: FnMut(f32),
{
    let reader = TlmFileReader::from_config(config)
        .with_echo(job.print)
        .with_csv_output(job.output);
    let mut store = TelemetryStore::new();

    let report = if job.path.is_dir() {
        info!("Parsing folder {}", job.path.display());
        reader.read_folder(&mut store, &job.path, progress)?
    } else {
        info!("Parsing file {}", job.path.display());
        reader.read_file_list(&mut store, std::slice::from_ref(&job.path), progress)
    };

    if report.success {
        info!("Parsing completed");
    } else {
        warn!("Parsing failed");
    }

    let mut derived = Vec::new();
    if job.derive_power {
        for (command, samples) in derive_power(&mut store) {
            derived.push(DerivedSeries {
                command: command.to_string(),
                samples,
            });
        }
    }

    if let Some(request) = job.combine {
        match derive_scratch(&mut store, request.primary, request.secondary, 0, request.combinator) {
            Ok((command, samples)) => derived.push(DerivedSeries {
                command: command.to_string(),
                samples,
            }),
            Err(e) => warn!("Cannot combine {} and {}: {}", request.primary, request.secondary, e),
        }
    }

    if job.sort {
        store.sort_all();
    }

    let mut exported = Vec::new();
    if let Some(path) = &job.export_csv {
        let rows = write_all_csv(&store, path, config.output.csv_precision, |p| {
            debug!("CSV export {:.0}%", p * 100.0);
        })?;
        exported.push(ExportedFile {
            path: path.clone(),
            rows,
        });
    }

    if let Some(path) = &job.export_jsonl {
        let rows = write_jsonl(&store, path)?;
        exported.push(ExportedFile {
            path: path.clone(),
            rows,
        });
    }

    Ok(Summary {
        report,
        derived,
        exported,
        store,
    })
}

/// Run `job` on a blocking thread until it finishes or Ctrl+C arrives
///
/// # Errors
///
/// Returns error if [`execute`] fails or the worker thread panics.
pub async fn run(config: Config, job: Job) -> Result<RunOutcome> {
    run_until(config, job, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Run `job`, abandoning it when `shutdown` resolves first
pub async fn run_until<S>(config: Config, job: Job, shutdown: S) -> Result<RunOutcome>
where
    S: std::future::Future<Output = ()>,
{
    let (tx, mut rx) = watch::channel(0.0f32);

    let mut worker = tokio::task::spawn_blocking(move || {
        execute(&config, &job, |p| {
            let _ = tx.send(p);
        })
    });

    tokio::pin!(shutdown);
    let mut progress_open = true;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Received Ctrl+C, shutting down...");
                return Ok(RunOutcome::Interrupted);
            }

            joined = &mut worker => {
                let summary = joined
                    .map_err(|e| EpsTlmError::Telemetry(format!("ingestion worker failed: {}", e)))??;
                return Ok(RunOutcome::Finished(Box::new(summary)));
            }

            changed = rx.changed(), if progress_open => {
                match changed {
                    Ok(()) => info!("Progress {:.0}%", *rx.borrow_and_update() * 100.0),
                    Err(_) => progress_open = false,
                }
            }
        }
    }
}
