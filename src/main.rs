//! # EPS TLM
//!
//! Parses EPS telemetry `*.tlm` files.
//!
//! # Usage
//!
//! Parse one file and print the sorted store:
//! ```bash
//! eps-tlm pass.tlm --sorted
//! ```
//!
//! Parse a folder, derive power channels and export everything:
//! ```bash
//! eps-tlm passes/ --derive-power --export-csv all.csv
//! ```
//!
//! Combine two series into the first scratch channel:
//! ```bash
//! eps-tlm pass.tlm --combine EPS:BCR1:VOLTAGE EPS:BCR2:VOLTAGE --op sub -s
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use eps_tlm::app::{self, CombineRequest, Job, RunOutcome, EXIT_INTERRUPTED};
use eps_tlm::config::{Config, LoggingConfig};
use eps_tlm::telemetry::derived::Combinator;
use eps_tlm::tlm::registry::Command;

/// Exit code when at least one file failed
const EXIT_PARSING_FAILED: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "eps-tlm", version)]
#[command(about = "Parses EPS telemetry *.tlm files", long_about = None)]
struct Cli {
    /// EPS telemetry *.tlm file or folder containing *.tlm files
    path: PathBuf,

    /// Write a human readable *.csv file next to every input file
    #[arg(short, long)]
    output: bool,

    /// Print the values read from the *.tlm file
    #[arg(short, long)]
    print: bool,

    /// Print the values sorted according to the data type
    #[arg(short, long)]
    sorted: bool,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compute every power channel from voltage and current
    #[arg(long)]
    derive_power: bool,

    /// Merge two series (DEVICE:SOURCE:TYPE) into the TEMP1 scratch channel
    #[arg(long, num_args = 2, value_names = ["PRIMARY", "SECONDARY"])]
    combine: Option<Vec<Command>>,

    /// Operation used by --combine: mul, add, sub or div
    #[arg(long, default_value = "mul")]
    op: Combinator,

    /// Append the whole store to a CSV file
    #[arg(long, value_name = "FILE")]
    export_csv: Option<PathBuf>,

    /// Write the whole store as JSON Lines
    #[arg(long, value_name = "FILE")]
    export_jsonl: Option<PathBuf>,

    /// Print the ingestion report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn job(&self) -> Job {
        let combine = match self.combine.as_deref() {
            Some([primary, secondary]) => Some(CombineRequest {
                primary: *primary,
                secondary: *secondary,
                combinator: self.op,
            }),
            _ => None,
        };

        Job {
            path: self.path.clone(),
            print: self.print,
            output: self.output,
            sort: self.sorted,
            derive_power: self.derive_power,
            combine,
            export_csv: self.export_csv.clone(),
            export_jsonl: self.export_jsonl.clone(),
        }
    }
}

/// Set up console logging and, when `log_dir` is set, a daily log file
///
/// The returned guard must live until exit so buffered lines are flushed.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_ascii_lowercase()));

    let (file_layer, guard) = if logging.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&logging.log_dir, "eps-tlm.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let guard = init_logging(&config.logging);
    info!("EPS TLM v{} starting...", env!("CARGO_PKG_VERSION"));

    let summary = match app::run(config, cli.job()).await? {
        RunOutcome::Finished(summary) => summary,
        RunOutcome::Interrupted => {
            drop(guard);
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    for file in &summary.exported {
        info!("Output file {} ({} rows)", file.path.display(), file.rows);
    }

    if cli.sorted {
        print!("{}", summary.store);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&*summary)?);
    }

    if !summary.report.success {
        drop(guard);
        std::process::exit(EXIT_PARSING_FAILED);
    }

    Ok(())
}
