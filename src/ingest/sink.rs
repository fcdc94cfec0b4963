//! # Record Sinks
//!
//! Observers that see every record the ingestion loop accepts or rejects.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::telemetry::export::CsvSampleWriter;
use crate::telemetry::store::{Sample, TIME_FORMAT};
use crate::tlm::decoder::{MalformedRecord, RawRecord, ValueError};
use crate::tlm::registry::Command;

/// Why a record did not reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Triple is not in the allow-list
    UnknownCommand,
    /// A field failed to decode
    Malformed(ValueError),
}

/// A record dropped by the ingestion loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub device: u8,
    pub source: u8,
    pub quantity: u8,
    pub reason: RejectReason,
}

impl Rejection {
    pub fn unknown(record: &RawRecord) -> Self {
        Self {
            device: record.device,
            source: record.source,
            quantity: record.quantity,
            reason: RejectReason::UnknownCommand,
        }
    }

    pub fn malformed(record: &MalformedRecord) -> Self {
        Self {
            device: record.device,
            source: record.source,
            quantity: record.quantity,
            reason: RejectReason::Malformed(record.reason),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}] ", self.device, self.source, self.quantity)?;
        match self.reason {
            RejectReason::UnknownCommand => f.write_str("unknown command"),
            RejectReason::Malformed(reason) => write!(f, "malformed: {}", reason),
        }
    }
}

/// Per-record observer driven by the ingestion loop
#[cfg_attr(test, mockall::automock)]
pub trait RecordSink {
    /// Called after a sample has been appended to the store
    fn accepted(&mut self, command: Command, sample: &Sample) -> Result<()>;

    /// Called for every record that was counted as an error
    fn rejected(&mut self, _rejection: &Rejection) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<Box<dyn RecordSink>> {
    fn accepted(&mut self, command: Command, sample: &Sample) -> Result<()> {
        for sink in self.iter_mut() {
            sink.accepted(command, sample)?;
        }
        Ok(())
    }

    fn rejected(&mut self, rejection: &Rejection) -> Result<()> {
        for sink in self.iter_mut() {
            sink.rejected(rejection)?;
        }
        Ok(())
    }
}

/// Print mode: writes one line per record
#[derive(Debug)]
pub struct EchoSink<W> {
    out: W,
}

impl<W: Write> EchoSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for EchoSink<W> {
    fn accepted(&mut self, command: Command, sample: &Sample) -> Result<()> {
        writeln!(
            self.out,
            "{} | {} | {:.6} {}",
            sample.time.format(TIME_FORMAT),
            command,
            sample.value,
            command.quantity.physical_unit()
        )?;
        Ok(())
    }

    fn rejected(&mut self, rejection: &Rejection) -> Result<()> {
        writeln!(self.out, "Rejected record {}", rejection)?;
        Ok(())
    }
}

/// Streams accepted samples into a CSV file
#[derive(Debug)]
pub struct CsvSink {
    writer: CsvSampleWriter<File>,
}

impl CsvSink {
    pub fn create<P: AsRef<Path>>(path: P, precision: usize) -> Result<Self> {
        Ok(Self {
            writer: CsvSampleWriter::append_to(path, precision)?,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }
}

impl RecordSink for CsvSink {
    fn accepted(&mut self, command: Command, sample: &Sample) -> Result<()> {
        self.writer.write_sample(command, sample)
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush CSV output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlm::registry::{Device, Quantity, Source};
    use chrono::DateTime;
    use tempfile::TempDir;

    const VOLTAGE: Command = Command::new(Device::Eps, Source::Bcr1, Quantity::Voltage);

    fn sample() -> Sample {
        Sample::new(DateTime::from_timestamp(1_614_859_201, 0).unwrap(), 8.0)
    }

    #[test]
    fn test_rejection_display() {
        let unknown = Rejection {
            device: 200,
            source: 1,
            quantity: 2,
            reason: RejectReason::UnknownCommand,
        };
        assert_eq!(unknown.to_string(), "[200, 1, 2] unknown command");

        let malformed = Rejection {
            reason: RejectReason::Malformed(ValueError::InvalidBool(7)),
            ..unknown
        };
        assert_eq!(malformed.to_string(), "[200, 1, 2] malformed: invalid boolean byte 0x07");
    }

    #[test]
    fn test_fan_out_reaches_every_sink() {
        let mut first = MockRecordSink::new();
        first.expect_accepted().times(1).returning(|_, _| Ok(()));
        first.expect_rejected().times(1).returning(|_| Ok(()));
        let mut second = MockRecordSink::new();
        second
            .expect_accepted()
            .withf(|command, sample| *command == VOLTAGE && sample.value == 8.0)
            .times(1)
            .returning(|_, _| Ok(()));
        second.expect_rejected().times(1).returning(|_| Ok(()));

        let mut sinks: Vec<Box<dyn RecordSink>> = vec![Box::new(first), Box::new(second)];
        sinks.accepted(VOLTAGE, &sample()).unwrap();
        sinks
            .rejected(&Rejection {
                device: 200,
                source: 0,
                quantity: 0,
                reason: RejectReason::UnknownCommand,
            })
            .unwrap();
    }

    #[test]
    fn test_csv_sink_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pass.csv");

        {
            let mut sink = CsvSink::create(&path, 6).unwrap();
            sink.accepted(VOLTAGE, &sample()).unwrap();
        }
        {
            let mut sink = CsvSink::create(&path, 6).unwrap();
            sink.accepted(VOLTAGE, &sample()).unwrap();
            sink.flush().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "DEVICE;SOURCE;TYPE;DATE;TIME;VALUE;\n\
             EPS;BCR1;VOLTAGE;2021-03-04;12:00:01;8.000000;\n\
             EPS;BCR1;VOLTAGE;2021-03-04;12:00:01;8.000000;\n"
        );
    }

    #[test]
    fn test_echo_sink_prints_every_record() {
        let mut sink = EchoSink::new(Vec::new());
        sink.accepted(VOLTAGE, &sample()).unwrap();
        sink.rejected(&Rejection {
            device: 200,
            source: 0,
            quantity: 0,
            reason: RejectReason::UnknownCommand,
        })
        .unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "2021-03-04 12:00:01 | EPS | BCR1 | VOLTAGE | 8.000000 V\n\
             Rejected record [200, 0, 0] unknown command\n"
        );
    }
}
