//! # Telemetry Store
//!
//! In-memory series for every valid command.
//!
//! The store holds one series per entry of [`VALID_COMMANDS`], laid out densely
//! in registry order. Series start empty and the set of keys never changes.

use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::tlm::registry::{Command, VALID_COMMANDS};

/// Display format of sample timestamps
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One (timestamp, value) point of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: f32,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, value: f32) -> Self {
        Self { time, value }
    }
}

/// Scan direction of a nearest-index lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Walk towards later samples
    Ascending,
    /// Walk towards earlier samples
    Descending,
}

impl FromStr for ScanDirection {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascending" | "left" => Ok(ScanDirection::Ascending),
            "descending" | "right" => Ok(ScanDirection::Descending),
            _ => Err(LookupError::InvalidDirection),
        }
    }
}

/// Why a nearest-index lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("command is not registered")]
    InvalidCommand,

    #[error("scan direction must be ascending or descending")]
    InvalidDirection,

    #[error("series is empty")]
    EmptySeries,
}

impl LookupError {
    /// Negative sentinel code for callers that work with plain integers
    pub const fn code(self) -> i32 {
        match self {
            LookupError::InvalidCommand => -1,
            LookupError::InvalidDirection => -2,
            LookupError::EmptySeries => -3,
        }
    }
}

/// Index of the sample in `samples` closest in time to `at`
///
/// Scans from `start` in `direction` until the query time is bracketed and
/// returns whichever bracketing sample is nearer; on a tie the sample scanned
/// first wins. A scan that runs off the end returns the last index it visited.
/// Returns `None` for an empty slice.
pub fn nearest_in(
    samples: &[Sample],
    at: DateTime<Utc>,
    direction: ScanDirection,
    start: usize,
) -> Option<usize> {
    let last = samples.len().checked_sub(1)?;
    let start = start.min(last);

    let index = match direction {
        ScanDirection::Ascending => (start..=last)
            .find(|&k| samples[k].time >= at)
            .map(|k| {
                if k == start {
                    return k;
                }
                let before = at - samples[k - 1].time;
                let after = samples[k].time - at;
                if before <= after {
                    k - 1
                } else {
                    k
                }
            })
            .unwrap_or(last),
        ScanDirection::Descending => (0..=start)
            .rev()
            .find(|&k| samples[k].time <= at)
            .map(|k| {
                if k == start {
                    return k;
                }
                let after = samples[k + 1].time - at;
                let before = at - samples[k].time;
                if after <= before {
                    k + 1
                } else {
                    k
                }
            })
            .unwrap_or(0),
    };

    Some(index)
}

/// Per-command series for one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryStore {
    series: Vec<Vec<Sample>>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    /// Create a store with an empty series for every valid command
    pub fn new() -> Self {
        Self {
            series: vec![Vec::new(); VALID_COMMANDS.len()],
        }
    }

    /// Validate raw ids and append a sample
    ///
    /// Returns `false` and leaves the store untouched if the triple is not on
    /// the allow-list.
    pub fn append(&mut self, device: u8, source: u8, quantity: u8, time: DateTime<Utc>, value: f32) -> bool {
        match Command::from_ids(device, source, quantity) {
            Some(command) => self.push(command, Sample::new(time, value)),
            None => false,
        }
    }

    /// Append a sample to a command's series
    pub fn push(&mut self, command: Command, sample: Sample) -> bool {
        match command.index() {
            Some(slot) => {
                self.series[slot].push(sample);
                true
            }
            None => false,
        }
    }

    /// Samples of a command, `None` if the command is not registered
    pub fn series(&self, command: Command) -> Option<&[Sample]> {
        command.index().map(|slot| self.series[slot].as_slice())
    }

    /// Number of samples of a command (0 for unregistered commands)
    pub fn len_of(&self, command: Command) -> usize {
        self.series(command).map_or(0, <[Sample]>::len)
    }

    /// Number of samples over all commands
    pub fn total_samples(&self) -> usize {
        self.series.iter().map(Vec::len).sum()
    }

    /// Whether every series is empty
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(Vec::is_empty)
    }

    /// Commands that currently hold at least one sample
    pub fn commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(command, _)| command)
    }

    /// Iterate over every command and its samples in registry order
    pub fn iter(&self) -> impl Iterator<Item = (Command, &[Sample])> {
        VALID_COMMANDS
            .iter()
            .copied()
            .zip(self.series.iter().map(Vec::as_slice))
    }

    /// Stable sort of one series by ascending timestamp
    pub fn sort(&mut self, command: Command) -> bool {
        match command.index() {
            Some(slot) => {
                self.series[slot].sort_by_key(|sample| sample.time);
                true
            }
            None => false,
        }
    }

    pub fn sort_all(&mut self) {
        for series in &mut self.series {
            series.sort_by_key(|sample| sample.time);
        }
    }

    /// Clear one series
    pub fn delete(&mut self, command: Command) -> bool {
        match command.index() {
            Some(slot) => {
                self.series[slot].clear();
                true
            }
            None => false,
        }
    }

    pub fn delete_all(&mut self) {
        for series in &mut self.series {
            series.clear();
        }
    }

    /// Append every series of `other` onto the matching series of `self`
    pub fn merge_from(&mut self, other: TelemetryStore) {
        for (mine, theirs) in self.series.iter_mut().zip(other.series) {
            mine.extend(theirs);
        }
    }

    /// Index of the sample of `command` nearest to `at`
    ///
    /// See [`nearest_in`] for the scan rules.
    ///
    /// # Arguments
    ///
    /// * `command` - Series to scan
    /// * `at` - Time to look up
    /// * `direction` - Scan direction from `start`
    /// * `start` - Index the scan begins at
    ///
    /// # Returns
    ///
    /// * `Result<usize, LookupError>` - Index into [`TelemetryStore::series`]
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `command` is not registered ([`LookupError::InvalidCommand`])
    /// - The series is empty ([`LookupError::EmptySeries`])
    pub fn nearest_index(
        &self,
        command: Command,
        at: DateTime<Utc>,
        direction: ScanDirection,
        start: usize,
    ) -> Result<usize, LookupError> {
        let samples = self.series(command).ok_or(LookupError::InvalidCommand)?;
        nearest_in(samples, at, direction, start).ok_or(LookupError::EmptySeries)
    }

    /// [`TelemetryStore::nearest_index`] with the direction given by name
    ///
    /// Checks run in order: command, direction, emptiness.
    pub fn nearest_index_by_name(
        &self,
        command: Command,
        at: DateTime<Utc>,
        direction: &str,
        start: usize,
    ) -> Result<usize, LookupError> {
        if !command.is_valid() {
            return Err(LookupError::InvalidCommand);
        }
        let direction = direction.parse()?;
        self.nearest_index(command, at, direction, start)
    }

    /// Replace a series wholesale
    pub(crate) fn replace(&mut self, command: Command, samples: Vec<Sample>) -> bool {
        match command.index() {
            Some(slot) => {
                self.series[slot] = samples;
                true
            }
            None => false,
        }
    }
}

impl AddAssign for TelemetryStore {
    fn add_assign(&mut self, other: TelemetryStore) {
        self.merge_from(other);
    }
}

impl fmt::Display for TelemetryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (command, samples) in self.iter() {
            let title = command.to_string();
            writeln!(f)?;
            writeln!(f, "> {}", title)?;
            writeln!(f, "  {}", "=".repeat(title.len()))?;
            for sample in samples {
                writeln!(f, "  {}   | {:10.3}", sample.time.format(TIME_FORMAT), sample.value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlm::registry::{Device, Quantity, Source};

    const BCR1_VOLTAGE: Command = Command::new(Device::Eps, Source::Bcr1, Quantity::Voltage);
    const EPS_PL_VOLTAGE: Command = Command::new(Device::Eps, Source::Pl, Quantity::Voltage);

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn series_of(times: &[i64]) -> Vec<Sample> {
        times.iter().map(|&t| Sample::new(at(t), t as f32)).collect()
    }

    #[test]
    fn test_new_store_has_every_command_empty() {
        let store = TelemetryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), VALID_COMMANDS.len());
        for cmd in VALID_COMMANDS {
            assert_eq!(store.series(*cmd), Some(&[][..]));
        }
    }

    #[test]
    fn test_append_every_valid_command() {
        let mut store = TelemetryStore::new();
        for cmd in VALID_COMMANDS {
            let (device, source, quantity) = cmd.ids();
            let before = store.len_of(*cmd);
            assert!(store.append(device, source, quantity, at(1), 1.0), "{}", cmd);
            assert_eq!(store.len_of(*cmd), before + 1);
        }
        assert_eq!(store.total_samples(), VALID_COMMANDS.len());
    }

    #[test]
    fn test_append_rejects_unlisted_triples() {
        let mut store = TelemetryStore::new();
        assert!(!store.append(0, 5, 0, at(1), 1.0)); // EPS PL VOLTAGE
        assert!(!store.append(7, 12, 0, at(1), 1.0)); // device out of range
        assert!(!store.append(0, 12, 200, at(1), 1.0)); // type out of range
        assert!(store.is_empty());
        assert!(!store.push(EPS_PL_VOLTAGE, Sample::new(at(1), 1.0)));
        assert_eq!(store.series(EPS_PL_VOLTAGE), None);
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let mut store = TelemetryStore::new();
        for (t, v) in [(5, 1.0), (1, 2.0), (5, 3.0), (3, 4.0), (1, 5.0)] {
            store.push(BCR1_VOLTAGE, Sample::new(at(t), v));
        }

        assert!(store.sort(BCR1_VOLTAGE));
        let sorted: Vec<(i64, f32)> = store
            .series(BCR1_VOLTAGE)
            .unwrap()
            .iter()
            .map(|s| (s.time.timestamp(), s.value))
            .collect();
        assert_eq!(sorted, vec![(1, 2.0), (1, 5.0), (3, 4.0), (5, 1.0), (5, 3.0)]);

        let once = store.clone();
        store.sort_all();
        assert_eq!(store, once);
    }

    #[test]
    fn test_sort_and_delete_unregistered_command() {
        let mut store = TelemetryStore::new();
        assert!(!store.sort(EPS_PL_VOLTAGE));
        assert!(!store.delete(EPS_PL_VOLTAGE));
    }

    #[test]
    fn test_delete() {
        let mut store = TelemetryStore::new();
        let current = Command::new(Device::Eps, Source::Bcr1, Quantity::Current);
        store.push(BCR1_VOLTAGE, Sample::new(at(1), 1.0));
        store.push(current, Sample::new(at(1), 1.0));

        assert_eq!(store.commands().collect::<Vec<_>>(), vec![BCR1_VOLTAGE, current]);

        assert!(store.delete(BCR1_VOLTAGE));
        assert_eq!(store.len_of(BCR1_VOLTAGE), 0);
        assert_eq!(store.len_of(current), 1);
        assert_eq!(store.commands().collect::<Vec<_>>(), vec![current]);

        store.delete_all();
        assert!(store.is_empty());
    }

    #[test]
    fn test_merge_from_preserves_both_orders() {
        let mut first = TelemetryStore::new();
        first.push(BCR1_VOLTAGE, Sample::new(at(9), 1.0));
        first.push(BCR1_VOLTAGE, Sample::new(at(2), 2.0));

        let mut second = TelemetryStore::new();
        second.push(BCR1_VOLTAGE, Sample::new(at(1), 3.0));
        let cell = Command::new(Device::Bat, Source::Cell, Quantity::Voltage);
        second.push(cell, Sample::new(at(4), 4.0));

        first += second;
        let values: Vec<f32> = first.series(BCR1_VOLTAGE).unwrap().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(first.len_of(cell), 1);
    }

    #[test]
    fn test_nearest_ascending() {
        let samples = series_of(&[0, 10, 20, 30]);
        assert_eq!(nearest_in(&samples, at(12), ScanDirection::Ascending, 0), Some(1));
        assert_eq!(nearest_in(&samples, at(18), ScanDirection::Ascending, 0), Some(2));
        // Tie between 10 and 20 goes to the earlier-scanned sample
        assert_eq!(nearest_in(&samples, at(15), ScanDirection::Ascending, 0), Some(1));
        // Query before the start offset returns the offset itself
        assert_eq!(nearest_in(&samples, at(5), ScanDirection::Ascending, 2), Some(2));
        // Query after the last sample
        assert_eq!(nearest_in(&samples, at(99), ScanDirection::Ascending, 0), Some(3));
    }

    #[test]
    fn test_nearest_descending() {
        let samples = series_of(&[0, 10, 20, 30]);
        assert_eq!(nearest_in(&samples, at(12), ScanDirection::Descending, 3), Some(1));
        assert_eq!(nearest_in(&samples, at(18), ScanDirection::Descending, 3), Some(2));
        // Tie goes to the later sample, which the backward scan sees first
        assert_eq!(nearest_in(&samples, at(15), ScanDirection::Descending, 3), Some(2));
        assert_eq!(nearest_in(&samples, at(25), ScanDirection::Descending, 1), Some(1));
        assert_eq!(nearest_in(&samples, at(-5), ScanDirection::Descending, 3), Some(0));
    }

    #[test]
    fn test_nearest_start_beyond_end_is_clamped() {
        let samples = series_of(&[0, 10]);
        assert_eq!(nearest_in(&samples, at(1), ScanDirection::Descending, 50), Some(0));
        assert_eq!(nearest_in(&samples, at(1), ScanDirection::Ascending, 50), Some(1));
    }

    #[test]
    fn test_nearest_index_sentinels_are_distinct() {
        let store = TelemetryStore::new();

        let empty = store.nearest_index_by_name(BCR1_VOLTAGE, at(0), "ascending", 0);
        assert_eq!(empty, Err(LookupError::EmptySeries));

        let bad_cmd = store.nearest_index_by_name(EPS_PL_VOLTAGE, at(0), "ascending", 0);
        assert_eq!(bad_cmd, Err(LookupError::InvalidCommand));

        let bad_dir = store.nearest_index_by_name(BCR1_VOLTAGE, at(0), "sideways", 0);
        assert_eq!(bad_dir, Err(LookupError::InvalidDirection));

        let codes = [
            LookupError::InvalidCommand.code(),
            LookupError::InvalidDirection.code(),
            LookupError::EmptySeries.code(),
        ];
        assert_eq!(codes, [-1, -2, -3]);
    }

    #[test]
    fn test_nearest_index_on_store() {
        let mut store = TelemetryStore::new();
        for sample in series_of(&[0, 10, 20]) {
            store.push(BCR1_VOLTAGE, sample);
        }
        assert_eq!(store.nearest_index(BCR1_VOLTAGE, at(11), ScanDirection::Ascending, 0), Ok(1));
        assert_eq!(store.nearest_index_by_name(BCR1_VOLTAGE, at(19), "right", 2), Ok(2));
    }

    #[test]
    fn test_display_dump() {
        let mut store = TelemetryStore::new();
        store.push(BCR1_VOLTAGE, Sample::new(at(0), 1.5));
        let dump = store.to_string();

        assert!(dump.contains("> EPS | BCR1 | VOLTAGE\n  ====================\n"));
        assert!(dump.contains("  1970-01-01 00:00:00   |      1.500\n"));
    }
}
