//! # Derived Channels
//!
//! Synthesizes a channel from two independently sampled series, e.g. power
//! from a voltage and a current series.
//!
//! ## Alignment
//!
//! The two inputs are walked with one pointer each. Whenever one series is
//! behind, its sample is paired with the nearest sample of the other series
//! and the result is placed halfway between the two timestamps. Samples with
//! identical timestamps are paired directly. A pair is only emitted when at
//! least one of its indices moved past the previous pair, so a sparse series
//! does not produce repeated output. Once one series runs out, the rest of the
//! other is paired with its last sample.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use super::store::{nearest_in, Sample, ScanDirection, TelemetryStore};
use crate::error::EpsTlmError;
use crate::tlm::registry::{Command, DERIVED_CHANNELS, SCRATCH_COMMANDS};

/// Why a derived channel could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeriveError {
    #[error("command {0} is not registered")]
    InvalidCommand(Command),

    #[error("input series {0} is empty")]
    EmptySeries(Command),

    #[error("no scratch slot {0}")]
    NoScratchSlot(usize),
}

/// Named binary operations for derived channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Mul,
    Add,
    Sub,
    Div,
}

impl Combinator {
    pub fn apply(self, primary: f32, secondary: f32) -> f32 {
        match self {
            Combinator::Mul => primary * secondary,
            Combinator::Add => primary + secondary,
            Combinator::Sub => primary - secondary,
            Combinator::Div => primary / secondary,
        }
    }
}

impl FromStr for Combinator {
    type Err = EpsTlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mul" | "*" => Ok(Combinator::Mul),
            "add" | "+" => Ok(Combinator::Add),
            "sub" | "-" => Ok(Combinator::Sub),
            "div" | "/" => Ok(Combinator::Div),
            other => Err(EpsTlmError::Telemetry(format!("unknown combinator: {:?}", other))),
        }
    }
}

fn midpoint(anchor: DateTime<Utc>, other: DateTime<Utc>) -> DateTime<Utc> {
    anchor + (other - anchor) / 2
}

fn is_new(last: Option<(usize, usize)>, ia: usize, ib: usize) -> bool {
    last.map_or(true, |(la, lb)| ia > la || ib > lb)
}

/// Merge two series sorted by time into one combined series
///
/// Output timestamps are non-decreasing. Either input being empty yields an
/// empty result.
pub fn merge_series<F>(a: &[Sample], b: &[Sample], combine: F) -> Vec<Sample>
where
    F: Fn(f32, f32) -> f32,
{
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let mut last: Option<(usize, usize)> = None;
    let (mut i, mut j) = (0, 0);

    let mut emit = |ia: usize, ib: usize, time: DateTime<Utc>, out: &mut Vec<Sample>| {
        if is_new(last, ia, ib) {
            out.push(Sample::new(time, combine(a[ia].value, b[ib].value)));
            last = Some((ia, ib));
        }
    };

    while i < a.len() && j < b.len() {
        let (ta, tb) = (a[i].time, b[j].time);

        if ta < tb {
            let k = nearest_in(b, ta, ScanDirection::Ascending, j.saturating_sub(1)).unwrap_or(j);
            emit(i, k, midpoint(b[k].time, ta), &mut out);
            i += 1;
        } else if tb < ta {
            let k = nearest_in(a, tb, ScanDirection::Ascending, i.saturating_sub(1)).unwrap_or(i);
            emit(k, j, midpoint(a[k].time, tb), &mut out);
            j += 1;
        } else {
            emit(i, j, ta, &mut out);
            i += 1;
            j += 1;
        }
    }

    // Drain whichever series is left against the last sample of the other
    if let Some(b_last) = b.len().checked_sub(1) {
        for ia in i..a.len() {
            emit(ia, b_last, midpoint(a[ia].time, b[b_last].time), &mut out);
        }
    }
    if let Some(a_last) = a.len().checked_sub(1) {
        for ib in j..b.len() {
            emit(a_last, ib, midpoint(b[ib].time, a[a_last].time), &mut out);
        }
    }

    out
}

/// Compute `target = combine(primary, secondary)` inside a store
///
/// Both inputs are sorted in place first; the target series is replaced.
///
/// # Arguments
///
/// * `store` - Store holding the inputs and receiving the target series
/// * `primary` - Series supplying the left operand
/// * `secondary` - Series supplying the right operand
/// * `target` - Series to replace with the result
/// * `combine` - Value operation applied to each aligned pair
///
/// # Returns
///
/// * `Result<usize, DeriveError>` - Number of samples written to `target`
///
/// # Errors
///
/// Returns error if:
/// - A command is not registered
/// - An input series is empty
///
/// The store is left untouched on error.
pub fn derive<F>(
    store: &mut TelemetryStore,
    primary: Command,
    secondary: Command,
    target: Command,
    combine: F,
) -> Result<usize, DeriveError>
where
    F: Fn(f32, f32) -> f32,
{
    for command in [primary, secondary, target] {
        if !command.is_valid() {
            return Err(DeriveError::InvalidCommand(command));
        }
    }
    for command in [primary, secondary] {
        if store.len_of(command) == 0 {
            return Err(DeriveError::EmptySeries(command));
        }
    }

    store.sort(primary);
    store.sort(secondary);

    let a = store.series(primary).ok_or(DeriveError::InvalidCommand(primary))?;
    let b = store.series(secondary).ok_or(DeriveError::InvalidCommand(secondary))?;
    let merged = merge_series(a, b, combine);
    let count = merged.len();

    store.replace(target, merged);
    debug!("Derived {} samples for {} from {} and {}", count, target, primary, secondary);
    Ok(count)
}

/// Compute every power channel whose inputs are present
///
/// Returns the channels written with their sample counts.
pub fn derive_power(store: &mut TelemetryStore) -> Vec<(Command, usize)> {
    let mut written = Vec::new();

    for channel in DERIVED_CHANNELS {
        match derive(store, channel.primary, channel.secondary, channel.target, |v, i| v * i) {
            Ok(count) => written.push((channel.target, count)),
            Err(e) => debug!("Skipping {}: {}", channel.target, e),
        }
    }

    written
}

/// Combine two arbitrary series into a scratch slot
pub fn derive_scratch(
    store: &mut TelemetryStore,
    primary: Command,
    secondary: Command,
    slot: usize,
    combinator: Combinator,
) -> Result<(Command, usize), DeriveError> {
    let target = *SCRATCH_COMMANDS.get(slot).ok_or(DeriveError::NoScratchSlot(slot))?;
    let count = derive(store, primary, secondary, target, |a, b| combinator.apply(a, b))?;
    Ok((target, count))
}
