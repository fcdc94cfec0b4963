//! # Telemetry Module
//!
//! In-memory telemetry store, derived channels, and export.
//!
//! This module handles:
//! - Per-command time series with nearest-sample lookup
//! - Merging two series into a derived channel (e.g. power = V x I)
//! - Writing the store as CSV or JSON Lines

pub mod store;
pub mod derived;
pub mod export;

pub use store::{Sample, ScanDirection, TelemetryStore};
