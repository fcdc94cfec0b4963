//! # EPS TLM Library
//!
//! Decodes EPS (electrical power subsystem) telemetry `.tlm` files into
//! per-command time series and derives power channels from them.
//!
//! This library provides the record format, the telemetry store, the file
//! ingestion loop with its corruption limit, and CSV / JSON Lines export.

pub mod config;
pub mod error;
pub mod tlm;
pub mod telemetry;
pub mod ingest;
pub mod app;
