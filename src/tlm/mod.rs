//! # TLM Wire Format Module
//!
//! Binary record format of EPS telemetry `.tlm` files.
//!
//! This module handles:
//! - The closed set of (device, source, type) commands
//! - Per-type value encoding and the fixed record header
//! - Streaming record decoding with clean end-of-stream on truncation
//! - Producer-side encoding for fixtures

pub mod registry;
pub mod decoder;
pub mod encoder;
