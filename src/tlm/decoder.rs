//! # TLM Record Decoder
//!
//! Reads `.tlm` records one at a time from a byte stream.
//!
//! ```text
//! [width u8][time u64 ns][device u8][source u8][type u8][value, width from type]
//! ```
//!
//! There is no record count, checksum or end marker. End of file and a short
//! read anywhere inside a record are both treated as a clean end of stream.

use std::io::{self, Read};

use bytes::Buf;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::registry::{self, Command, NumericKind, WireKind, HEADER_SIZE, WIDTH_KIND};
use crate::error::Result;

/// Nanosecond ticks per second of the timestamp field
pub const TICKS_PER_SECOND: u64 = 1_000_000_000;

/// Byte order of multi-byte fields
///
/// Must match the machine that wrote the file; it is never auto-detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
    Native,
}

/// Why a value or timestamp field could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("invalid boolean byte 0x{0:02X}")]
    InvalidBool(u8),

    #[error("value field too short: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}

/// One decoded record, before allow-list validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord {
    /// Frame width tag as written by the producer
    pub width: u8,
    pub timestamp: DateTime<Utc>,
    pub device: u8,
    pub source: u8,
    pub quantity: u8,
    pub value: f32,
}

impl RawRecord {
    /// Command triple if every id is in range (not necessarily allow-listed)
    pub fn command(&self) -> Option<Command> {
        Command::from_ids(self.device, self.source, self.quantity)
    }
}

/// A record whose framing was intact but whose fields did not decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedRecord {
    pub device: u8,
    pub source: u8,
    pub quantity: u8,
    pub reason: ValueError,
}

/// Result of reading one record
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Record decoded; it still has to pass the allow-list
    Record(RawRecord),

    /// Record framed correctly but a field failed to decode
    Malformed(MalformedRecord),

    /// End of stream, clean or truncated
    End,
}

/// Streaming decoder over any [`Read`] source
#[derive(Debug)]
pub struct FrameDecoder<R> {
    reader: R,
    byte_order: ByteOrder,
    wire_kind: fn(u8) -> WireKind,
}

impl<R: Read> FrameDecoder<R> {
    /// Create a decoder reading fields in `byte_order`
    pub fn new(reader: R, byte_order: ByteOrder) -> Self {
        Self::with_wire_table(reader, byte_order, registry::wire_kind)
    }

    /// Create a decoder that sizes value fields with `wire_kind` instead of
    /// the registry table
    pub fn with_wire_table(reader: R, byte_order: ByteOrder, wire_kind: fn(u8) -> WireKind) -> Self {
        Self {
            reader,
            byte_order,
            wire_kind,
        }
    }

    /// Decode the next record
    ///
    /// # Errors
    ///
    /// Returns error only for I/O failures other than a short read.
    pub fn next_record(&mut self) -> Result<DecodeOutcome> {
        let mut header = [0u8; HEADER_SIZE];

        let (width_field, rest) = header.split_at_mut(WIDTH_KIND.byte_count());
        if !self.read_field(width_field)? || !self.read_field(rest)? {
            return Ok(DecodeOutcome::End);
        }

        let mut fields = &header[..];
        let width = fields.get_u8();
        let ticks = match self.byte_order {
            ByteOrder::Little => fields.get_u64_le(),
            ByteOrder::Big => fields.get_u64(),
            ByteOrder::Native => fields.get_u64_ne(),
        };
        let device = fields.get_u8();
        let source = fields.get_u8();
        let quantity = fields.get_u8();

        let wire = (self.wire_kind)(quantity);
        let mut value_bytes = [0u8; 8];
        if !self.read_field(&mut value_bytes[..wire.width])? {
            return Ok(DecodeOutcome::End);
        }

        let timestamp = decode_timestamp(ticks);
        let decoded = decode_value(&value_bytes[..wire.width], wire.kind, self.byte_order);

        Ok(match decoded {
            Ok(value) => DecodeOutcome::Record(RawRecord {
                width,
                timestamp,
                device,
                source,
                quantity,
                value,
            }),
            Err(reason) => DecodeOutcome::Malformed(MalformedRecord {
                device,
                source,
                quantity,
                reason,
            }),
        })
    }

    /// Consume the decoder, returning the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Fill `buf` completely; `false` on a short read
    fn read_field(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Convert nanosecond ticks to whole seconds since the epoch
///
/// Sub-second precision is dropped. Every `u64` tick count is representable.
pub fn decode_timestamp(ticks: u64) -> DateTime<Utc> {
    let seconds = (ticks / TICKS_PER_SECOND) as i64;
    DateTime::from_timestamp(seconds, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

macro_rules! get_ordered {
    ($buf:expr, $order:expr, $le:ident, $be:ident, $ne:ident) => {
        match $order {
            ByteOrder::Little => $buf.$le(),
            ByteOrder::Big => $buf.$be(),
            ByteOrder::Native => $buf.$ne(),
        }
    };
}

/// Decode a value field of the given kind into the sample representation
pub fn decode_value(
    raw: &[u8],
    kind: NumericKind,
    order: ByteOrder,
) -> std::result::Result<f32, ValueError> {
    if raw.len() < kind.byte_count() {
        return Err(ValueError::Truncated {
            expected: kind.byte_count(),
            got: raw.len(),
        });
    }

    let mut buf = raw;
    let value = match kind {
        NumericKind::Bit => match buf.get_u8() {
            0 => 0.0,
            1 => 1.0,
            other => return Err(ValueError::InvalidBool(other)),
        },
        NumericKind::U8 => buf.get_u8() as f32,
        NumericKind::I8 => buf.get_i8() as f32,
        NumericKind::U16 => get_ordered!(buf, order, get_u16_le, get_u16, get_u16_ne) as f32,
        NumericKind::I16 => get_ordered!(buf, order, get_i16_le, get_i16, get_i16_ne) as f32,
        NumericKind::U32 => get_ordered!(buf, order, get_u32_le, get_u32, get_u32_ne) as f32,
        NumericKind::I32 => get_ordered!(buf, order, get_i32_le, get_i32, get_i32_ne) as f32,
        NumericKind::U64 => get_ordered!(buf, order, get_u64_le, get_u64, get_u64_ne) as f32,
        NumericKind::I64 => get_ordered!(buf, order, get_i64_le, get_i64, get_i64_ne) as f32,
        NumericKind::F32 => get_ordered!(buf, order, get_f32_le, get_f32, get_f32_ne),
        NumericKind::F64 => get_ordered!(buf, order, get_f64_le, get_f64, get_f64_ne) as f32,
    };

    Ok(value)
}
