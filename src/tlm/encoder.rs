//! # TLM Record Encoder
//!
//! Producer-side layout of `.tlm` records. The flight software is the real
//! producer; this encoder exists to build test fixtures and replay files.

use bytes::{BufMut, Bytes, BytesMut};

use super::decoder::ByteOrder;
use super::registry::{self, Command, NumericKind, HEADER_SIZE};

/// Appends records to an in-memory `.tlm` image
///
/// # Examples
///
/// ```
/// use eps_tlm::tlm::decoder::ByteOrder;
/// use eps_tlm::tlm::encoder::RecordEncoder;
/// use eps_tlm::tlm::registry::{Command, Device, Quantity, Source};
///
/// let cmd = Command::new(Device::Eps, Source::Bcr1, Quantity::Voltage);
/// let mut enc = RecordEncoder::new(ByteOrder::Little);
/// enc.push(cmd, 1_000_000_000, 8.2);
/// assert_eq!(enc.finish().len(), 16);
/// ```
#[derive(Debug)]
pub struct RecordEncoder {
    buf: BytesMut,
    byte_order: ByteOrder,
}

impl RecordEncoder {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            byte_order,
        }
    }

    /// Append a record for `command` at `ticks` nanoseconds since the epoch
    pub fn push(&mut self, command: Command, ticks: u64, value: f32) -> &mut Self {
        let (device, source, quantity) = command.ids();
        self.push_raw(ticks, device, source, quantity, value)
    }

    /// Append a record with arbitrary ids
    ///
    /// The value is written in the kind the registry assigns to `quantity`.
    pub fn push_raw(&mut self, ticks: u64, device: u8, source: u8, quantity: u8, value: f32) -> &mut Self {
        let wire = registry::wire_kind(quantity);

        self.buf.reserve(HEADER_SIZE + wire.width);
        self.buf.put_u8((HEADER_SIZE + wire.width) as u8);
        match self.byte_order {
            ByteOrder::Little => self.buf.put_u64_le(ticks),
            ByteOrder::Big => self.buf.put_u64(ticks),
            ByteOrder::Native => self.buf.put_u64_ne(ticks),
        }
        self.buf.put_u8(device);
        self.buf.put_u8(source);
        self.buf.put_u8(quantity);
        encode_value(&mut self.buf, wire.kind, self.byte_order, value);
        self
    }

    /// Append raw bytes, e.g. to simulate a damaged tail
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freeze the image
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

macro_rules! put_ordered {
    ($buf:expr, $order:expr, $le:ident, $be:ident, $ne:ident, $value:expr) => {
        match $order {
            ByteOrder::Little => $buf.$le($value),
            ByteOrder::Big => $buf.$be($value),
            ByteOrder::Native => $buf.$ne($value),
        }
    };
}

/// Write `value` as `kind`; integer kinds truncate toward zero
pub fn encode_value<B: BufMut>(buf: &mut B, kind: NumericKind, order: ByteOrder, value: f32) {
    match kind {
        NumericKind::Bit => buf.put_u8(u8::from(value != 0.0)),
        NumericKind::U8 => buf.put_u8(value as u8),
        NumericKind::I8 => buf.put_i8(value as i8),
        NumericKind::U16 => put_ordered!(buf, order, put_u16_le, put_u16, put_u16_ne, value as u16),
        NumericKind::I16 => put_ordered!(buf, order, put_i16_le, put_i16, put_i16_ne, value as i16),
        NumericKind::U32 => put_ordered!(buf, order, put_u32_le, put_u32, put_u32_ne, value as u32),
        NumericKind::I32 => put_ordered!(buf, order, put_i32_le, put_i32, put_i32_ne, value as i32),
        NumericKind::U64 => put_ordered!(buf, order, put_u64_le, put_u64, put_u64_ne, value as u64),
        NumericKind::I64 => put_ordered!(buf, order, put_i64_le, put_i64, put_i64_ne, value as i64),
        NumericKind::F32 => put_ordered!(buf, order, put_f32_le, put_f32, put_f32_ne, value),
        NumericKind::F64 => {
            put_ordered!(buf, order, put_f64_le, put_f64, put_f64_ne, f64::from(value))
        }
    }
}
