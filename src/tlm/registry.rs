//! # Command Registry
//!
//! Closed set of telemetry commands and the wire encoding table.
//!
//! A command is a (device, source, type) triple. Only the triples listed in
//! [`VALID_COMMANDS`] may be stored; membership is the only validity check
//! applied to a decoded record.

use std::fmt;
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{EpsTlmError, Result};

/// Device that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Device {
    Eps = 0,
    Bat = 1,
    Sse = 2,
    Ce = 3,
    Soft = 4,
    Derived = 5,
    Temp = 6,
    BlockInit = 255,
}

impl Device {
    /// Every device, in id order
    pub const ALL: [Device; 8] = [
        Device::Eps,
        Device::Bat,
        Device::Sse,
        Device::Ce,
        Device::Soft,
        Device::Derived,
        Device::Temp,
        Device::BlockInit,
    ];

    /// Upper-case name used in CSV rows and dumps
    pub const fn as_str(self) -> &'static str {
        match self {
            Device::Eps => "EPS",
            Device::Bat => "BAT",
            Device::Sse => "SSE",
            Device::Ce => "CE",
            Device::Soft => "SOFT",
            Device::Derived => "DERIVED",
            Device::Temp => "TEMP",
            Device::BlockInit => "BLOCK_INIT",
        }
    }
}

/// Physical line a record was measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Source {
    Uhf = 0,
    Cdh = 1,
    Sband = 2,
    Smard1 = 3,
    Smard2 = 4,
    Pl = 5,
    Adcs5v1 = 6,
    Adcs5v2 = 7,
    Thm = 8,
    Adcs3v3_1 = 9,
    Adcs3v3_2 = 10,
    Cell = 11,
    Bcr1 = 12,
    Bcr2 = 13,
    Bcr3 = 14,
    Sse = 15,
    Ce = 16,
    Ttc = 17,
    Bttc = 18,
    Temp = 19,
    BlockInit = 255,
}

impl Source {
    /// Every source, in id order
    pub const ALL: [Source; 21] = [
        Source::Uhf,
        Source::Cdh,
        Source::Sband,
        Source::Smard1,
        Source::Smard2,
        Source::Pl,
        Source::Adcs5v1,
        Source::Adcs5v2,
        Source::Thm,
        Source::Adcs3v3_1,
        Source::Adcs3v3_2,
        Source::Cell,
        Source::Bcr1,
        Source::Bcr2,
        Source::Bcr3,
        Source::Sse,
        Source::Ce,
        Source::Ttc,
        Source::Bttc,
        Source::Temp,
        Source::BlockInit,
    ];

    /// Upper-case name used in CSV rows and dumps
    pub const fn as_str(self) -> &'static str {
        match self {
            Source::Uhf => "UHF",
            Source::Cdh => "CDH",
            Source::Sband => "SBAND",
            Source::Smard1 => "SMARD1",
            Source::Smard2 => "SMARD2",
            Source::Pl => "PL",
            Source::Adcs5v1 => "ADCS5V_1",
            Source::Adcs5v2 => "ADCS5V_2",
            Source::Thm => "THM",
            Source::Adcs3v3_1 => "ADCS3V3_1",
            Source::Adcs3v3_2 => "ADCS3V3_2",
            Source::Cell => "CELL",
            Source::Bcr1 => "BCR1",
            Source::Bcr2 => "BCR2",
            Source::Bcr3 => "BCR3",
            Source::Sse => "SSE",
            Source::Ce => "CE",
            Source::Ttc => "TTC",
            Source::Bttc => "BTTC",
            Source::Temp => "TEMP",
            Source::BlockInit => "BLOCK_INIT",
        }
    }
}

/// Physical quantity carried by a record (the TYPE field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Quantity {
    Voltage = 0,
    Current = 1,
    CurrentB = 2,
    Temperature = 3,
    ManReset = 4,
    SoftReset = 5,
    WdReset = 6,
    BrwnoutReset = 7,
    WdTime = 8,
    ChargeLvl = 9,
    HeaterState1 = 10,
    HeaterState2 = 11,
    Temperature2 = 12,
    Temperature3 = 13,
    Current3v3 = 14,
    Current5v = 15,
    DerivedPower = 16,
    DerivedPowerB = 17,
    Temp1 = 18,
    Temp2 = 19,
    BlockInit = 255,
}

impl Quantity {
    /// Every quantity, in id order
    pub const ALL: [Quantity; 21] = [
        Quantity::Voltage,
        Quantity::Current,
        Quantity::CurrentB,
        Quantity::Temperature,
        Quantity::ManReset,
        Quantity::SoftReset,
        Quantity::WdReset,
        Quantity::BrwnoutReset,
        Quantity::WdTime,
        Quantity::ChargeLvl,
        Quantity::HeaterState1,
        Quantity::HeaterState2,
        Quantity::Temperature2,
        Quantity::Temperature3,
        Quantity::Current3v3,
        Quantity::Current5v,
        Quantity::DerivedPower,
        Quantity::DerivedPowerB,
        Quantity::Temp1,
        Quantity::Temp2,
        Quantity::BlockInit,
    ];

    /// Upper-case name used in CSV rows and dumps
    pub const fn as_str(self) -> &'static str {
        match self {
            Quantity::Voltage => "VOLTAGE",
            Quantity::Current => "CURRENT",
            Quantity::CurrentB => "CURRENTB",
            Quantity::Temperature => "TEMPERATURE",
            Quantity::ManReset => "MANRESET",
            Quantity::SoftReset => "SOFTRESET",
            Quantity::WdReset => "WDRESET",
            Quantity::BrwnoutReset => "BRWNOUTRESET",
            Quantity::WdTime => "WDTIME",
            Quantity::ChargeLvl => "CHARGE_LVL",
            Quantity::HeaterState1 => "HEATER_STATE1",
            Quantity::HeaterState2 => "HEATER_STATE2",
            Quantity::Temperature2 => "TEMPERATURE2",
            Quantity::Temperature3 => "TEMPERATURE3",
            Quantity::Current3v3 => "CURRENT3V3",
            Quantity::Current5v => "CURRENT5V",
            Quantity::DerivedPower => "DERIVED_POWER",
            Quantity::DerivedPowerB => "DERIVED_POWER_B",
            Quantity::Temp1 => "TEMP1",
            Quantity::Temp2 => "TEMP2",
            Quantity::BlockInit => "BLOCK_INIT",
        }
    }

    /// Physical unit of the quantity's values
    pub const fn physical_unit(self) -> &'static str {
        match self {
            Quantity::Voltage => "V",
            Quantity::Current | Quantity::CurrentB | Quantity::Current3v3 | Quantity::Current5v => "mA",
            Quantity::Temperature | Quantity::Temperature2 | Quantity::Temperature3 => "K",
            Quantity::ManReset | Quantity::SoftReset | Quantity::WdReset | Quantity::BrwnoutReset => {
                "count"
            }
            Quantity::HeaterState1 | Quantity::HeaterState2 => "on/off",
            Quantity::DerivedPower | Quantity::DerivedPowerB => "mW",
            _ => "1",
        }
    }

    /// Numeric kind of the value field for this quantity
    ///
    /// Heater states are logically booleans but the flight software writes
    /// them as float32, like every other quantity.
    pub const fn value_kind(self) -> NumericKind {
        match self {
            Quantity::Voltage
            | Quantity::Current
            | Quantity::CurrentB
            | Quantity::Temperature
            | Quantity::Temperature2
            | Quantity::Temperature3
            | Quantity::Current3v3
            | Quantity::Current5v => NumericKind::F32,
            Quantity::ManReset
            | Quantity::SoftReset
            | Quantity::WdReset
            | Quantity::BrwnoutReset
            | Quantity::WdTime
            | Quantity::ChargeLvl => NumericKind::F32,
            Quantity::HeaterState1 | Quantity::HeaterState2 => NumericKind::F32,
            Quantity::DerivedPower
            | Quantity::DerivedPowerB
            | Quantity::Temp1
            | Quantity::Temp2
            | Quantity::BlockInit => NumericKind::F32,
        }
    }
}

macro_rules! impl_names {
    ($($ty:ident),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl FromStr for $ty {
                type Err = EpsTlmError;

                fn from_str(s: &str) -> Result<Self> {
                    let wanted = s.trim();
                    $ty::ALL
                        .iter()
                        .copied()
                        .find(|item| item.as_str().eq_ignore_ascii_case(wanted))
                        .ok_or_else(|| {
                            EpsTlmError::Telemetry(format!(
                                "unknown {} name: {:?}",
                                stringify!($ty).to_lowercase(),
                                s
                            ))
                        })
                }
            }
        )*
    };
}

impl_names!(Device, Source, Quantity);

macro_rules! impl_ordinal {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                /// Dense position in `0..ALL.len()`; `BLOCK_INIT` takes the last slot
                pub(crate) const fn ordinal(self) -> usize {
                    match self {
                        $ty::BlockInit => $ty::ALL.len() - 1,
                        other => other as usize,
                    }
                }
            }
        )*
    };
}

impl_ordinal!(Device, Source, Quantity);

/// On-disk numeric representation of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Bit,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl NumericKind {
    /// Number of bytes the kind occupies on disk
    pub const fn byte_count(self) -> usize {
        match self {
            NumericKind::Bit | NumericKind::U8 | NumericKind::I8 => 1,
            NumericKind::U16 | NumericKind::I16 => 2,
            NumericKind::U32 | NumericKind::I32 | NumericKind::F32 => 4,
            NumericKind::U64 | NumericKind::I64 | NumericKind::F64 => 8,
        }
    }
}

/// Byte width and numeric kind of a value field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireKind {
    /// Field width in bytes
    pub width: usize,

    /// Numeric representation
    pub kind: NumericKind,
}

impl WireKind {
    /// Wire kind for a numeric representation
    pub const fn of(kind: NumericKind) -> Self {
        Self {
            width: kind.byte_count(),
            kind,
        }
    }
}

/// Frame width tag
pub const WIDTH_KIND: NumericKind = NumericKind::U8;

/// Timestamp in nanoseconds since the Unix epoch
pub const TIME_KIND: NumericKind = NumericKind::U64;

/// Device id
pub const DEVICE_KIND: NumericKind = NumericKind::U8;

/// Source id
pub const SOURCE_KIND: NumericKind = NumericKind::U8;

/// Type id
pub const TYPE_KIND: NumericKind = NumericKind::U8;

/// Record header size: width(1) + time(8) + device(1) + source(1) + type(1)
pub const HEADER_SIZE: usize = WIDTH_KIND.byte_count()
    + TIME_KIND.byte_count()
    + DEVICE_KIND.byte_count()
    + SOURCE_KIND.byte_count()
    + TYPE_KIND.byte_count();

/// Value kind used for type ids the registry does not know
///
/// Keeps the decoder in step with streams written by newer flight software.
pub const DEFAULT_VALUE_KIND: NumericKind = NumericKind::F32;

/// Wire kind of the value field for a raw type id
pub fn wire_kind(quantity_id: u8) -> WireKind {
    let kind = Quantity::try_from(quantity_id)
        .map(Quantity::value_kind)
        .unwrap_or(DEFAULT_VALUE_KIND);
    WireKind::of(kind)
}

/// A (device, source, type) triple identifying one telemetry channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Command {
    pub device: Device,
    pub source: Source,
    pub quantity: Quantity,
}

impl Command {
    pub const fn new(device: Device, source: Source, quantity: Quantity) -> Self {
        Self {
            device,
            source,
            quantity,
        }
    }

    /// Build a command from raw ids, `None` if any id is out of range
    ///
    /// The result is not necessarily a valid command; see [`Command::is_valid`].
    pub fn from_ids(device: u8, source: u8, quantity: u8) -> Option<Self> {
        Some(Self {
            device: Device::try_from(device).ok()?,
            source: Source::try_from(source).ok()?,
            quantity: Quantity::try_from(quantity).ok()?,
        })
    }

    /// Slot of this command in [`VALID_COMMANDS`]
    pub fn index(&self) -> Option<usize> {
        let slot = COMMAND_SLOTS[self.device.ordinal()][self.source.ordinal()][self.quantity.ordinal()];
        (slot != NO_SLOT).then_some(slot as usize)
    }

    /// Whether the command is on the allow-list
    pub fn is_valid(&self) -> bool {
        self.index().is_some()
    }

    /// Raw (device, source, type) ids
    pub fn ids(&self) -> (u8, u8, u8) {
        (self.device.into(), self.source.into(), self.quantity.into())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.device, self.source, self.quantity)
    }
}

/// Parses `DEVICE:SOURCE:TYPE` (`;` and `,` are accepted as separators too)
impl FromStr for Command {
    type Err = EpsTlmError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(|c| c == ':' || c == ';' || c == ',').collect();
        if parts.len() != 3 {
            return Err(EpsTlmError::InvalidCommand(format!(
                "expected DEVICE:SOURCE:TYPE, got {:?}",
                s
            )));
        }

        Ok(Command::new(parts[0].parse()?, parts[1].parse()?, parts[2].parse()?))
    }
}

const NO_SLOT: u8 = u8::MAX;

type SlotTable = [[[u8; Quantity::ALL.len()]; Source::ALL.len()]; Device::ALL.len()];

/// `VALID_COMMANDS` position of every triple, `NO_SLOT` when not listed
const COMMAND_SLOTS: SlotTable = build_slots();

const fn build_slots() -> SlotTable {
    let mut slots = [[[NO_SLOT; Quantity::ALL.len()]; Source::ALL.len()]; Device::ALL.len()];
    let mut i = VALID_COMMANDS.len();
    // walk backwards so the first listing of a triple wins
    while i > 0 {
        i -= 1;
        let cmd = VALID_COMMANDS[i];
        slots[cmd.device.ordinal()][cmd.source.ordinal()][cmd.quantity.ordinal()] = i as u8;
    }
    slots
}

/// Decide allow-list membership from raw ids
///
/// Fails closed: ids outside any enum's range are simply not valid.
pub fn is_valid(device: u8, source: u8, quantity: u8) -> bool {
    Command::from_ids(device, source, quantity).map_or(false, |cmd| cmd.is_valid())
}

const fn cmd(device: Device, source: Source, quantity: Quantity) -> Command {
    Command::new(device, source, quantity)
}

use Device as D;
use Quantity as Q;
use Source as S;

/// Number of physical commands at the head of [`VALID_COMMANDS`]
pub const PHYSICAL_COMMAND_COUNT: usize = 46;

/// Every command that may be stored, in display order
///
/// The first [`PHYSICAL_COMMAND_COUNT`] entries are written by the flight
/// software; the rest are derived power channels and two scratch slots.
pub const VALID_COMMANDS: &[Command] = &[
    // BCR
    cmd(D::Eps, S::Bcr1, Q::Voltage),
    cmd(D::Eps, S::Bcr1, Q::Current),
    cmd(D::Eps, S::Bcr1, Q::CurrentB),
    cmd(D::Eps, S::Bcr2, Q::Voltage),
    cmd(D::Eps, S::Bcr2, Q::Current),
    cmd(D::Eps, S::Bcr2, Q::CurrentB),
    cmd(D::Eps, S::Bcr3, Q::Voltage),
    cmd(D::Eps, S::Bcr3, Q::Current),
    cmd(D::Eps, S::Bcr3, Q::CurrentB),
    // TTC
    cmd(D::Eps, S::Ttc, Q::Voltage),
    cmd(D::Eps, S::Ttc, Q::Current),
    cmd(D::Eps, S::Ttc, Q::Current3v3),
    cmd(D::Eps, S::Ttc, Q::Current5v),
    cmd(D::Eps, S::Ttc, Q::Temperature),
    cmd(D::Eps, S::Ttc, Q::ManReset),
    cmd(D::Eps, S::Ttc, Q::WdReset),
    cmd(D::Eps, S::Ttc, Q::SoftReset),
    cmd(D::Eps, S::Ttc, Q::BrwnoutReset),
    // Bus
    cmd(D::Eps, S::Uhf, Q::Voltage),
    cmd(D::Eps, S::Uhf, Q::Current),
    cmd(D::Eps, S::Sband, Q::Voltage),
    cmd(D::Eps, S::Sband, Q::Current),
    cmd(D::Eps, S::Cdh, Q::Voltage),
    cmd(D::Eps, S::Cdh, Q::Current),
    cmd(D::Eps, S::Smard1, Q::Voltage),
    cmd(D::Eps, S::Smard1, Q::Current),
    cmd(D::Eps, S::Smard2, Q::Voltage),
    cmd(D::Eps, S::Smard2, Q::Current),
    cmd(D::Eps, S::Adcs5v1, Q::Voltage),
    cmd(D::Eps, S::Adcs5v1, Q::Current),
    cmd(D::Eps, S::Adcs5v2, Q::Voltage),
    cmd(D::Eps, S::Adcs5v2, Q::Current),
    cmd(D::Eps, S::Adcs3v3_1, Q::Voltage),
    cmd(D::Eps, S::Adcs3v3_1, Q::Current),
    cmd(D::Eps, S::Adcs3v3_2, Q::Voltage),
    cmd(D::Eps, S::Adcs3v3_2, Q::Current),
    cmd(D::Eps, S::Thm, Q::Voltage),
    cmd(D::Eps, S::Thm, Q::Current),
    // Battery
    cmd(D::Bat, S::Cell, Q::Voltage),
    cmd(D::Bat, S::Cell, Q::Current),
    cmd(D::Bat, S::Ce, Q::ChargeLvl),
    cmd(D::Bat, S::Bttc, Q::HeaterState1),
    cmd(D::Bat, S::Bttc, Q::HeaterState2),
    cmd(D::Bat, S::Bttc, Q::Temperature),
    cmd(D::Bat, S::Bttc, Q::Temperature2),
    cmd(D::Bat, S::Bttc, Q::Temperature3),
    // Derived power (V * mA)
    cmd(D::Derived, S::Bcr1, Q::DerivedPower),
    cmd(D::Derived, S::Bcr2, Q::DerivedPower),
    cmd(D::Derived, S::Bcr3, Q::DerivedPower),
    cmd(D::Derived, S::Bcr1, Q::DerivedPowerB),
    cmd(D::Derived, S::Bcr2, Q::DerivedPowerB),
    cmd(D::Derived, S::Bcr3, Q::DerivedPowerB),
    cmd(D::Derived, S::Ttc, Q::DerivedPower),
    cmd(D::Derived, S::Uhf, Q::DerivedPower),
    cmd(D::Derived, S::Sband, Q::DerivedPower),
    cmd(D::Derived, S::Cdh, Q::DerivedPower),
    cmd(D::Derived, S::Smard1, Q::DerivedPower),
    cmd(D::Derived, S::Smard2, Q::DerivedPower),
    cmd(D::Derived, S::Adcs5v1, Q::DerivedPower),
    cmd(D::Derived, S::Adcs5v2, Q::DerivedPower),
    cmd(D::Derived, S::Adcs3v3_1, Q::DerivedPower),
    cmd(D::Derived, S::Adcs3v3_2, Q::DerivedPower),
    cmd(D::Derived, S::Thm, Q::DerivedPower),
    cmd(D::Derived, S::Cell, Q::DerivedPower),
    // Scratch
    cmd(D::Temp, S::Temp, Q::Temp1),
    cmd(D::Temp, S::Temp, Q::Temp2),
];

/// Scratch commands for ad-hoc derived channels
pub const SCRATCH_COMMANDS: [Command; 2] = [
    cmd(D::Temp, S::Temp, Q::Temp1),
    cmd(D::Temp, S::Temp, Q::Temp2),
];

/// A channel computed from two physical channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedChannel {
    /// Command the result is written to
    pub target: Command,

    /// Primary input (voltage)
    pub primary: Command,

    /// Secondary input (current)
    pub secondary: Command,
}

const fn power(source: Source, device: Device, current: Quantity, target: Quantity) -> DerivedChannel {
    DerivedChannel {
        target: cmd(D::Derived, source, target),
        primary: cmd(device, source, Q::Voltage),
        secondary: cmd(device, source, current),
    }
}

/// Power channels: voltage [V] times current [mA] gives [mW]
pub const DERIVED_CHANNELS: &[DerivedChannel] = &[
    power(S::Bcr1, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Bcr2, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Bcr3, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Bcr1, D::Eps, Q::CurrentB, Q::DerivedPowerB),
    power(S::Bcr2, D::Eps, Q::CurrentB, Q::DerivedPowerB),
    power(S::Bcr3, D::Eps, Q::CurrentB, Q::DerivedPowerB),
    power(S::Ttc, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Uhf, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Sband, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Cdh, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Smard1, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Smard2, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Adcs5v1, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Adcs5v2, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Adcs3v3_1, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Adcs3v3_2, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Thm, D::Eps, Q::Current, Q::DerivedPower),
    power(S::Cell, D::Bat, Q::Current, Q::DerivedPower),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_header_constants() {
        assert_eq!(WIDTH_KIND.byte_count(), 1);
        assert_eq!(TIME_KIND.byte_count(), 8);
        assert_eq!(DEVICE_KIND.byte_count(), 1);
        assert_eq!(SOURCE_KIND.byte_count(), 1);
        assert_eq!(TYPE_KIND.byte_count(), 1);
        assert_eq!(HEADER_SIZE, 12);
    }

    #[test]
    fn test_byte_counts() {
        assert_eq!(NumericKind::Bit.byte_count(), 1);
        assert_eq!(NumericKind::I16.byte_count(), 2);
        assert_eq!(NumericKind::U32.byte_count(), 4);
        assert_eq!(NumericKind::F32.byte_count(), 4);
        assert_eq!(NumericKind::F64.byte_count(), 8);
        assert_eq!(NumericKind::I64.byte_count(), 8);
    }

    #[test]
    fn test_ordinals_are_dense() {
        for (n, device) in Device::ALL.iter().enumerate() {
            assert!(device.ordinal() < Device::ALL.len());
            assert!(Device::ALL[..n].iter().all(|d| d.ordinal() != device.ordinal()));
        }
        for (n, source) in Source::ALL.iter().enumerate() {
            assert!(source.ordinal() < Source::ALL.len());
            assert!(Source::ALL[..n].iter().all(|s| s.ordinal() != source.ordinal()));
        }
        for (n, quantity) in Quantity::ALL.iter().enumerate() {
            assert!(quantity.ordinal() < Quantity::ALL.len());
            assert!(Quantity::ALL[..n].iter().all(|q| q.ordinal() != quantity.ordinal()));
        }
    }

    #[test]
    fn test_index_matches_table_position() {
        for (slot, cmd) in VALID_COMMANDS.iter().enumerate() {
            assert_eq!(cmd.index(), Some(slot), "{}", cmd);
        }

        let mut listed = 0;
        for device in Device::ALL {
            for source in Source::ALL {
                for quantity in Quantity::ALL {
                    let cmd = Command::new(device, source, quantity);
                    assert_eq!(cmd.index(), VALID_COMMANDS.iter().position(|c| *c == cmd));
                    listed += usize::from(cmd.index().is_some());
                }
            }
        }
        assert_eq!(listed, VALID_COMMANDS.len());
    }

    #[test]
    fn test_block_init_is_never_valid() {
        let cmd = Command::new(Device::BlockInit, Source::BlockInit, Quantity::BlockInit);
        assert_eq!(cmd.index(), None);
        assert!(!is_valid(255, 255, 255));
    }

    #[test]
    fn test_valid_commands_unique() {
        let unique: HashSet<_> = VALID_COMMANDS.iter().collect();
        assert_eq!(unique.len(), VALID_COMMANDS.len());
        assert_eq!(VALID_COMMANDS.len(), 66);
    }

    #[test]
    fn test_physical_commands_come_from_flight_devices() {
        for cmd in &VALID_COMMANDS[..PHYSICAL_COMMAND_COUNT] {
            assert!(matches!(cmd.device, Device::Eps | Device::Bat), "{}", cmd);
        }
        for cmd in &VALID_COMMANDS[PHYSICAL_COMMAND_COUNT..] {
            assert!(matches!(cmd.device, Device::Derived | Device::Temp), "{}", cmd);
        }
    }

    #[test]
    fn test_is_valid_known_triple() {
        assert!(is_valid(0, 12, 0)); // EPS BCR1 VOLTAGE
        assert!(is_valid(1, 18, 10)); // BAT BTTC HEATER_STATE1
    }

    #[test]
    fn test_is_valid_unlisted_triple() {
        // EPS PL VOLTAGE: all ids exist but the triple is not listed
        assert!(!is_valid(0, 5, 0));
        assert!(!is_valid(4, 12, 0));
    }

    #[test]
    fn test_is_valid_fails_closed_out_of_range() {
        assert!(!is_valid(200, 12, 0));
        assert!(!is_valid(0, 100, 0));
        assert!(!is_valid(0, 12, 99));
    }

    #[test]
    fn test_wire_kind_known_types_are_float32() {
        for quantity in Quantity::ALL {
            let wire = wire_kind(quantity.into());
            assert_eq!(wire.kind, NumericKind::F32);
            assert_eq!(wire.width, 4);
        }
    }

    #[test]
    fn test_wire_kind_unknown_type_uses_default() {
        assert_eq!(wire_kind(42), WireKind::of(DEFAULT_VALUE_KIND));
        assert_eq!(wire_kind(42).width, 4);
    }

    #[test]
    fn test_physical_units() {
        assert_eq!(Quantity::Voltage.physical_unit(), "V");
        assert_eq!(Quantity::Current5v.physical_unit(), "mA");
        assert_eq!(Quantity::Temperature3.physical_unit(), "K");
        assert_eq!(Quantity::WdReset.physical_unit(), "count");
        assert_eq!(Quantity::HeaterState2.physical_unit(), "on/off");
        assert_eq!(Quantity::DerivedPowerB.physical_unit(), "mW");
        assert_eq!(Quantity::ChargeLvl.physical_unit(), "1");
    }

    #[test]
    fn test_command_parse_and_display() {
        let cmd: Command = "eps:adcs5v_1:voltage".parse().unwrap();
        assert_eq!(cmd, Command::new(Device::Eps, Source::Adcs5v1, Quantity::Voltage));
        assert_eq!(cmd.to_string(), "EPS | ADCS5V_1 | VOLTAGE");

        let cmd: Command = "BAT;CELL;CURRENT".parse().unwrap();
        assert_eq!(cmd.ids(), (1, 11, 1));
    }

    #[test]
    fn test_command_parse_errors() {
        assert!("EPS:BCR1".parse::<Command>().is_err());
        assert!("EPS:NOPE:VOLTAGE".parse::<Command>().is_err());
    }

    #[test]
    fn test_derived_channels_are_registered() {
        for channel in DERIVED_CHANNELS {
            assert!(channel.target.is_valid(), "{}", channel.target);
            assert!(channel.primary.is_valid(), "{}", channel.primary);
            assert!(channel.secondary.is_valid(), "{}", channel.secondary);
        }
        for scratch in SCRATCH_COMMANDS {
            assert!(scratch.is_valid());
        }
    }
}
