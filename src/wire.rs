//! Wire-level primitives: type codes, field heads and endianness.
//!
//! A field head is one or two bytes. For tags below 15 the head packs
//! `(tag << 4) | type` into a single byte; larger tags emit `0xF0 | type`
//! followed by the full tag byte. Tags therefore live in 0..=255 and type
//! codes in 0..=13.

use byteorder::ByteOrder;
pub use byteorder::{BigEndian, LittleEndian};

/// The fourteen wire type codes of the JCE protocol.
///
/// The discriminants are the on-wire values and are stable.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Int1 = 0,
    Int2 = 1,
    Int4 = 2,
    Int8 = 3,
    Float = 4,
    Double = 5,
    String1 = 6,
    String4 = 7,
    Map = 8,
    List = 9,
    StructBegin = 10,
    StructEnd = 11,
    /// A numerically-zero scalar; the head is the entire field.
    ZeroTag = 12,
    /// Compact byte-array form: inner `Int1` marker, length, raw payload.
    SimpleList = 13,
}

impl WireType {
    /// Map a raw 4-bit type code to a `WireType`, if it is one.
    #[inline]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Int1),
            1 => Some(Self::Int2),
            2 => Some(Self::Int4),
            3 => Some(Self::Int8),
            4 => Some(Self::Float),
            5 => Some(Self::Double),
            6 => Some(Self::String1),
            7 => Some(Self::String4),
            8 => Some(Self::Map),
            9 => Some(Self::List),
            10 => Some(Self::StructBegin),
            11 => Some(Self::StructEnd),
            12 => Some(Self::ZeroTag),
            13 => Some(Self::SimpleList),
            _ => None,
        }
    }

    /// The raw on-wire code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True for the integer-typed codes (`Int1..Int8` and `ZeroTag`).
    #[inline]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int1 | Self::Int2 | Self::Int4 | Self::Int8 | Self::ZeroTag
        )
    }
}

impl TryFrom<u8> for WireType {
    type Error = u8;

    /// Same mapping as [`WireType::from_code`], with the offending code as
    /// the error.
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

/// Encode a head into `out`, returning how many bytes were used (1 or 2).
#[inline]
pub fn encode_head(tag: u8, wire_type: WireType, out: &mut [u8; 2]) -> usize {
    let code = wire_type.code();
    if tag < 15 {
        out[0] = (tag << 4) | code;
        1
    } else {
        out[0] = 0xF0 | code;
        out[1] = tag;
        2
    }
}

/// Byte order selected at the call boundary.
///
/// The hot paths are monomorphised over [`Endianness`], so this enum is
/// only matched once per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Network byte order, the protocol default.
    #[default]
    Big,
    /// Non-standard little-endian payloads seen from some emitters.
    Little,
}

/// Compile-time byte order for the numeric primitives.
///
/// Extends [`byteorder::ByteOrder`] so the reader and writer generate two
/// branch-free code paths instead of testing the order on every read.
pub trait Endianness: ByteOrder + 'static {
    /// Whether this instantiation is little-endian.
    const IS_LITTLE: bool;
}

impl Endianness for BigEndian {
    const IS_LITTLE: bool = false;
}

impl Endianness for LittleEndian {
    const IS_LITTLE: bool = true;
}
