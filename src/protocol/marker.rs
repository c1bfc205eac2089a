//! Wire markers (leading tag byte) dari format msgpack
//!
//! Layout tag byte:
//! ```text
//! 0x00..=0x7f  positive fixint     0xc0        nil
//! 0x80..=0x8f  fixmap              0xc2/0xc3   false/true
//! 0x90..=0x9f  fixarray            0xc7        ext8
//! 0xa0..=0xbf  fixstr              0xcc..=0xcf uint8..uint64
//! 0xe0..=0xff  negative fixint     0xd0..=0xd3 int8..int64
//!                                  0xd4..=0xd7 fixext1..fixext8
//!                                  0xd9..=0xdb str8..str32
//!                                  0xdc/0xdd   array16/32
//!                                  0xde/0xdf   map16/32
//! ```

use crate::error::{Error, Result};

pub const NIL: u8 = 0xc0;
pub const FALSE: u8 = 0xc2;
pub const TRUE: u8 = 0xc3;
pub const BIN8: u8 = 0xc4;
pub const BIN32: u8 = 0xc6;
pub const EXT8: u8 = 0xc7;
pub const EXT16: u8 = 0xc8;
pub const EXT32: u8 = 0xc9;
pub const FLOAT32: u8 = 0xca;
pub const FLOAT64: u8 = 0xcb;
pub const UINT8: u8 = 0xcc;
pub const UINT16: u8 = 0xcd;
pub const UINT32: u8 = 0xce;
pub const UINT64: u8 = 0xcf;
pub const INT8: u8 = 0xd0;
pub const INT16: u8 = 0xd1;
pub const INT32: u8 = 0xd2;
pub const INT64: u8 = 0xd3;
pub const FIXEXT1: u8 = 0xd4;
pub const FIXEXT2: u8 = 0xd5;
pub const FIXEXT4: u8 = 0xd6;
pub const FIXEXT8: u8 = 0xd7;
pub const FIXEXT16: u8 = 0xd8;
pub const STR8: u8 = 0xd9;
pub const STR16: u8 = 0xda;
pub const STR32: u8 = 0xdb;
pub const ARRAY16: u8 = 0xdc;
pub const ARRAY32: u8 = 0xdd;
pub const MAP16: u8 = 0xde;
pub const MAP32: u8 = 0xdf;

pub const FIXMAP: u8 = 0x80;
pub const FIXARRAY: u8 = 0x90;
pub const FIXSTR: u8 = 0xa0;
pub const NEG_FIXINT: u8 = 0xe0;

/// Ukuran length field (dalam bytes) yang mengikuti tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// Length ada di dalam tag byte (fixarray, fixmap, fixstr)
    Fixed(u32),
    /// Length dibaca dari 1/2/4 bytes big-endian setelah tag
    Field(u8),
}

/// Hasil klasifikasi tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Nil,
    Bool(bool),
    /// Positive fixint, nilai sudah ada di tag
    PosFixInt(u8),
    /// Negative fixint, sudah di-sign-extend
    NegFixInt(i8),
    /// Signed integer dengan width 1/2/4/8 bytes
    Int(u8),
    /// Unsigned integer dengan width 1/2/4/8 bytes
    UInt(u8),
    Str(Length),
    Array(Length),
    Map(Length),
    /// Fixed-size ext, payload 1/2/4/8 bytes
    FixExt(u8),
    /// ext8: length 1 byte, lalu type, lalu payload
    Ext8,
}

impl Marker {
    /// Klasifikasi tag byte. Bin, float, ext16/32 dan fixext16 tidak didukung.
    pub fn from_u8(tag: u8) -> Result<Self> {
        let marker = match tag {
            0x00..=0x7f => Self::PosFixInt(tag),
            0x80..=0x8f => Self::Map(Length::Fixed((tag & 0x0f) as u32)),
            0x90..=0x9f => Self::Array(Length::Fixed((tag & 0x0f) as u32)),
            0xa0..=0xbf => Self::Str(Length::Fixed((tag & 0x1f) as u32)),
            0xe0..=0xff => Self::NegFixInt(tag as i8),
            NIL => Self::Nil,
            FALSE => Self::Bool(false),
            TRUE => Self::Bool(true),
            UINT8 => Self::UInt(1),
            UINT16 => Self::UInt(2),
            UINT32 => Self::UInt(4),
            UINT64 => Self::UInt(8),
            INT8 => Self::Int(1),
            INT16 => Self::Int(2),
            INT32 => Self::Int(4),
            INT64 => Self::Int(8),
            STR8 => Self::Str(Length::Field(1)),
            STR16 => Self::Str(Length::Field(2)),
            STR32 => Self::Str(Length::Field(4)),
            ARRAY16 => Self::Array(Length::Field(2)),
            ARRAY32 => Self::Array(Length::Field(4)),
            MAP16 => Self::Map(Length::Field(2)),
            MAP32 => Self::Map(Length::Field(4)),
            FIXEXT1 => Self::FixExt(1),
            FIXEXT2 => Self::FixExt(2),
            FIXEXT4 => Self::FixExt(4),
            FIXEXT8 => Self::FixExt(8),
            EXT8 => Self::Ext8,
            BIN8..=BIN32 => {
                return Err(Error::protocol(format!(
                    "bin format (0x{:02x}) is not supported",
                    tag
                )))
            }
            EXT16 | EXT32 | FIXEXT16 => {
                return Err(Error::protocol(format!(
                    "variable length ext (0x{:02x}) is not supported",
                    tag
                )))
            }
            FLOAT32 | FLOAT64 => {
                return Err(Error::protocol(format!(
                    "float format (0x{:02x}) is not supported",
                    tag
                )))
            }
            _ => {
                return Err(Error::protocol(format!(
                    "failed to identify type for byte 0x{:02x}",
                    tag
                )))
            }
        };
        Ok(marker)
    }
}
