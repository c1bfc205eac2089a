//! Decoder: byte stream -> Value tree
//!
//! Satu recursive core, dua sumber bytes:
//! - `StreamSource`: blocking read dari duplex stream (tunggu sampai N bytes)
//! - `SliceSource`: in-memory buffer, gagal keras jika bytes kurang

use std::io::{self, Read};

use super::marker::{Length, Marker};
use super::value::{Ext, Value};
use crate::error::{Error, Result};

/// Nesting maksimum sebelum decode dianggap protocol error
pub const MAX_DEPTH: usize = 512;

/// Batas pre-allocation untuk source tanpa ukuran pasti
const PREALLOC_LIMIT: usize = 4096;

/// Sumber bytes untuk decoder
pub trait ByteSource {
    /// Isi `buf` penuh, atau error.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Sisa bytes jika diketahui. Stream mengembalikan `None`.
    fn remaining_hint(&self) -> Option<usize> {
        None
    }
}

/// Blocking reader di atas `Read`
pub struct StreamSource<R> {
    reader: R,
}

impl<R: Read> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    #[inline]
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream closed while {} bytes were expected", buf.len()),
                ))
            } else {
                Error::Transport(e)
            }
        })
    }
}

/// Zero-copy cursor di atas buffer
pub struct SliceSource<'a> {
    buffer: &'a [u8],
    read_pos: usize,
}

impl<'a> SliceSource<'a> {
    #[inline(always)]
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
        }
    }

    /// Remaining bytes
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read_pos)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

impl ByteSource for SliceSource<'_> {
    #[inline]
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.remaining() < buf.len() {
            return Err(Error::protocol(format!(
                "buffer does not contain a complete msgpack object (available: {}, need {})",
                self.remaining(),
                buf.len()
            )));
        }
        let end = self.read_pos + buf.len();
        buf.copy_from_slice(&self.buffer[self.read_pos..end]);
        self.read_pos = end;
        Ok(())
    }

    #[inline(always)]
    fn remaining_hint(&self) -> Option<usize> {
        Some(self.remaining())
    }
}

/// Decode satu RPC message. Top-level value harus array.
pub fn decode_one<S: ByteSource + ?Sized>(source: &mut S) -> Result<Value> {
    let value = decode_value(source)?;
    match value {
        Value::Array(_) => Ok(value),
        other => Err(Error::protocol(format!(
            "top-level message is {} ({}), expected array",
            other.kind_name(),
            other
        ))),
    }
}

/// Decode satu value dengan tipe apapun.
pub fn decode_value<S: ByteSource + ?Sized>(source: &mut S) -> Result<Value> {
    decode_at(source, 0)
}

/// Decode semua message dalam buffer sampai habis
pub fn decode_all(buffer: &[u8]) -> Result<Vec<Value>> {
    let mut source = SliceSource::new(buffer);
    let mut messages = Vec::new();
    while !source.is_empty() {
        messages.push(decode_one(&mut source)?);
    }
    Ok(messages)
}

fn decode_at<S: ByteSource + ?Sized>(source: &mut S, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::protocol(format!(
            "object nesting exceeds {} levels",
            MAX_DEPTH
        )));
    }

    let tag = read_u8(source)?;
    let value = match Marker::from_u8(tag)? {
        Marker::Nil => Value::Nil,
        Marker::Bool(b) => Value::Bool(b),
        Marker::PosFixInt(n) => Value::UInt(n as u64),
        Marker::NegFixInt(n) => Value::Int(n as i64),
        Marker::Int(width) => Value::Int(read_signed(source, width)?),
        Marker::UInt(width) => Value::UInt(read_unsigned(source, width)?),
        Marker::Str(len) => {
            let len = read_length(source, len)? as usize;
            Value::String(read_payload(source, len)?)
        }
        Marker::Array(len) => {
            let len = read_length(source, len)? as usize;
            let mut items = Vec::with_capacity(capacity_for(source, len, 1)?);
            for _ in 0..len {
                items.push(decode_at(source, depth + 1)?);
            }
            Value::Array(items)
        }
        Marker::Map(len) => {
            let len = read_length(source, len)? as usize;
            let mut entries = Vec::with_capacity(capacity_for(source, len, 2)?);
            for _ in 0..len {
                let key = decode_at(source, depth + 1)?;
                let value = decode_at(source, depth + 1)?;
                entries.push((key, value));
            }
            Value::Dict(entries)
        }
        Marker::FixExt(len) => Value::Ext(read_ext(source, len as usize)?),
        Marker::Ext8 => {
            let len = read_u8(source)? as usize;
            if len == 0 || len > Ext::MAX_LEN {
                return Err(Error::protocol(format!(
                    "ext8 payload of {} bytes is not supported",
                    len
                )));
            }
            Value::Ext(read_ext(source, len)?)
        }
    };
    Ok(value)
}

/// Kapasitas awal untuk `len` element, masing-masing minimal `min_size` bytes.
/// Panjang yang melebihi sisa buffer langsung jadi protocol error.
fn capacity_for<S: ByteSource + ?Sized>(
    source: &S,
    len: usize,
    min_size: usize,
) -> Result<usize> {
    match source.remaining_hint() {
        Some(remaining) if len.saturating_mul(min_size) > remaining => {
            Err(Error::protocol(format!(
                "declared length {} exceeds the {} bytes left in the buffer",
                len, remaining
            )))
        }
        Some(_) => Ok(len),
        None => Ok(len.min(PREALLOC_LIMIT)),
    }
}

/// Baca `len` bytes raw. Untuk stream dibaca per chunk supaya Vec tumbuh
/// sesuai data yang benar-benar datang.
fn read_payload<S: ByteSource + ?Sized>(source: &mut S, len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(capacity_for(source, len, 1)?);
    let mut chunk = [0u8; PREALLOC_LIMIT];
    while bytes.len() < len {
        let n = (len - bytes.len()).min(PREALLOC_LIMIT);
        source.read_bytes(&mut chunk[..n])?;
        bytes.extend_from_slice(&chunk[..n]);
    }
    Ok(bytes)
}

#[inline(always)]
fn read_u8<S: ByteSource + ?Sized>(source: &mut S) -> Result<u8> {
    let mut buf = [0u8; 1];
    source.read_bytes(&mut buf)?;
    Ok(buf[0])
}

/// Big-endian unsigned dengan width 1/2/4/8
fn read_unsigned<S: ByteSource + ?Sized>(source: &mut S, width: u8) -> Result<u64> {
    let mut buf = [0u8; 8];
    let width = width as usize;
    source.read_bytes(&mut buf[8 - width..])?;
    Ok(u64::from_be_bytes(buf))
}

fn read_signed<S: ByteSource + ?Sized>(source: &mut S, width: u8) -> Result<i64> {
    let raw = read_unsigned(source, width)?;
    let value = match width {
        1 => raw as u8 as i8 as i64,
        2 => raw as u16 as i16 as i64,
        4 => raw as u32 as i32 as i64,
        _ => raw as i64,
    };
    Ok(value)
}

fn read_length<S: ByteSource + ?Sized>(source: &mut S, len: Length) -> Result<u32> {
    match len {
        Length::Fixed(n) => Ok(n),
        Length::Field(width) => Ok(read_unsigned(source, width)? as u32),
    }
}

fn read_ext<S: ByteSource + ?Sized>(source: &mut S, len: usize) -> Result<Ext> {
    let kind = read_u8(source)? as i8;
    let mut payload = [0u8; Ext::MAX_LEN];
    source.read_bytes(&mut payload[..len])?;
    Ext::new(kind, &payload[..len])
        .ok_or_else(|| Error::protocol(format!("invalid ext payload length {}", len)))
}
