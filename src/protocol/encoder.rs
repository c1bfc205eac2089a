//! Encoder: Value -> msgpack bytes
//!
//! `Encoder` menulis bentuk terkecil untuk setiap value.
//! `ValueBuilder` membangun Value tree dan bytes-nya sekaligus,
//! dengan ukuran container yang sudah diketahui di depan.

use super::format::FormatError;
use super::marker;
use super::value::{DictEntry, Ext, Value};

/// Growable byte writer untuk msgpack
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    /// Membuat encoder dengan buffer size awal tertentu
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Reset encoder untuk reuse
    #[inline(always)]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[inline(always)]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline(always)]
    pub fn write_nil(&mut self) {
        self.buffer.push(marker::NIL);
    }

    #[inline(always)]
    pub fn write_bool(&mut self, v: bool) {
        self.buffer.push(if v { marker::TRUE } else { marker::FALSE });
    }

    /// Non-negative values ditulis sebagai unsigned
    pub fn write_int(&mut self, v: i64) {
        if v >= 0 {
            self.write_uint(v as u64);
        } else if v >= -32 {
            self.buffer.push(v as i8 as u8);
        } else if v >= i8::MIN as i64 {
            self.buffer.push(marker::INT8);
            self.buffer.push(v as i8 as u8);
        } else if v >= i16::MIN as i64 {
            self.buffer.push(marker::INT16);
            self.buffer.extend_from_slice(&(v as i16).to_be_bytes());
        } else if v >= i32::MIN as i64 {
            self.buffer.push(marker::INT32);
            self.buffer.extend_from_slice(&(v as i32).to_be_bytes());
        } else {
            self.buffer.push(marker::INT64);
            self.buffer.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub fn write_uint(&mut self, v: u64) {
        if v <= 0x7f {
            self.buffer.push(v as u8);
        } else if v <= u8::MAX as u64 {
            self.buffer.push(marker::UINT8);
            self.buffer.push(v as u8);
        } else if v <= u16::MAX as u64 {
            self.buffer.push(marker::UINT16);
            self.buffer.extend_from_slice(&(v as u16).to_be_bytes());
        } else if v <= u32::MAX as u64 {
            self.buffer.push(marker::UINT32);
            self.buffer.extend_from_slice(&(v as u32).to_be_bytes());
        } else {
            self.buffer.push(marker::UINT64);
            self.buffer.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub fn write_str(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        if len <= 31 {
            self.buffer.push(marker::FIXSTR | len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.push(marker::STR8);
            self.buffer.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.push(marker::STR16);
            self.buffer.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buffer.push(marker::STR32);
            self.buffer.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_array_len(&mut self, len: usize) {
        self.write_container_len(len, marker::FIXARRAY, marker::ARRAY16, marker::ARRAY32);
    }

    /// `len` = jumlah entry (pasangan key/value)
    pub fn write_map_len(&mut self, len: usize) {
        self.write_container_len(len, marker::FIXMAP, marker::MAP16, marker::MAP32);
    }

    #[inline(always)]
    fn write_container_len(&mut self, len: usize, fixed: u8, tag16: u8, tag32: u8) {
        if len <= 15 {
            self.buffer.push(fixed | len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.push(tag16);
            self.buffer.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buffer.push(tag32);
            self.buffer.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    pub fn write_ext(&mut self, ext: &Ext) {
        let payload = ext.payload();
        match payload.len() {
            1 => self.buffer.push(marker::FIXEXT1),
            2 => self.buffer.push(marker::FIXEXT2),
            4 => self.buffer.push(marker::FIXEXT4),
            8 => self.buffer.push(marker::FIXEXT8),
            n => {
                self.buffer.push(marker::EXT8);
                self.buffer.push(n as u8);
            }
        }
        self.buffer.push(ext.kind() as u8);
        self.buffer.extend_from_slice(payload);
    }

    /// Serialize seluruh subtree
    pub fn write_value(&mut self, value: &Value) {
        match value {
            Value::Nil => self.write_nil(),
            Value::Bool(b) => self.write_bool(*b),
            Value::Int(n) => self.write_int(*n),
            Value::UInt(n) => self.write_uint(*n),
            Value::Ext(ext) => self.write_ext(ext),
            Value::String(bytes) => self.write_str(bytes),
            Value::Array(items) => {
                self.write_array_len(items.len());
                for item in items {
                    self.write_value(item);
                }
            }
            Value::Dict(entries) => {
                self.write_map_len(entries.len());
                for (key, value) in entries {
                    self.write_value(key);
                    self.write_value(value);
                }
            }
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Serialize satu value ke bytes
pub fn serialize(value: &Value) -> Vec<u8> {
    let mut encoder = Encoder::default();
    encoder.write_value(value);
    encoder.into_bytes()
}

/// Value beserta bentuk wire-nya
#[derive(Debug, Clone, PartialEq)]
pub struct Packed {
    pub value: Value,
    pub bytes: Vec<u8>,
}

enum Frame {
    Array {
        items: Vec<Value>,
        declared: usize,
    },
    Dict {
        entries: Vec<DictEntry>,
        key: Option<Value>,
        declared: usize,
    },
}

impl Frame {
    fn filled(&self) -> usize {
        match self {
            Frame::Array { items, .. } => items.len(),
            Frame::Dict { entries, key, .. } => entries.len() * 2 + key.is_some() as usize,
        }
    }

    /// Kapasitas dalam elemen (dict: key dan value dihitung terpisah)
    fn capacity(&self) -> usize {
        match self {
            Frame::Array { declared, .. } => *declared,
            Frame::Dict { declared, .. } => declared * 2,
        }
    }
}

/// Builder untuk satu Value tree.
///
/// Ukuran setiap container harus diketahui saat `begin_*`, sehingga
/// header wire bisa langsung ditulis dan children tidak pernah realokasi.
///
/// ```
/// use mpack_rpc::protocol::ValueBuilder;
///
/// let mut builder = ValueBuilder::new();
/// builder.begin_array(2).unwrap();
/// builder.int(1).unwrap();
/// builder.str("two").unwrap();
/// builder.end().unwrap();
/// let packed = builder.finish().unwrap();
/// assert_eq!(packed.bytes, vec![0x92, 0x01, 0xa3, b't', b'w', b'o']);
/// ```
pub struct ValueBuilder {
    stack: Vec<Frame>,
    root: Option<Value>,
    encoder: Encoder,
}

impl ValueBuilder {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// `capacity` = perkiraan ukuran bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: Vec::new(),
            root: None,
            encoder: Encoder::new(capacity),
        }
    }

    /// Jumlah container yang masih terbuka
    #[inline(always)]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn begin_array(&mut self, len: usize) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_array_len(len);
        self.stack.push(Frame::Array {
            items: Vec::with_capacity(len),
            declared: len,
        });
        Ok(())
    }

    /// `len` = jumlah entry
    pub fn begin_dict(&mut self, len: usize) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_map_len(len);
        self.stack.push(Frame::Dict {
            entries: Vec::with_capacity(len),
            key: None,
            declared: len,
        });
        Ok(())
    }

    pub fn int(&mut self, v: i64) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_int(v);
        self.place(Value::Int(v));
        Ok(())
    }

    pub fn uint(&mut self, v: u64) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_uint(v);
        self.place(Value::UInt(v));
        Ok(())
    }

    pub fn bool(&mut self, v: bool) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_bool(v);
        self.place(Value::Bool(v));
        Ok(())
    }

    pub fn nil(&mut self) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_nil();
        self.place(Value::Nil);
        Ok(())
    }

    pub fn str(&mut self, s: impl Into<Vec<u8>>) -> Result<(), FormatError> {
        self.reserve_slot()?;
        let bytes = s.into();
        self.encoder.write_str(&bytes);
        self.place(Value::String(bytes));
        Ok(())
    }

    pub fn ext(&mut self, ext: Ext) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_ext(&ext);
        self.place(Value::Ext(ext));
        Ok(())
    }

    /// Sisipkan subtree yang sudah jadi
    pub fn value(&mut self, value: Value) -> Result<(), FormatError> {
        self.reserve_slot()?;
        self.encoder.write_value(&value);
        self.place(value);
        Ok(())
    }

    /// Tutup container paling dalam
    pub fn end(&mut self) -> Result<(), FormatError> {
        let frame = self.stack.pop().ok_or(FormatError::UnbalancedEnd)?;
        let (filled, capacity) = (frame.filled(), frame.capacity());
        if filled != capacity {
            let (declared, found) = match frame {
                Frame::Dict { .. } => (capacity / 2, filled / 2),
                Frame::Array { .. } => (capacity, filled),
            };
            return Err(FormatError::MissingElements { declared, found });
        }
        let value = match frame {
            Frame::Array { items, .. } => Value::Array(items),
            Frame::Dict { entries, .. } => Value::Dict(entries),
        };
        self.place(value);
        Ok(())
    }

    pub fn finish(self) -> Result<Packed, FormatError> {
        if !self.stack.is_empty() {
            return Err(FormatError::Unclosed {
                open: self.stack.len(),
            });
        }
        let value = self.root.ok_or(FormatError::Empty)?;
        Ok(Packed {
            value,
            bytes: self.encoder.into_bytes(),
        })
    }

    fn reserve_slot(&self) -> Result<(), FormatError> {
        match self.stack.last() {
            Some(frame) if frame.filled() >= frame.capacity() => {
                Err(FormatError::TooManyElements {
                    declared: match frame {
                        Frame::Dict { declared, .. } | Frame::Array { declared, .. } => *declared,
                    },
                })
            }
            Some(_) => Ok(()),
            None if self.root.is_some() => Err(FormatError::MultipleRoots),
            None => Ok(()),
        }
    }

    /// Slot sudah dicek oleh `reserve_slot`
    fn place(&mut self, value: Value) {
        match self.stack.last_mut() {
            Some(Frame::Array { items, .. }) => items.push(value),
            Some(Frame::Dict { entries, key, .. }) => match key.take() {
                Some(k) => entries.push((k, value)),
                None => *key = Some(value),
            },
            None => self.root = Some(value),
        }
    }
}

impl Default for ValueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
