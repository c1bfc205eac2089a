//! Value Model: in-memory tree untuk satu msgpack object
//!
//! Setiap node non-scalar memiliki (own) children-nya sendiri.
//! Drop root = seluruh subtree ikut di-drop, tepat satu kali.

use tracing::warn;

use crate::error::{Error, Result};

/// Satu entry dictionary. Key tidak harus unik.
pub type DictEntry = (Value, Value);

/// Msgpack value
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Signed integer (int8..int64, negative fixint)
    Int(i64),
    /// Unsigned integer (uint8..uint64, positive fixint)
    UInt(u64),
    Ext(Ext),
    /// Raw bytes, tidak dijamin UTF-8
    String(Vec<u8>),
    Array(Vec<Value>),
    Dict(Vec<DictEntry>),
}

/// Fixed-size extension value (fixext1/2/4/8, ext8 sampai 8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ext {
    kind: i8,
    len: u8,
    data: [u8; Ext::MAX_LEN],
}

impl Ext {
    pub const MAX_LEN: usize = 8;

    /// Returns `None` jika payload kosong atau lebih dari 8 bytes.
    pub fn new(kind: i8, payload: &[u8]) -> Option<Self> {
        if payload.is_empty() || payload.len() > Self::MAX_LEN {
            return None;
        }
        let mut data = [0u8; Self::MAX_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            kind,
            len: payload.len() as u8,
            data,
        })
    }

    #[inline(always)]
    pub fn kind(&self) -> i8 {
        self.kind
    }

    #[inline(always)]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Interpretasi numerik dari payload.
    ///
    /// Editor menyimpan handle sebagai msgpack integer di dalam payload.
    /// Payload lain dibaca sebagai big-endian unsigned.
    pub fn as_number(&self) -> u64 {
        let payload = self.payload();
        let mut source = super::SliceSource::new(payload);
        if let Ok(value) = super::decode_value(&mut source) {
            if source.remaining() == 0 {
                match value {
                    Value::UInt(n) => return n,
                    Value::Int(n) => return n as u64,
                    _ => {}
                }
            }
        }
        payload.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// Nama handle editor untuk ext type ini
    pub fn handle_name(&self) -> &'static str {
        match self.kind {
            0 => "Buffer",
            1 => "Window",
            2 => "Tabpage",
            _ => "Unknown",
        }
    }
}

impl Value {
    pub fn string(s: impl Into<Vec<u8>>) -> Self {
        Self::String(s.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "signed",
            Self::UInt(_) => "unsigned",
            Self::Ext(_) => "ext",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
        }
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// View UTF-8 dari string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(n) => Some(n),
            Self::UInt(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }

    /// Element ke-`i` dari array
    pub fn index(&self, i: usize) -> Option<&Value> {
        self.as_array()?.get(i)
    }

    /// Lepas (steal) element ke-`i`, posisinya diganti `Nil`.
    pub fn take(&mut self, i: usize) -> Option<Value> {
        match self {
            Self::Array(items) => items.get_mut(i).map(std::mem::take),
            _ => None,
        }
    }

    /// Linear scan, returns first match.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn dict_get<T: FromValue>(&self, key: &str) -> Option<T> {
        self.get(key).cloned()?.expect()
    }

    /// Extract typed value. Mismatch di-log sebagai warning dan returns `None`.
    pub fn expect<T: FromValue>(self) -> Option<T> {
        match T::from_value(self) {
            Ok(v) => Some(v),
            Err(other) => {
                warn!(
                    expected = T::EXPECTED,
                    found = other.kind_name(),
                    "unexpected value type"
                );
                None
            }
        }
    }

    /// Strict variant: mismatch menjadi `Error::TypeMismatch`.
    pub fn try_expect<T: FromValue>(self) -> Result<T> {
        T::from_value(self).map_err(|other| Error::TypeMismatch {
            expected: T::EXPECTED,
            found: other.kind_name(),
        })
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Nil
    }
}

/// Integer signed dan unsigned dibandingkan berdasarkan nilainya:
/// `Int(5) == UInt(5)`, karena wire encoding memilih bentuk terkecil.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Int(a), Self::UInt(b)) | (Self::UInt(b), Self::Int(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Self::Ext(a), Self::Ext(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v.into_bytes())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

/// Conversion target untuk `Value::expect`
pub trait FromValue: Sized {
    const EXPECTED: &'static str;

    /// Returns value asli jika tipenya tidak cocok.
    fn from_value(value: Value) -> std::result::Result<Self, Value>;
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        Ok(value)
    }
}

impl FromValue for () {
    const EXPECTED: &'static str = "nil";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Nil => Ok(()),
            other => Err(other),
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(n) => Ok(n != 0),
            Value::UInt(n) => Ok(n != 0),
            other => Err(other),
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Int(n) => Ok(n),
            Value::UInt(n) => i64::try_from(n).map_err(|_| Value::UInt(n)),
            Value::Ext(ext) => Ok(ext.as_number() as i64),
            other => Err(other),
        }
    }
}

impl FromValue for u64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::UInt(n) => Ok(n),
            Value::Int(n) => u64::try_from(n).map_err(|_| Value::Int(n)),
            Value::Ext(ext) => Ok(ext.as_number()),
            other => Err(other),
        }
    }
}

impl FromValue for i32 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| Value::Int(n))
    }
}

impl FromValue for u32 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        let n = u64::from_value(value)?;
        u32::try_from(n).map_err(|_| Value::UInt(n))
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::String(bytes) => {
                String::from_utf8(bytes).map_err(|e| Value::String(e.into_bytes()))
            }
            other => Err(other),
        }
    }
}

impl FromValue for Vec<u8> {
    const EXPECTED: &'static str = "string";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::String(bytes) => Ok(bytes),
            other => Err(other),
        }
    }
}

impl FromValue for Vec<Value> {
    const EXPECTED: &'static str = "array";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Array(items) => Ok(items),
            other => Err(other),
        }
    }
}

impl FromValue for Vec<DictEntry> {
    const EXPECTED: &'static str = "dict";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Dict(entries) => Ok(entries),
            other => Err(other),
        }
    }
}

impl FromValue for Ext {
    const EXPECTED: &'static str = "ext";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Ext(ext) => Ok(ext),
            other => Err(other),
        }
    }
}

/// Array of strings (buffer lines dan sejenisnya)
impl FromValue for Vec<String> {
    const EXPECTED: &'static str = "string list";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        let items = match value {
            Value::Array(items) => items,
            other => return Err(other),
        };
        if !items.iter().all(|v| v.as_str().is_some()) {
            return Err(Value::Array(items));
        }
        Ok(items
            .into_iter()
            .filter_map(|v| String::from_value(v).ok())
            .collect())
    }
}
