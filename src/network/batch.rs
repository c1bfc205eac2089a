//! Atomic batch: beberapa call dalam satu request
//!
//! Peer mengeksekusi semua call tanpa diselingi operasi lain.
//! Format yang dihasilkan untuk N call:
//! ```text
//! [d,u,s:[:[ @[s[fmt0]],[*s[fmt1]],...,[*s[fmtN]] ]:]]
//! ```
//! Call 0 masuk lewat `@` (sumber = argument array pertama),
//! call berikutnya lewat `*` (pindah ke argument array berikutnya).

use crate::error::{Error, Result};
use crate::protocol::{encode_packed, Arg, FormatError, MessageType, Packed, Value};

/// Daftar call yang menunggu dikirim sebagai satu batch
#[derive(Debug, Clone, Default)]
pub struct AtomicBatch {
    fragments: Vec<String>,
    calls: Vec<Vec<Arg>>,
}

impl AtomicBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tambah satu call. `fmt` mendeskripsikan isi params array.
    pub fn push(&mut self, method: &str, fmt: &str, args: Vec<Arg>) -> &mut Self {
        let mut call = Vec::with_capacity(args.len() + 1);
        call.push(Arg::Str(method.to_owned()));
        call.extend(args);
        self.fragments.push(format!("s[{}]", fmt));
        self.calls.push(call);
        self
    }

    /// `nvim_buf_add_highlight`, src_id = namespace
    pub fn add_highlight(
        &mut self,
        bufnr: i64,
        namespace: i64,
        group: &str,
        line: i64,
        col_start: i64,
        col_end: i64,
    ) -> &mut Self {
        self.push(
            "nvim_buf_add_highlight",
            "dd,s,ddd",
            vec![
                Arg::Int(bufnr),
                Arg::Int(namespace),
                Arg::Str(group.to_owned()),
                Arg::Int(line),
                Arg::Int(col_start),
                Arg::Int(col_end),
            ],
        )
    }

    /// `nvim_buf_clear_namespace` untuk baris `[line_start, line_end)`, -1 = sampai akhir
    pub fn clear_highlight(
        &mut self,
        bufnr: i64,
        namespace: i64,
        line_start: i64,
        line_end: i64,
    ) -> &mut Self {
        self.push(
            "nvim_buf_clear_namespace",
            "dddd",
            vec![
                Arg::Int(bufnr),
                Arg::Int(namespace),
                Arg::Int(line_start),
                Arg::Int(line_end),
            ],
        )
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Format string untuk seluruh request envelope
    pub fn format(&self) -> String {
        let body: usize = self.fragments.iter().map(|f| f.len() + 4).sum();
        let mut fmt = String::with_capacity(body + 16);
        fmt.push_str("[d,u,s:[:[ ");
        for (i, fragment) in self.fragments.iter().enumerate() {
            if i == 0 {
                fmt.push_str("@[");
            } else {
                fmt.push_str(",[*");
            }
            fmt.push_str(fragment);
            fmt.push(']');
        }
        fmt.push_str(" ]:]]");
        fmt
    }

    /// Build request `[0, sequence, method, [[call0, call1, ...]]]`
    pub fn into_request(self, sequence: u32, method: &str) -> std::result::Result<Packed, FormatError> {
        if self.is_empty() {
            return Err(FormatError::EmptyBatch);
        }
        let fmt = self.format();
        let envelope = [
            Arg::Int(MessageType::Request as i64),
            Arg::UInt(sequence as u64),
            Arg::Str(method.to_owned()),
            Arg::Batch(self.calls),
        ];
        encode_packed(&fmt, &envelope)
    }
}

/// Call yang gagal di dalam batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    /// Index call yang gagal; call sebelumnya sudah dieksekusi
    pub index: u64,
    pub kind: i64,
    pub message: String,
}

/// Hasil atomic call: `[results, error | nil]`
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub results: Vec<Value>,
    pub error: Option<BatchError>,
}

impl BatchResult {
    pub fn from_value(value: Value) -> Result<Self> {
        let mut items: Vec<Value> = value.try_expect()?;
        if items.len() != 2 {
            return Err(Error::protocol(format!(
                "atomic call result has {} elements, expected 2",
                items.len()
            )));
        }
        let error = items.pop().unwrap_or_default();
        let results: Vec<Value> = items.pop().unwrap_or_default().try_expect()?;

        let error = match error {
            Value::Nil => None,
            Value::Array(mut parts) if parts.len() == 3 => {
                let message = parts.pop().unwrap_or_default().try_expect::<String>()?;
                let kind = parts.pop().unwrap_or_default().try_expect::<i64>()?;
                let index = parts.pop().unwrap_or_default().try_expect::<u64>()?;
                Some(BatchError {
                    index,
                    kind,
                    message,
                })
            }
            other => {
                return Err(Error::protocol(format!(
                    "malformed atomic call error: {}",
                    other
                )))
            }
        };
        Ok(Self { results, error })
    }

    #[inline(always)]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
