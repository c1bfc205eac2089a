//! Format-string encoder
//!
//! Membangun Value (dan bytes-nya) dari format string plus daftar argumen bertipe.
//!
//! Directives (case-insensitive):
//! ```text
//! d  i32          l  i64          u  u64          b  bool
//! s  string       c  string, dipotong di NUL pertama
//! n  nil (tanpa argumen)
//! [ ]  array      { }  dict (key dan value bergantian)
//! !  argumen berikutnya adalah Forward list, dipakai sebagai sumber
//! @  argumen berikutnya adalah Batch list, sumber = sub-array pertama
//! *  pindah ke sub-array berikutnya (hanya dalam mode @)
//! ```
//! Whitespace dan `: ; , .` diabaikan.
//!
//! Dua pass: pass 1 menghitung ukuran setiap container, pass 2 mengisi
//! `ValueBuilder` yang sudah tahu ukuran final setiap container.

use std::slice;

use thiserror::Error;

use super::encoder::{Packed, ValueBuilder};
use super::value::Value;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("unknown directive {ch:?} at position {pos}")]
    UnknownDirective { ch: char, pos: usize },

    #[error("unexpected '{found}' at position {pos}")]
    Unbalanced { found: char, pos: usize },

    #[error("'{found}' at position {pos} closes a '{open}'")]
    MismatchedBracket { open: char, found: char, pos: usize },

    #[error("dict closed at position {pos} holds an odd number of elements ({count})")]
    OddDictCount { count: usize, pos: usize },

    #[error("{open} container(s) left open")]
    Unclosed { open: usize },

    #[error("format must describe exactly one top-level value, found {count}")]
    TopLevelCount { count: usize },

    #[error("missing argument for directive '{directive}'")]
    MissingArgument { directive: char },

    #[error("directive '{directive}' expects {expected}, got {found}")]
    ArgumentType {
        directive: char,
        expected: &'static str,
        found: &'static str,
    },

    #[error("argument for directive '{directive}' is out of range")]
    OutOfRange { directive: char },

    #[error("'*' at position {pos} used outside '@' mode")]
    StarOutsideBatch { pos: usize },

    #[error("'*' at position {pos} has no argument array left")]
    BatchExhausted { pos: usize },

    #[error("{count} argument(s) left unused")]
    TrailingArguments { count: usize },

    #[error("container declared with {declared} element(s) overflowed")]
    TooManyElements { declared: usize },

    #[error("container declared with {declared} element(s) closed after {found}")]
    MissingElements { declared: usize, found: usize },

    #[error("end of container without a matching begin")]
    UnbalancedEnd,

    #[error("top-level value is already complete")]
    MultipleRoots,

    #[error("no value was built")]
    Empty,

    #[error("atomic batch contains no calls")]
    EmptyBatch,
}

/// Satu argumen untuk format encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Str(String),
    /// Sumber argumen pengganti untuk `!`
    Forward(Vec<Arg>),
    /// Array of argument arrays untuk `@` / `*`
    Batch(Vec<Vec<Arg>>),
}

impl Arg {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::Forward(_) => "forward list",
            Self::Batch(_) => "batch list",
        }
    }

    /// Directive yang cocok untuk argumen scalar ini
    pub fn directive(&self) -> Option<char> {
        match self {
            Self::Int(_) => Some('l'),
            Self::UInt(_) => Some('u'),
            Self::Bool(_) => Some('b'),
            Self::Str(_) => Some('s'),
            Self::Forward(_) | Self::Batch(_) => None,
        }
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Arg {
    fn from(v: u32) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<u64> for Arg {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(v: Vec<Arg>) -> Self {
        Self::Forward(v)
    }
}

impl From<Vec<Vec<Arg>>> for Arg {
    fn from(v: Vec<Vec<Arg>>) -> Self {
        Self::Batch(v)
    }
}

/// Build `Vec<Arg>` dari ekspresi yang punya `Into<Arg>`.
///
/// ```
/// use mpack_rpc::{args, protocol::Arg};
///
/// let list = args![1, "two", true];
/// assert_eq!(list[1], Arg::Str("two".into()));
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::protocol::Arg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::protocol::Arg::from($arg)),+]
    };
}

/// Encode ke Value tree
pub fn encode(fmt: &str, args: &[Arg]) -> Result<Value, FormatError> {
    encode_packed(fmt, args).map(|packed| packed.value)
}

/// Encode ke Value tree dan bytes wire-nya sekaligus
pub fn encode_packed(fmt: &str, args: &[Arg]) -> Result<Packed, FormatError> {
    let sizes = measure(fmt)?;
    let mut interpreter = Interpreter {
        builder: ValueBuilder::with_capacity(fmt.len() * 4 + 16),
        sizes: sizes.into_iter(),
        own: args.iter(),
        forward: None,
        batch: None,
    };
    interpreter.run(fmt)?;

    let unused = interpreter.own.len();
    if unused > 0 {
        return Err(FormatError::TrailingArguments { count: unused });
    }
    interpreter.builder.finish()
}

#[inline(always)]
fn is_ignored(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, ':' | ';' | ',' | '.')
}

/// Pass 1: ukuran setiap container dalam urutan kemunculan `[` / `{`.
/// Ukuran dict dalam jumlah entry.
fn measure(fmt: &str) -> Result<Vec<usize>, FormatError> {
    struct Level {
        open: char,
        count: usize,
        slot: usize,
    }

    let mut sizes = Vec::new();
    let mut stack: Vec<Level> = Vec::new();
    let mut top_level = 0usize;

    for (pos, raw) in fmt.chars().enumerate() {
        let ch = raw.to_ascii_lowercase();
        match ch {
            c if is_ignored(c) => {}
            '!' | '@' | '*' => {}
            'd' | 'l' | 'u' | 's' | 'c' | 'b' | 'n' | '[' | '{' => {
                match stack.last_mut() {
                    Some(level) => level.count += 1,
                    None => top_level += 1,
                }
                if ch == '[' || ch == '{' {
                    stack.push(Level {
                        open: ch,
                        count: 0,
                        slot: sizes.len(),
                    });
                    sizes.push(0);
                }
            }
            ']' | '}' => {
                let level = stack
                    .pop()
                    .ok_or(FormatError::Unbalanced { found: ch, pos })?;
                let expected = if level.open == '[' { ']' } else { '}' };
                if ch != expected {
                    return Err(FormatError::MismatchedBracket {
                        open: level.open,
                        found: ch,
                        pos,
                    });
                }
                sizes[level.slot] = if ch == '}' {
                    if level.count % 2 != 0 {
                        return Err(FormatError::OddDictCount {
                            count: level.count,
                            pos,
                        });
                    }
                    level.count / 2
                } else {
                    level.count
                };
            }
            _ => return Err(FormatError::UnknownDirective { ch: raw, pos }),
        }
    }

    if !stack.is_empty() {
        return Err(FormatError::Unclosed { open: stack.len() });
    }
    if top_level != 1 {
        return Err(FormatError::TopLevelCount { count: top_level });
    }
    Ok(sizes)
}

struct BatchCursor<'a> {
    rest: slice::Iter<'a, Vec<Arg>>,
    current: slice::Iter<'a, Arg>,
}

/// Pass 2
struct Interpreter<'a> {
    builder: ValueBuilder,
    sizes: std::vec::IntoIter<usize>,
    own: slice::Iter<'a, Arg>,
    forward: Option<slice::Iter<'a, Arg>>,
    batch: Option<BatchCursor<'a>>,
}

impl<'a> Interpreter<'a> {
    fn run(&mut self, fmt: &str) -> Result<(), FormatError> {
        for (pos, raw) in fmt.chars().enumerate() {
            let ch = raw.to_ascii_lowercase();
            match ch {
                c if is_ignored(c) => {}
                '[' => {
                    let len = self.sizes.next().unwrap_or_default();
                    self.builder.begin_array(len)?;
                }
                '{' => {
                    let len = self.sizes.next().unwrap_or_default();
                    self.builder.begin_dict(len)?;
                }
                ']' | '}' => self.builder.end()?,
                'n' => self.builder.nil()?,
                'd' => {
                    let n = self.signed(ch)?;
                    let n = i32::try_from(n).map_err(|_| FormatError::OutOfRange { directive: ch })?;
                    self.builder.int(n as i64)?;
                }
                'l' => {
                    let n = self.signed(ch)?;
                    self.builder.int(n)?;
                }
                'u' => {
                    let n = match self.next_arg(ch)? {
                        Arg::UInt(n) => *n,
                        Arg::Int(n) => {
                            u64::try_from(*n).map_err(|_| FormatError::OutOfRange { directive: ch })?
                        }
                        other => return Err(type_error(ch, "integer", other)),
                    };
                    self.builder.uint(n)?;
                }
                'b' => match self.next_arg(ch)? {
                    Arg::Bool(b) => self.builder.bool(*b)?,
                    other => return Err(type_error(ch, "bool", other)),
                },
                's' => match self.next_arg(ch)? {
                    Arg::Str(s) => self.builder.str(s.as_bytes())?,
                    other => return Err(type_error(ch, "string", other)),
                },
                'c' => match self.next_arg(ch)? {
                    Arg::Str(s) => {
                        let s = match s.find('\0') {
                            Some(end) => &s[..end],
                            None => s.as_str(),
                        };
                        self.builder.str(s.as_bytes())?;
                    }
                    other => return Err(type_error(ch, "string", other)),
                },
                '!' => match self.source_arg(ch)? {
                    Arg::Forward(list) => self.forward = Some(list.iter()),
                    other => return Err(type_error(ch, "forward list", other)),
                },
                '@' => match self.source_arg(ch)? {
                    Arg::Batch(lists) => {
                        let mut rest = lists.iter();
                        let current = rest.next().map_or_else(|| [].iter(), |first| first.iter());
                        self.batch = Some(BatchCursor { rest, current });
                    }
                    other => return Err(type_error(ch, "batch list", other)),
                },
                '*' => {
                    let cursor = self
                        .batch
                        .as_mut()
                        .ok_or(FormatError::StarOutsideBatch { pos })?;
                    cursor.current = cursor
                        .rest
                        .next()
                        .ok_or(FormatError::BatchExhausted { pos })?
                        .iter();
                }
                // measure() sudah menolak karakter lain
                _ => return Err(FormatError::UnknownDirective { ch: raw, pos }),
            }
        }
        Ok(())
    }

    fn signed(&mut self, directive: char) -> Result<i64, FormatError> {
        match self.next_arg(directive)? {
            Arg::Int(n) => Ok(*n),
            Arg::UInt(n) => i64::try_from(*n).map_err(|_| FormatError::OutOfRange { directive }),
            other => Err(type_error(directive, "integer", other)),
        }
    }

    /// Argumen untuk scalar directive: batch > forward > own
    fn next_arg(&mut self, directive: char) -> Result<&'a Arg, FormatError> {
        let next = match (&mut self.batch, &mut self.forward) {
            (Some(cursor), _) => cursor.current.next(),
            (None, Some(forward)) => forward.next(),
            (None, None) => self.own.next(),
        };
        next.ok_or(FormatError::MissingArgument { directive })
    }

    /// Argumen untuk `!` dan `@`: forward > own
    fn source_arg(&mut self, directive: char) -> Result<&'a Arg, FormatError> {
        let next = match &mut self.forward {
            Some(forward) => forward.next(),
            None => self.own.next(),
        };
        next.ok_or(FormatError::MissingArgument { directive })
    }
}

fn type_error(directive: char, expected: &'static str, found: &Arg) -> FormatError {
    FormatError::ArgumentType {
        directive,
        expected,
        found: found.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decoder::{decode_one, SliceSource};
    use crate::protocol::encoder::serialize;

    #[test]
    fn test_single_nil() {
        assert_eq!(encode("n", &[]).unwrap(), Value::Nil);
    }

    #[test]
    fn test_int_array() {
        let value = encode("[ddd]", &args![1, 2, 3]).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        match value {
            Value::Array(items) => assert!(items.iter().all(|v| matches!(v, Value::Int(_)))),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_single_entry_dict() {
        let value = encode("{s:d}", &args!["a", 1]).unwrap();
        assert_eq!(
            value,
            Value::Dict(vec![(Value::from("a"), Value::Int(1))])
        );
    }

    #[test]
    fn test_packed_bytes_match_serializer() {
        let packed = encode_packed(
            "[d, u, s, [b, n, {}], c]",
            &args![-7, 300u64, "x", true, "ab\0cd"],
        )
        .unwrap();
        assert_eq!(packed.bytes, serialize(&packed.value));
        assert_eq!(packed.value.index(4).and_then(Value::as_str), Some("ab"));

        let decoded = decode_one(&mut SliceSource::new(&packed.bytes)).unwrap();
        assert_eq!(decoded, packed.value);
    }

    #[test]
    fn test_case_insensitive_and_separators() {
        let a = encode("[D;L.U:B,S]", &args![1, 2, 3u64, false, "s"]).unwrap();
        let b = encode("[dlubs]", &args![1, 2, 3u64, false, "s"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_forwarded_arguments() {
        let forwarded = args!["buf", 3];
        let value = encode("[d,s,[!s,d]]", &args![0, "method", forwarded]).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Int(0),
                Value::from("method"),
                Value::Array(vec![Value::from("buf"), Value::Int(3)]),
            ])
        );
    }

    #[test]
    fn test_batch_arguments() {
        let calls: Vec<Vec<Arg>> = vec![args!["first", 1], args!["second", 2, 3]];
        let value = encode("[@[s[d]],[*s[dd]]]", &[Arg::Batch(calls)]).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Array(vec![
                    Value::from("first"),
                    Value::Array(vec![Value::Int(1)])
                ]),
                Value::Array(vec![
                    Value::from("second"),
                    Value::Array(vec![Value::Int(2), Value::Int(3)])
                ]),
            ])
        );
    }

    #[test]
    fn test_structure_errors() {
        assert!(matches!(
            encode("[dd", &args![1, 2]),
            Err(FormatError::Unclosed { open: 1 })
        ));
        assert!(matches!(
            encode("d]", &args![1]),
            Err(FormatError::Unbalanced { found: ']', pos: 1 })
        ));
        assert!(matches!(
            encode("[d}", &args![1]),
            Err(FormatError::MismatchedBracket { .. })
        ));
        assert!(matches!(
            encode("{sds}", &args!["a", 1, "b"]),
            Err(FormatError::OddDictCount { count: 3, .. })
        ));
        assert!(matches!(
            encode("dd", &args![1, 2]),
            Err(FormatError::TopLevelCount { count: 2 })
        ));
        assert!(matches!(
            encode("", &[]),
            Err(FormatError::TopLevelCount { count: 0 })
        ));
        assert!(matches!(
            encode("[x]", &[]),
            Err(FormatError::UnknownDirective { ch: 'x', pos: 1 })
        ));
    }

    #[test]
    fn test_argument_errors() {
        assert!(matches!(
            encode("[dd]", &args![1]),
            Err(FormatError::MissingArgument { directive: 'd' })
        ));
        assert!(matches!(
            encode("s", &args![1]),
            Err(FormatError::ArgumentType {
                directive: 's',
                found: "int",
                ..
            })
        ));
        assert!(matches!(
            encode("d", &args![i64::MAX]),
            Err(FormatError::OutOfRange { directive: 'd' })
        ));
        assert!(matches!(
            encode("u", &args![-1]),
            Err(FormatError::OutOfRange { directive: 'u' })
        ));
        assert!(matches!(
            encode("d", &args![1, 2]),
            Err(FormatError::TrailingArguments { count: 1 })
        ));
        assert!(matches!(
            encode("[d*d]", &args![1, 2]),
            Err(FormatError::StarOutsideBatch { pos: 2 })
        ));
        let calls: Vec<Vec<Arg>> = vec![args![1]];
        assert!(matches!(
            encode("[@d*d]", &[Arg::Batch(calls)]),
            Err(FormatError::BatchExhausted { pos: 3 })
        ));
    }

    #[test]
    fn test_container_sizes_in_order() {
        assert_eq!(measure("[d[dd]{sd}n]").unwrap(), vec![4, 2, 1]);
        assert_eq!(measure("[@[s[dd]],[*s[d]]]").unwrap(), vec![2, 2, 2, 2, 1]);
    }
}
