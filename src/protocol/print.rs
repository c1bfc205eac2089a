//! Human-readable rendering untuk trace log
//!
//! `{}` menghasilkan satu baris, `{:#}` memecah container bertingkat
//! ke beberapa baris dengan indentasi.

use std::fmt::{self, Write};

use super::value::{Ext, Value};

const INDENT: &str = "  ";

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f, f.alternate(), 0)
    }
}

impl fmt::Display for Ext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(EXT: {} {})", self.handle_name(), self.as_number())
    }
}

fn is_container(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Dict(entries) => !entries.is_empty(),
        _ => false,
    }
}

fn newline(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    f.write_char('\n')?;
    for _ in 0..depth {
        f.write_str(INDENT)?;
    }
    Ok(())
}

fn render(value: &Value, f: &mut fmt::Formatter<'_>, pretty: bool, depth: usize) -> fmt::Result {
    match value {
        Value::Nil => f.write_str("NIL"),
        Value::Bool(true) => f.write_str("TRUE"),
        Value::Bool(false) => f.write_str("FALSE"),
        Value::Int(n) => write!(f, "{}", n),
        Value::UInt(n) => write!(f, "{}", n),
        Value::Ext(ext) => write!(f, "{}", ext),
        Value::String(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
        Value::Array(items) => {
            // Array berisi scalar saja tetap satu baris
            let split = pretty && items.iter().any(is_container);
            f.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if split {
                    newline(f, depth + 1)?;
                } else if i > 0 {
                    f.write_str(", ")?;
                }
                render(item, f, pretty, depth + 1)?;
                if split && i + 1 < items.len() {
                    f.write_char(',')?;
                }
            }
            if split {
                newline(f, depth)?;
            }
            f.write_char(']')
        }
        Value::Dict(entries) => {
            let split = pretty && !entries.is_empty();
            f.write_char('{')?;
            for (i, (key, value)) in entries.iter().enumerate() {
                if split {
                    newline(f, depth + 1)?;
                } else if i > 0 {
                    f.write_str(", ")?;
                }
                render(key, f, pretty, depth + 1)?;
                f.write_str(" => ")?;
                render(value, f, pretty, depth + 1)?;
                if split && i + 1 < entries.len() {
                    f.write_char(',')?;
                }
            }
            if split {
                newline(f, depth)?;
            }
            f.write_char('}')
        }
    }
}
