//! Protocol Layer: msgpack value model dan RPC envelopes
//!
//! Prinsip desain:
//! - Satu Value tree dengan ownership yang jelas
//! - Decoder tidak peduli sumber bytes (stream atau buffer)
//! - Encoder membangun Value dan bytes wire dalam satu langkah

mod decoder;
mod encoder;
mod format;
pub mod marker;
mod message;
mod print;
mod value;

pub use decoder::{
    decode_all, decode_one, decode_value, ByteSource, SliceSource, StreamSource, MAX_DEPTH,
};
pub use encoder::{serialize, Encoder, Packed, ValueBuilder};
pub use format::{encode, encode_packed, Arg, FormatError};
pub use message::{Message, MessageType, Notification, Request, Response};
pub use value::{DictEntry, Ext, FromValue, Value};
