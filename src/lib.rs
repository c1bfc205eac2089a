//! mpack-rpc: MessagePack-RPC engine untuk editor integration
//!
//! Layers:
//! - `protocol`: value model, decoder, format-string encoder, envelopes
//! - `core`: pending-wait registry dan wire capture
//! - `network`: connection, reader thread, client, atomic batch
//!
//! Library ini tidak memasang tracing subscriber; itu urusan binary.

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod protocol;

pub use config::RpcConfig;
pub use error::{Error, Result};
pub use network::{AtomicBatch, BatchResult, Client, Endpoint, NotificationHandler};
pub use protocol::{decode_one, encode, Arg, Response, Value};
