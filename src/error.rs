//! Error types untuk RPC engine
//!
//! Transport dan Protocol error bersifat fatal untuk connection.
//! Rpc dan TypeMismatch bisa di-recover oleh caller.

use std::io;

use thiserror::Error;

use crate::protocol::FormatError;

#[derive(Error, Debug)]
pub enum Error {
    /// Read/write failure pada connection
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Byte stream tidak bisa di-decode sebagai msgpack-rpc
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Peer membalas dengan error slot yang tidak nil
    #[error("remote error: {0}")]
    Rpc(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("connection closed")]
    Disconnected,

    #[error("no response for request {sequence} before timeout")]
    Timeout { sequence: u32 },
}

impl Error {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Error yang membuat connection tidak bisa dipakai lagi
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Protocol(_) | Self::Disconnected
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
