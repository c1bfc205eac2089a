//! Konfigurasi client RPC
//!
//! Default bisa di-override lewat environment:
//! ```text
//! MPACK_RPC_CALL_TIMEOUT_MS   batas tunggu response (ms), 0 = tanpa batas
//! MPACK_RPC_CAPTURE           prefix file capture (<prefix>.read / <prefix>.write)
//! MPACK_RPC_ATOMIC_METHOD     nama method untuk atomic batch
//! MPACK_RPC_SOCKET_BUFFER     SO_SNDBUF / SO_RCVBUF dalam bytes
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const ENV_CALL_TIMEOUT_MS: &str = "MPACK_RPC_CALL_TIMEOUT_MS";
pub const ENV_CAPTURE: &str = "MPACK_RPC_CAPTURE";
pub const ENV_ATOMIC_METHOD: &str = "MPACK_RPC_ATOMIC_METHOD";
pub const ENV_SOCKET_BUFFER: &str = "MPACK_RPC_SOCKET_BUFFER";

pub const DEFAULT_ATOMIC_METHOD: &str = "nvim_call_atomic";
pub const DEFAULT_SOCKET_BUFFER: usize = 256 * 1024; // 256KB

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// `None` = tunggu response selamanya
    pub call_timeout: Option<Duration>,
    pub reader_thread_name: String,
    pub atomic_method: String,
    /// Prefix file capture, `None` = capture mati
    pub capture_path: Option<PathBuf>,
    /// Hanya untuk socket endpoint
    pub socket_buffer_size: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout: None,
            reader_thread_name: "mpack-rpc-reader".to_string(),
            atomic_method: DEFAULT_ATOMIC_METHOD.to_string(),
            capture_path: None,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER,
        }
    }
}

impl RpcConfig {
    /// Default ditimpa nilai dari environment. Nilai yang tidak valid di-skip.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.call_timeout = None,
                Ok(ms) => config.call_timeout = Some(Duration::from_millis(ms)),
                Err(_) => warn!(key = ENV_CALL_TIMEOUT_MS, value = %raw, "ignoring invalid value"),
            }
        }
        if let Some(path) = lookup(ENV_CAPTURE).filter(|p| !p.is_empty()) {
            config.capture_path = Some(PathBuf::from(path));
        }
        if let Some(method) = lookup(ENV_ATOMIC_METHOD).filter(|m| !m.is_empty()) {
            config.atomic_method = method;
        }
        if let Some(raw) = lookup(ENV_SOCKET_BUFFER) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.socket_buffer_size = size,
                _ => warn!(key = ENV_SOCKET_BUFFER, value = %raw, "ignoring invalid value"),
            }
        }
        config
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_reader_thread_name(mut self, name: impl Into<String>) -> Self {
        self.reader_thread_name = name.into();
        self
    }

    pub fn with_atomic_method(mut self, method: impl Into<String>) -> Self {
        self.atomic_method = method.into();
        self
    }

    pub fn with_capture(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.capture_path = Some(prefix.into());
        self
    }

    pub fn with_socket_buffer_size(mut self, size: usize) -> Self {
        self.socket_buffer_size = size;
        self
    }
}
