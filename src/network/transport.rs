//! Transport endpoints ke editor
//!
//! Editor bisa dijangkau lewat stdio (job channel), Unix socket,
//! atau TCP. Socket di-tune: TCP_NODELAY dan buffer kernel yang lebih besar.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::PathBuf;
use std::str::FromStr;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use tracing::debug;

use crate::config::RpcConfig;

/// Alamat peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// stdin / stdout proses ini
    Stdio,
    #[cfg(unix)]
    Unix(PathBuf),
    /// `host:port`
    Tcp(String),
}

/// Read half dan write half yang terpisah
pub struct Transport {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    /// Handle socket untuk memutus kedua arah. `None` untuk stdio.
    pub closer: Option<SocketCloser>,
}

/// Clone socket yang dipakai untuk `shutdown(Both)`.
/// Reader thread yang sedang block di `read` akan bangun dengan EOF.
#[derive(Debug)]
pub enum SocketCloser {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl SocketCloser {
    pub fn shutdown(&self) -> io::Result<()> {
        let outcome = match self {
            #[cfg(unix)]
            SocketCloser::Unix(stream) => stream.shutdown(Shutdown::Both),
            SocketCloser::Tcp(stream) => stream.shutdown(Shutdown::Both),
        };
        match outcome {
            // Peer sudah menutup lebih dulu
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Transport {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            closer: None,
        }
    }

    /// Split socket Unix yang sudah terhubung
    #[cfg(unix)]
    pub fn from_unix(stream: UnixStream) -> io::Result<Self> {
        let reader = stream.try_clone()?;
        let closer = SocketCloser::Unix(stream.try_clone()?);
        let mut transport = Self::new(reader, stream);
        transport.closer = Some(closer);
        Ok(transport)
    }

    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let reader = stream.try_clone()?;
        let closer = SocketCloser::Tcp(stream.try_clone()?);
        let mut transport = Self::new(reader, stream);
        transport.closer = Some(closer);
        Ok(transport)
    }
}

impl Endpoint {
    pub fn connect(&self, config: &RpcConfig) -> io::Result<Transport> {
        match self {
            Endpoint::Stdio => Ok(Transport::new(io::stdin(), io::stdout())),
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)?;
                tune_socket(&stream, config.socket_buffer_size);
                debug!(endpoint = %self, "connected");
                Transport::from_unix(stream)
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str())?;
                // Disable Nagle's algorithm untuk lower latency
                stream.set_nodelay(true)?;
                #[cfg(unix)]
                tune_socket(&stream, config.socket_buffer_size);
                debug!(endpoint = %self, "connected");
                Transport::from_tcp(stream)
            }
        }
    }
}

/// Perbesar SO_SNDBUF dan SO_RCVBUF. Kegagalan hanya di-log.
#[cfg(unix)]
fn tune_socket<S: std::os::unix::io::AsRawFd>(socket: &S, size: usize) {
    let fd = socket.as_raw_fd();
    let optval = size.min(libc::c_int::MAX as usize) as libc::c_int;
    for (name, opt) in [("SO_SNDBUF", libc::SO_SNDBUF), ("SO_RCVBUF", libc::SO_RCVBUF)] {
        // SAFETY: fd valid selama `socket` hidup, optval berukuran c_int
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                opt,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            debug!(option = name, error = %io::Error::last_os_error(), "setsockopt failed");
        }
    }
}

impl FromStr for Endpoint {
    type Err = io::Error;

    /// Format: `stdio`, `unix:<path>`, `tcp:<host:port>`, atau alamat polos
    /// (path jika mengandung `/`, selain itu `host:port`).
    fn from_str(s: &str) -> io::Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty endpoint"));
        }
        if s.eq_ignore_ascii_case("stdio") {
            return Ok(Endpoint::Stdio);
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        #[cfg(unix)]
        {
            if let Some(path) = s.strip_prefix("unix:") {
                return Ok(Endpoint::Unix(PathBuf::from(path)));
            }
            if s.contains('/') {
                return Ok(Endpoint::Unix(PathBuf::from(s)));
            }
        }
        if s.contains(':') {
            return Ok(Endpoint::Tcp(s.to_string()));
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unrecognized endpoint {:?}", s),
        ))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Stdio => f.write_str("stdio"),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}
