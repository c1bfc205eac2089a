//! Client: connection + reader thread dalam satu handle
//!
//! Semua method bisa dipanggil dari banyak thread sekaligus.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::batch::{AtomicBatch, BatchResult};
use super::connection::Connection;
use super::dispatcher::{Dispatcher, NotificationHandler};
use super::transport::{Endpoint, SocketCloser, Transport};
use crate::config::RpcConfig;
use crate::core::{Capture, Registry};
use crate::error::{Error, Result};
use crate::protocol::{Arg, FromValue, Response};

pub struct Client {
    connection: Arc<Connection>,
    config: RpcConfig,
    reader: Mutex<Option<JoinHandle<Result<()>>>>,
    closer: Option<SocketCloser>,
}

impl Client {
    /// Connect ke endpoint dan jalankan reader thread
    pub fn connect<H: NotificationHandler>(
        endpoint: &Endpoint,
        config: RpcConfig,
        handler: H,
    ) -> Result<Self> {
        let transport = endpoint.connect(&config)?;
        info!(endpoint = %endpoint, "rpc client connected");
        Self::from_transport(transport, config, handler)
    }

    pub fn from_transport<H: NotificationHandler>(
        transport: Transport,
        config: RpcConfig,
        handler: H,
    ) -> Result<Self> {
        Self::with_registry(transport, config, Arc::new(Registry::new()), handler)
    }

    /// Seperti `from_transport`, dengan registry yang dibagi ke connection lain
    pub fn with_registry<H: NotificationHandler>(
        transport: Transport,
        config: RpcConfig,
        registry: Arc<Registry>,
        handler: H,
    ) -> Result<Self> {
        let Transport {
            reader,
            writer,
            closer,
        } = transport;

        let capture = match &config.capture_path {
            Some(prefix) => Some(Arc::new(Capture::open(prefix)?)),
            None => None,
        };
        let connection = Arc::new(Connection::new(
            writer,
            registry,
            config.call_timeout,
            capture.clone(),
        ));

        let dispatcher = Dispatcher::new(Arc::clone(&connection), Arc::new(handler));
        let handle = match &capture {
            Some(capture) => dispatcher.spawn(capture.tee(reader)?, &config.reader_thread_name)?,
            None => dispatcher.spawn(reader, &config.reader_thread_name)?,
        };

        Ok(Self {
            connection,
            config,
            reader: Mutex::new(Some(handle)),
            closer,
        })
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Kirim request. `blocking = false` langsung kembali dengan `None`.
    pub fn call(
        &self,
        blocking: bool,
        method: &str,
        fmt: &str,
        args: Vec<Arg>,
    ) -> Result<Option<Response>> {
        self.connection.call(blocking, method, fmt, args)
    }

    /// Blocking call
    pub fn request(&self, method: &str, fmt: &str, args: Vec<Arg>) -> Result<Response> {
        self.call(true, method, fmt, args)?
            .ok_or(Error::Disconnected)
    }

    /// Fire-and-forget
    pub fn notify(&self, method: &str, fmt: &str, args: Vec<Arg>) -> Result<()> {
        self.call(false, method, fmt, args).map(|_| ())
    }

    /// Blocking call dengan result bertipe.
    ///
    /// Error dari peer dan type mismatch di-log dan menjadi `Ok(None)`;
    /// hanya error connection yang diteruskan.
    pub fn call_expect<T: FromValue>(
        &self,
        method: &str,
        fmt: &str,
        args: Vec<Arg>,
    ) -> Result<Option<T>> {
        let response = self.request(method, fmt, args)?;
        match response.into_result() {
            Ok(value) => Ok(value.expect::<T>()),
            Err(Error::Rpc(message)) => {
                warn!(method, error = %message, "rpc call failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Kirim semua call di `batch` sebagai satu atomic request
    pub fn batch_call(&self, batch: AtomicBatch) -> Result<Response> {
        let method = self.config.atomic_method.as_str();
        let sequence = self.connection.next_sequence();
        let packed = batch.into_request(sequence, method)?;
        self.connection
            .send(true, sequence, method, &packed)?
            .ok_or(Error::Disconnected)
    }

    /// `batch_call` lalu parse `[results, error]`. Error di dalam batch di-log.
    pub fn batch_expect(&self, batch: AtomicBatch) -> Result<Option<BatchResult>> {
        let response = self.batch_call(batch)?;
        let value = match response.into_result() {
            Ok(value) => value,
            Err(Error::Rpc(message)) => {
                warn!(error = %message, "atomic call failed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let result = BatchResult::from_value(value)?;
        if let Some(failed) = &result.error {
            warn!(
                index = failed.index,
                error = %failed.message,
                "call inside atomic batch failed"
            );
        }
        Ok(Some(result))
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Tunggu reader thread selesai dan kembalikan error fatalnya
    pub fn join_reader(&self) -> Result<()> {
        let Some(handle) = self.reader.lock().take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("reader thread panicked");
                self.connection.close();
                Err(Error::Disconnected)
            }
        }
    }
}

impl Drop for Client {
    /// Tutup connection dan putus socket supaya reader thread berhenti.
    /// Thread tidak di-join: stdin bisa block selamanya.
    fn drop(&mut self) {
        self.connection.close();
        if let Some(closer) = &self.closer {
            if let Err(e) = closer.shutdown() {
                debug!(connection = self.connection.id(), error = %e, "socket shutdown failed");
            }
        }
    }
}
