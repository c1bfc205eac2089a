//! Write side dari satu duplex connection
//!
//! Banyak caller thread berbagi satu `Connection`:
//! - sequence counter atomic, independen dari lock apapun
//! - satu write lock supaya bytes dua request tidak pernah bercampur
//! - registry di-inject, bisa dipakai bersama connection lain

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::core::{Capture, Registry, WaitKey};
use crate::error::{Error, Result};
use crate::protocol::{encode_packed, Arg, MessageType, Packed, Response};

static NEXT_CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

/// Envelope untuk request: `[0, sequence, method, [params...]]`
fn request_format(params: &str) -> String {
    format!("[d,u,s,[!{}]]", params)
}

pub struct Connection {
    id: u32,
    sequence: AtomicU32,
    writer: Mutex<Box<dyn Write + Send>>,
    registry: Arc<Registry>,
    closed: AtomicBool,
    capture: Option<Arc<Capture>>,
    call_timeout: Option<Duration>,
}

impl Connection {
    pub fn new<W: Write + Send + 'static>(
        writer: W,
        registry: Arc<Registry>,
        call_timeout: Option<Duration>,
        capture: Option<Arc<Capture>>,
    ) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            sequence: AtomicU32::new(0),
            writer: Mutex::new(Box::new(writer)),
            registry,
            closed: AtomicBool::new(false),
            capture,
            call_timeout,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Wrap di u32::MAX
    #[inline(always)]
    pub fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[inline(always)]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tandai connection mati dan bangunkan semua caller yang masih menunggu
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let woken = self.registry.fail_connection(self.id);
            debug!(connection = self.id, pending = woken, "connection closed");
        }
    }

    /// Tulis satu message utuh di bawah write lock, lalu flush
    pub fn write_packed(&self, packed: &Packed) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(&packed.bytes)?;
        writer.flush()?;
        drop(writer);

        if let Some(capture) = &self.capture {
            capture.record_write(&packed.bytes);
        }
        Ok(())
    }

    /// Kirim request `method` dengan params dari `fmt` / `args`.
    ///
    /// `blocking = false` tidak mendaftarkan waiter; response-nya nanti
    /// di-drop oleh reader sebagai unmatched.
    pub fn call(
        &self,
        blocking: bool,
        method: &str,
        fmt: &str,
        args: Vec<Arg>,
    ) -> Result<Option<Response>> {
        let sequence = self.next_sequence();
        let envelope = [
            Arg::Int(MessageType::Request as i64),
            Arg::UInt(sequence as u64),
            Arg::Str(method.to_owned()),
            Arg::Forward(args),
        ];
        let packed = encode_packed(&request_format(fmt), &envelope)?;
        self.send(blocking, sequence, method, &packed)
    }

    /// Kirim envelope request yang sudah di-build (dipakai atomic batch).
    /// `packed` harus membawa `sequence` yang sama.
    pub(crate) fn send(
        &self,
        blocking: bool,
        sequence: u32,
        method: &str,
        packed: &Packed,
    ) -> Result<Option<Response>> {
        let waiter = if blocking {
            Some(self.registry.register(WaitKey {
                connection: self.id,
                sequence,
            }))
        } else {
            None
        };

        // Cek setelah register: close() yang terjadi setelah ini pasti melihat waiter kita
        if self.is_closed() {
            return Err(Error::Disconnected);
        }

        trace!(
            connection = self.id,
            sequence,
            method,
            bytes = packed.bytes.len(),
            "send {}",
            packed.value
        );
        if let Err(e) = self.write_packed(packed) {
            if e.is_fatal() {
                self.close();
            }
            return Err(e);
        }

        let Some(waiter) = waiter else {
            return Ok(None);
        };
        let response = match self.call_timeout {
            Some(timeout) => waiter.wait_timeout(timeout)?,
            None => waiter.wait()?,
        };
        trace!(connection = self.id, sequence, "recv {}", response.result);
        Ok(Some(response))
    }

    /// Balas request dari peer dengan error: `[1, sequence, message, nil]`
    pub fn respond_error(&self, sequence: u32, message: &str) -> Result<()> {
        let envelope = [
            Arg::Int(MessageType::Response as i64),
            Arg::UInt(sequence as u64),
            Arg::Str(message.to_owned()),
        ];
        let packed = encode_packed("[d,u,s,n]", &envelope)?;
        self.write_packed(&packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::protocol::{decode_all, Message, Value};
    use std::io;

    /// Writer yang menyimpan semua bytes ke buffer bersama
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sequence_wraps() {
        let conn = Connection::new(io::sink(), Arc::new(Registry::new()), None, None);
        conn.sequence.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(conn.next_sequence(), u32::MAX);
        assert_eq!(conn.next_sequence(), 0);
    }

    #[test]
    fn test_fire_and_forget_writes_request() {
        let sink = SharedSink::default();
        let registry = Arc::new(Registry::new());
        let conn = Connection::new(sink.clone(), Arc::clone(&registry), None, None);

        let sent = conn.call(false, "nvim_command", "s", args!["echo 1"]).unwrap();
        assert!(sent.is_none());
        assert!(registry.is_empty());

        let bytes = sink.0.lock().clone();
        let messages = decode_all(&bytes).unwrap();
        assert_eq!(messages.len(), 1);
        match Message::from_value(messages[0].clone()).unwrap() {
            Message::Request(request) => {
                assert_eq!(request.sequence, 0);
                assert_eq!(request.method, "nvim_command");
                assert_eq!(request.params, Value::Array(vec![Value::from("echo 1")]));
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_write_failure_closes_connection() {
        let registry = Arc::new(Registry::new());
        let conn = Connection::new(BrokenPipe, Arc::clone(&registry), None, None);
        let err = conn.call(true, "nvim_eval", "s", args!["1"]).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(conn.is_closed());
        assert!(registry.is_empty());

        assert!(matches!(
            conn.call(true, "nvim_eval", "s", args!["1"]),
            Err(Error::Disconnected)
        ));
    }

    #[test]
    fn test_format_error_is_reported() {
        let conn = Connection::new(io::sink(), Arc::new(Registry::new()), None, None);
        assert!(matches!(
            conn.call(false, "nvim_eval", "d", args!["not a number"]),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_respond_error_shape() {
        let sink = SharedSink::default();
        let conn = Connection::new(sink.clone(), Arc::new(Registry::new()), None, None);
        conn.respond_error(4, "unsupported").unwrap();

        let bytes = sink.0.lock().clone();
        let message = Message::from_value(decode_all(&bytes).unwrap().remove(0)).unwrap();
        match message {
            Message::Response(response) => {
                assert_eq!(response.sequence, 4);
                assert_eq!(response.error_message().as_deref(), Some("unsupported"));
                assert!(response.result.is_nil());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }
}
