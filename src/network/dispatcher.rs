//! Reader loop: satu thread per connection
//!
//! Thread ini satu-satunya pemilik read half. Untuk setiap message:
//! - Notification: diserahkan ke handler di thread baru
//! - Response: dikirim ke waiter lewat registry, atau di-drop jika unmatched
//! - Request dari peer: dibalas dengan error response

use std::io::Read;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace, warn};

use super::connection::Connection;
use crate::core::WaitKey;
use crate::error::Result;
use crate::protocol::{decode_one, ByteSource, Message, Notification, StreamSource, Value};

/// Penerima notification dari peer. Dipanggil di thread tersendiri.
pub trait NotificationHandler: Send + Sync + 'static {
    fn handle(&self, notification: Notification);
}

impl<F> NotificationHandler for F
where
    F: Fn(Notification) + Send + Sync + 'static,
{
    fn handle(&self, notification: Notification) {
        self(notification)
    }
}

/// Handler default: log lalu buang
pub struct IgnoreNotifications;

impl NotificationHandler for IgnoreNotifications {
    fn handle(&self, notification: Notification) {
        debug!(method = %notification.method, "ignoring notification");
    }
}

pub struct Dispatcher {
    connection: Arc<Connection>,
    handler: Arc<dyn NotificationHandler>,
}

impl Dispatcher {
    pub fn new(connection: Arc<Connection>, handler: Arc<dyn NotificationHandler>) -> Self {
        Self {
            connection,
            handler,
        }
    }

    /// Jalankan reader loop di thread bernama `name`.
    ///
    /// Join handle membawa error fatal yang menghentikan loop.
    pub fn spawn<R>(self, reader: R, name: &str) -> std::io::Result<JoinHandle<Result<()>>>
    where
        R: Read + Send + 'static,
    {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run(&mut StreamSource::new(reader)))
    }

    /// Decode dan dispatch sampai terjadi error fatal.
    pub fn run<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<()> {
        let connection = self.connection.id();
        debug!(connection, "reader started");
        loop {
            let outcome = decode_one(source).and_then(|value| self.dispatch(value));
            if let Err(e) = outcome {
                error!(connection, error = %e, "reader stopped");
                self.connection.close();
                return Err(e);
            }
        }
    }

    /// Dispatch satu message hasil decode
    pub fn dispatch(&self, value: Value) -> Result<()> {
        trace!(connection = self.connection.id(), "recv {}", value);
        match Message::from_value(value)? {
            Message::Response(response) => {
                let key = WaitKey {
                    connection: self.connection.id(),
                    sequence: response.sequence,
                };
                if let Err(unmatched) = self.connection.registry().deliver(key, response) {
                    // Fire-and-forget call atau waiter yang sudah timeout
                    debug!(
                        connection = key.connection,
                        sequence = key.sequence,
                        "dropping unmatched response {}",
                        unmatched.result
                    );
                }
            }
            Message::StrayResponse { sequence } => {
                debug!(
                    connection = self.connection.id(),
                    "dropping response with out-of-range sequence {}",
                    sequence
                );
            }
            Message::Notification(notification) => {
                let handler = Arc::clone(&self.handler);
                let method = notification.method.clone();
                let spawned = thread::Builder::new()
                    .name("mpack-rpc-notify".to_string())
                    .spawn(move || handler.handle(notification));
                if let Err(e) = spawned {
                    warn!(method = %method, error = %e, "failed to spawn notification handler");
                }
            }
            Message::Request(request) => {
                warn!(
                    sequence = request.sequence,
                    method = %request.method,
                    "peer sent a request, answering with error"
                );
                let message = format!("method not supported: {}", request.method);
                self.connection.respond_error(request.sequence, &message)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::core::Registry;
    use crate::error::Error;
    use crate::protocol::{encode, encode_packed, SliceSource};
    use crossbeam::channel;
    use std::io;
    use std::time::Duration;

    fn dispatcher(registry: &Arc<Registry>) -> (Dispatcher, Arc<Connection>) {
        let conn = Arc::new(Connection::new(io::sink(), Arc::clone(registry), None, None));
        let dispatcher = Dispatcher::new(Arc::clone(&conn), Arc::new(IgnoreNotifications));
        (dispatcher, conn)
    }

    #[test]
    fn test_unmatched_then_matched() {
        let registry = Arc::new(Registry::new());
        let (dispatcher, conn) = dispatcher(&registry);
        let waiter = registry.register(WaitKey {
            connection: conn.id(),
            sequence: 5,
        });

        let stray = encode("[d,d,n,s]", &args![1, 999, "stray"]).unwrap();
        dispatcher.dispatch(stray).unwrap();

        let real = encode("[d,d,n,s]", &args![1, 5, "real"]).unwrap();
        dispatcher.dispatch(real).unwrap();

        let response = waiter.wait().unwrap();
        assert_eq!(response.result.as_str(), Some("real"));
    }

    #[test]
    fn test_out_of_range_sequence_then_matched() {
        let registry = Arc::new(Registry::new());
        let (dispatcher, conn) = dispatcher(&registry);
        let waiter = registry.register(WaitKey {
            connection: conn.id(),
            sequence: 6,
        });

        let stray = encode("[d,l,n,n]", &args![1, 1i64 << 33]).unwrap();
        dispatcher.dispatch(stray).unwrap();
        let negative = encode("[d,d,n,n]", &args![1, -1]).unwrap();
        dispatcher.dispatch(negative).unwrap();
        assert!(!conn.is_closed());

        let real = encode("[d,d,n,s]", &args![1, 6, "real"]).unwrap();
        dispatcher.dispatch(real).unwrap();
        assert_eq!(waiter.wait().unwrap().result.as_str(), Some("real"));
    }

    #[test]
    fn test_notification_handler_runs() {
        let registry = Arc::new(Registry::new());
        let conn = Arc::new(Connection::new(io::sink(), Arc::clone(&registry), None, None));
        let (tx, rx) = channel::unbounded();
        let handler = move |n: Notification| {
            tx.send(n.method).ok();
        };
        let dispatcher = Dispatcher::new(conn, Arc::new(handler));

        let value = encode("[d,s,[d]]", &args![2, "nvim_buf_detach_event", 1]).unwrap();
        dispatcher.dispatch(value).unwrap();
        let method = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(method, "nvim_buf_detach_event");
    }

    #[test]
    fn test_run_stops_on_garbage_and_wakes_waiters() {
        let registry = Arc::new(Registry::new());
        let (dispatcher, conn) = dispatcher(&registry);
        let waiter = registry.register(WaitKey {
            connection: conn.id(),
            sequence: 1,
        });

        let mut bytes = encode_packed("[d,d,n,n]", &args![1, 77]).unwrap().bytes;
        bytes.push(0xc1);
        let err = dispatcher.run(&mut SliceSource::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(conn.is_closed());
        assert!(matches!(waiter.wait(), Err(Error::Disconnected)));
    }
}
