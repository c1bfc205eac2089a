//! Network Layer: multiplexed RPC di atas satu duplex connection
//!
//! Banyak caller thread, satu reader thread per connection.
//!
//! Fitur:
//! - Request/response correlation berdasarkan (connection, sequence)
//! - Atomic batch untuk beberapa call dalam satu request
//! - Endpoint stdio, Unix socket, dan TCP

mod api;
mod batch;
mod client;
mod connection;
mod dispatcher;
mod transport;

pub use batch::{AtomicBatch, BatchError, BatchResult};
pub use client::Client;
pub use connection::Connection;
pub use dispatcher::{Dispatcher, IgnoreNotifications, NotificationHandler};
pub use transport::{Endpoint, SocketCloser, Transport};
