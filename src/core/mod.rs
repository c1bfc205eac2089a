//! Core module: state bersama antara caller threads dan reader thread
//!
//! Prinsip desain:
//! - Registry eksplisit, di-inject per connection (bukan global)
//! - O(1) matching berdasarkan (connection, sequence)
//! - Capture opsional untuk debugging wire traffic

pub mod capture;
mod registry;

pub use capture::{replay, Capture, TeeReader};
pub use registry::{Registry, WaitKey, WaitRecord};
