//! Pending-wait registry
//!
//! Map (connection, sequence) -> one-shot channel. Caller mendaftar
//! sebelum request ditulis; reader thread mengirim response ke channel
//! yang cocok. Response tanpa pasangan dikembalikan ke pemanggil `deliver`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::protocol::Response;

/// Identitas satu call yang sedang ditunggu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitKey {
    pub connection: u32,
    pub sequence: u32,
}

/// Registry bersama, bisa dipakai beberapa connection via `Arc`
///
/// Setiap entry membawa generation id, supaya record lama untuk key yang
/// sama (setelah sequence wrap) tidak menghapus entry penggantinya.
#[derive(Default)]
pub struct Registry {
    pending: Mutex<HashMap<WaitKey, (u64, Sender<Response>)>>,
    generation: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Daftarkan waiter. Record otomatis dihapus saat di-drop.
    pub fn register(self: &Arc<Self>, key: WaitKey) -> WaitRecord {
        let (tx, rx) = channel::bounded(1);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        if self.pending.lock().insert(key, (generation, tx)).is_some() {
            // Sequence sudah wrap dan call lama belum selesai
            warn!(
                connection = key.connection,
                sequence = key.sequence,
                "replacing stale wait record"
            );
        }
        WaitRecord {
            key,
            generation,
            receiver: rx,
            registry: Arc::clone(self),
        }
    }

    /// Kirim response ke waiter yang cocok.
    ///
    /// Returns response kembali jika tidak ada waiter untuk key ini.
    pub fn deliver(&self, key: WaitKey, response: Response) -> std::result::Result<(), Response> {
        let sender = self.pending.lock().remove(&key);
        match sender {
            Some((_, tx)) => {
                trace!(
                    connection = key.connection,
                    sequence = key.sequence,
                    "delivering response"
                );
                // Waiter yang sudah pergi (timeout) juga dihitung unmatched
                tx.send(response).map_err(|e| e.into_inner())
            }
            None => Err(response),
        }
    }

    pub fn remove(&self, key: &WaitKey) -> bool {
        self.pending.lock().remove(key).is_some()
    }

    /// Hapus entry hanya jika masih milik registrasi `generation`
    fn remove_own(&self, key: &WaitKey, generation: u64) -> bool {
        let mut pending = self.pending.lock();
        match pending.get(key) {
            Some((current, _)) if *current == generation => pending.remove(key).is_some(),
            _ => false,
        }
    }

    /// Bangunkan semua waiter satu connection dengan `Error::Disconnected`.
    pub fn fail_connection(&self, connection: u32) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|key, _| key.connection != connection);
        before - pending.len()
    }

    pub fn fail_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Satu caller yang menunggu response
pub struct WaitRecord {
    key: WaitKey,
    generation: u64,
    receiver: Receiver<Response>,
    registry: Arc<Registry>,
}

impl WaitRecord {
    #[inline(always)]
    pub fn key(&self) -> WaitKey {
        self.key
    }

    /// Block sampai response datang atau connection mati
    pub fn wait(&self) -> Result<Response> {
        self.receiver.recv().map_err(|_| Error::Disconnected)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<Response> {
        match self.receiver.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout {
                sequence: self.key.sequence,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }
}

impl Drop for WaitRecord {
    fn drop(&mut self) {
        self.registry.remove_own(&self.key, self.generation);
    }
}
