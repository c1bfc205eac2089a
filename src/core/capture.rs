//! Wire capture untuk debugging
//!
//! Semua bytes yang dibaca reader thread ditulis ke `<prefix>.read`,
//! semua request yang dikirim ke `<prefix>.write`. File capture bisa
//! dibaca ulang dengan `replay` (mmap, lalu decode semua message).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{decode_all, Value};

/// Pasangan file capture untuk satu connection
pub struct Capture {
    read_path: PathBuf,
    write_path: PathBuf,
    write_log: Mutex<Option<File>>,
}

impl Capture {
    /// Membuat (truncate) `<prefix>.read` dan `<prefix>.write`
    pub fn open<P: AsRef<Path>>(prefix: P) -> io::Result<Self> {
        let prefix = prefix.as_ref();
        let read_path = with_suffix(prefix, "read");
        let write_path = with_suffix(prefix, "write");

        File::create(&read_path)?;
        let write_log = File::create(&write_path)?;
        debug!(read = %read_path.display(), write = %write_path.display(), "wire capture enabled");

        Ok(Self {
            read_path,
            write_path,
            write_log: Mutex::new(Some(write_log)),
        })
    }

    pub fn read_path(&self) -> &Path {
        &self.read_path
    }

    pub fn write_path(&self) -> &Path {
        &self.write_path
    }

    /// Bungkus reader sehingga bytes yang dibaca ikut tersimpan
    pub fn tee<R: Read>(&self, inner: R) -> io::Result<TeeReader<R>> {
        let log = OpenOptions::new().append(true).open(&self.read_path)?;
        Ok(TeeReader {
            inner,
            log: Some(log),
        })
    }

    /// Simpan satu request yang sudah di-serialize
    pub fn record_write(&self, bytes: &[u8]) {
        let mut guard = self.write_log.lock();
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(bytes) {
                warn!(error = %e, "write capture failed, disabling");
                *guard = None;
            }
        }
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Reader yang menyalin setiap bytes ke file capture
pub struct TeeReader<R> {
    inner: R,
    log: Option<File>,
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(log) = self.log.as_mut() {
                if let Err(e) = log.write_all(&buf[..n]) {
                    warn!(error = %e, "read capture failed, disabling");
                    self.log = None;
                }
            }
        }
        Ok(n)
    }
}

/// Decode semua message dalam file capture
pub fn replay<P: AsRef<Path>>(path: P) -> Result<Vec<Value>> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: file hanya dibaca; capture tidak dimodifikasi selama replay
    let mmap = unsafe { Mmap::map(&file)? };
    decode_all(&mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::protocol::encode_packed;
    use std::fs;

    fn cleanup(capture: &Capture) {
        fs::remove_file(capture.read_path()).ok();
        fs::remove_file(capture.write_path()).ok();
    }

    #[test]
    fn test_capture_roundtrip() {
        let capture = Capture::open("test_capture_roundtrip").unwrap();

        let request = encode_packed("[d,d,s,[]]", &args![0, 1, "nvim_get_api_info"]).unwrap();
        capture.record_write(&request.bytes);

        let response = encode_packed("[d,d,n,b]", &args![1, 1, true]).unwrap();
        let mut reader = capture.tee(&response.bytes[..]).unwrap();
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(sink, response.bytes);

        assert_eq!(replay(capture.write_path()).unwrap(), vec![request.value]);
        assert_eq!(replay(capture.read_path()).unwrap(), vec![response.value]);

        cleanup(&capture);
    }

    #[test]
    fn test_replay_empty_file() {
        let capture = Capture::open("test_capture_empty").unwrap();
        assert!(replay(capture.read_path()).unwrap().is_empty());
        cleanup(&capture);
    }

    #[test]
    fn test_replay_truncated_file() {
        let capture = Capture::open("test_capture_truncated").unwrap();
        capture.record_write(&[0x93, 0x01]);
        assert!(replay(capture.write_path()).is_err());
        cleanup(&capture);
    }
}
