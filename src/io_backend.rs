//! Collective I/O backend (consumed interface, spec §6): positioned
//! read/write/truncate/close, abstracted so the section engine can run
//! against a real file or an in-memory buffer without caring which.
//!
//! Grounded on `sc_io_write_at` / `sc_io_write_at_all` / `sc_io_read_at`:
//! every call is at an absolute offset, every call reports the exact
//! byte count it moved so the context can distinguish a short write
//! from a backend error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{FileError, Result};

/// What [`crate::context::FileContext`] requires of its storage.
pub trait CollectiveIo: Send + Sync {
    /// Write `buf` at absolute `offset`, returning the number of bytes
    /// actually written.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize>;

    /// Read exactly `buf.len()` bytes starting at absolute `offset`,
    /// returning the number of bytes actually read (short on EOF).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total length of the underlying storage.
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate (or extend) storage to exactly `len` bytes.
    fn set_len(&self, len: u64) -> Result<()>;

    /// Flush and release any OS-level resources. Idempotent.
    fn close(&self) -> Result<()>;
}

fn write_at_impl(file: &Mutex<File>, offset: u64, buf: &[u8]) -> Result<usize> {
    let mut f = file.lock().unwrap();
    f.seek(SeekFrom::Start(offset))?;
    f.write_all(buf)?;
    Ok(buf.len())
}

fn read_at_impl(file: &Mutex<File>, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut f = file.lock().unwrap();
    f.seek(SeekFrom::Start(offset))?;
    let mut total = 0;
    loop {
        match f.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
        if total == buf.len() {
            break;
        }
    }
    Ok(total)
}

/// Storage backed by a real file on disk.
pub struct PosixBackend {
    file: Mutex<File>,
}

impl PosixBackend {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(PosixBackend { file: Mutex::new(file) })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(PosixBackend { file: Mutex::new(file) })
    }
}

impl CollectiveIo for PosixBackend {
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        write_at_impl(&self.file, offset, buf)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        read_at_impl(&self.file, offset, buf)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().unwrap().metadata()?.len())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.file.lock().unwrap().set_len(len)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.file.lock().unwrap().flush()?;
        Ok(())
    }
}

/// Storage backed by an in-memory buffer, used by tests and benches
/// that don't want to touch the filesystem.
pub struct MemBackend {
    buf: Mutex<Vec<u8>>,
}

impl MemBackend {
    pub fn new() -> Self {
        MemBackend { buf: Mutex::new(Vec::new()) }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf.into_inner().unwrap()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.buf.lock().unwrap().clone()
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectiveIo for MemBackend {
    fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let mut buf = self.buf.lock().unwrap();
        let end = offset as usize + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<usize> {
        let buf = self.buf.lock().unwrap();
        let offset = offset as usize;
        if offset >= buf.len() {
            return Ok(0);
        }
        let n = out.len().min(buf.len() - offset);
        out[..n].copy_from_slice(&buf[offset..offset + n]);
        Ok(n)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.buf.lock().unwrap().len() as u64)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.buf.lock().unwrap().resize(len as usize, 0);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Test-only backend that wraps another one and fails deterministically
/// on a chosen call, used to exercise the count-error / I/O-error
/// branches of the section engine without needing a real flaky disk.
#[cfg(test)]
pub struct FaultInjectingBackend<B> {
    inner: B,
    fail_writes_after: std::sync::atomic::AtomicUsize,
    short_read_by: usize,
}

#[cfg(test)]
impl<B: CollectiveIo> FaultInjectingBackend<B> {
    pub fn new(inner: B) -> Self {
        FaultInjectingBackend {
            inner,
            fail_writes_after: std::sync::atomic::AtomicUsize::new(usize::MAX),
            short_read_by: 0,
        }
    }

    pub fn fail_after_writes(mut self, n: usize) -> Self {
        self.fail_writes_after = std::sync::atomic::AtomicUsize::new(n);
        self
    }

    pub fn short_read_by(mut self, n: usize) -> Self {
        self.short_read_by = n;
        self
    }
}

#[cfg(test)]
impl<B: CollectiveIo> CollectiveIo for FaultInjectingBackend<B> {
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        use std::sync::atomic::Ordering;
        let remaining = self.fail_writes_after.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n == 0 {
                None
            } else {
                Some(n - 1)
            }
        });
        if remaining == Ok(0) {
            return Err(FileError::format("injected write failure"));
        }
        self.inner.write_at(offset, buf)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if self.short_read_by == 0 {
            return self.inner.read_at(offset, buf);
        }
        let capped = buf.len().saturating_sub(self.short_read_by);
        self.inner.read_at(offset, &mut buf[..capped])
    }

    fn len(&self) -> Result<u64> {
        self.inner.len()
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.inner.set_len(len)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
