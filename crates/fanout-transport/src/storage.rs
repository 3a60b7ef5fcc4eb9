//! Positional file access for the transfer.
//!
//! All reads and writes are by absolute byte offset, so checksum passes,
//! sequential window reads, and out-of-order repair writes can interleave
//! freely without sharing a cursor.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// A source or destination file, addressed by byte offset.
pub struct FileStore {
    file: File,
}

impl FileStore {
    /// Open an existing file read-only (the sender's source).
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(FileStore {
            file: File::open(path)?,
        })
    }

    /// Create or truncate a file read-write (the receiver's destination).
    /// Read access is needed for checksum verification.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(FileStore {
            file: OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        })
    }

    /// Read into `buf` starting at `offset`. Loops over short reads and
    /// returns how many bytes were read; less than `buf.len()` means end
    /// of file was reached, zero means `offset` is at or past it.
    pub fn read_span(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Write all of `buf` at `offset`, looping until every byte lands.
    pub fn write_span(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.file.write_at(&buf[written..], offset + written as u64)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "file write made no progress",
                ));
            }
            written += n;
        }
        Ok(())
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The underlying file, for checksum passes.
    pub fn file(&self) -> &File {
        &self.file
    }
}
