//! Integrity checksums over file byte ranges.
//!
//! Every window of a transfer, and the whole file once, is verified by a
//! CRC-32 over its byte range. Reads are positional (`read_at`), so a
//! checksum never disturbs the offsets used by the transfer's own reads
//! and writes and can be taken at any point mid-session.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Checksum of `file` over `[start, end)`. The range is truncated at end
/// of file; an empty or inverted range yields the empty-input CRC, which
/// both ends compute identically.
pub fn checksum_range(file: &File, start: u64, end: u64) -> io::Result<u32> {
    let mut digest = CRC32.digest();
    let mut buf = [0u8; 8192];
    let mut offset = start;

    while offset < end {
        let want = ((end - offset) as usize).min(buf.len());
        let n = file.read_at(&mut buf[..want], offset)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
        offset += n as u64;
    }

    Ok(digest.finalize())
}

/// Checksum of the whole file.
pub fn checksum_file(file: &File) -> io::Result<u32> {
    let len = file.metadata()?.len();
    checksum_range(file, 0, len)
}
