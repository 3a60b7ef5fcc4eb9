//! fanout wire format — on-wire types for every fanout message.
//!
//! These types ARE the protocol. Every field, every size, every padding byte
//! is part of the wire format and is shared by the sender and all receivers;
//! nothing here is negotiated at runtime.
//!
//! All types are #[repr(C)] with alignment-1 fields and use zerocopy derives
//! for safe, allocation-free serialization. Multi-byte integers are stored
//! big-endian on the wire so the encoding does not depend on the host
//! architecture. There is no unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, I32, I64, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Data packets per window. One window is the unit of loss tracking,
/// checksum verification, and retry.
pub const WINDOW_SIZE: usize = 256;

/// Payload bytes per data packet. Every packet except a file's final one
/// carries exactly this many bytes.
pub const BUFFER_SIZE: usize = 8192;

/// Capacity of the header's filename field. Shorter names are zero-padded.
pub const MAX_FILENAME: usize = 256;

/// Capacity of a data packet's body field. One byte larger than
/// BUFFER_SIZE; the final byte is always zero on the wire.
pub const DATA_BODY_CAPACITY: usize = BUFFER_SIZE + 1;

/// Fixed IPv4 multicast group for the data channel.
pub const MULTICAST_GROUP: &str = "233.0.133.0";

/// Fixed UDP port for the data channel.
pub const MULTICAST_PORT: u16 = 18238;

/// Bytes covered by one full window.
pub const WINDOW_SPAN: u64 = (WINDOW_SIZE * BUFFER_SIZE) as u64;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when building or interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown control tag: {0}")]
    UnknownControlKind(i32),

    #[error("buffer too short for {kind}: {len} < {need} bytes")]
    Truncated {
        kind: &'static str,
        len: usize,
        need: usize,
    },

    #[error("filename is {0} bytes, capacity is {MAX_FILENAME}")]
    FilenameTooLong(usize),

    #[error("filename contains a path separator")]
    FilenameNotPlain,

    #[error("filename is not valid UTF-8")]
    FilenameNotUtf8,

    #[error("file size {0} exceeds the wire limit")]
    FileTooLarge(u64),

    #[error("payload is {0} bytes, capacity is {BUFFER_SIZE}")]
    PayloadTooLarge(usize),

    #[error("nack lists {0} packets, window holds {WINDOW_SIZE}")]
    TooManyMissing(usize),
}

fn truncated(kind: &'static str, len: usize, need: usize) -> WireError {
    WireError::Truncated { kind, len, need }
}

// ── Control tags ──────────────────────────────────────────────────────────────

/// The four control message kinds carried over a TCP control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ControlKind {
    /// Sender → receivers: the current window has been fully transmitted.
    /// Carries the window's range checksum and the byte offset reached.
    WindowDone = 91,

    /// Receiver → sender: post-repair checksum mismatched, re-send the
    /// whole window. Sender → receivers: a full-window re-send is coming.
    Resend = 101,

    /// Receiver → sender: a NackPacket follows immediately on this channel.
    Nack = 111,

    /// Receiver → sender: window verified, ready to advance.
    /// Sender → receivers: all receivers verified, advance.
    Ack = 121,
}

impl TryFrom<i32> for ControlKind {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            91 => Ok(ControlKind::WindowDone),
            101 => Ok(ControlKind::Resend),
            111 => Ok(ControlKind::Nack),
            121 => Ok(ControlKind::Ack),
            other => Err(WireError::UnknownControlKind(other)),
        }
    }
}

impl From<ControlKind> for i32 {
    fn from(kind: ControlKind) -> i32 {
        kind as i32
    }
}

// ── Header packet ─────────────────────────────────────────────────────────────

/// Sent once per receiver over TCP, immediately after accept.
/// Describes the whole transfer; immutable for the session.
///
/// Wire size: 272 bytes.
#[derive(Clone, PartialEq, Eq, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct HeaderPacket {
    /// Total file size in bytes.
    pub file_size: I32<BigEndian>,

    /// Payload bytes per data packet. Always BUFFER_SIZE; carried on the
    /// wire so a receiver can sanity-check it against its own constant.
    pub packet_payload_size: I32<BigEndian>,

    /// Total data packets in the transfer: ceil(file_size / payload_size).
    pub packet_count: I32<BigEndian>,

    /// Whole-file checksum. Receivers compare against it after the last
    /// window as a final diagnostic.
    pub checksum: U32<BigEndian>,

    /// Destination filename, zero-padded. No path separators.
    pub filename: [u8; MAX_FILENAME],
}

assert_eq_size!(HeaderPacket, [u8; 272]);

impl HeaderPacket {
    pub const WIRE_SIZE: usize = 272;

    pub fn new(file_size: u64, checksum: u32, filename: &str) -> Result<Self, WireError> {
        if file_size > i32::MAX as u64 {
            return Err(WireError::FileTooLarge(file_size));
        }
        if filename.len() > MAX_FILENAME {
            return Err(WireError::FilenameTooLong(filename.len()));
        }
        if filename.contains('/') || filename.contains('\\') {
            return Err(WireError::FilenameNotPlain);
        }

        let mut name = [0u8; MAX_FILENAME];
        name[..filename.len()].copy_from_slice(filename.as_bytes());

        Ok(HeaderPacket {
            file_size: I32::new(file_size as i32),
            packet_payload_size: I32::new(BUFFER_SIZE as i32),
            packet_count: I32::new(file_size.div_ceil(BUFFER_SIZE as u64) as i32),
            checksum: U32::new(checksum),
            filename: name,
        })
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        HeaderPacket::read_from_prefix(buf)
            .ok_or_else(|| truncated("HeaderPacket", buf.len(), Self::WIRE_SIZE))
    }

    pub fn file_size(&self) -> u64 {
        self.file_size.get() as u64
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count.get() as u32
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.get()
    }

    /// The filename with its zero padding trimmed.
    pub fn filename(&self) -> Result<&str, WireError> {
        let end = self
            .filename
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_FILENAME);
        std::str::from_utf8(&self.filename[..end]).map_err(|_| WireError::FilenameNotUtf8)
    }
}

impl std::fmt::Debug for HeaderPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderPacket")
            .field("file_size", &self.file_size.get())
            .field("packet_payload_size", &self.packet_payload_size.get())
            .field("packet_count", &self.packet_count.get())
            .field("checksum", &self.checksum.get())
            .field("filename", &self.filename().unwrap_or("<invalid>"))
            .finish()
    }
}

// ── Data packet ───────────────────────────────────────────────────────────────

/// One payload unit, sent over UDP multicast. Always transmitted at its
/// full wire size; `payload_length` says how much of the body is real.
///
/// Wire size: 8205 bytes.
#[derive(Clone, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct DataPacket {
    /// Index of this packet within its window, in [0, WINDOW_SIZE).
    pub packet_number: I32<BigEndian>,

    /// Bytes of `body` that carry file data. BUFFER_SIZE except for the
    /// file's final packet.
    pub payload_length: I32<BigEndian>,

    /// Which window this packet belongs to, 0-based.
    pub window_number: I32<BigEndian>,

    /// Payload bytes, zero-padded past `payload_length`.
    pub body: [u8; DATA_BODY_CAPACITY],
}

assert_eq_size!(DataPacket, [u8; 8205]);

impl DataPacket {
    pub const WIRE_SIZE: usize = 8205;

    pub fn new(packet_number: u32, window_number: u32, payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() > BUFFER_SIZE {
            return Err(WireError::PayloadTooLarge(payload.len()));
        }

        let mut body = [0u8; DATA_BODY_CAPACITY];
        body[..payload.len()].copy_from_slice(payload);

        Ok(DataPacket {
            packet_number: I32::new(packet_number as i32),
            payload_length: I32::new(payload.len() as i32),
            window_number: I32::new(window_number as i32),
            body,
        })
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        DataPacket::read_from_prefix(buf)
            .ok_or_else(|| truncated("DataPacket", buf.len(), Self::WIRE_SIZE))
    }

    pub fn packet_number(&self) -> u32 {
        self.packet_number.get() as u32
    }

    pub fn window_number(&self) -> u32 {
        self.window_number.get() as u32
    }

    /// The real payload bytes, clamped to the body capacity so a hostile
    /// length field cannot read out of bounds.
    pub fn payload(&self) -> &[u8] {
        let len = (self.payload_length.get().max(0) as usize).min(BUFFER_SIZE);
        &self.body[..len]
    }

    /// Absolute byte offset of this packet's payload in the file.
    pub fn file_offset(&self) -> u64 {
        self.window_number() as u64 * WINDOW_SPAN + self.packet_number() as u64 * BUFFER_SIZE as u64
    }
}

impl std::fmt::Debug for DataPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPacket")
            .field("packet_number", &self.packet_number.get())
            .field("payload_length", &self.payload_length.get())
            .field("window_number", &self.window_number.get())
            .finish_non_exhaustive()
    }
}

// ── Control packet ────────────────────────────────────────────────────────────

/// One control message, sent over TCP. For signal-only kinds (ACK, RESEND,
/// and the NACK announcement) every field except `kind` is zero.
///
/// Wire size: 20 bytes.
#[derive(Debug, Clone, PartialEq, Eq, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct ControlPacket {
    /// One of the ControlKind tags.
    pub kind: I32<BigEndian>,

    /// WINDOW_DONE only: the window this message ends.
    pub window_number: I32<BigEndian>,

    /// WINDOW_DONE only: cumulative file offset reached by the window.
    pub window_offset: I64<BigEndian>,

    /// WINDOW_DONE only: checksum over the window's byte range.
    pub checksum: U32<BigEndian>,
}

assert_eq_size!(ControlPacket, [u8; 20]);

impl ControlPacket {
    pub const WIRE_SIZE: usize = 20;

    /// A WINDOW_DONE message ending `window_number` at `window_offset`.
    pub fn window_done(window_number: u32, window_offset: u64, checksum: u32) -> Self {
        ControlPacket {
            kind: I32::new(ControlKind::WindowDone.into()),
            window_number: I32::new(window_number as i32),
            window_offset: I64::new(window_offset as i64),
            checksum: U32::new(checksum),
        }
    }

    /// A signal-only message: ACK, RESEND, or the NACK announcement.
    pub fn signal(kind: ControlKind) -> Self {
        ControlPacket {
            kind: I32::new(kind.into()),
            window_number: I32::new(0),
            window_offset: I64::new(0),
            checksum: U32::new(0),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        ControlPacket::read_from_prefix(buf)
            .ok_or_else(|| truncated("ControlPacket", buf.len(), Self::WIRE_SIZE))
    }

    pub fn kind(&self) -> Result<ControlKind, WireError> {
        ControlKind::try_from(self.kind.get())
    }

    pub fn window_number(&self) -> u32 {
        self.window_number.get() as u32
    }

    pub fn window_offset(&self) -> u64 {
        self.window_offset.get() as u64
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.get()
    }
}

// ── Nack packet ───────────────────────────────────────────────────────────────

/// Receiver → sender, immediately after a NACK control message. Lists the
/// packet numbers still missing from the receiver's current window. Sent
/// every round, even with nothing missing.
///
/// Wire size: 1028 bytes.
#[derive(Debug, Clone, PartialEq, Eq, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct NackPacket {
    /// How many entries of `missing_packets` are meaningful.
    pub missing_count: I32<BigEndian>,

    /// The missing packet numbers, in ascending order, zero-padded.
    pub missing_packets: [I32<BigEndian>; WINDOW_SIZE],
}

assert_eq_size!(NackPacket, [u8; 1028]);

impl NackPacket {
    pub const WIRE_SIZE: usize = 1028;

    pub fn new(missing: &[u32]) -> Result<Self, WireError> {
        if missing.len() > WINDOW_SIZE {
            return Err(WireError::TooManyMissing(missing.len()));
        }

        let mut packets = [I32::new(0); WINDOW_SIZE];
        for (slot, &number) in packets.iter_mut().zip(missing) {
            *slot = I32::new(number as i32);
        }

        Ok(NackPacket {
            missing_count: I32::new(missing.len() as i32),
            missing_packets: packets,
        })
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        NackPacket::read_from_prefix(buf)
            .ok_or_else(|| truncated("NackPacket", buf.len(), Self::WIRE_SIZE))
    }

    /// The meaningful entries, with a hostile count clamped to capacity.
    pub fn missing(&self) -> impl Iterator<Item = u32> + '_ {
        let count = (self.missing_count.get().max(0) as usize).min(WINDOW_SIZE);
        self.missing_packets[..count].iter().map(|n| n.get() as u32)
    }

    pub fn missing_count(&self) -> usize {
        (self.missing_count.get().max(0) as usize).min(WINDOW_SIZE)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
