//! The per-receiver TCP control channel.
//!
//! Carries the header handoff and the per-window signaling: WINDOW_DONE,
//! NACK (+ the NackPacket that follows it), ACK, RESEND. Messages are
//! fixed-size with no framing delimiters; the channel is assumed reliable
//! and in-order, so a short read or undecodable bytes here are fatal.
//!
//! Receiving is buffered and message-granular: bytes accumulate in an
//! internal buffer across `read_buf` calls and a message is only consumed
//! once complete. The recv methods are therefore safe to drop from a
//! `select!`; a partially received message survives in the buffer.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use zerocopy::AsBytes;

use fanout_core::wire::{ControlKind, ControlPacket, HeaderPacket, NackPacket};

use crate::TransportError;

// The recv buffer never needs more than one control message plus the
// nack that can follow it.
const RECV_BUF_CAPACITY: usize = HeaderPacket::WIRE_SIZE + NackPacket::WIRE_SIZE;

pub struct ControlChannel {
    stream: TcpStream,
    buf: BytesMut,
}

impl ControlChannel {
    pub fn new(stream: TcpStream) -> Self {
        ControlChannel {
            stream,
            buf: BytesMut::with_capacity(RECV_BUF_CAPACITY),
        }
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    pub async fn send_header(&mut self, header: &HeaderPacket) -> Result<(), TransportError> {
        self.stream.write_all(header.as_bytes()).await?;
        Ok(())
    }

    pub async fn send_control(&mut self, packet: &ControlPacket) -> Result<(), TransportError> {
        self.stream.write_all(packet.as_bytes()).await?;
        Ok(())
    }

    /// Send a signal-only control message (ACK, RESEND, NACK announcement).
    pub async fn send_signal(&mut self, kind: ControlKind) -> Result<(), TransportError> {
        self.send_control(&ControlPacket::signal(kind)).await
    }

    pub async fn send_nack(&mut self, nack: &NackPacket) -> Result<(), TransportError> {
        self.stream.write_all(nack.as_bytes()).await?;
        Ok(())
    }

    // ── Receiving ────────────────────────────────────────────────────────────

    pub async fn recv_header(&mut self) -> Result<HeaderPacket, TransportError> {
        self.fill(HeaderPacket::WIRE_SIZE).await?;
        let header = HeaderPacket::decode(&self.buf[..HeaderPacket::WIRE_SIZE])?;
        self.buf.advance(HeaderPacket::WIRE_SIZE);
        Ok(header)
    }

    pub async fn recv_control(&mut self) -> Result<ControlPacket, TransportError> {
        self.fill(ControlPacket::WIRE_SIZE).await?;
        let packet = ControlPacket::decode(&self.buf[..ControlPacket::WIRE_SIZE])?;
        self.buf.advance(ControlPacket::WIRE_SIZE);
        Ok(packet)
    }

    pub async fn recv_nack(&mut self) -> Result<NackPacket, TransportError> {
        self.fill(NackPacket::WIRE_SIZE).await?;
        let nack = NackPacket::decode(&self.buf[..NackPacket::WIRE_SIZE])?;
        self.buf.advance(NackPacket::WIRE_SIZE);
        Ok(nack)
    }

    /// Buffer bytes until at least `need` are available. EOF mid-message
    /// means the peer vanished.
    async fn fill(&mut self, need: usize) -> Result<(), TransportError> {
        while self.buf.len() < need {
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(TransportError::ControlChannelClosed);
            }
        }
        Ok(())
    }
}
