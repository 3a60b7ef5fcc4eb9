//! The sender's window engine.
//!
//! Per window: SENDING multicasts up to WINDOW_SIZE packets read
//! sequentially from the source, then WINDOW_DONE goes to every receiver
//! and the engine waits for convergence: each receiver must answer with
//! exactly one round-ending signal (ACK or RESEND). NACKs arriving along
//! the way trigger immediate targeted retransmission and do not end that
//! receiver's round. A single RESEND vote re-sends the whole window to
//! everyone; unanimous ACKs advance.
//!
//! The convergence wait is one `join_all` over a future per control
//! channel: readiness multiplexing on a single thread, no spawned tasks,
//! and the hard barrier the protocol's ordering depends on.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use zerocopy::AsBytes;

use fanout_core::integrity::checksum_range;
use fanout_core::wire::{ControlKind, ControlPacket, DataPacket, BUFFER_SIZE, WINDOW_SIZE};

use crate::control::ControlChannel;
use crate::storage::FileStore;
use crate::window::{packet_offset, window_base};
use crate::TransportError;

/// Counters reported when a transfer completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransferStats {
    /// Windows advanced past (retries of the same window count once).
    pub windows: u32,
    /// Full-window re-sends forced by a RESEND vote.
    pub retries: u32,
    /// Data packets multicast, including targeted retransmissions.
    pub packets_sent: u64,
}

pub struct Sender {
    store: FileStore,
    data: UdpSocket,
    group: SocketAddr,
    controls: Vec<ControlChannel>,
}

/// What one receiver answered for the current round.
enum RoundSignal {
    Ack,
    Resend,
}

impl Sender {
    pub fn new(
        store: FileStore,
        data: UdpSocket,
        group: SocketAddr,
        controls: Vec<ControlChannel>,
    ) -> Self {
        Sender {
            store,
            data,
            group,
            controls,
        }
    }

    /// Drive the transfer to completion. Returns once the final window
    /// has converged on every receiver.
    pub async fn run(&mut self) -> Result<TransferStats, TransportError> {
        let mut stats = TransferStats::default();
        let mut window: u32 = 0;

        loop {
            let (packets, window_end, eof) = self.send_window(window).await?;
            stats.packets_sent += packets as u64;

            let checksum = checksum_range(self.store.file(), window_base(window), window_end)?;
            let done = ControlPacket::window_done(window, window_end, checksum);
            for chan in &mut self.controls {
                chan.send_control(&done).await?;
            }

            let (resend_votes, repairs) = self.await_convergence(window).await?;
            stats.packets_sent += repairs;

            tracing::info!(
                window,
                packets,
                repairs,
                resend_votes,
                "window transmitted"
            );

            if resend_votes > 0 {
                // one bad verdict re-sends the window to everyone
                for chan in &mut self.controls {
                    chan.send_signal(ControlKind::Resend).await?;
                }
                stats.retries += 1;
                continue;
            }

            for chan in &mut self.controls {
                chan.send_signal(ControlKind::Ack).await?;
            }
            stats.windows += 1;
            window += 1;

            if eof {
                return Ok(stats);
            }
        }
    }

    /// SENDING: multicast one window's packets. Returns the packet count,
    /// the file offset reached, and whether end of file was hit. Hitting
    /// it ends the whole transfer once this window's round completes.
    async fn send_window(&mut self, window: u32) -> Result<(u32, u64, bool), TransportError> {
        let mut buf = [0u8; BUFFER_SIZE];
        let mut offset = window_base(window);
        let mut sequence: u32 = 0;
        let mut eof = false;

        while (sequence as usize) < WINDOW_SIZE {
            let n = self.store.read_span(offset, &mut buf)?;
            if n == 0 {
                eof = true;
                break;
            }

            let packet = DataPacket::new(sequence, window, &buf[..n])?;
            send_datagram(&self.data, packet.as_bytes(), self.group).await?;

            offset += n as u64;
            sequence += 1;
        }

        tracing::debug!(window, packets = sequence, eof, "window sent");
        Ok((sequence, offset, eof))
    }

    /// AWAITING_CONVERGENCE: wait until every receiver has ended its
    /// round, servicing NACKs as they arrive. Returns the number of
    /// RESEND votes and how many packets were retransmitted.
    async fn await_convergence(&mut self, window: u32) -> Result<(u32, u64), TransportError> {
        let store = &self.store;
        let data = &self.data;
        let group = self.group;

        let rounds = self.controls.iter_mut().map(|chan| async move {
            let mut repairs: u64 = 0;
            loop {
                let ctrl = chan.recv_control().await?;
                match ctrl.kind()? {
                    ControlKind::Ack => return Ok((RoundSignal::Ack, repairs)),
                    ControlKind::Resend => return Ok((RoundSignal::Resend, repairs)),
                    ControlKind::Nack => {
                        // a NACK never ends the round; repair and keep waiting
                        let nack = chan.recv_nack().await?;
                        tracing::debug!(
                            window,
                            missing = nack.missing_count(),
                            "nack received"
                        );
                        for packet in nack.missing() {
                            resend_packet(store, data, group, window, packet).await?;
                            repairs += 1;
                        }
                    }
                    other => return Err(TransportError::UnexpectedControl(other)),
                }
            }
        });

        let mut resend_votes: u32 = 0;
        let mut repairs: u64 = 0;
        for result in futures::future::join_all(rounds).await {
            let (signal, sent) = result?;
            repairs += sent;
            if matches!(signal, RoundSignal::Resend) {
                resend_votes += 1;
            }
        }
        Ok((resend_votes, repairs))
    }
}

/// Re-read one packet's bytes at its absolute offset and multicast it.
/// A zero-length read past end of file still sends the (empty) packet so
/// the receiver can clear the corresponding bitmap entry.
async fn resend_packet(
    store: &FileStore,
    data: &UdpSocket,
    group: SocketAddr,
    window: u32,
    packet: u32,
) -> Result<(), TransportError> {
    let mut buf = [0u8; BUFFER_SIZE];
    let n = store.read_span(packet_offset(window, packet), &mut buf)?;

    let resend = DataPacket::new(packet, window, &buf[..n])?;
    send_datagram(data, resend.as_bytes(), group).await?;

    tracing::trace!(window, packet, bytes = n, "packet retransmitted");
    Ok(())
}

/// Send one datagram. A short send is an error, never a success.
async fn send_datagram(
    socket: &UdpSocket,
    bytes: &[u8],
    dest: SocketAddr,
) -> Result<(), TransportError> {
    let sent = socket.send_to(bytes, dest).await?;
    if sent != bytes.len() {
        return Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            format!("short datagram send: {sent} of {} bytes", bytes.len()),
        )));
    }
    Ok(())
}
