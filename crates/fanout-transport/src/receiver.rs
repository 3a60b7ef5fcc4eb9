//! The receiver's window engine.
//!
//! Per window: COLLECTING multiplexes the multicast data socket against
//! the TCP control channel until the window's bitmap fills or the sender
//! announces WINDOW_DONE. REPAIRING always sends one NACK (empty when
//! nothing is missing), then re-NACKs on a short timeout until the bitmap
//! fills, bounded by the configured repair-round cap. VERIFYING compares
//! the window's checksum against the sender's; the verdict (ACK or
//! RESEND) goes up the control channel, and the sender's broadcast reply
//! decides between advancing and re-collecting the same window.
//!
//! The loop ends when the window cursor passes the advisory window count
//! AND every packet the header promised has arrived; the packet count
//! is the termination authority.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use fanout_core::config::RepairConfig;
use fanout_core::integrity::checksum_range;
use fanout_core::wire::{ControlKind, ControlPacket, DataPacket, HeaderPacket, WINDOW_SIZE};

use crate::control::ControlChannel;
use crate::storage::FileStore;
use crate::window::{total_windows, window_base, WindowMap};
use crate::TransportError;

/// Counters reported when a transfer completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiveStats {
    /// Data packets accepted and written, across all rounds.
    pub packets_received: u64,
    /// Windows re-collected after a RESEND broadcast.
    pub windows_retried: u32,
    /// Repair rounds that timed out and re-sent a NACK.
    pub repair_rounds: u32,
}

pub struct Receiver {
    store: FileStore,
    data: UdpSocket,
    control: ControlChannel,
    packet_count: u32,
    total_windows: u32,
    repair_timeout: Duration,
    max_repair_rounds: u32,
}

enum CollectEvent {
    Datagram(usize),
    Control(ControlPacket),
}

impl Receiver {
    pub fn new(
        store: FileStore,
        data: UdpSocket,
        control: ControlChannel,
        header: &HeaderPacket,
        repair: &RepairConfig,
    ) -> Self {
        Receiver {
            store,
            data,
            control,
            packet_count: header.packet_count(),
            total_windows: total_windows(header.file_size()),
            repair_timeout: repair.timeout(),
            max_repair_rounds: repair.max_rounds,
        }
    }

    /// Drive the transfer to completion. Returns once every promised
    /// packet has been written and the final window verified.
    pub async fn run(&mut self) -> Result<ReceiveStats, TransportError> {
        let mut stats = ReceiveStats::default();
        let mut received: u32 = 0;
        let mut window: u32 = 0;
        let mut buf = vec![0u8; DataPacket::WIRE_SIZE];

        while window <= self.total_windows || received < self.packet_count {
            let packets_left = (self.packet_count - received) as usize;
            let mut map = WindowMap::new(packets_left.min(WINDOW_SIZE));
            let mut window_packets: u32 = 0;

            // ── COLLECTING ───────────────────────────────────────────────────
            let done = loop {
                if map.is_complete() {
                    // everything arrived; the sender's WINDOW_DONE is next
                    break self.control.recv_control().await?;
                }

                let event = tokio::select! {
                    r = self.data.recv_from(&mut buf) => CollectEvent::Datagram(r?.0),
                    c = self.control.recv_control() => CollectEvent::Control(c?),
                };

                match event {
                    CollectEvent::Datagram(len) => {
                        let packet = match DataPacket::decode(&buf[..len]) {
                            Ok(p) => p,
                            Err(e) => {
                                // multicast is best-effort; drop and move on
                                tracing::debug!(error = %e, "undecodable datagram dropped");
                                continue;
                            }
                        };
                        if packet.window_number() != window {
                            tracing::debug!(
                                got = packet.window_number(),
                                want = window,
                                "stale-window packet dropped"
                            );
                            continue;
                        }
                        if map.mark(packet.packet_number()) {
                            self.store.write_span(packet.file_offset(), packet.payload())?;
                            window_packets += 1;
                            received += 1;
                            stats.packets_received += 1;
                        }
                    }
                    CollectEvent::Control(ctrl) => break ctrl,
                }
            };

            match done.kind()? {
                ControlKind::WindowDone => {}
                other => return Err(TransportError::UnexpectedControl(other)),
            }

            // resynchronize our window cursor with the sender's
            window = done.window_number();

            tracing::info!(
                window,
                received = window_packets,
                missing = map.missing_count(),
                progress = received,
                total = self.packet_count,
                "window collected"
            );

            // ── REPAIRING ────────────────────────────────────────────────────
            // Announce our missing set even when it is empty.
            self.send_nack(&map).await?;

            let mut rounds: u32 = 0;
            while !map.is_complete() {
                match timeout(self.repair_timeout, self.data.recv_from(&mut buf)).await {
                    Ok(r) => {
                        let len = r?.0;
                        let packet = match DataPacket::decode(&buf[..len]) {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::debug!(error = %e, "undecodable datagram dropped");
                                continue;
                            }
                        };
                        if map.mark(packet.packet_number()) {
                            self.store.write_span(packet.file_offset(), packet.payload())?;
                            window_packets += 1;
                            received += 1;
                            stats.packets_received += 1;
                        }
                    }
                    Err(_elapsed) => {
                        rounds += 1;
                        stats.repair_rounds += 1;
                        if self.max_repair_rounds != 0 && rounds >= self.max_repair_rounds {
                            return Err(TransportError::PeerLost(rounds));
                        }
                        // ask again with whatever is still outstanding
                        self.send_nack(&map).await?;
                    }
                }
            }

            // ── VERIFYING ────────────────────────────────────────────────────
            let ours = checksum_range(
                self.store.file(),
                window_base(done.window_number()),
                done.window_offset(),
            )?;
            let verified = ours == done.checksum();

            tracing::debug!(
                window,
                ours,
                theirs = done.checksum(),
                verified,
                "window checksum compared"
            );

            self.control
                .send_signal(if verified {
                    ControlKind::Ack
                } else {
                    ControlKind::Resend
                })
                .await?;

            // the sender's broadcast reply decides what happens next
            let reply = self.control.recv_control().await?;
            match reply.kind()? {
                ControlKind::Resend => {
                    // the whole window is coming again, for everyone
                    received -= window_packets;
                    stats.windows_retried += 1;
                    tracing::info!(window, "window will be re-sent");
                }
                ControlKind::Ack => {
                    window += 1;
                }
                other => return Err(TransportError::UnexpectedControl(other)),
            }
        }

        Ok(stats)
    }

    async fn send_nack(&mut self, map: &WindowMap) -> Result<(), TransportError> {
        let nack = fanout_core::wire::NackPacket::new(&map.missing())?;
        self.control.send_signal(ControlKind::Nack).await?;
        self.control.send_nack(&nack).await?;
        Ok(())
    }
}
